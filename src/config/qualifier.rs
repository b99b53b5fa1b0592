// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Environment qualifier
//!
//! A qualifier namespaces every generated name (`QueueStack` becomes
//! `QueueStack-staging`) so one definition can be instantiated several
//! times in the same account.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::errors::{MailstackError, MailstackResult};

static QUALIFIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9-]{0,30}[a-z0-9]$").expect("qualifier pattern is valid")
});

/// Validated environment qualifier such as `dev`, `test` or `prod`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Qualifier(String);

impl Qualifier {
    /// Parse a qualifier; blank input means "no qualifier"
    pub fn parse(raw: &str) -> MailstackResult<Option<Self>> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        if !QUALIFIER_PATTERN.is_match(trimmed) {
            return Err(MailstackError::InvalidQualifier {
                qualifier: trimmed.to_string(),
                reason: "must be 2-32 lowercase letters, digits or inner dashes".into(),
            });
        }

        Ok(Some(Self(trimmed.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append this qualifier to a base name
    pub fn apply(&self, base: &str) -> String {
        format!("{}-{}", base, self.0)
    }
}

impl TryFrom<String> for Qualifier {
    type Error = MailstackError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)?.ok_or_else(|| MailstackError::InvalidQualifier {
            qualifier: value,
            reason: "must not be empty".into(),
        })
    }
}

impl From<Qualifier> for String {
    fn from(q: Qualifier) -> Self {
        q.0
    }
}

impl std::fmt::Display for Qualifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Qualify `base` when a qualifier is present, otherwise return it unchanged
pub fn qualified_name(base: &str, qualifier: Option<&Qualifier>) -> String {
    match qualifier {
        Some(q) => q.apply(base),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_is_none() {
        assert!(Qualifier::parse("").unwrap().is_none());
        assert!(Qualifier::parse("   ").unwrap().is_none());
    }

    #[test]
    fn test_valid_qualifiers() {
        for raw in ["qa", "dev", "test", "prod", "staging", "pr-42"] {
            let q = Qualifier::parse(raw).unwrap().unwrap();
            assert_eq!(q.as_str(), raw);
        }
    }

    #[test]
    fn test_invalid_qualifiers() {
        for raw in ["Prod", "-dev", "dev-", "dev_1", "a b", "e"] {
            assert!(
                matches!(
                    Qualifier::parse(raw),
                    Err(MailstackError::InvalidQualifier { .. })
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_qualified_name() {
        let q = Qualifier::parse("staging").unwrap();
        assert_eq!(qualified_name("QueueStack", q.as_ref()), "QueueStack-staging");
        assert_eq!(qualified_name("QueueStack", None), "QueueStack");
    }
}
