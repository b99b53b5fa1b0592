// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Secret provider capability
//!
//! Credentials are never looked up ambiently. A single [`SecretProvider`] is
//! chosen at start-up and handed to whatever needs a credential (today: the
//! source actions that authenticate against the repository host).

use serde::{Serialize, Serializer};
use std::collections::HashMap;

use crate::errors::{MailstackError, MailstackResult};

/// Pointer to a secret in the credential store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReference {
    /// Credential store entry
    pub secret_arn: String,
    /// Key the entry is encrypted with
    pub encryption_key_arn: String,
}

impl SecretReference {
    pub fn new(secret_arn: impl Into<String>, encryption_key_arn: impl Into<String>) -> Self {
        Self {
            secret_arn: secret_arn.into(),
            encryption_key_arn: encryption_key_arn.into(),
        }
    }
}

/// A secret as it may appear in a rendered definition
#[derive(Clone, PartialEq, Eq)]
pub enum SecretValue {
    /// Token the provisioning engine resolves at apply time
    Reference(String),
    /// Literal secret; never written out
    Plain(String),
}

impl SecretValue {
    /// Text safe to place in a rendered template
    pub fn rendered(&self) -> &str {
        match self {
            Self::Reference(token) => token,
            Self::Plain(_) => "****",
        }
    }

    /// The underlying value, for runners that authenticate directly
    pub fn expose(&self) -> &str {
        match self {
            Self::Reference(token) => token,
            Self::Plain(value) => value,
        }
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference(token) => f.debug_tuple("Reference").field(token).finish(),
            Self::Plain(_) => f.debug_tuple("Plain").field(&"****").finish(),
        }
    }
}

impl Serialize for SecretValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.rendered())
    }
}

/// Capability that turns secret references into usable values
pub trait SecretProvider: Send + Sync {
    /// Provider name, for logs
    fn name(&self) -> &str;

    /// Resolve a reference
    fn resolve(&self, reference: &SecretReference) -> MailstackResult<SecretValue>;
}

/// Emits dynamic references for the provisioning engine to resolve, so the
/// secret itself never passes through this process
#[derive(Debug, Default)]
pub struct DynamicReferenceProvider;

impl DynamicReferenceProvider {
    pub fn new() -> Self {
        Self
    }
}

impl SecretProvider for DynamicReferenceProvider {
    fn name(&self) -> &str {
        "dynamic-reference"
    }

    fn resolve(&self, reference: &SecretReference) -> MailstackResult<SecretValue> {
        if !reference.secret_arn.starts_with("arn:")
            || !reference.secret_arn.contains(":secretsmanager:")
        {
            return Err(MailstackError::SecretUnavailable {
                reference: reference.secret_arn.clone(),
                reason: "not a secrets manager ARN".into(),
            });
        }

        tracing::debug!(
            secret = %reference.secret_arn,
            key = %reference.encryption_key_arn,
            "using dynamic secret reference"
        );

        Ok(SecretValue::Reference(format!(
            "{{{{resolve:secretsmanager:{}:SecretString:::}}}}",
            reference.secret_arn
        )))
    }
}

/// In-memory secrets, keyed by secret ARN
#[derive(Default)]
pub struct StaticSecretProvider {
    secrets: HashMap<String, String>,
}

impl StaticSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, secret_arn: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(secret_arn.into(), value.into());
        self
    }
}

impl SecretProvider for StaticSecretProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn resolve(&self, reference: &SecretReference) -> MailstackResult<SecretValue> {
        self.secrets
            .get(&reference.secret_arn)
            .map(|v| SecretValue::Plain(v.clone()))
            .ok_or_else(|| MailstackError::SecretUnavailable {
                reference: reference.secret_arn.clone(),
                reason: "no such secret".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARN: &str = "arn:aws:secretsmanager:ap-southeast-2:1:secret:github-token";

    #[test]
    fn test_dynamic_reference() {
        let value = DynamicReferenceProvider::new()
            .resolve(&SecretReference::new(ARN, "arn:aws:kms:ap-southeast-2:1:key/k"))
            .unwrap();
        assert_eq!(
            value.rendered(),
            format!("{{{{resolve:secretsmanager:{}:SecretString:::}}}}", ARN)
        );
    }

    #[test]
    fn test_dynamic_reference_rejects_other_arns() {
        let result = DynamicReferenceProvider::new()
            .resolve(&SecretReference::new("arn:aws:kms:x:1:key/k", "k"));
        assert!(matches!(result, Err(MailstackError::SecretUnavailable { .. })));
    }

    #[test]
    fn test_plain_secret_is_redacted() {
        let provider = StaticSecretProvider::new().with_secret(ARN, "ghp_secret");
        let value = provider.resolve(&SecretReference::new(ARN, "k")).unwrap();

        assert_eq!(value.expose(), "ghp_secret");
        assert_eq!(serde_json::to_string(&value).unwrap(), "\"****\"");
        assert!(!format!("{:?}", value).contains("ghp_secret"));
    }

    #[test]
    fn test_static_provider_missing_secret() {
        let result = StaticSecretProvider::new().resolve(&SecretReference::new(ARN, "k"));
        assert!(result.is_err());
    }
}
