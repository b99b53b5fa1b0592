// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Deferred stack outputs
//!
//! An [`OutputHandle`] is handed out when a stack declares an output, long
//! before the stack is deployed. Other stacks bind to the handle; the executor
//! writes the concrete value exactly once after the deploy action completes.

use std::sync::{Arc, OnceLock};

use crate::errors::{MailstackError, MailstackResult};

#[derive(Debug)]
struct OutputCell {
    stack: String,
    name: String,
    export_name: String,
    value: OnceLock<String>,
}

/// Forward reference to a value a stack produces once deployed
#[derive(Debug, Clone)]
pub struct OutputHandle {
    cell: Arc<OutputCell>,
}

impl OutputHandle {
    pub(crate) fn new(stack: &str, name: &str) -> Self {
        Self {
            cell: Arc::new(OutputCell {
                stack: stack.to_string(),
                name: name.to_string(),
                export_name: format!("{}:{}", stack, name),
                value: OnceLock::new(),
            }),
        }
    }

    /// Name of the stack that owns this output
    pub fn stack(&self) -> &str {
        &self.cell.stack
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Cross-stack export name (`<stack>:<output>`)
    pub fn export_name(&self) -> &str {
        &self.cell.export_name
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.value.get().is_some()
    }

    /// Record the deployed value. A second write is rejected, even with the
    /// same value.
    pub fn resolve(&self, value: impl Into<String>) -> MailstackResult<()> {
        self.cell.value.set(value.into()).map_err(|_| {
            MailstackError::OutputAlreadyResolved {
                stack: self.cell.stack.clone(),
                output: self.cell.name.clone(),
                existing: self.cell.value.get().cloned().unwrap_or_default(),
            }
        })?;

        tracing::debug!(stack = %self.cell.stack, output = %self.cell.name, "output resolved");
        Ok(())
    }

    /// Read the deployed value
    pub fn get(&self) -> MailstackResult<&str> {
        self.cell
            .value
            .get()
            .map(String::as_str)
            .ok_or_else(|| MailstackError::UnresolvedOutput {
                stack: self.cell.stack.clone(),
                output: self.cell.name.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_before_resolve_fails() {
        let handle = OutputHandle::new("QueueStack", "QueueUrl");
        assert!(!handle.is_resolved());
        assert!(matches!(
            handle.get(),
            Err(MailstackError::UnresolvedOutput { .. })
        ));
    }

    #[test]
    fn test_write_once() {
        let handle = OutputHandle::new("QueueStack", "QueueUrl");
        let alias = handle.clone();

        handle.resolve("https://sqs/1").unwrap();
        assert_eq!(alias.get().unwrap(), "https://sqs/1");

        let second = alias.resolve("https://sqs/2");
        assert!(matches!(
            second,
            Err(MailstackError::OutputAlreadyResolved { ref existing, .. }) if existing == "https://sqs/1"
        ));

        // Re-reading after a rejected write returns the original value
        assert_eq!(handle.get().unwrap(), "https://sqs/1");
        assert_eq!(handle.get().unwrap(), alias.get().unwrap());
    }

    #[test]
    fn test_export_name() {
        let handle = OutputHandle::new("QueueStack-dev", "QueueArn");
        assert_eq!(handle.export_name(), "QueueStack-dev:QueueArn");
    }
}
