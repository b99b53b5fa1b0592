// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Error types for stack and pipeline orchestration
//!
//! Every fatal condition is a [`MailstackError`] carrying a stable diagnostic
//! code and, where it helps, a hint pointing at the fix. Errors fall into the
//! categories returned by [`MailstackError::category`].

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for mailstack operations
pub type MailstackResult<T> = Result<T, MailstackError>;

/// Broad classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Required external value absent, empty or malformed
    Configuration,
    /// Inconsistent stack or pipeline graph
    Definition,
    /// An action reported failure or broke its contract
    Execution,
    /// A deploy reached apply time with an unresolved deferred binding
    DeferredBinding,
    /// Filesystem or serialization failure
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Definition => write!(f, "definition"),
            Self::Execution => write!(f, "execution"),
            Self::DeferredBinding => write!(f, "deferred-binding"),
            Self::Io => write!(f, "io"),
        }
    }
}

/// Main error type for mailstack
#[derive(Error, Debug, Diagnostic)]
pub enum MailstackError {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Required configuration key '{key}' is missing or empty")]
    #[diagnostic(
        code(mailstack::missing_config),
        help("Set {key} in the environment, on the command line, or in mailstack.yaml")
    )]
    MissingConfig { key: String },

    #[error("Configuration key '{key}' is invalid: {reason}")]
    #[diagnostic(code(mailstack::invalid_config))]
    InvalidConfig { key: String, reason: String },

    #[error("Environment qualifier '{qualifier}' is invalid: {reason}")]
    #[diagnostic(
        code(mailstack::invalid_qualifier),
        help("Use lowercase letters, digits and dashes, e.g. 'dev' or 'staging'")
    )]
    InvalidQualifier { qualifier: String, reason: String },

    #[error("Failed to resolve secret '{reference}': {reason}")]
    #[diagnostic(code(mailstack::secret_unavailable))]
    SecretUnavailable { reference: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Stack Definition Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Stack '{stack}' is defined more than once")]
    #[diagnostic(code(mailstack::duplicate_stack))]
    DuplicateStack { stack: String },

    #[error("Stack '{stack}' declares output '{output}' twice")]
    #[diagnostic(code(mailstack::duplicate_output))]
    DuplicateOutput { stack: String, output: String },

    #[error("Stack '{stack}' declares input '{input}' twice")]
    #[diagnostic(code(mailstack::duplicate_input))]
    DuplicateInput { stack: String, input: String },

    #[error("Stack '{stack}' declares resource '{logical_id}' twice")]
    #[diagnostic(code(mailstack::duplicate_resource))]
    DuplicateResource { stack: String, logical_id: String },

    #[error("Stack '{stack}' has no input named '{input}'")]
    #[diagnostic(
        code(mailstack::undeclared_input),
        help("Only inputs declared on the stack can receive parameter bindings")
    )]
    UndeclaredInput { stack: String, input: String },

    #[error("Input '{input}' of stack '{stack}' has no parameter binding")]
    #[diagnostic(
        code(mailstack::unbound_input),
        help("Add a parameter override for '{input}' to the deploy action of '{stack}'")
    )]
    UnboundInput { stack: String, input: String },

    #[error("Output '{output}' of stack '{stack}' was already resolved to '{existing}'")]
    #[diagnostic(code(mailstack::output_already_resolved))]
    OutputAlreadyResolved {
        stack: String,
        output: String,
        existing: String,
    },

    #[error("Output '{output}' of stack '{stack}' has not been resolved yet")]
    #[diagnostic(
        code(mailstack::unresolved_output),
        help("Outputs only have a value after the stack's deploy action has completed")
    )]
    UnresolvedOutput { stack: String, output: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline Definition Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline '{pipeline}' has no stages")]
    #[diagnostic(code(mailstack::empty_pipeline))]
    EmptyPipeline { pipeline: String },

    #[error("Stage '{stage}' is defined more than once")]
    #[diagnostic(code(mailstack::duplicate_stage))]
    DuplicateStage { stage: String },

    #[error("Action '{action}' is defined more than once")]
    #[diagnostic(code(mailstack::duplicate_action))]
    DuplicateAction { action: String },

    #[error("Action '{action}' is invalid: {reason}")]
    #[diagnostic(code(mailstack::invalid_action))]
    InvalidAction { action: String, reason: String },

    #[error("Dangling artifact reference: action '{action}' consumes '{artifact}', which no action produces")]
    #[diagnostic(
        code(mailstack::dangling_artifact),
        help("Declare '{artifact}' as the output of a source or build action in an earlier stage")
    )]
    DanglingArtifact { action: String, artifact: String },

    #[error("Artifact '{artifact}' is produced by both '{first}' and '{second}'")]
    #[diagnostic(code(mailstack::duplicate_artifact_producer))]
    DuplicateArtifactProducer {
        artifact: String,
        first: String,
        second: String,
    },

    #[error("Action '{action}' consumes '{artifact}' before its producer '{producer}' runs")]
    #[diagnostic(
        code(mailstack::artifact_order),
        help("Move '{producer}' to an earlier stage, or before '{action}' in the same stage")
    )]
    ArtifactOrder {
        action: String,
        artifact: String,
        producer: String,
    },

    #[error("Deploy action '{action}' targets unknown stack '{stack}'")]
    #[diagnostic(code(mailstack::unknown_stack))]
    UnknownStack { action: String, stack: String },

    #[error("Stack '{stack}' is deployed by more than one action")]
    #[diagnostic(code(mailstack::multiple_deploys))]
    MultipleDeploys { stack: String },

    #[error("Circular dependency detected between actions")]
    #[diagnostic(
        code(mailstack::circular_dependency),
        help("Artifacts must flow from earlier actions to later ones")
    )]
    CircularDependency { actions: Vec<String> },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Action '{action}' in stage '{stage}' failed: {message}")]
    #[diagnostic(code(mailstack::action_failed))]
    ActionFailed {
        action: String,
        stage: String,
        consumed: Vec<String>,
        produced: Vec<String>,
        message: String,
    },

    #[error("Action '{action}' broke its contract: {reason}")]
    #[diagnostic(code(mailstack::runner_contract))]
    RunnerContract { action: String, reason: String },

    #[error("Artifact '{artifact}' was already produced")]
    #[diagnostic(code(mailstack::artifact_already_produced))]
    ArtifactAlreadyProduced { artifact: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Deferred Binding Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Deploy action '{action}' cannot apply: binding '{key}' still refers to unresolved {reference}")]
    #[diagnostic(
        code(mailstack::unresolved_binding),
        help("A deferred binding must point at an artifact or output produced by an earlier action")
    )]
    UnresolvedBinding {
        action: String,
        key: String,
        reference: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(mailstack::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to write file '{path}': {error}")]
    #[diagnostic(code(mailstack::file_write_error))]
    FileWriteError { path: PathBuf, error: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(mailstack::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(mailstack::yaml_error))]
    Yaml { message: String },

    #[error("JSON error: {message}")]
    #[diagnostic(code(mailstack::json_error))]
    Json { message: String },
}

impl From<std::io::Error> for MailstackError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for MailstackError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for MailstackError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl MailstackError {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingConfig { .. }
            | Self::InvalidConfig { .. }
            | Self::InvalidQualifier { .. }
            | Self::SecretUnavailable { .. } => ErrorCategory::Configuration,

            Self::DuplicateStack { .. }
            | Self::DuplicateOutput { .. }
            | Self::DuplicateInput { .. }
            | Self::DuplicateResource { .. }
            | Self::UndeclaredInput { .. }
            | Self::UnboundInput { .. }
            | Self::OutputAlreadyResolved { .. }
            | Self::UnresolvedOutput { .. }
            | Self::EmptyPipeline { .. }
            | Self::DuplicateStage { .. }
            | Self::DuplicateAction { .. }
            | Self::InvalidAction { .. }
            | Self::DanglingArtifact { .. }
            | Self::DuplicateArtifactProducer { .. }
            | Self::ArtifactOrder { .. }
            | Self::UnknownStack { .. }
            | Self::MultipleDeploys { .. }
            | Self::CircularDependency { .. } => ErrorCategory::Definition,

            Self::ActionFailed { .. }
            | Self::RunnerContract { .. }
            | Self::ArtifactAlreadyProduced { .. } => ErrorCategory::Execution,

            Self::UnresolvedBinding { .. } => ErrorCategory::DeferredBinding,

            Self::FileReadError { .. }
            | Self::FileWriteError { .. }
            | Self::Io { .. }
            | Self::Yaml { .. }
            | Self::Json { .. } => ErrorCategory::Io,
        }
    }

    /// Whether the run must stop before any side-effecting action starts
    pub fn is_fatal_before_execution(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Configuration | ErrorCategory::Definition
        )
    }

    /// Recovery suggestion for errors a user can fix by editing input
    pub fn recovery(&self) -> Option<RecoverySuggestion> {
        match self {
            Self::MissingConfig { key } => Some(RecoverySuggestion::set_config_key(key)),
            Self::DanglingArtifact { action, artifact } => {
                Some(RecoverySuggestion::produce_artifact(action, artifact))
            }
            Self::UnboundInput { stack, input } => {
                Some(RecoverySuggestion::bind_input(stack, input))
            }
            Self::CircularDependency { actions } => {
                Some(RecoverySuggestion::fix_circular_dependency(actions))
            }
            _ => None,
        }
    }
}
