// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Action runners
//!
//! The external execution engine sits behind [`ActionRunner`]. The pipeline
//! executor hands it one [`ActionRequest`] at a time and gets back an
//! [`ActionOutcome`]; fetching, building and applying templates are entirely
//! the runner's business.

mod simulated;

pub use simulated::SimulatedRunner;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::MailstackResult;
use crate::pipeline::{Action, ArtifactLocation};

/// Everything a runner needs to perform one action
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub pipeline: String,
    pub stage: String,
    pub action: Action,

    /// Locations of the action's input artifacts
    pub inputs: BTreeMap<String, ArtifactLocation>,

    /// Resolved parameter overrides (deploy actions only)
    pub parameters: BTreeMap<String, String>,

    /// Outputs the deployed stack is expected to report (deploy actions only)
    pub stack_outputs: Vec<String>,

    /// Bucket the engine stores artifacts in
    pub artifact_bucket: String,
}

/// Result of running one action
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// Whether the action succeeded
    pub success: bool,

    /// Failure reason, or a short summary on success
    pub message: String,

    /// Produced artifacts by name
    pub artifacts: BTreeMap<String, ArtifactLocation>,

    /// Output values reported by a deployed stack
    pub stack_outputs: BTreeMap<String, String>,

    pub duration: Duration,
}

impl ActionOutcome {
    /// Create a successful outcome
    pub fn success(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: true,
            message: message.into(),
            artifacts: BTreeMap::new(),
            stack_outputs: BTreeMap::new(),
            duration,
        }
    }

    /// Create a failed outcome
    pub fn failure(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            message: message.into(),
            artifacts: BTreeMap::new(),
            stack_outputs: BTreeMap::new(),
            duration,
        }
    }

    pub fn with_artifact(mut self, name: impl Into<String>, location: ArtifactLocation) -> Self {
        self.artifacts.insert(name.into(), location);
        self
    }

    pub fn with_stack_output(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.stack_outputs.insert(name.into(), value.into());
        self
    }
}

/// The execution engine
#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// Engine name, for logs and reports
    fn name(&self) -> &str;

    /// Perform one action. `Err` means the engine itself could not be
    /// reached; a failed action is an `Ok` outcome with `success == false`.
    async fn run(&self, request: &ActionRequest) -> MailstackResult<ActionOutcome>;
}
