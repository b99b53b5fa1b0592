// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Simulated execution engine
//!
//! Produces deterministic artifact locations and stack outputs without
//! touching any external system. Used by `mailstack run` to rehearse a
//! pipeline and by tests to inject failures.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{ActionOutcome, ActionRequest, ActionRunner};
use crate::errors::MailstackResult;
use crate::pipeline::{ActionKind, ArtifactLocation};

/// Engine that pretends to run actions
#[derive(Debug, Default)]
pub struct SimulatedRunner {
    failures: HashMap<String, String>,
    delay: Duration,
    started: Mutex<Vec<String>>,
}

impl SimulatedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `action` report failure with `message`
    pub fn fail(mut self, action: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(action.into(), message.into());
        self
    }

    /// Pause this long inside every action
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Actions started so far, in start order
    pub async fn started(&self) -> Vec<String> {
        self.started.lock().await.clone()
    }

    fn digest(parts: &[&str]) -> String {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize().to_hex().as_str()[..12].to_string()
    }

    fn location(request: &ActionRequest, artifact: &str, digest: &str) -> ArtifactLocation {
        ArtifactLocation::new(
            request.artifact_bucket.clone(),
            format!("{}/{}/{}", request.pipeline, artifact, digest),
        )
    }
}

#[async_trait]
impl ActionRunner for SimulatedRunner {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn run(&self, request: &ActionRequest) -> MailstackResult<ActionOutcome> {
        let start = Instant::now();
        let action = &request.action;
        self.started.lock().await.push(action.name.clone());

        tracing::debug!(
            stage = %request.stage,
            action = %action.name,
            kind = action.kind_name(),
            "simulating action"
        );

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(message) = self.failures.get(&action.name) {
            return Ok(ActionOutcome::failure(message.clone(), start.elapsed()));
        }

        let outcome = match &action.kind {
            ActionKind::SourceFetch(source) => {
                if source.oauth_token.expose().trim().is_empty() {
                    return Ok(ActionOutcome::failure(
                        format!("{}/{}: repository token is empty", source.owner, source.repo),
                        start.elapsed(),
                    ));
                }
                let revision = Self::digest(&[source.owner.as_str(), source.repo.as_str(), source.branch.as_str()]);
                let mut outcome = ActionOutcome::success(
                    format!("fetched {}/{}@{} ({})", source.owner, source.repo, source.branch, revision),
                    start.elapsed(),
                );
                for output in &action.outputs {
                    let location = Self::location(request, output, &Self::digest(&[action.name.as_str(), output.as_str(), revision.as_str()]))
                        .with_revision(revision.clone());
                    outcome = outcome.with_artifact(output.clone(), location);
                }
                outcome
            }
            ActionKind::Build(build) => {
                let mut parts: Vec<&str> = vec![action.name.as_str(), build.project.as_str()];
                parts.extend(request.inputs.values().map(|l| l.object_key.as_str()));
                let digest = Self::digest(&parts);
                let revision = request.inputs.values().find_map(|l| l.revision.clone());

                let mut outcome = ActionOutcome::success(format!("built {}", build.project), start.elapsed());
                for output in &action.outputs {
                    let mut location = Self::location(request, output, &digest);
                    location.revision = revision.clone();
                    outcome = outcome.with_artifact(output.clone(), location);
                }
                outcome
            }
            ActionKind::Deploy(target) => {
                let mut outcome = ActionOutcome::success(
                    format!(
                        "applied {} with {} parameter override(s)",
                        target.stack_name,
                        request.parameters.len()
                    ),
                    start.elapsed(),
                );
                for output in &request.stack_outputs {
                    outcome = outcome.with_stack_output(
                        output.clone(),
                        format!("sim://{}/{}", target.stack_name, output),
                    );
                }
                outcome
            }
        };

        Ok(outcome)
    }
}
