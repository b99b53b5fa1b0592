// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Pipeline validation
//!
//! Every check here runs before any action is handed to a runner. A pipeline
//! that passes cannot hit a dangling artifact or an unbound stack input at
//! execution time.

use std::collections::{HashMap, HashSet};

use crate::binding::BindingSource;
use crate::errors::{MailstackError, MailstackResult};
use crate::pipeline::{Action, ActionGraph, ActionKind, ActionPosition, Pipeline};
use crate::stack::StackSet;

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Run every check and collect all issues
    pub fn validate(pipeline: &Pipeline, stacks: &StackSet) -> ValidationResult {
        let mut result = ValidationResult::new();

        if pipeline.stages.is_empty() {
            result.add_error(MailstackError::EmptyPipeline {
                pipeline: pipeline.name.clone(),
            });
            return result;
        }

        Self::check_names(pipeline, &mut result);

        for stage in &pipeline.stages {
            if stage.actions.is_empty() {
                result.add_warning(format!("Stage '{}' has no actions", stage.name));
            }
            for action in &stage.actions {
                Self::check_kind_contract(action, &mut result);
            }
        }

        Self::check_artifacts(pipeline, &mut result);
        Self::check_deploys(pipeline, stacks, &mut result);

        if let Err(e) = ActionGraph::build(pipeline) {
            result.add_error(e);
        }

        tracing::debug!(
            pipeline = %pipeline.name,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "pipeline validated"
        );
        result
    }

    /// Fail fast with the first issue found
    pub fn check(pipeline: &Pipeline, stacks: &StackSet) -> MailstackResult<ValidationResult> {
        let mut result = Self::validate(pipeline, stacks);
        if result.errors.is_empty() {
            Ok(result)
        } else {
            Err(result.errors.remove(0))
        }
    }

    fn check_names(pipeline: &Pipeline, result: &mut ValidationResult) {
        let mut stages = HashSet::new();
        let mut actions = HashSet::new();

        for stage in &pipeline.stages {
            if !stages.insert(stage.name.as_str()) {
                result.add_error(MailstackError::DuplicateStage {
                    stage: stage.name.clone(),
                });
            }
            for action in &stage.actions {
                if action.name.trim().is_empty() {
                    result.add_error(MailstackError::InvalidAction {
                        action: action.name.clone(),
                        reason: format!("action in stage '{}' has an empty name", stage.name),
                    });
                } else if !actions.insert(action.name.as_str()) {
                    result.add_error(MailstackError::DuplicateAction {
                        action: action.name.clone(),
                    });
                }
            }
        }
    }

    fn check_kind_contract(action: &Action, result: &mut ValidationResult) {
        let invalid = |reason: String| MailstackError::InvalidAction {
            action: action.name.clone(),
            reason,
        };

        match &action.kind {
            ActionKind::SourceFetch(_) => {
                if !action.inputs.is_empty() {
                    result.add_error(invalid("source actions take no input artifacts".into()));
                }
                if action.outputs.len() != 1 {
                    result.add_error(invalid(format!(
                        "source actions produce exactly one artifact, found {}",
                        action.outputs.len()
                    )));
                }
            }
            ActionKind::Build(_) => {
                if action.inputs.len() != 1 {
                    result.add_error(invalid(format!(
                        "build actions consume exactly one source artifact, found {}",
                        action.inputs.len()
                    )));
                }
                if action.outputs.len() != 1 {
                    result.add_error(invalid(format!(
                        "build actions produce exactly one artifact, found {}",
                        action.outputs.len()
                    )));
                }
            }
            ActionKind::Deploy(target) => {
                if !action.outputs.is_empty() {
                    result.add_error(invalid("deploy actions produce no artifacts".into()));
                }
                if !action.inputs.contains(&target.template_path.artifact) {
                    result.add_error(invalid(format!(
                        "template artifact '{}' is not an input",
                        target.template_path.artifact
                    )));
                }
                for artifact in target.parameter_overrides.artifacts() {
                    if !action.inputs.iter().any(|i| i == artifact) {
                        result.add_error(invalid(format!(
                            "parameter override reads artifact '{}', which is not an input",
                            artifact
                        )));
                    }
                }
            }
        }
    }

    fn check_artifacts(pipeline: &Pipeline, result: &mut ValidationResult) {
        let positions: Vec<ActionPosition<'_>> = pipeline.positioned_actions().collect();
        let mut producers: HashMap<&str, &ActionPosition<'_>> = HashMap::new();
        let mut consumed: HashSet<&str> = HashSet::new();

        for position in &positions {
            for output in &position.action.outputs {
                match producers.get(output.as_str()) {
                    Some(first) => result.add_error(MailstackError::DuplicateArtifactProducer {
                        artifact: output.clone(),
                        first: first.action.name.clone(),
                        second: position.action.name.clone(),
                    }),
                    None => {
                        producers.insert(output.as_str(), position);
                    }
                }
            }
        }

        for position in &positions {
            for input in &position.action.inputs {
                consumed.insert(input.as_str());
                match producers.get(input.as_str()) {
                    None => result.add_error(MailstackError::DanglingArtifact {
                        action: position.action.name.clone(),
                        artifact: input.clone(),
                    }),
                    Some(producer) if !producer.precedes(position) => {
                        result.add_error(MailstackError::ArtifactOrder {
                            action: position.action.name.clone(),
                            artifact: input.clone(),
                            producer: producer.action.name.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        for artifact in pipeline.artifact_names() {
            if !consumed.contains(artifact) {
                result.add_warning(format!("Artifact '{}' is produced but never consumed", artifact));
            }
        }
    }

    fn check_deploys(pipeline: &Pipeline, stacks: &StackSet, result: &mut ValidationResult) {
        let positions: Vec<ActionPosition<'_>> = pipeline.positioned_actions().collect();
        let mut deployed: HashMap<&str, &ActionPosition<'_>> = HashMap::new();

        for position in &positions {
            let ActionKind::Deploy(ref target) = position.action.kind else {
                continue;
            };

            if deployed.insert(target.stack_name.as_str(), position).is_some() {
                result.add_error(MailstackError::MultipleDeploys {
                    stack: target.stack_name.clone(),
                });
            }

            match stacks.get(&target.stack_name) {
                None => result.add_error(MailstackError::UnknownStack {
                    action: position.action.name.clone(),
                    stack: target.stack_name.clone(),
                }),
                Some(stack) => {
                    if let Err(e) = target.parameter_overrides.validate_against(stack) {
                        result.add_error(e);
                    }
                }
            }
        }

        // A stack output is only known once its own deploy has run
        for position in &positions {
            let ActionKind::Deploy(ref target) = position.action.kind else {
                continue;
            };

            for (key, source) in target.parameter_overrides.iter() {
                let BindingSource::StackOutput(handle) = source else {
                    continue;
                };

                let reason = match deployed.get(handle.stack()) {
                    None => Some(format!(
                        "override '{}' reads {}, but no action deploys that stack",
                        key,
                        source.describe()
                    )),
                    Some(producer) if !producer.precedes(position) => Some(format!(
                        "override '{}' reads {} before '{}' deploys it",
                        key,
                        source.describe(),
                        producer.action.name
                    )),
                    Some(_) => None,
                };

                if let Some(reason) = reason {
                    result.add_error(MailstackError::InvalidAction {
                        action: position.action.name.clone(),
                        reason,
                    });
                }
            }
        }
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<MailstackError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: MailstackError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
