// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for recovering from errors.

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Suggest providing a missing configuration value
    pub fn set_config_key(key: &str) -> Self {
        Self {
            action: format!("Provide a value for {}", key),
            steps: vec![
                format!("'{}' is required before any stack is constructed", key),
                "Set it as an environment variable, pass it as a flag, or add it to mailstack.yaml"
                    .into(),
            ],
            commands: vec![
                "# As an environment variable:".into(),
                format!("export {}=arn:aws:...", key),
                "".into(),
                "# Check the full configuration:".into(),
                "mailstack validate".into(),
            ],
        }
    }

    /// Suggest declaring a producer for a dangling artifact
    pub fn produce_artifact(action: &str, artifact: &str) -> Self {
        Self {
            action: format!("Add a producer for artifact '{}'", artifact),
            steps: vec![
                format!("Action '{}' reads '{}' but nothing writes it", action, artifact),
                "Declare the artifact as the output of a source or build action".into(),
                "The producer must sit in an earlier stage than the consumer".into(),
            ],
            commands: vec![
                "# Show which actions produce and consume artifacts:".into(),
                "mailstack plan".into(),
            ],
        }
    }

    /// Suggest binding a stack input on its deploy action
    pub fn bind_input(stack: &str, input: &str) -> Self {
        Self {
            action: format!("Bind input '{}' of stack '{}'", input, stack),
            steps: vec![
                format!("Stack '{}' declares '{}' as a deploy-time parameter", stack, input),
                "Its deploy action must carry a parameter override for it".into(),
            ],
            commands: vec![],
        }
    }

    /// Suggest fixing a circular dependency
    pub fn fix_circular_dependency(actions: &[String]) -> Self {
        Self {
            action: "Remove circular dependency".into(),
            steps: vec![
                format!("Detected cycle: {}", actions.join(" → ")),
                "Review which artifacts each action consumes".into(),
            ],
            commands: vec![
                "# Visualize the action graph:".into(),
                "mailstack graph --format mermaid".into(),
            ],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}
