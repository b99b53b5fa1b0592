// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Pipeline definition structures
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s; each stage groups
//! [`Action`]s that declare the artifacts they consume and produce.

use serde::Serialize;
use std::collections::BTreeMap;

use super::ArtifactPath;
use crate::binding::BindingSet;
use crate::secrets::SecretValue;

/// Delivery pipeline
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Bucket where the execution engine stores artifacts
    pub artifact_bucket: String,

    /// Stages in execution order
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, artifact_bucket: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact_bucket: artifact_bucket.into(),
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Get a stage by name
    pub fn get_stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Get all stage names
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Every action with its position: (stage index, index within stage)
    pub fn positioned_actions(&self) -> impl Iterator<Item = ActionPosition<'_>> {
        self.stages.iter().enumerate().flat_map(|(stage_index, stage)| {
            stage
                .actions
                .iter()
                .enumerate()
                .map(move |(action_index, action)| ActionPosition {
                    stage_index,
                    action_index,
                    stage,
                    action,
                })
        })
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.stages.iter().flat_map(|s| s.actions.iter())
    }

    pub fn get_action(&self, name: &str) -> Option<&Action> {
        self.actions().find(|a| a.name == name)
    }

    /// Deploy actions, with the stack each one targets
    pub fn deploy_actions(&self) -> impl Iterator<Item = (&Action, &DeployTarget)> {
        self.actions().filter_map(|a| match &a.kind {
            ActionKind::Deploy(target) => Some((a, target)),
            _ => None,
        })
    }

    /// Names of all produced artifacts, in declaration order
    pub fn artifact_names(&self) -> Vec<&str> {
        self.actions()
            .flat_map(|a| a.outputs.iter().map(String::as_str))
            .collect()
    }
}

/// Where an action sits in the pipeline
#[derive(Debug, Clone, Copy)]
pub struct ActionPosition<'a> {
    pub stage_index: usize,
    pub action_index: usize,
    pub stage: &'a Stage,
    pub action: &'a Action,
}

impl ActionPosition<'_> {
    /// Whether `self` runs strictly before `other` may start
    pub fn precedes(&self, other: &ActionPosition<'_>) -> bool {
        (self.stage_index, self.action_index) < (other.stage_index, other.action_index)
    }
}

/// Ordered group of actions separated from the next stage by a barrier
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Stage {
    /// Stage name (must be unique within pipeline)
    pub name: String,

    pub actions: Vec<Action>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

/// Unit of pipeline work
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Action {
    /// Action name (must be unique within pipeline)
    pub name: String,

    #[serde(flatten)]
    pub kind: ActionKind,

    /// Artifacts this action reads
    #[serde(rename = "InputArtifacts")]
    pub inputs: Vec<String>,

    /// Artifacts this action writes
    #[serde(rename = "OutputArtifacts")]
    pub outputs: Vec<String>,
}

impl Action {
    /// Fetch a repository snapshot into `output`
    pub fn source(name: impl Into<String>, source: SourceFetch, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ActionKind::SourceFetch(source),
            inputs: Vec::new(),
            outputs: vec![output.into()],
        }
    }

    /// Build `input` into `output`
    pub fn build(
        name: impl Into<String>,
        build: BuildProject,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ActionKind::Build(build),
            inputs: vec![input.into()],
            outputs: vec![output.into()],
        }
    }

    /// Apply the template at `target.template_path`; the template's artifact
    /// is an input, as is every artifact read by `extra_inputs`
    pub fn deploy(name: impl Into<String>, target: DeployTarget, extra_inputs: Vec<String>) -> Self {
        let mut inputs = vec![target.template_path.artifact.clone()];
        for extra in extra_inputs {
            if !inputs.contains(&extra) {
                inputs.push(extra);
            }
        }

        Self {
            name: name.into(),
            kind: ActionKind::Deploy(target),
            inputs,
            outputs: Vec::new(),
        }
    }

    /// Kind label
    pub fn kind_name(&self) -> &'static str {
        self.kind.label()
    }

    /// Only deploy actions change live infrastructure
    pub fn mutates_environment(&self) -> bool {
        matches!(self.kind, ActionKind::Deploy(_))
    }

    /// Flat key/value view of the action's configuration
    pub fn configuration(&self) -> BTreeMap<String, String> {
        let mut config = BTreeMap::new();
        match &self.kind {
            ActionKind::SourceFetch(source) => {
                config.insert("Owner".into(), source.owner.clone());
                config.insert("Repo".into(), source.repo.clone());
                config.insert("Branch".into(), source.branch.clone());
                config.insert("OAuthToken".into(), source.oauth_token.rendered().to_string());
            }
            ActionKind::Build(build) => {
                config.insert("ProjectName".into(), build.project.clone());
                config.insert("BuildImage".into(), build.build_image.clone());
                for (key, value) in &build.environment {
                    config.insert(format!("env.{}", key), value.clone());
                }
            }
            ActionKind::Deploy(target) => {
                config.insert("StackName".into(), target.stack_name.clone());
                config.insert("TemplatePath".into(), target.template_path.to_string());
                config.insert("AdminPermissions".into(), target.admin_permissions.to_string());
                for (key, source) in target.parameter_overrides.iter() {
                    config.insert(format!("param.{}", key), source.describe());
                }
            }
        }
        config
    }
}

/// What an action does
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "Category", content = "Configuration")]
pub enum ActionKind {
    #[serde(rename = "Source")]
    SourceFetch(SourceFetch),
    Build(BuildProject),
    Deploy(DeployTarget),
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SourceFetch(_) => "source-fetch",
            Self::Build(_) => "build",
            Self::Deploy(_) => "deploy",
        }
    }
}

/// Repository snapshot to fetch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceFetch {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    #[serde(rename = "OAuthToken")]
    pub oauth_token: SecretValue,
}

/// Build project run against a source snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuildProject {
    #[serde(rename = "ProjectName")]
    pub project: String,

    pub build_image: String,

    /// Environment-style configuration handed to the build
    #[serde(rename = "EnvironmentVariables")]
    pub environment: BTreeMap<String, String>,

    /// Inline build specification; `None` uses the repository's own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_spec: Option<BuildSpec>,
}

/// Inline build specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildSpec {
    pub install: Vec<String>,
    pub build: Vec<String>,
    /// Directory the output files are taken from
    pub base_directory: Option<String>,
    /// Files packed into the output artifact; empty means everything
    pub files: Vec<String>,
}

impl BuildSpec {
    /// Render as a buildspec document
    pub fn to_document(&self) -> serde_json::Value {
        let mut artifacts = serde_json::Map::new();
        if let Some(ref base) = self.base_directory {
            artifacts.insert("base-directory".into(), serde_json::json!(base));
        }
        artifacts.insert(
            "files".into(),
            if self.files.is_empty() {
                serde_json::json!(["**/*"])
            } else {
                serde_json::json!(self.files)
            },
        );

        serde_json::json!({
            "version": "0.2",
            "phases": {
                "install": { "commands": self.install },
                "build": { "commands": self.build },
            },
            "artifacts": artifacts,
        })
    }
}

/// Stack a deploy action brings to its declared state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeployTarget {
    pub stack_name: String,
    pub template_path: ArtifactPath,
    pub admin_permissions: bool,
    pub parameter_overrides: BindingSet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{LocationField, ParameterBinding};
    use crate::secrets::SecretValue;

    fn token() -> SecretValue {
        SecretValue::Reference("{{resolve:secretsmanager:x:SecretString:::}}".into())
    }

    fn source(repo: &str) -> SourceFetch {
        SourceFetch {
            owner: "2pisoftware".into(),
            repo: repo.into(),
            branch: "master".into(),
            oauth_token: token(),
        }
    }

    fn build() -> BuildProject {
        BuildProject {
            project: "LambdaBuild".into(),
            build_image: "aws/codebuild/standard:3.0".into(),
            environment: BTreeMap::from([("GO_VERSION".to_string(), "1.15.1".to_string())]),
            build_spec: None,
        }
    }

    #[test]
    fn test_action_constructors() {
        let fetch = Action::source("LambdaSource", source("consumer"), "LambdaSourceOutput");
        assert!(fetch.inputs.is_empty());
        assert_eq!(fetch.outputs, vec!["LambdaSourceOutput"]);
        assert_eq!(fetch.kind_name(), "source-fetch");

        let compile = Action::build("LambdaBuild", build(), "LambdaSourceOutput", "LambdaBuildOutput");
        assert_eq!(compile.inputs, vec!["LambdaSourceOutput"]);
        assert!(!compile.mutates_environment());

        let target = DeployTarget {
            stack_name: "QueueStack".into(),
            template_path: ArtifactPath::new("CdkBuildOutput", "QueueStack.template.json"),
            admin_permissions: true,
            parameter_overrides: BindingSet::new(),
        };
        let deploy = Action::deploy(
            "CDKDeploy",
            target,
            vec!["LambdaBuildOutput".into(), "CdkBuildOutput".into()],
        );
        assert_eq!(deploy.inputs, vec!["CdkBuildOutput", "LambdaBuildOutput"]);
        assert!(deploy.outputs.is_empty());
        assert!(deploy.mutates_environment());
    }

    #[test]
    fn test_positions() {
        let pipeline = Pipeline::new("p", "bucket")
            .with_stage(
                Stage::new("Source")
                    .with_action(Action::source("A", source("a"), "AOut"))
                    .with_action(Action::source("B", source("b"), "BOut")),
            )
            .with_stage(Stage::new("Build").with_action(Action::build("C", build(), "AOut", "COut")));

        let positions: Vec<_> = pipeline.positioned_actions().collect();
        assert_eq!(positions.len(), 3);
        assert!(positions[0].precedes(&positions[1]));
        assert!(positions[1].precedes(&positions[2]));
        assert!(!positions[2].precedes(&positions[0]));
        assert_eq!(pipeline.artifact_names(), vec!["AOut", "BOut", "COut"]);
    }

    #[test]
    fn test_serialized_shape() {
        let mut overrides = BindingSet::new();
        overrides.insert(ParameterBinding::artifact_location(
            "CodeKey",
            "LambdaBuildOutput",
            LocationField::ObjectKey,
        ));
        let deploy = Action::deploy(
            "CDKDeploy",
            DeployTarget {
                stack_name: "QueueStack".into(),
                template_path: ArtifactPath::new("CdkBuildOutput", "QueueStack.template.json"),
                admin_permissions: true,
                parameter_overrides: overrides,
            },
            vec!["LambdaBuildOutput".into()],
        );

        let value = serde_json::to_value(&deploy).unwrap();
        assert_eq!(value["Name"], "CDKDeploy");
        assert_eq!(value["Category"], "Deploy");
        assert_eq!(
            value["Configuration"]["ParameterOverrides"]["CodeKey"]["Fn::GetArtifactAtt"][1],
            "ObjectKey"
        );
        assert_eq!(value["InputArtifacts"][1], "LambdaBuildOutput");
    }

    #[test]
    fn test_build_spec_document() {
        let spec = BuildSpec {
            install: vec!["cargo build --release".into()],
            build: vec!["mailstack synth".into()],
            base_directory: Some("cdk.out".into()),
            files: vec!["QueueStack.template.json".into()],
        };

        let doc = spec.to_document();
        assert_eq!(doc["version"], "0.2");
        assert_eq!(doc["artifacts"]["base-directory"], "cdk.out");
        assert_eq!(doc["artifacts"]["files"][0], "QueueStack.template.json");
    }

    #[test]
    fn test_configuration_never_exposes_plain_secret() {
        let mut fetch = source("consumer");
        fetch.oauth_token = SecretValue::Plain("ghp_secret".into());
        let action = Action::source("LambdaSource", fetch, "Out");

        let config = action.configuration();
        assert_eq!(config["OAuthToken"], "****");
        assert_eq!(config["Repo"], "consumer");
    }
}
