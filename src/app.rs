// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! The mail service application
//!
//! Assembles the queue stack, the delivery pipeline that keeps it up to
//! date, and the stack that provisions that pipeline. Assembly is the
//! definition phase: it either produces a fully consistent graph or fails
//! before anything could run.

use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Qualifier, RawConfig, ServiceConfig};
use crate::errors::{MailstackError, MailstackResult};
use crate::executors::ActionRunner;
use crate::pipeline::{
    Action, ActionGraph, ArtifactPath, BuildProject, BuildSpec, DeployTarget, ExecutionOptions,
    Pipeline, PipelineExecutor, PipelineRun, PipelineValidator, SourceFetch, Stage,
    ValidationResult,
};
use crate::secrets::{SecretProvider, SecretReference};
use crate::stack::{pipeline_stack, QueueStack, QueueStackProps, StackSet, StackTemplate};

/// Default synthesis output directory
pub const DEFAULT_OUTPUT_DIR: &str = "cdk.out";

/// Manifest file written next to the templates
pub const MANIFEST_FILE: &str = "manifest.json";

const PIPELINE_NAME: &str = "MailServicePipeline";
const LAMBDA_BUILD_PROJECT: &str = "MailServiceLambdaBuild";
const CDK_BUILD_PROJECT: &str = "MailServiceCdkBuild";
const BUILD_IMAGE: &str = "aws/codebuild/standard:3.0";

/// Artifact names, before qualification
mod artifacts {
    pub const LAMBDA_SOURCE: &str = "LambdaSourceOutput";
    pub const CDK_SOURCE: &str = "CdkSourceOutput";
    pub const LAMBDA_BUILD: &str = "LambdaBuildOutput";
    pub const CDK_BUILD: &str = "CdkBuildOutput";
}

/// Files written by [`MailServiceApp::synthesize`]
#[derive(Debug, Clone)]
pub struct SynthOutput {
    pub directory: PathBuf,
    pub templates: Vec<PathBuf>,
    pub manifest: PathBuf,
}

#[derive(Serialize)]
struct ManifestStack<'a> {
    name: &'a str,
    template: String,
    inputs: Vec<&'a str>,
    outputs: Vec<&'a str>,
}

/// The assembled stacks and pipeline of one run
#[derive(Debug)]
pub struct MailServiceApp {
    config: ServiceConfig,
    queue: QueueStack,
    pipeline: Pipeline,
    stacks: StackSet,
    validation: ValidationResult,
}

impl MailServiceApp {
    /// Validate raw configuration, then assemble. A missing key fails here,
    /// before any stack exists.
    pub fn from_raw(raw: &RawConfig, secrets: &dyn SecretProvider) -> MailstackResult<Self> {
        let config = raw.validate()?;
        Self::assemble(&config, secrets)
    }

    /// Build every stack and the pipeline, then check the whole definition
    pub fn assemble(config: &ServiceConfig, secrets: &dyn SecretProvider) -> MailstackResult<Self> {
        tracing::info!(
            qualifier = config.qualifier.as_ref().map(|q| q.as_str()).unwrap_or("<none>"),
            secrets = secrets.name(),
            "assembling mail service"
        );

        let queue = QueueStack::new(&QueueStackProps::from_config(config))?;
        let pipeline = Self::delivery_pipeline(config, &queue, secrets)?;

        let mut stacks = StackSet::new();
        stacks.add(queue.stack.clone())?;
        stacks.add(pipeline_stack(&pipeline, config)?)?;

        if let Some(ref qualifier) = config.qualifier {
            Self::check_qualifier(qualifier, &pipeline, &stacks)?;
        }

        let validation = PipelineValidator::check(&pipeline, &stacks)?;
        for warning in &validation.warnings {
            tracing::warn!(pipeline = %pipeline.name, "{}", warning);
        }

        tracing::info!(
            stacks = stacks.len(),
            stages = pipeline.stages.len(),
            actions = pipeline.actions().count(),
            "mail service assembled"
        );

        Ok(Self {
            config: config.clone(),
            queue,
            pipeline,
            stacks,
            validation,
        })
    }

    fn delivery_pipeline(
        config: &ServiceConfig,
        queue: &QueueStack,
        secrets: &dyn SecretProvider,
    ) -> MailstackResult<Pipeline> {
        let oauth_token = secrets.resolve(&SecretReference::new(
            config.secrets_manager_secret_arn.clone(),
            config.kms_encryption_key_arn.clone(),
        ))?;
        let sources = &config.sources;

        let lambda_source = config.name(artifacts::LAMBDA_SOURCE);
        let cdk_source = config.name(artifacts::CDK_SOURCE);
        let lambda_build = config.name(artifacts::LAMBDA_BUILD);
        let cdk_build = config.name(artifacts::CDK_BUILD);

        let source_stage = Stage::new("Source")
            .with_action(Action::source(
                "LambdaSource",
                SourceFetch {
                    owner: sources.owner.clone(),
                    repo: sources.consumer_repo.clone(),
                    branch: sources.branch.clone(),
                    oauth_token: oauth_token.clone(),
                },
                lambda_source.clone(),
            ))
            .with_action(Action::source(
                "CDKSource",
                SourceFetch {
                    owner: sources.owner.clone(),
                    repo: sources.infrastructure_repo.clone(),
                    branch: sources.branch.clone(),
                    oauth_token,
                },
                cdk_source.clone(),
            ));

        let template_file = StackTemplate::file_name(queue.stack.name());
        let build_stage = Stage::new("Build")
            .with_action(Action::build(
                "LambdaBuild",
                BuildProject {
                    project: config.name(LAMBDA_BUILD_PROJECT),
                    build_image: BUILD_IMAGE.to_string(),
                    environment: [("GO_VERSION".to_string(), config.runtime_version.clone())]
                        .into_iter()
                        .collect(),
                    build_spec: None,
                },
                lambda_source,
                lambda_build.clone(),
            ))
            .with_action(Action::build(
                "CDKBuild",
                BuildProject {
                    project: config.name(CDK_BUILD_PROJECT),
                    build_image: BUILD_IMAGE.to_string(),
                    environment: config.build_environment(),
                    build_spec: Some(BuildSpec {
                        install: vec!["cargo build --release --locked".to_string()],
                        build: vec![format!(
                            "./target/release/mailstack synth --output {}",
                            DEFAULT_OUTPUT_DIR
                        )],
                        base_directory: Some(DEFAULT_OUTPUT_DIR.to_string()),
                        files: vec![template_file.clone()],
                    }),
                },
                cdk_source,
                cdk_build.clone(),
            ));

        let deploy_stage = Stage::new("Deploy").with_action(Action::deploy(
            "CDKDeploy",
            DeployTarget {
                stack_name: queue.stack.name().to_string(),
                template_path: ArtifactPath::new(cdk_build, template_file),
                admin_permissions: true,
                parameter_overrides: queue.code.assign(&lambda_build).into_iter().collect(),
            },
            vec![lambda_build],
        ));

        Ok(Pipeline::new(config.name(PIPELINE_NAME), config.bucket_name())
            .with_stage(source_stage)
            .with_stage(build_stage)
            .with_stage(deploy_stage))
    }

    /// A qualifier that already occurs in a base name would make qualified
    /// names ambiguous
    fn check_qualifier(qualifier: &Qualifier, pipeline: &Pipeline, stacks: &StackSet) -> MailstackResult<()> {
        let mut names: Vec<String> = stacks.iter().flat_map(|s| s.exported_names()).collect();
        names.extend(pipeline.artifact_names().into_iter().map(String::from));
        names.push(pipeline.name.clone());

        match names.iter().find(|n| n.matches(qualifier.as_str()).count() != 1) {
            Some(name) => Err(MailstackError::InvalidQualifier {
                qualifier: qualifier.to_string(),
                reason: format!("generated name '{}' would contain it more than once", name),
            }),
            None => Ok(()),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn queue(&self) -> &QueueStack {
        &self.queue
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn stacks(&self) -> &StackSet {
        &self.stacks
    }

    /// Warnings found while checking the definition
    pub fn warnings(&self) -> &[String] {
        &self.validation.warnings
    }

    pub fn graph(&self) -> MailstackResult<ActionGraph> {
        ActionGraph::build(&self.pipeline)
    }

    /// Rendered template for every stack
    pub fn templates(&self) -> Vec<StackTemplate> {
        self.stacks.iter().map(StackTemplate::render).collect()
    }

    /// Stacks plus the pipeline definition
    pub fn manifest(&self) -> MailstackResult<Value> {
        let stacks: Vec<ManifestStack<'_>> = self
            .stacks
            .iter()
            .map(|stack| ManifestStack {
                name: stack.name(),
                template: StackTemplate::file_name(stack.name()),
                inputs: stack.inputs().map(|i| i.name()).collect(),
                outputs: stack.outputs().map(|o| o.handle.name()).collect(),
            })
            .collect();

        Ok(json!({
            "version": crate::VERSION,
            "qualifier": self.config.qualifier,
            "stacks": stacks,
            "pipeline": serde_json::to_value(&self.pipeline)?,
        }))
    }

    /// Write every template and the manifest into `directory`
    pub fn synthesize(&self, directory: &Path) -> MailstackResult<SynthOutput> {
        std::fs::create_dir_all(directory).map_err(|e| MailstackError::FileWriteError {
            path: directory.to_path_buf(),
            error: e.to_string(),
        })?;

        let templates = self
            .templates()
            .iter()
            .map(|t| t.write_to(directory))
            .collect::<MailstackResult<Vec<_>>>()?;

        let manifest = directory.join(MANIFEST_FILE);
        let content = serde_json::to_string_pretty(&self.manifest()?)?;
        std::fs::write(&manifest, content).map_err(|e| MailstackError::FileWriteError {
            path: manifest.clone(),
            error: e.to_string(),
        })?;

        tracing::info!(
            directory = %directory.display(),
            templates = templates.len(),
            "synthesis complete"
        );

        Ok(SynthOutput {
            directory: directory.to_path_buf(),
            templates,
            manifest,
        })
    }

    /// Run the delivery pipeline on `runner`
    pub async fn execute(
        &self,
        runner: Arc<dyn ActionRunner>,
        options: ExecutionOptions,
    ) -> MailstackResult<PipelineRun> {
        PipelineExecutor::new(runner)
            .with_options(options)
            .execute(&self.pipeline, &self.stacks)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingSource;
    use crate::config::tests::{complete_values, raw_from, test_config};
    use crate::config::ConfigKey;
    use crate::executors::SimulatedRunner;
    use crate::pipeline::{ActionKind, ActionState};
    use crate::secrets::{DynamicReferenceProvider, StaticSecretProvider};
    use std::collections::HashMap;

    fn app(qualifier: Option<&str>) -> MailServiceApp {
        MailServiceApp::assemble(&test_config(qualifier), &DynamicReferenceProvider::new()).unwrap()
    }

    /// Every name the app generates for the outside world
    fn generated_names(app: &MailServiceApp) -> Vec<String> {
        let mut names: Vec<String> = app.stacks().iter().flat_map(|s| s.exported_names()).collect();
        names.extend(app.pipeline().artifact_names().into_iter().map(String::from));
        names.extend(app.templates().iter().map(|t| t.file_name_for()));
        names.push(app.pipeline().name.clone());
        names
    }

    #[test]
    fn test_assembles_with_all_keys() {
        let app = app(None);

        let mut deploys: HashMap<&str, usize> = HashMap::new();
        for (_, target) in app.pipeline().deploy_actions() {
            *deploys.entry(target.stack_name.as_str()).or_default() += 1;
        }
        assert_eq!(deploys, HashMap::from([("QueueStack", 1)]));

        let (_, target) = app.pipeline().deploy_actions().next().unwrap();
        let deferred: Vec<_> = target.parameter_overrides.deferred().collect();
        assert_eq!(deferred.len(), 2);
        assert!(deferred.iter().all(|(_, source)| matches!(
            source,
            BindingSource::ArtifactLocation { artifact, .. } if artifact == "LambdaBuildOutput"
        )));
        assert!(app.warnings().is_empty());
    }

    #[test]
    fn test_missing_sender_aborts_before_stacks() {
        let mut values = complete_values();
        values.remove("QUEUE_SENDER_ARN");

        let err = MailServiceApp::from_raw(&raw_from(&values), &DynamicReferenceProvider::new()).unwrap_err();
        assert!(matches!(err, MailstackError::MissingConfig { ref key } if key == "QUEUE_SENDER_ARN"));
    }

    #[test]
    fn test_staging_qualifier_names() {
        let app = app(Some("staging"));

        for template in app.templates() {
            assert!(template.file_name_for().ends_with("-staging.template.json"));
        }
        for stack in app.stacks().iter() {
            assert!(stack.name().ends_with("-staging"), "{}", stack.name());
        }
    }

    #[test]
    fn test_qualifier_appears_exactly_once() {
        let qualified = app(Some("staging"));
        for name in generated_names(&qualified) {
            assert_eq!(name.matches("staging").count(), 1, "{}", name);
        }

        let plain = app(None);
        for name in generated_names(&plain) {
            assert!(!name.contains("staging"), "{}", name);
            assert!(!name.ends_with('-'), "{}", name);
        }
    }

    #[test]
    fn test_qualifier_inside_base_name_is_rejected() {
        // "QueueStack-ue" would contain the qualifier twice
        let err = MailServiceApp::assemble(&test_config(Some("ue")), &DynamicReferenceProvider::new()).unwrap_err();
        assert!(matches!(
            err,
            MailstackError::InvalidQualifier { ref qualifier, ref reason } if qualifier == "ue" && reason.contains("QueueStack-ue")
        ));
    }

    #[test]
    fn test_source_actions_use_injected_secret() {
        let config = test_config(None);
        let provider =
            StaticSecretProvider::new().with_secret(config.secrets_manager_secret_arn.clone(), "ghp_token");
        let app = MailServiceApp::assemble(&config, &provider).unwrap();

        for action in app.pipeline().actions() {
            if let ActionKind::SourceFetch(ref source) = action.kind {
                assert_eq!(source.oauth_token.expose(), "ghp_token");
            }
        }
        let manifest = serde_json::to_string(&app.manifest().unwrap()).unwrap();
        assert!(!manifest.contains("ghp_token"));
    }

    #[test]
    fn test_unavailable_secret_fails_assembly() {
        let err = MailServiceApp::assemble(&test_config(None), &StaticSecretProvider::new()).unwrap_err();
        assert!(matches!(err, MailstackError::SecretUnavailable { .. }));
    }

    #[test]
    fn test_build_environment() {
        let app = app(Some("dev"));
        let build = app.pipeline().get_action("CDKBuild").unwrap();
        let ActionKind::Build(ref project) = build.kind else {
            panic!("CDKBuild is not a build action");
        };

        for key in ConfigKey::REQUIRED {
            assert!(project.environment.contains_key(key.env_var()), "{}", key);
        }
        assert_eq!(project.environment["ENVIRONMENT"], "dev");
        assert_eq!(
            project.build_spec.as_ref().unwrap().files,
            vec!["QueueStack-dev.template.json".to_string()]
        );
    }

    #[test]
    fn test_synthesize_writes_templates_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let out = app(Some("staging")).synthesize(&dir.path().join("cdk.out")).unwrap();

        assert_eq!(out.templates.len(), 2);
        assert!(out.directory.join("QueueStack-staging.template.json").exists());
        assert!(out.directory.join("PipelineStack-staging.template.json").exists());

        let manifest: Value = serde_json::from_str(&std::fs::read_to_string(&out.manifest).unwrap()).unwrap();
        assert_eq!(manifest["qualifier"], "staging");
        assert_eq!(manifest["stacks"][0]["name"], "QueueStack-staging");
        assert_eq!(manifest["pipeline"]["Stages"][2]["Name"], "Deploy");
    }

    #[tokio::test]
    async fn test_rehearsal_succeeds() {
        let app = app(None);
        let run = app
            .execute(Arc::new(SimulatedRunner::new()), ExecutionOptions { quiet: true })
            .await
            .unwrap();

        assert!(run.succeeded());
        assert!(app.queue().queue_url.is_resolved());
        assert_eq!(app.queue().queue_url.get().unwrap(), "sim://QueueStack/QueueUrl");
    }

    #[tokio::test]
    async fn test_build_failure_leaves_deploy_not_started() {
        let app = app(None);
        let runner = Arc::new(SimulatedRunner::new().fail("LambdaBuild", "compilation failed"));

        let run = app.execute(runner, ExecutionOptions { quiet: true }).await.unwrap();

        assert!(!run.succeeded());
        assert_eq!(run.state("CDKDeploy"), Some(&ActionState::NotStarted));
        assert!(!app.queue().queue_url.is_resolved());
    }
}
