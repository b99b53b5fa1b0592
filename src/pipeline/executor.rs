// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Pipeline executor
//!
//! Runs stages strictly in order. Inside a stage, actions run concurrently in
//! dependency waves; the next stage starts only once every action of the
//! current one is terminal. After a failure nothing else is started.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use tokio::task::{self, JoinSet};

use crate::binding::BindingResolver;
use crate::errors::{MailstackError, MailstackResult};
use crate::executors::{ActionOutcome, ActionRequest, ActionRunner};
use crate::pipeline::{
    Action, ActionGraph, ActionKind, ArtifactStore, Pipeline, PipelineValidator, ProducedArtifact,
    Stage,
};
use crate::stack::StackSet;

/// Pipeline execution options
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Suppress progress output on stdout
    pub quiet: bool,
}

/// Terminal state of an action after a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionState {
    NotStarted,
    Succeeded,
    Failed { message: String },
}

impl ActionState {
    pub fn was_started(&self) -> bool {
        !matches!(self, Self::NotStarted)
    }
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed { message } => write!(f, "failed: {}", message),
        }
    }
}

/// What happened to one action
#[derive(Debug, Clone)]
pub struct ActionReport {
    pub action: String,
    pub stage: String,
    pub kind: &'static str,
    pub state: ActionState,
    pub consumed: Vec<String>,
    pub produced: Vec<String>,
    pub duration: Option<Duration>,
    /// Runner summary for actions that ran
    pub summary: Option<String>,
    /// Failed action that kept this one from starting
    pub blocked_by: Option<String>,
}

impl ActionReport {
    fn pending(stage: &Stage, action: &Action) -> Self {
        Self {
            action: action.name.clone(),
            stage: stage.name.clone(),
            kind: action.kind_name(),
            state: ActionState::NotStarted,
            consumed: action.inputs.clone(),
            produced: action.outputs.clone(),
            duration: None,
            summary: None,
            blocked_by: None,
        }
    }
}

/// Result of executing a pipeline
#[derive(Debug)]
pub struct PipelineRun {
    pub pipeline: String,
    pub runner: String,
    /// One report per action, in pipeline order
    pub reports: Vec<ActionReport>,
    pub artifacts: ArtifactStore,
    pub duration: Duration,
    failure: Option<MailstackError>,
}

impl PipelineRun {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// First error that stopped the run
    pub fn failure(&self) -> Option<&MailstackError> {
        self.failure.as_ref()
    }

    pub fn into_failure(self) -> Option<MailstackError> {
        self.failure
    }

    pub fn report(&self, action: &str) -> Option<&ActionReport> {
        self.reports.iter().find(|r| r.action == action)
    }

    pub fn state(&self, action: &str) -> Option<&ActionState> {
        self.report(action).map(|r| &r.state)
    }

    /// Names of actions that were handed to the runner
    pub fn started(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| r.state.was_started())
            .map(|r| r.action.as_str())
            .collect()
    }
}

/// Mutable state threaded through one run
struct RunState {
    reports: HashMap<String, ActionReport>,
    artifacts: ArtifactStore,
    failure: Option<MailstackError>,
}

impl RunState {
    fn fail(&mut self, action: &str, error: MailstackError) {
        tracing::error!(action, error = %error, "action failed");
        if let Some(report) = self.reports.get_mut(action) {
            report.state = ActionState::Failed {
                message: error.to_string(),
            };
        }
        if self.failure.is_none() {
            self.failure = Some(error);
        }
    }
}

/// Pipeline executor
pub struct PipelineExecutor {
    runner: Arc<dyn ActionRunner>,
    options: ExecutionOptions,
}

impl PipelineExecutor {
    /// Create an executor over an execution engine
    pub fn new(runner: Arc<dyn ActionRunner>) -> Self {
        Self {
            runner,
            options: ExecutionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Execute a pipeline. Definition problems are returned as `Err` before
    /// any action starts; action failures are reported in the returned run.
    pub async fn execute(&self, pipeline: &Pipeline, stacks: &StackSet) -> MailstackResult<PipelineRun> {
        let start = Instant::now();

        let validation = PipelineValidator::check(pipeline, stacks)?;
        for warning in &validation.warnings {
            tracing::warn!(pipeline = %pipeline.name, "{}", warning);
        }
        let graph = ActionGraph::build(pipeline)?;

        let mut state = RunState {
            reports: pipeline
                .positioned_actions()
                .map(|p| (p.action.name.clone(), ActionReport::pending(p.stage, p.action)))
                .collect(),
            artifacts: ArtifactStore::new(),
            failure: None,
        };

        self.print_header(pipeline);
        tracing::info!(
            pipeline = %pipeline.name,
            runner = self.runner.name(),
            actions = graph.len(),
            "pipeline run started"
        );

        'stages: for (stage_index, stage) in pipeline.stages.iter().enumerate() {
            tracing::info!(stage = %stage.name, actions = stage.actions.len(), "stage started");
            self.print_stage(stage);

            for wave in graph.stage_waves(stage_index) {
                self.run_wave(pipeline, stage, &wave, stacks, &mut state).await;

                if state.failure.is_some() {
                    tracing::warn!(stage = %stage.name, "stage failed, no further actions will start");
                    break 'stages;
                }
            }

            tracing::info!(stage = %stage.name, "stage completed");
        }

        let mut reports: Vec<ActionReport> = pipeline
            .actions()
            .filter_map(|a| state.reports.remove(&a.name))
            .collect();

        let failed: Vec<String> = reports
            .iter()
            .filter(|r| matches!(r.state, ActionState::Failed { .. }))
            .map(|r| r.action.clone())
            .collect();
        if let Some(first) = failed.first() {
            for report in reports.iter_mut().filter(|r| !r.state.was_started()) {
                // Prefer the failure the action actually depends on
                let upstream = failed
                    .iter()
                    .find(|f| graph.downstream(f).contains(&report.action))
                    .unwrap_or(first);
                report.blocked_by = Some(upstream.clone());
                self.print_not_started(report);
            }
        }

        let run = PipelineRun {
            pipeline: pipeline.name.clone(),
            runner: self.runner.name().to_string(),
            reports,
            artifacts: state.artifacts,
            duration: start.elapsed(),
            failure: state.failure,
        };

        self.print_summary(&run);
        tracing::info!(
            pipeline = %run.pipeline,
            succeeded = run.succeeded(),
            started = run.started().len(),
            "pipeline run finished"
        );
        Ok(run)
    }

    /// Run one wave of a stage concurrently and wait for all of it
    async fn run_wave(
        &self,
        pipeline: &Pipeline,
        stage: &Stage,
        wave: &[usize],
        stacks: &StackSet,
        state: &mut RunState,
    ) {
        let mut tasks = JoinSet::new();
        let mut spawned: HashMap<task::Id, &Action> = HashMap::new();

        for &action_index in wave {
            let action = &stage.actions[action_index];
            match self.prepare(pipeline, stage, action, stacks, &state.artifacts) {
                Ok(request) => {
                    let runner = Arc::clone(&self.runner);
                    let handle = tasks.spawn(async move {
                        let outcome = runner.run(&request).await;
                        (request, outcome)
                    });
                    spawned.insert(handle.id(), action);
                }
                Err(e) => state.fail(&action.name, e),
            }
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (request, outcome))) => self.complete(&request, outcome, stacks, state),
                Err(e) => match spawned.get(&e.id()) {
                    Some(action) => {
                        let reason = if e.is_panic() { "runner panicked" } else { "runner task cancelled" };
                        let error = self.action_failed(&stage.name, action, format!("{}: {}", reason, e));
                        state.fail(&action.name, error);
                        self.print_action(&action.name, None, false);
                    }
                    None => {
                        let error = MailstackError::RunnerContract {
                            action: format!("<stage {}>", stage.name),
                            reason: format!("unknown runner task aborted: {}", e),
                        };
                        tracing::error!(stage = %stage.name, error = %error, "runner task aborted");
                        if state.failure.is_none() {
                            state.failure = Some(error);
                        }
                    }
                },
            }
        }
    }

    /// Build the request for an action from what the run has produced so far
    fn prepare(
        &self,
        pipeline: &Pipeline,
        stage: &Stage,
        action: &Action,
        stacks: &StackSet,
        artifacts: &ArtifactStore,
    ) -> MailstackResult<ActionRequest> {
        let mut inputs = BTreeMap::new();
        for input in &action.inputs {
            let location = artifacts
                .location(input)
                .ok_or_else(|| MailstackError::DanglingArtifact {
                    action: action.name.clone(),
                    artifact: input.clone(),
                })?;
            inputs.insert(input.clone(), location.clone());
        }

        let (parameters, stack_outputs) = match &action.kind {
            ActionKind::Deploy(target) => {
                let parameters = BindingResolver::new(artifacts)
                    .resolve(&action.name, &target.parameter_overrides)?;
                let outputs = stacks
                    .get(&target.stack_name)
                    .map(|s| s.outputs().map(|o| o.handle.name().to_string()).collect())
                    .unwrap_or_default();
                (parameters, outputs)
            }
            _ => (BTreeMap::new(), Vec::new()),
        };

        tracing::debug!(
            stage = %stage.name,
            action = %action.name,
            inputs = inputs.len(),
            parameters = parameters.len(),
            "action prepared"
        );

        Ok(ActionRequest {
            pipeline: pipeline.name.clone(),
            stage: stage.name.clone(),
            action: action.clone(),
            inputs,
            parameters,
            stack_outputs,
            artifact_bucket: pipeline.artifact_bucket.clone(),
        })
    }

    /// Record the outcome of one action
    fn complete(
        &self,
        request: &ActionRequest,
        outcome: MailstackResult<ActionOutcome>,
        stacks: &StackSet,
        state: &mut RunState,
    ) {
        let action = &request.action;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                state.fail(&action.name, self.action_failed(&request.stage, action, e.to_string()));
                self.print_action(&action.name, None, false);
                return;
            }
        };

        if let Some(report) = state.reports.get_mut(&action.name) {
            report.duration = Some(outcome.duration);
            report.summary = Some(outcome.message.clone());
        }

        if !outcome.success {
            state.fail(&action.name, self.action_failed(&request.stage, action, outcome.message.clone()));
            self.print_action(&action.name, Some(outcome.duration), false);
            return;
        }

        if let Err(e) = self.record_results(action, &outcome, stacks, &mut state.artifacts) {
            state.fail(&action.name, e);
            self.print_action(&action.name, Some(outcome.duration), false);
            return;
        }

        if let Some(report) = state.reports.get_mut(&action.name) {
            report.state = ActionState::Succeeded;
        }
        tracing::info!(stage = %request.stage, action = %action.name, "action succeeded");
        self.print_action(&action.name, Some(outcome.duration), true);
    }

    /// Store produced artifacts and resolve deployed stack outputs
    fn record_results(
        &self,
        action: &Action,
        outcome: &ActionOutcome,
        stacks: &StackSet,
        artifacts: &mut ArtifactStore,
    ) -> MailstackResult<()> {
        let reported: Vec<&String> = outcome.artifacts.keys().collect();
        let declared: Vec<&String> = {
            let mut declared: Vec<&String> = action.outputs.iter().collect();
            declared.sort();
            declared
        };
        if reported != declared {
            return Err(MailstackError::RunnerContract {
                action: action.name.clone(),
                reason: format!(
                    "reported artifacts [{}] but declared [{}]",
                    outcome.artifacts.keys().cloned().collect::<Vec<_>>().join(", "),
                    action.outputs.join(", ")
                ),
            });
        }

        for (name, location) in &outcome.artifacts {
            artifacts.record(ProducedArtifact::new(name.clone(), action.name.clone(), location.clone()))?;
        }

        if let ActionKind::Deploy(ref target) = action.kind {
            let stack = stacks.get(&target.stack_name);
            for (name, value) in &outcome.stack_outputs {
                let handle = stack.and_then(|s| s.output(name)).ok_or_else(|| {
                    MailstackError::RunnerContract {
                        action: action.name.clone(),
                        reason: format!("stack '{}' has no output '{}'", target.stack_name, name),
                    }
                })?;
                handle.resolve(value.clone())?;
                tracing::debug!(stack = %target.stack_name, output = %name, "stack output resolved");
            }
        }

        Ok(())
    }

    fn action_failed(&self, stage: &str, action: &Action, message: String) -> MailstackError {
        MailstackError::ActionFailed {
            action: action.name.clone(),
            stage: stage.to_string(),
            consumed: action.inputs.clone(),
            produced: action.outputs.clone(),
            message,
        }
    }

    fn print_header(&self, pipeline: &Pipeline) {
        if self.options.quiet {
            return;
        }
        println!();
        println!("{}: {}", "Pipeline".bold(), pipeline.name);
        println!("{}", "═".repeat(50));
    }

    fn print_stage(&self, stage: &Stage) {
        if self.options.quiet {
            return;
        }
        println!("{} {}", "▸".blue(), stage.name.bold());
    }

    fn print_action(&self, action: &str, duration: Option<Duration>, success: bool) {
        if self.options.quiet {
            return;
        }
        let elapsed = duration
            .map(|d| format!(" ({:.2}s)", d.as_secs_f64()))
            .unwrap_or_default();
        if success {
            println!("  {} {}{}", "✓".green(), action, elapsed.dimmed());
        } else {
            println!("  {} {} failed{}", "✗".red(), action.bold(), elapsed.dimmed());
        }
    }

    fn print_not_started(&self, report: &ActionReport) {
        if self.options.quiet {
            return;
        }
        let reason = report
            .blocked_by
            .as_deref()
            .map(|b| format!(" (blocked by {})", b))
            .unwrap_or_default();
        println!("  {} {} not started{}", "○".dimmed(), report.action, reason.dimmed());
    }

    fn print_summary(&self, run: &PipelineRun) {
        if self.options.quiet {
            return;
        }
        println!();
        if run.succeeded() {
            println!(
                "{}",
                format!("Pipeline completed successfully in {:.2}s", run.duration.as_secs_f64()).green()
            );
        } else {
            println!(
                "{}",
                format!("Pipeline failed after {:.2}s", run.duration.as_secs_f64()).red()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindingSet, LocationField, ParameterBinding};
    use crate::errors::ErrorCategory;
    use crate::executors::SimulatedRunner;
    use crate::pipeline::{ArtifactPath, BuildProject, DeployTarget, SourceFetch};
    use crate::secrets::SecretValue;
    use crate::stack::Stack;
    use serde_json::json;

    fn fetch(name: &str, output: &str) -> Action {
        Action::source(
            name,
            SourceFetch {
                owner: "o".into(),
                repo: name.into(),
                branch: "master".into(),
                oauth_token: SecretValue::Reference("token".into()),
            },
            output,
        )
    }

    fn build(name: &str, input: &str, output: &str) -> Action {
        Action::build(
            name,
            BuildProject {
                project: name.into(),
                build_image: "image".into(),
                environment: BTreeMap::new(),
                build_spec: None,
            },
            input,
            output,
        )
    }

    fn fixture() -> (Pipeline, StackSet) {
        let mut stack = Stack::new("QueueStack");
        stack.declare_input("CodeBucket", "bucket").unwrap();
        stack.declare_input("CodeKey", "key").unwrap();
        stack.declare_output("QueueUrl", json!({"Ref": "Queue"})).unwrap();
        let mut stacks = StackSet::new();
        stacks.add(stack).unwrap();

        let overrides: BindingSet = [
            ParameterBinding::artifact_location("CodeBucket", "LambdaBuildOutput", LocationField::BucketName),
            ParameterBinding::artifact_location("CodeKey", "LambdaBuildOutput", LocationField::ObjectKey),
        ]
        .into_iter()
        .collect();

        let pipeline = Pipeline::new("MailServicePipeline", "mail-artifacts")
            .with_stage(
                Stage::new("Source")
                    .with_action(fetch("LambdaSource", "LambdaSourceOutput"))
                    .with_action(fetch("CDKSource", "CdkSourceOutput")),
            )
            .with_stage(
                Stage::new("Build")
                    .with_action(build("LambdaBuild", "LambdaSourceOutput", "LambdaBuildOutput"))
                    .with_action(build("CDKBuild", "CdkSourceOutput", "CdkBuildOutput")),
            )
            .with_stage(Stage::new("Deploy").with_action(Action::deploy(
                "CDKDeploy",
                DeployTarget {
                    stack_name: "QueueStack".into(),
                    template_path: ArtifactPath::new("CdkBuildOutput", "QueueStack.template.json"),
                    admin_permissions: true,
                    parameter_overrides: overrides,
                },
                vec!["LambdaBuildOutput".into()],
            )));

        (pipeline, stacks)
    }

    fn executor(runner: Arc<SimulatedRunner>) -> PipelineExecutor {
        PipelineExecutor::new(runner).with_options(ExecutionOptions { quiet: true })
    }

    #[tokio::test]
    async fn test_successful_run() {
        let (pipeline, stacks) = fixture();
        let runner = Arc::new(SimulatedRunner::new());

        let run = executor(runner.clone()).execute(&pipeline, &stacks).await.unwrap();

        assert!(run.succeeded());
        assert_eq!(run.artifacts.len(), 4);
        assert_eq!(run.started().len(), 5);
        assert_eq!(run.state("CDKDeploy"), Some(&ActionState::Succeeded));

        let handle = stacks.get("QueueStack").unwrap().output("QueueUrl").unwrap();
        assert_eq!(handle.get().unwrap(), "sim://QueueStack/QueueUrl");

        // Deploy ran last
        let started = runner.started().await;
        assert_eq!(started.last().map(String::as_str), Some("CDKDeploy"));
    }

    #[tokio::test]
    async fn test_build_failure_blocks_deploy() {
        let (pipeline, stacks) = fixture();
        let runner = Arc::new(SimulatedRunner::new().fail("LambdaBuild", "go build failed"));

        let run = executor(runner.clone()).execute(&pipeline, &stacks).await.unwrap();

        assert!(!run.succeeded());
        assert!(matches!(run.state("LambdaBuild"), Some(ActionState::Failed { .. })));
        assert_eq!(run.state("CDKBuild"), Some(&ActionState::Succeeded));
        assert_eq!(run.state("CDKDeploy"), Some(&ActionState::NotStarted));
        assert_eq!(
            run.report("CDKDeploy").unwrap().blocked_by.as_deref(),
            Some("LambdaBuild")
        );
        assert!(!runner.started().await.contains(&"CDKDeploy".to_string()));

        match run.failure() {
            Some(MailstackError::ActionFailed {
                action,
                stage,
                consumed,
                produced,
                message,
            }) => {
                assert_eq!(action, "LambdaBuild");
                assert_eq!(stage, "Build");
                assert_eq!(consumed, &vec!["LambdaSourceOutput".to_string()]);
                assert_eq!(produced, &vec!["LambdaBuildOutput".to_string()]);
                assert_eq!(message, "go build failed");
            }
            other => panic!("unexpected failure: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stage_barrier_on_source_failure() {
        let (pipeline, stacks) = fixture();
        let runner = Arc::new(SimulatedRunner::new().fail("CDKSource", "unauthorized"));

        let run = executor(runner.clone()).execute(&pipeline, &stacks).await.unwrap();

        // The sibling in the failing stage still runs; nothing later does
        assert_eq!(run.state("LambdaSource"), Some(&ActionState::Succeeded));
        for later in ["LambdaBuild", "CDKBuild", "CDKDeploy"] {
            assert_eq!(run.state(later), Some(&ActionState::NotStarted), "{}", later);
        }
        let mut started = runner.started().await;
        started.sort();
        assert_eq!(started, vec!["CDKSource", "LambdaSource"]);
    }

    #[tokio::test]
    async fn test_definition_error_starts_nothing() {
        let (pipeline, stacks) = fixture();
        let pipeline = pipeline.with_stage(
            Stage::new("Extra").with_action(build("Orphan", "Missing", "OrphanOut")),
        );
        let runner = Arc::new(SimulatedRunner::new());

        let err = executor(runner.clone()).execute(&pipeline, &stacks).await.unwrap_err();

        assert!(matches!(err, MailstackError::DanglingArtifact { ref artifact, .. } if artifact == "Missing"));
        assert!(runner.started().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_stage_members() {
        let (pipeline, stacks) = fixture();
        let runner = Arc::new(SimulatedRunner::new().with_delay(Duration::from_millis(50)));

        let run = executor(runner).execute(&pipeline, &stacks).await.unwrap();

        assert!(run.succeeded());
        // Three stages of 50ms each; running all five actions serially takes 250ms
        assert!(run.duration < Duration::from_millis(240), "took {:?}", run.duration);
    }

    struct DroppingRunner;

    #[async_trait::async_trait]
    impl ActionRunner for DroppingRunner {
        fn name(&self) -> &str {
            "dropping"
        }

        async fn run(&self, _request: &ActionRequest) -> MailstackResult<ActionOutcome> {
            Ok(ActionOutcome::success("done", Duration::ZERO))
        }
    }

    #[tokio::test]
    async fn test_runner_must_report_declared_artifacts() {
        let (pipeline, stacks) = fixture();

        let run = PipelineExecutor::new(Arc::new(DroppingRunner))
            .with_options(ExecutionOptions { quiet: true })
            .execute(&pipeline, &stacks)
            .await
            .unwrap();

        assert!(!run.succeeded());
        assert!(matches!(run.failure(), Some(MailstackError::RunnerContract { .. })));
        assert_eq!(run.state("LambdaBuild"), Some(&ActionState::NotStarted));
    }

    struct PanickingRunner {
        inner: SimulatedRunner,
        panic_on: &'static str,
    }

    #[async_trait::async_trait]
    impl ActionRunner for PanickingRunner {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn run(&self, request: &ActionRequest) -> MailstackResult<ActionOutcome> {
            if request.action.name == self.panic_on {
                panic!("runner crashed on {}", request.action.name);
            }
            self.inner.run(request).await
        }
    }

    #[tokio::test]
    async fn test_runner_panic_fails_the_action() {
        let (pipeline, stacks) = fixture();
        let runner = PanickingRunner {
            inner: SimulatedRunner::new(),
            panic_on: "LambdaSource",
        };

        let run = PipelineExecutor::new(Arc::new(runner))
            .with_options(ExecutionOptions { quiet: true })
            .execute(&pipeline, &stacks)
            .await
            .unwrap();

        assert!(!run.succeeded());
        assert!(matches!(run.state("LambdaSource"), Some(ActionState::Failed { .. })));
        assert_eq!(run.state("CDKSource"), Some(&ActionState::Succeeded));
        assert_eq!(run.state("LambdaBuild"), Some(&ActionState::NotStarted));
        assert_eq!(
            run.report("LambdaBuild").unwrap().blocked_by.as_deref(),
            Some("LambdaSource")
        );

        match run.failure() {
            Some(MailstackError::ActionFailed { action, stage, message, .. }) => {
                assert_eq!(action, "LambdaSource");
                assert_eq!(stage, "Source");
                assert!(message.contains("panicked"), "{}", message);
            }
            other => panic!("unexpected failure: {:?}", other),
        }
    }

    /// Deploys successfully but never reports the stack's outputs
    struct SilentOutputsRunner(SimulatedRunner);

    #[async_trait::async_trait]
    impl ActionRunner for SilentOutputsRunner {
        fn name(&self) -> &str {
            "silent-outputs"
        }

        async fn run(&self, request: &ActionRequest) -> MailstackResult<ActionOutcome> {
            let mut outcome = self.0.run(request).await?;
            outcome.stack_outputs.clear();
            Ok(outcome)
        }
    }

    fn deploy(name: &str, stack: &str, overrides: BindingSet) -> Action {
        Action::deploy(
            name,
            DeployTarget {
                stack_name: stack.into(),
                template_path: ArtifactPath::new("Templates", format!("{}.template.json", stack)),
                admin_permissions: false,
                parameter_overrides: overrides,
            },
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_deploy_never_applies_with_unresolved_output() {
        let mut queue = Stack::new("QueueStack");
        let queue_url = queue.declare_output("QueueUrl", json!({"Ref": "Queue"})).unwrap();
        let mut consumer = Stack::new("ConsumerStack");
        consumer.declare_input("QueueUrl", "queue url").unwrap();
        let mut stacks = StackSet::new();
        stacks.add(queue).unwrap();
        stacks.add(consumer).unwrap();

        let consumer_overrides: BindingSet =
            [ParameterBinding::stack_output("QueueUrl", &queue_url)].into_iter().collect();

        let pipeline = Pipeline::new("MailServicePipeline", "mail-artifacts")
            .with_stage(Stage::new("Source").with_action(fetch("InfraSource", "InfraSourceOutput")))
            .with_stage(Stage::new("Build").with_action(build("Synth", "InfraSourceOutput", "Templates")))
            .with_stage(Stage::new("Deploy").with_action(deploy("QueueDeploy", "QueueStack", BindingSet::new())))
            .with_stage(
                Stage::new("Consumers").with_action(deploy("ConsumerDeploy", "ConsumerStack", consumer_overrides)),
            );

        let runner = Arc::new(SilentOutputsRunner(SimulatedRunner::new()));
        let run = PipelineExecutor::new(runner.clone())
            .with_options(ExecutionOptions { quiet: true })
            .execute(&pipeline, &stacks)
            .await
            .unwrap();

        assert_eq!(run.state("QueueDeploy"), Some(&ActionState::Succeeded));
        assert!(!queue_url.is_resolved());
        assert!(matches!(run.state("ConsumerDeploy"), Some(ActionState::Failed { .. })));
        assert!(!runner.0.started().await.contains(&"ConsumerDeploy".to_string()));

        let failure = run.failure().unwrap();
        assert_eq!(failure.category(), ErrorCategory::DeferredBinding);
        assert!(matches!(
            failure,
            MailstackError::UnresolvedBinding { action, key, .. } if action == "ConsumerDeploy" && key == "QueueUrl"
        ));
    }
}
