// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Pipeline stack
//!
//! Renders a [`Pipeline`] as a stack of its own: the pipeline resource, one
//! build project per build action, and the roles they run under. Deploying
//! this stack by hand bootstraps the delivery pipeline, which then keeps the
//! other stacks up to date.

use serde_json::{json, Value};

use super::{Resource, Stack};
use crate::config::ServiceConfig;
use crate::errors::MailstackResult;
use crate::pipeline::{Action, ActionGraph, ActionKind, BuildProject, Pipeline};

/// Unqualified stack name
pub const PIPELINE_STACK: &str = "PipelineStack";

const PIPELINE_ID: &str = "MailServicePipeline";
const PIPELINE_ROLE_ID: &str = "MailServicePipelineRole";
const BUILD_ROLE_ID: &str = "MailServiceBuildRole";

/// Build the stack that provisions `pipeline`
pub fn pipeline_stack(pipeline: &Pipeline, config: &ServiceConfig) -> MailstackResult<Stack> {
    let graph = ActionGraph::build(pipeline)?;
    let mut stack = Stack::new(config.name(PIPELINE_STACK))
        .with_description("Delivery pipeline for the mail service queue");

    let pipeline_role = config.name(PIPELINE_ROLE_ID);
    stack.add_resource(
        Resource::new(
            PIPELINE_ROLE_ID,
            "AWS::IAM::Role",
            json!({
                "RoleName": pipeline_role,
                "AssumeRolePolicyDocument": assume_role("codepipeline.amazonaws.com"),
                "Policies": [{
                    "PolicyName": "ArtifactAccess",
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [
                            {
                                "Effect": "Allow",
                                "Action": ["s3:GetObject", "s3:PutObject", "s3:GetBucketVersioning"],
                                "Resource": [
                                    config.s3_bucket_arn.clone(),
                                    format!("{}/*", config.s3_bucket_arn),
                                ],
                            },
                            {
                                "Effect": "Allow",
                                "Action": ["kms:Decrypt", "kms:Encrypt", "kms:GenerateDataKey*"],
                                "Resource": config.kms_encryption_key_arn.clone(),
                            },
                            {
                                "Effect": "Allow",
                                "Action": ["codebuild:StartBuild", "codebuild:BatchGetBuilds"],
                                "Resource": "*",
                            },
                            {
                                "Effect": "Allow",
                                "Action": ["cloudformation:*", "iam:PassRole"],
                                "Resource": "*",
                            },
                        ],
                    },
                }],
            }),
        )
        .with_physical_name(pipeline_role),
    )?;

    let build_role = config.name(BUILD_ROLE_ID);
    stack.add_resource(
        Resource::new(
            BUILD_ROLE_ID,
            "AWS::IAM::Role",
            json!({
                "RoleName": build_role,
                "AssumeRolePolicyDocument": assume_role("codebuild.amazonaws.com"),
                "ManagedPolicyArns": [
                    "arn:aws:iam::aws:policy/CloudWatchLogsFullAccess"
                ],
            }),
        )
        .with_physical_name(build_role),
    )?;

    for action in pipeline.actions() {
        match &action.kind {
            ActionKind::Build(build) => {
                stack.add_resource(build_project(action, build, config)?)?;
            }
            ActionKind::Deploy(target) => {
                let logical_id = format!("{}Role", logical_name(&action.name));
                let role_name = config.name(&logical_id);
                let mut role = json!({
                    "RoleName": role_name,
                    "AssumeRolePolicyDocument": assume_role("cloudformation.amazonaws.com"),
                });
                if target.admin_permissions {
                    role["ManagedPolicyArns"] = json!(["arn:aws:iam::aws:policy/AdministratorAccess"]);
                }
                stack.add_resource(
                    Resource::new(logical_id, "AWS::IAM::Role", role).with_physical_name(role_name),
                )?;
            }
            ActionKind::SourceFetch(_) => {}
        }
    }

    let stages: Vec<Value> = pipeline
        .stages
        .iter()
        .enumerate()
        .map(|(stage_index, stage)| -> MailstackResult<Value> {
            let mut actions = Vec::new();
            for (wave_index, wave) in graph.stage_waves(stage_index).iter().enumerate() {
                for &action_index in wave {
                    actions.push(pipeline_action(&stage.actions[action_index], wave_index + 1)?);
                }
            }
            Ok(json!({ "Name": stage.name, "Actions": actions }))
        })
        .collect::<MailstackResult<_>>()?;

    let pipeline_name = pipeline.name.clone();
    let mut pipeline_resource = Resource::new(
        PIPELINE_ID,
        "AWS::CodePipeline::Pipeline",
        json!({
            "Name": pipeline_name,
            "RoleArn": { "Fn::GetAtt": [PIPELINE_ROLE_ID, "Arn"] },
            "ArtifactStore": {
                "Type": "S3",
                "Location": pipeline.artifact_bucket,
                "EncryptionKey": { "Id": config.kms_encryption_key_arn, "Type": "KMS" },
            },
            "Stages": stages,
        }),
    )
    .with_physical_name(pipeline_name)
    .depends_on(PIPELINE_ROLE_ID);
    for resource in stack.resources() {
        if resource.resource_type == "AWS::CodeBuild::Project" {
            pipeline_resource = pipeline_resource.depends_on(resource.logical_id.clone());
        }
    }
    stack.add_resource(pipeline_resource)?;

    stack.declare_output("PipelineName", json!({ "Ref": PIPELINE_ID }))?;

    tracing::debug!(
        stack = %stack.name(),
        stages = pipeline.stages.len(),
        resources = stack.resources().len(),
        "pipeline stack constructed"
    );
    Ok(stack)
}

fn assume_role(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": "sts:AssumeRole",
            "Principal": { "Service": service },
        }],
    })
}

/// Logical ids must be alphanumeric
fn logical_name(name: &str) -> String {
    name.chars().filter(char::is_ascii_alphanumeric).collect()
}

fn build_project(action: &Action, build: &BuildProject, config: &ServiceConfig) -> MailstackResult<Resource> {
    let mut source = json!({ "Type": "CODEPIPELINE" });
    if let Some(ref spec) = build.build_spec {
        source["BuildSpec"] = json!(serde_yaml::to_string(&spec.to_document())?);
    }

    let environment: Vec<Value> = build
        .environment
        .iter()
        .map(|(name, value)| json!({ "Name": name, "Value": value, "Type": "PLAINTEXT" }))
        .collect();

    Ok(Resource::new(
        format!("{}Project", logical_name(&action.name)),
        "AWS::CodeBuild::Project",
        json!({
            "Name": build.project,
            "ServiceRole": { "Fn::GetAtt": [BUILD_ROLE_ID, "Arn"] },
            "EncryptionKey": config.kms_encryption_key_arn,
            "Source": source,
            "Artifacts": { "Type": "CODEPIPELINE" },
            "Environment": {
                "Type": "LINUX_CONTAINER",
                "ComputeType": "BUILD_GENERAL1_SMALL",
                "Image": build.build_image,
                "EnvironmentVariables": environment,
            },
        }),
    )
    .with_physical_name(build.project.clone())
    .depends_on(BUILD_ROLE_ID))
}

fn pipeline_action(action: &Action, run_order: usize) -> MailstackResult<Value> {
    let (category, owner, provider, configuration) = match &action.kind {
        ActionKind::SourceFetch(source) => (
            "Source",
            "ThirdParty",
            "GitHub",
            json!({
                "Owner": source.owner,
                "Repo": source.repo,
                "Branch": source.branch,
                "OAuthToken": source.oauth_token,
                "PollForSourceChanges": false,
            }),
        ),
        ActionKind::Build(build) => (
            "Build",
            "AWS",
            "CodeBuild",
            json!({ "ProjectName": { "Ref": format!("{}Project", logical_name(&action.name)) } }),
        ),
        ActionKind::Deploy(target) => (
            "Deploy",
            "AWS",
            "CloudFormation",
            json!({
                "ActionMode": "CREATE_UPDATE",
                "StackName": target.stack_name,
                "TemplatePath": target.template_path.to_string(),
                "Capabilities": "CAPABILITY_NAMED_IAM",
                "RoleArn": { "Fn::GetAtt": [format!("{}Role", logical_name(&action.name)), "Arn"] },
                "ParameterOverrides": serde_json::to_string(&target.parameter_overrides)?,
            }),
        ),
    };

    let artifacts = |names: &[String]| -> Vec<Value> { names.iter().map(|n| json!({ "Name": n })).collect() };

    Ok(json!({
        "Name": action.name,
        "ActionTypeId": {
            "Category": category,
            "Owner": owner,
            "Provider": provider,
            "Version": "1",
        },
        "Configuration": configuration,
        "InputArtifacts": artifacts(&action.inputs),
        "OutputArtifacts": artifacts(&action.outputs),
        "RunOrder": run_order,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MailServiceApp;
    use crate::config::tests::{complete_values, raw_from, test_config};
    use crate::secrets::DynamicReferenceProvider;

    fn delivery(qualifier: Option<&str>) -> Stack {
        let config = test_config(qualifier);
        let app = MailServiceApp::assemble(&config, &DynamicReferenceProvider::new()).unwrap();
        pipeline_stack(app.pipeline(), &config).unwrap()
    }

    #[test]
    fn test_pipeline_resource() {
        let stack = delivery(None);
        let pipeline = &stack.resource(PIPELINE_ID).unwrap().properties;

        assert_eq!(pipeline["ArtifactStore"]["Location"], "mail-artifacts");
        assert_eq!(pipeline["ArtifactStore"]["EncryptionKey"]["Type"], "KMS");

        let stage_names: Vec<&str> = pipeline["Stages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["Name"].as_str().unwrap())
            .collect();
        assert_eq!(stage_names, vec!["Source", "Build", "Deploy"]);

        let deploy = &pipeline["Stages"][2]["Actions"][0];
        assert_eq!(deploy["ActionTypeId"]["Provider"], "CloudFormation");
        assert_eq!(deploy["Configuration"]["TemplatePath"], "CdkBuildOutput::QueueStack.template.json");
        assert_eq!(deploy["RunOrder"], 1);

        let overrides: Value =
            serde_json::from_str(deploy["Configuration"]["ParameterOverrides"].as_str().unwrap()).unwrap();
        assert_eq!(
            overrides["MailServiceQueuePopperCodeObjectKey"]["Fn::GetArtifactAtt"],
            json!(["LambdaBuildOutput", "ObjectKey"])
        );
    }

    #[test]
    fn test_build_projects_and_roles() {
        let stack = delivery(Some("dev"));

        let cdk = &stack.resource("CDKBuildProject").unwrap().properties;
        assert_eq!(cdk["Name"], "MailServiceCdkBuild-dev");
        assert!(cdk["Source"]["BuildSpec"].as_str().unwrap().contains("base-directory: cdk.out"));
        let env_names: Vec<&str> = cdk["Environment"]["EnvironmentVariables"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["Name"].as_str().unwrap())
            .collect();
        assert!(env_names.contains(&"QUEUE_SENDER_ARN"));
        assert!(env_names.contains(&"ENVIRONMENT"));

        let lambda = &stack.resource("LambdaBuildProject").unwrap().properties;
        assert!(lambda["Source"].get("BuildSpec").is_none());

        let deploy_role = &stack.resource("CDKDeployRole").unwrap().properties;
        assert_eq!(deploy_role["RoleName"], "CDKDeployRole-dev");
        assert_eq!(
            deploy_role["ManagedPolicyArns"][0],
            "arn:aws:iam::aws:policy/AdministratorAccess"
        );
    }

    #[test]
    fn test_bare_bucket_name_renders_arn_resources() {
        let mut values = complete_values();
        values.insert("S3_BUCKET_ARN", "plain-bucket");
        let config = raw_from(&values).validate().unwrap();
        let app = MailServiceApp::assemble(&config, &DynamicReferenceProvider::new()).unwrap();
        let stack = pipeline_stack(app.pipeline(), &config).unwrap();

        let role = &stack.resource(PIPELINE_ROLE_ID).unwrap().properties;
        let statement = &role["Policies"][0]["PolicyDocument"]["Statement"][0];
        assert_eq!(
            statement["Resource"],
            json!(["arn:aws:s3:::plain-bucket", "arn:aws:s3:::plain-bucket/*"])
        );
        let pipeline = &stack.resource(PIPELINE_ID).unwrap().properties;
        assert_eq!(pipeline["ArtifactStore"]["Location"], "plain-bucket");
    }

    #[test]
    fn test_logical_name() {
        assert_eq!(logical_name("CDK-Deploy 2"), "CDKDeploy2");
    }
}
