// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Queue stack
//!
//! The mail queue and the serverless consumer that pops messages from it.
//! One parameterized template covers every variant: each optional field of
//! [`QueueStackProps`] attaches (or leaves out) a specific policy.

use serde_json::{json, Value};

use super::{InputPlaceholder, OutputHandle, Resource, Stack};
use crate::binding::{LocationField, ParameterBinding};
use crate::config::{qualified_name, Qualifier, ServiceConfig};
use crate::errors::MailstackResult;

/// Unqualified stack name
pub const QUEUE_STACK: &str = "QueueStack";

const QUEUE_ID: &str = "MailServiceQueue";
const QUEUE_POLICY_ID: &str = "MailServiceQueuePolicy";
const FUNCTION_ID: &str = "MailServiceQueuePopper";
const ROLE_ID: &str = "MailServiceQueuePopperRole";
const ROLE_POLICY_ID: &str = "MailServiceQueuePopperPolicy";
const EVENT_SOURCE_ID: &str = "MailServiceQueuePopperEventSource";

const LAMBDA_RUNTIME: &str = "go1.x";
const LAMBDA_HANDLER: &str = "main";

/// Inputs of the queue stack template
#[derive(Debug, Clone, Default)]
pub struct QueueStackProps {
    /// Identity allowed to send to the queue
    pub sender_identity: Option<String>,
    /// Bucket the consumer code is read from
    pub artifact_bucket_arn: Option<String>,
    /// Key the consumer may decrypt with
    pub encryption_key_arn: Option<String>,
    /// Secret the consumer may read
    pub secret_arn: Option<String>,
    pub qualifier: Option<Qualifier>,
    /// Toolchain version the consumer was built with
    pub runtime_version: Option<String>,
}

impl QueueStackProps {
    /// Every variant field populated from configuration
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            sender_identity: Some(config.queue_sender_arn.clone()),
            artifact_bucket_arn: Some(config.s3_bucket_arn.clone()),
            encryption_key_arn: Some(config.kms_encryption_key_arn.clone()),
            secret_arn: Some(config.secrets_manager_secret_arn.clone()),
            qualifier: config.qualifier.clone(),
            runtime_version: Some(config.runtime_version.clone()),
        }
    }

    fn name(&self, base: &str) -> String {
        qualified_name(base, self.qualifier.as_ref())
    }
}

/// The two deploy-time parameters that locate the consumer's code
#[derive(Debug, Clone)]
pub struct LambdaCodeParameters {
    pub bucket_name: InputPlaceholder,
    pub object_key: InputPlaceholder,
}

impl LambdaCodeParameters {
    fn declare(stack: &mut Stack, function_id: &str) -> MailstackResult<Self> {
        let bucket_name = stack.declare_input(
            &format!("{}CodeBucketName", function_id),
            format!("Bucket holding the code of {}", function_id),
        )?;
        let object_key = stack.declare_input(
            &format!("{}CodeObjectKey", function_id),
            format!("Object key of the code of {}", function_id),
        )?;
        Ok(Self {
            bucket_name,
            object_key,
        })
    }

    /// Bind both parameters to wherever `artifact` lands once built
    pub fn assign(&self, artifact: &str) -> Vec<ParameterBinding> {
        vec![
            ParameterBinding::artifact_location(
                self.bucket_name.name(),
                artifact,
                LocationField::BucketName,
            ),
            ParameterBinding::artifact_location(
                self.object_key.name(),
                artifact,
                LocationField::ObjectKey,
            ),
        ]
    }

    fn code_property(&self) -> Value {
        json!({
            "S3Bucket": { "Ref": self.bucket_name.name() },
            "S3Key": { "Ref": self.object_key.name() },
        })
    }
}

/// The queue stack and the handles other parts of the app bind to
#[derive(Debug, Clone)]
pub struct QueueStack {
    pub stack: Stack,
    pub code: LambdaCodeParameters,
    pub queue_url: OutputHandle,
    pub queue_arn: OutputHandle,
    pub consumer_function: OutputHandle,
}

impl QueueStack {
    pub fn new(props: &QueueStackProps) -> MailstackResult<Self> {
        let mut stack = Stack::new(props.name(QUEUE_STACK))
            .with_description("Mail service queue and consumer");

        let code = LambdaCodeParameters::declare(&mut stack, FUNCTION_ID)?;
        let queue_arn = json!({ "Fn::GetAtt": [QUEUE_ID, "Arn"] });

        let queue_name = props.name(QUEUE_ID);
        stack.add_resource(
            Resource::new(QUEUE_ID, "AWS::SQS::Queue", json!({ "QueueName": queue_name }))
                .with_physical_name(queue_name),
        )?;

        if let Some(ref sender) = props.sender_identity {
            stack.add_resource(Resource::new(
                QUEUE_POLICY_ID,
                "AWS::SQS::QueuePolicy",
                json!({
                    "Queues": [{ "Ref": QUEUE_ID }],
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [{
                            "Sid": "__sender_statement",
                            "Effect": "Allow",
                            "Action": "SQS:SendMessage",
                            "Principal": { "AWS": sender },
                            "Resource": queue_arn,
                        }],
                    },
                }),
            ))?;
        }

        let role_name = props.name(ROLE_ID);
        stack.add_resource(
            Resource::new(
                ROLE_ID,
                "AWS::IAM::Role",
                json!({
                    "RoleName": role_name,
                    "AssumeRolePolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [{
                            "Effect": "Allow",
                            "Action": "sts:AssumeRole",
                            "Principal": { "Service": "lambda.amazonaws.com" },
                        }],
                    },
                    "ManagedPolicyArns": [
                        "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"
                    ],
                }),
            )
            .with_physical_name(role_name),
        )?;

        let policy_name = props.name(ROLE_POLICY_ID);
        stack.add_resource(
            Resource::new(
                ROLE_POLICY_ID,
                "AWS::IAM::Policy",
                json!({
                    "PolicyName": policy_name,
                    "Roles": [{ "Ref": ROLE_ID }],
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": consumer_statements(props, &queue_arn),
                    },
                }),
            )
            .with_physical_name(policy_name),
        )?;

        let function_name = props.name(FUNCTION_ID);
        let mut function = json!({
            "FunctionName": function_name,
            "Handler": LAMBDA_HANDLER,
            "Runtime": LAMBDA_RUNTIME,
            "Role": { "Fn::GetAtt": [ROLE_ID, "Arn"] },
            "Code": code.code_property(),
        });
        if let Some(ref version) = props.runtime_version {
            function["Tags"] = json!([{ "Key": "RuntimeVersion", "Value": version }]);
        }
        stack.add_resource(
            Resource::new(FUNCTION_ID, "AWS::Lambda::Function", function)
                .with_physical_name(function_name)
                .depends_on(ROLE_ID)
                .depends_on(ROLE_POLICY_ID),
        )?;

        stack.add_resource(
            Resource::new(
                EVENT_SOURCE_ID,
                "AWS::Lambda::EventSourceMapping",
                json!({
                    "EventSourceArn": queue_arn,
                    "FunctionName": { "Ref": FUNCTION_ID },
                }),
            )
            .depends_on(ROLE_POLICY_ID),
        )?;

        let queue_url = stack.declare_output("QueueUrl", json!({ "Ref": QUEUE_ID }))?;
        let queue_arn = stack.declare_output("QueueArn", queue_arn)?;
        let consumer_function =
            stack.declare_output("ConsumerFunctionName", json!({ "Ref": FUNCTION_ID }))?;

        tracing::debug!(
            stack = %stack.name(),
            sender = props.sender_identity.is_some(),
            bucket = props.artifact_bucket_arn.is_some(),
            key = props.encryption_key_arn.is_some(),
            secret = props.secret_arn.is_some(),
            "queue stack constructed"
        );

        Ok(Self {
            stack,
            code,
            queue_url,
            queue_arn,
            consumer_function,
        })
    }
}

/// Statements of the consumer's role policy
fn consumer_statements(props: &QueueStackProps, queue_arn: &Value) -> Vec<Value> {
    let mut statements = vec![json!({
        "Sid": "ConsumeMessages",
        "Effect": "Allow",
        "Action": [
            "sqs:ReceiveMessage",
            "sqs:ChangeMessageVisibility",
            "sqs:GetQueueUrl",
            "sqs:DeleteMessage",
            "sqs:GetQueueAttributes",
        ],
        "Resource": queue_arn,
    })];

    if let Some(ref bucket) = props.artifact_bucket_arn {
        statements.push(json!({
            "Sid": "ReadArtifacts",
            "Effect": "Allow",
            "Action": ["s3:GetObject", "s3:GetObjectVersion"],
            "Resource": format!("{}/*", bucket),
        }));
    }

    if let Some(ref key) = props.encryption_key_arn {
        statements.push(json!({
            "Sid": "DecryptWithKey",
            "Effect": "Allow",
            "Action": "kms:Decrypt",
            "Resource": key,
        }));
    }

    if let Some(ref secret) = props.secret_arn {
        statements.push(json!({
            "Sid": "ReadSecret",
            "Effect": "Allow",
            "Action": "secretsmanager:GetSecretValue",
            "Resource": secret,
        }));
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{complete_values, raw_from, test_config};
    use crate::stack::StackTemplate;

    fn statement_ids(stack: &Stack) -> Vec<String> {
        stack.resource(ROLE_POLICY_ID).unwrap().properties["PolicyDocument"]["Statement"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["Sid"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_full_variant() {
        let queue = QueueStack::new(&QueueStackProps::from_config(&test_config(None))).unwrap();

        assert_eq!(queue.stack.name(), "QueueStack");
        assert!(queue.stack.resource(QUEUE_POLICY_ID).is_some());
        assert_eq!(
            statement_ids(&queue.stack),
            vec!["ConsumeMessages", "ReadArtifacts", "DecryptWithKey", "ReadSecret"]
        );
    }

    #[test]
    fn test_bare_bucket_name_renders_arn_resource() {
        let mut values = complete_values();
        values.insert("S3_BUCKET_ARN", "plain-bucket");
        let config = raw_from(&values).validate().unwrap();

        let queue = QueueStack::new(&QueueStackProps::from_config(&config)).unwrap();
        let statements = &queue.stack.resource(ROLE_POLICY_ID).unwrap().properties["PolicyDocument"]["Statement"];
        let read = statements
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["Sid"] == "ReadArtifacts")
            .unwrap();
        assert_eq!(read["Resource"], "arn:aws:s3:::plain-bucket/*");
    }

    #[test]
    fn test_minimal_variant_attaches_only_consume() {
        let queue = QueueStack::new(&QueueStackProps::default()).unwrap();

        assert!(queue.stack.resource(QUEUE_POLICY_ID).is_none());
        assert_eq!(statement_ids(&queue.stack), vec!["ConsumeMessages"]);
        let function = queue.stack.resource(FUNCTION_ID).unwrap();
        assert!(function.properties.get("Tags").is_none());
    }

    #[test]
    fn test_sender_statement() {
        let props = QueueStackProps {
            sender_identity: Some("arn:aws:iam::1:user/mailer".into()),
            ..Default::default()
        };
        let queue = QueueStack::new(&props).unwrap();
        let statement =
            &queue.stack.resource(QUEUE_POLICY_ID).unwrap().properties["PolicyDocument"]["Statement"][0];

        assert_eq!(statement["Sid"], "__sender_statement");
        assert_eq!(statement["Action"], "SQS:SendMessage");
        assert_eq!(statement["Principal"]["AWS"], "arn:aws:iam::1:user/mailer");
    }

    #[test]
    fn test_code_comes_from_parameters() {
        let queue = QueueStack::new(&QueueStackProps::default()).unwrap();
        let doc = StackTemplate::render(&queue.stack).document;

        let code = &doc["Resources"][FUNCTION_ID]["Properties"]["Code"];
        assert_eq!(code["S3Bucket"]["Ref"], queue.code.bucket_name.name());
        assert_eq!(code["S3Key"]["Ref"], queue.code.object_key.name());
        assert!(doc["Parameters"].get(queue.code.bucket_name.name()).is_some());
        assert_eq!(doc["Resources"][FUNCTION_ID]["Properties"]["Handler"], "main");
    }

    #[test]
    fn test_assign_produces_deferred_bindings() {
        let queue = QueueStack::new(&QueueStackProps::default()).unwrap();
        let bindings = queue.code.assign("LambdaBuildOutput");

        assert_eq!(bindings.len(), 2);
        assert!(bindings.iter().all(|b| b.source.is_deferred()));
        assert!(bindings
            .iter()
            .all(|b| b.source.artifact() == Some("LambdaBuildOutput")));
    }

    #[test]
    fn test_qualified_names() {
        let queue =
            QueueStack::new(&QueueStackProps::from_config(&test_config(Some("staging")))).unwrap();

        assert_eq!(queue.stack.name(), "QueueStack-staging");
        for name in queue.stack.exported_names() {
            assert_eq!(name.matches("staging").count(), 1, "{name}");
        }
        assert_eq!(queue.queue_url.export_name(), "QueueStack-staging:QueueUrl");
    }
}
