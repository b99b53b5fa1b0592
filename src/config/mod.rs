// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Service configuration
//!
//! External values that parameterize the stacks and the delivery pipeline.
//! Values are layered (YAML file, then environment, then explicit overrides)
//! into a [`RawConfig`], and validated exactly once into a [`ServiceConfig`].
//! Validation happens before any stack is constructed; the first missing or
//! empty key aborts the run.

mod qualifier;

pub use qualifier::{qualified_name, Qualifier};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::{MailstackError, MailstackResult};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "mailstack.yaml";

/// A configuration key understood by mailstack
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigKey {
    /// Identity allowed to send messages to the queue
    QueueSenderArn,
    /// Bucket holding pipeline artifacts
    S3BucketArn,
    /// Key protecting the credential store
    KmsEncryptionKeyArn,
    /// Credential store entry holding the source OAuth token
    SecretsManagerSecretArn,
    /// Consumer runtime toolchain version
    RuntimeVersion,
    /// Optional environment qualifier
    Environment,
}

impl ConfigKey {
    /// Keys that must be present and non-empty, in validation order
    pub const REQUIRED: [ConfigKey; 5] = [
        ConfigKey::QueueSenderArn,
        ConfigKey::S3BucketArn,
        ConfigKey::KmsEncryptionKeyArn,
        ConfigKey::SecretsManagerSecretArn,
        ConfigKey::RuntimeVersion,
    ];

    /// Every key, required ones first
    pub const ALL: [ConfigKey; 6] = [
        ConfigKey::QueueSenderArn,
        ConfigKey::S3BucketArn,
        ConfigKey::KmsEncryptionKeyArn,
        ConfigKey::SecretsManagerSecretArn,
        ConfigKey::RuntimeVersion,
        ConfigKey::Environment,
    ];

    /// Environment variable name for this key
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::QueueSenderArn => "QUEUE_SENDER_ARN",
            Self::S3BucketArn => "S3_BUCKET_ARN",
            Self::KmsEncryptionKeyArn => "KMS_ENCRYPTION_KEY_ARN",
            Self::SecretsManagerSecretArn => "SECRETS_MANAGER_SECRET_ARN",
            Self::RuntimeVersion => "RUNTIME_VERSION",
            Self::Environment => "ENVIRONMENT",
        }
    }

    pub fn is_required(&self) -> bool {
        !matches!(self, Self::Environment)
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.env_var())
    }
}

/// Coordinates of the two source repositories the pipeline fetches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Repository owner
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Repository with the queue consumer executable
    #[serde(default = "default_consumer_repo")]
    pub consumer_repo: String,

    /// Repository with this infrastructure definition
    #[serde(default = "default_infrastructure_repo")]
    pub infrastructure_repo: String,

    /// Branch to track
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_owner() -> String {
    "2pisoftware".to_string()
}

fn default_consumer_repo() -> String {
    "Cmfive-Mail-Service-Queue-Trigger".to_string()
}

fn default_infrastructure_repo() -> String {
    "Cmfive-Mail-Service-CDK".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            consumer_repo: default_consumer_repo(),
            infrastructure_repo: default_infrastructure_repo(),
            branch: default_branch(),
        }
    }
}

/// On-disk configuration (mailstack.yaml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub queue_sender_arn: Option<String>,

    #[serde(default)]
    pub s3_bucket_arn: Option<String>,

    #[serde(default)]
    pub kms_encryption_key_arn: Option<String>,

    #[serde(default)]
    pub secrets_manager_secret_arn: Option<String>,

    #[serde(default)]
    pub runtime_version: Option<String>,

    /// Environment qualifier
    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub sources: SourceSettings,
}

impl ConfigFile {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> MailstackResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| MailstackError::FileReadError {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> MailstackResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    fn value(&self, key: ConfigKey) -> Option<&String> {
        match key {
            ConfigKey::QueueSenderArn => self.queue_sender_arn.as_ref(),
            ConfigKey::S3BucketArn => self.s3_bucket_arn.as_ref(),
            ConfigKey::KmsEncryptionKeyArn => self.kms_encryption_key_arn.as_ref(),
            ConfigKey::SecretsManagerSecretArn => self.secrets_manager_secret_arn.as_ref(),
            ConfigKey::RuntimeVersion => self.runtime_version.as_ref(),
            ConfigKey::Environment => self.environment.as_ref(),
        }
    }
}

/// Unvalidated, layered configuration values
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    values: BTreeMap<ConfigKey, String>,
    sources: SourceSettings,
}

impl RawConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a configuration file
    pub fn from_file(file: &ConfigFile) -> Self {
        let mut raw = Self {
            values: BTreeMap::new(),
            sources: file.sources.clone(),
        };
        for key in ConfigKey::ALL {
            if let Some(value) = file.value(key) {
                raw.values.insert(key, value.clone());
            }
        }
        raw
    }

    /// Overlay values from a lookup function (e.g. the process environment)
    pub fn layer_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in ConfigKey::ALL {
            if let Some(value) = lookup(key.env_var()) {
                self.values.insert(key, value);
            }
        }
        self
    }

    /// Set a single value, replacing any lower layer
    pub fn set(mut self, key: ConfigKey, value: impl Into<String>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    /// Replace the source repository settings
    pub fn with_sources(mut self, sources: SourceSettings) -> Self {
        self.sources = sources;
        self
    }

    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    fn required(&self, key: ConfigKey) -> MailstackResult<String> {
        match self.values.get(&key).map(|v| v.trim()) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => {
                tracing::error!(key = %key, "required configuration key missing");
                Err(MailstackError::MissingConfig {
                    key: key.env_var().to_string(),
                })
            }
        }
    }

    /// Validate every required key and produce a typed configuration
    pub fn validate(&self) -> MailstackResult<ServiceConfig> {
        let queue_sender_arn = self.required(ConfigKey::QueueSenderArn)?;
        let s3_bucket_arn = self.required(ConfigKey::S3BucketArn)?;
        let kms_encryption_key_arn = self.required(ConfigKey::KmsEncryptionKeyArn)?;
        let secrets_manager_secret_arn = self.required(ConfigKey::SecretsManagerSecretArn)?;
        let runtime_version = self.required(ConfigKey::RuntimeVersion)?;

        let qualifier = match self.get(ConfigKey::Environment) {
            Some(raw) => Qualifier::parse(raw)?,
            None => None,
        };

        // policies need the ARN form even when a bare bucket name was given
        let s3_bucket_arn = if s3_bucket_arn.starts_with("arn:") {
            bucket_name_from_arn(&s3_bucket_arn)?;
            s3_bucket_arn
        } else {
            format!("arn:aws:s3:::{}", bucket_name_from_arn(&s3_bucket_arn)?)
        };

        tracing::debug!(
            qualifier = qualifier.as_ref().map(Qualifier::as_str).unwrap_or("<none>"),
            runtime_version = %runtime_version,
            "configuration validated"
        );

        Ok(ServiceConfig {
            queue_sender_arn,
            s3_bucket_arn,
            kms_encryption_key_arn,
            secrets_manager_secret_arn,
            runtime_version,
            qualifier,
            sources: self.sources.clone(),
        })
    }
}

/// Validated configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub queue_sender_arn: String,
    pub s3_bucket_arn: String,
    pub kms_encryption_key_arn: String,
    pub secrets_manager_secret_arn: String,
    pub runtime_version: String,
    pub qualifier: Option<Qualifier>,
    pub sources: SourceSettings,
}

impl ServiceConfig {
    /// Qualify a generated name with this configuration's qualifier
    pub fn name(&self, base: &str) -> String {
        qualified_name(base, self.qualifier.as_ref())
    }

    /// Artifact bucket name derived from its ARN
    pub fn bucket_name(&self) -> &str {
        // normalized to an ARN in RawConfig::validate
        bucket_name_from_arn(&self.s3_bucket_arn).unwrap_or(&self.s3_bucket_arn)
    }

    /// Environment handed to the build that re-renders the infrastructure
    /// templates, so the rendered stacks match this configuration
    pub fn build_environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(
            ConfigKey::QueueSenderArn.env_var().to_string(),
            self.queue_sender_arn.clone(),
        );
        env.insert(
            ConfigKey::S3BucketArn.env_var().to_string(),
            self.s3_bucket_arn.clone(),
        );
        env.insert(
            ConfigKey::KmsEncryptionKeyArn.env_var().to_string(),
            self.kms_encryption_key_arn.clone(),
        );
        env.insert(
            ConfigKey::SecretsManagerSecretArn.env_var().to_string(),
            self.secrets_manager_secret_arn.clone(),
        );
        env.insert(
            ConfigKey::RuntimeVersion.env_var().to_string(),
            self.runtime_version.clone(),
        );
        if let Some(ref q) = self.qualifier {
            env.insert(ConfigKey::Environment.env_var().to_string(), q.to_string());
        }
        env
    }
}

/// Extract the bucket name from an `arn:aws:s3:::name` ARN; a bare name is
/// accepted as-is
pub fn bucket_name_from_arn(arn: &str) -> MailstackResult<&str> {
    let name = match arn.strip_prefix("arn:") {
        Some(rest) => {
            let parts: Vec<&str> = rest.splitn(5, ':').collect();
            if parts.len() != 5 || parts[1] != "s3" {
                return Err(MailstackError::InvalidConfig {
                    key: ConfigKey::S3BucketArn.env_var().to_string(),
                    reason: format!("'{}' is not an S3 bucket ARN", arn),
                });
            }
            parts[4]
        }
        None => arn,
    };

    if name.is_empty() || name.contains('/') {
        return Err(MailstackError::InvalidConfig {
            key: ConfigKey::S3BucketArn.env_var().to_string(),
            reason: format!("'{}' does not name a bucket", arn),
        });
    }

    Ok(name)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    pub(crate) fn complete_values() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("QUEUE_SENDER_ARN", "arn:aws:iam::123456789012:user/mailer"),
            ("S3_BUCKET_ARN", "arn:aws:s3:::mail-artifacts"),
            (
                "KMS_ENCRYPTION_KEY_ARN",
                "arn:aws:kms:ap-southeast-2:123456789012:key/abcd",
            ),
            (
                "SECRETS_MANAGER_SECRET_ARN",
                "arn:aws:secretsmanager:ap-southeast-2:123456789012:secret:github-token",
            ),
            ("RUNTIME_VERSION", "1.15.1"),
        ])
    }

    pub(crate) fn raw_from(values: &HashMap<&'static str, &'static str>) -> RawConfig {
        RawConfig::new().layer_lookup(|name| values.get(name).map(|v| v.to_string()))
    }

    pub(crate) fn test_config(qualifier: Option<&str>) -> ServiceConfig {
        let mut raw = raw_from(&complete_values());
        if let Some(q) = qualifier {
            raw = raw.set(ConfigKey::Environment, q);
        }
        raw.validate().unwrap()
    }

    #[test]
    fn test_complete_configuration() {
        let config = test_config(None);
        assert_eq!(config.runtime_version, "1.15.1");
        assert_eq!(config.bucket_name(), "mail-artifacts");
        assert!(config.qualifier.is_none());
        assert_eq!(config.sources, SourceSettings::default());
    }

    #[test]
    fn test_each_missing_key_is_named() {
        for key in ConfigKey::REQUIRED {
            let mut values = complete_values();
            values.remove(key.env_var());

            let err = raw_from(&values).validate().unwrap_err();
            match err {
                MailstackError::MissingConfig { key: named } => {
                    assert_eq!(named, key.env_var())
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let mut values = complete_values();
        values.insert("KMS_ENCRYPTION_KEY_ARN", "  ");

        let err = raw_from(&values).validate().unwrap_err();
        assert!(err.to_string().contains("KMS_ENCRYPTION_KEY_ARN"));
    }

    #[test]
    fn test_environment_layer_overrides_file() {
        let file = ConfigFile::from_yaml(
            r#"
queue_sender_arn: "arn:aws:iam::1:user/file"
s3_bucket_arn: "arn:aws:s3:::from-file"
environment: dev
sources:
  owner: someone-else
"#,
        )
        .unwrap();

        let values = complete_values();
        let config = RawConfig::from_file(&file)
            .layer_lookup(|name| values.get(name).map(|v| v.to_string()))
            .validate()
            .unwrap();

        assert_eq!(config.bucket_name(), "mail-artifacts");
        assert_eq!(config.qualifier.unwrap().as_str(), "dev");
        assert_eq!(config.sources.owner, "someone-else");
        assert_eq!(config.sources.branch, "master");
    }

    #[test]
    fn test_build_environment_carries_qualifier() {
        let env = test_config(Some("staging")).build_environment();
        assert_eq!(env.get("ENVIRONMENT").map(String::as_str), Some("staging"));
        assert_eq!(env.len(), 6);

        let env = test_config(None).build_environment();
        assert!(!env.contains_key("ENVIRONMENT"));
    }

    #[test]
    fn test_bare_bucket_name_becomes_arn() {
        let mut values = complete_values();
        values.insert("S3_BUCKET_ARN", "plain-bucket");

        let config = raw_from(&values).validate().unwrap();
        assert_eq!(config.s3_bucket_arn, "arn:aws:s3:::plain-bucket");
        assert_eq!(config.bucket_name(), "plain-bucket");
        assert_eq!(config.build_environment()["S3_BUCKET_ARN"], "arn:aws:s3:::plain-bucket");
    }

    #[test]
    fn test_bucket_name_from_arn() {
        assert_eq!(bucket_name_from_arn("arn:aws:s3:::b").unwrap(), "b");
        assert_eq!(bucket_name_from_arn("plain-bucket").unwrap(), "plain-bucket");
        assert!(bucket_name_from_arn("arn:aws:sqs:::b").is_err());
        assert!(bucket_name_from_arn("arn:aws:s3:::").is_err());
    }
}
