// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for mailstack.

pub mod graph;
pub mod plan;
pub mod run;
pub mod synth;
pub mod validate;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use crate::app::{MailServiceApp, DEFAULT_OUTPUT_DIR};
use crate::config::{ConfigFile, ConfigKey, RawConfig, DEFAULT_CONFIG_FILE};
use crate::errors::{MailstackError, MailstackResult};
use crate::secrets::DynamicReferenceProvider;

/// Mail service stack orchestrator
///
/// Synthesizes the mail queue stacks and the pipeline that delivers them.
#[derive(Parser, Debug)]
#[clap(
    name = "mailstack",
    version,
    about = "Synthesize and rehearse the mail service queue stacks and delivery pipeline",
    long_about = None,
    after_help = "Examples:\n\
        mailstack synth                    Write templates and manifest to cdk.out\n\
        mailstack validate                 Check configuration and definition\n\
        mailstack graph --format mermaid   Show the action graph\n\
        mailstack run --fail LambdaBuild   Rehearse a failed build\n\n\
        Configuration comes from mailstack.yaml, then the environment, then flags."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    #[clap(flatten)]
    pub config: ConfigArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write every stack template and the manifest
    Synth {
        /// Output directory
        #[clap(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output: PathBuf,
    },

    /// Validate configuration and the stack/pipeline definition
    Validate,

    /// Show the pipeline's action graph
    Graph {
        /// Output format
        #[clap(short, long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },

    /// Show stages, actions, artifacts and parameter bindings
    Plan {
        /// Print the pipeline definition as JSON
        #[clap(long)]
        json: bool,
    },

    /// Rehearse the pipeline against the simulated engine
    Run {
        /// Make an action fail (repeatable)
        #[clap(long, value_name = "ACTION")]
        fail: Vec<String>,

        /// Simulated duration of every action, in milliseconds
        #[clap(long, default_value = "0", value_name = "MS")]
        delay: u64,
    },
}

/// Configuration sources; flags win over the environment, which wins over
/// the configuration file
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Configuration file (default: mailstack.yaml if present)
    #[clap(long = "config", global = true, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Identity allowed to send to the queue
    #[clap(long, global = true, env = "QUEUE_SENDER_ARN", value_name = "ARN", hide_env_values = true)]
    pub queue_sender_arn: Option<String>,

    /// Artifact bucket
    #[clap(long, global = true, env = "S3_BUCKET_ARN", value_name = "ARN", hide_env_values = true)]
    pub s3_bucket_arn: Option<String>,

    /// Key protecting the credential store
    #[clap(long, global = true, env = "KMS_ENCRYPTION_KEY_ARN", value_name = "ARN", hide_env_values = true)]
    pub kms_encryption_key_arn: Option<String>,

    /// Credential store entry with the repository token
    #[clap(long, global = true, env = "SECRETS_MANAGER_SECRET_ARN", value_name = "ARN", hide_env_values = true)]
    pub secrets_manager_secret_arn: Option<String>,

    /// Consumer runtime version
    #[clap(long, global = true, env = "RUNTIME_VERSION", value_name = "VERSION")]
    pub runtime_version: Option<String>,

    /// Environment qualifier appended to every generated name
    #[clap(long, global = true, env = "ENVIRONMENT", value_name = "QUALIFIER")]
    pub qualifier: Option<String>,
}

impl ConfigArgs {
    fn value(&self, key: ConfigKey) -> Option<&String> {
        match key {
            ConfigKey::QueueSenderArn => self.queue_sender_arn.as_ref(),
            ConfigKey::S3BucketArn => self.s3_bucket_arn.as_ref(),
            ConfigKey::KmsEncryptionKeyArn => self.kms_encryption_key_arn.as_ref(),
            ConfigKey::SecretsManagerSecretArn => self.secrets_manager_secret_arn.as_ref(),
            ConfigKey::RuntimeVersion => self.runtime_version.as_ref(),
            ConfigKey::Environment => self.qualifier.as_ref(),
        }
    }

    /// Layer the configuration file under environment and flag values
    pub fn raw_config(&self) -> MailstackResult<RawConfig> {
        let file = match self.config_file {
            Some(ref path) => ConfigFile::from_file(path)?,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    ConfigFile::from_file(&default)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        Ok(RawConfig::from_file(&file).layer_lookup(|name| {
            ConfigKey::ALL
                .iter()
                .find(|k| k.env_var() == name)
                .and_then(|k| self.value(*k))
                .cloned()
        }))
    }
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// Load configuration and assemble the app, printing recovery steps on
/// failure
pub fn load_app(config: &ConfigArgs) -> miette::Result<MailServiceApp> {
    let result = config
        .raw_config()
        .and_then(|raw| MailServiceApp::from_raw(&raw, &DynamicReferenceProvider::new()));

    result.map_err(|e| {
        print_recovery(&e);
        e.into()
    })
}

/// Print the recovery suggestion for an error, if there is one
pub fn print_recovery(error: &MailstackError) {
    if let Some(suggestion) = error.recovery() {
        eprintln!("{}", format!("[{}]", error.category()).dimmed());
        eprintln!("{}", suggestion);
    }
}
