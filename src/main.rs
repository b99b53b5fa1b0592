// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! mailstack - mail service stack orchestrator
//!
//! Synthesize the mail queue stacks and rehearse the pipeline that delivers them.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailstack::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !mailstack::utils::should_use_colors() {
        colored::control::set_override(false);
    }

    let default_filter = if cli.verbose { "mailstack=debug" } else { "mailstack=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    let config = &cli.config;
    match cli.command {
        Commands::Synth { output } => mailstack::cli::synth::run(config, output, cli.verbose).await,
        Commands::Validate => mailstack::cli::validate::run(config, cli.verbose).await,
        Commands::Graph { format } => mailstack::cli::graph::run(config, format, cli.verbose).await,
        Commands::Plan { json } => mailstack::cli::plan::run(config, json, cli.verbose).await,
        Commands::Run { fail, delay } => {
            mailstack::cli::run::run(config, fail, delay, cli.verbose).await
        }
    }
}
