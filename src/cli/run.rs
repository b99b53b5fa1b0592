// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Run command - rehearse the pipeline on the simulated engine

use colored::Colorize;
use miette::Result;
use std::sync::Arc;
use std::time::Duration;

use super::{load_app, print_recovery, ConfigArgs};
use crate::executors::SimulatedRunner;
use crate::pipeline::ExecutionOptions;

/// Rehearse the pipeline
pub async fn run(config: &ConfigArgs, fail: Vec<String>, delay: u64, verbose: bool) -> Result<()> {
    let app = load_app(config)?;

    if !app.warnings().is_empty() && verbose {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in app.warnings() {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    for action in &fail {
        if app.pipeline().get_action(action).is_none() {
            return Err(miette::miette!(
                "Unknown action '{}'\n\nKnown actions: {}",
                action,
                app.pipeline().actions().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", ")
            ));
        }
    }

    let mut runner = SimulatedRunner::new().with_delay(Duration::from_millis(delay));
    for action in fail {
        runner = runner.fail(action, "failure requested on the command line");
    }

    let run = app
        .execute(Arc::new(runner), ExecutionOptions { quiet: false })
        .await
        .map_err(|e| {
            print_recovery(&e);
            miette::Report::from(e)
        })?;

    if verbose && !run.artifacts.is_empty() {
        println!();
        println!("{}:", "Artifacts".bold());
        for produced in run.artifacts.iter() {
            println!(
                "  {} {} {}",
                produced.name,
                format!("({})", produced.producer).dimmed(),
                produced.location.object_url().dimmed()
            );
        }
    }

    match run.into_failure() {
        None => {
            if let Ok(url) = app.queue().queue_url.get() {
                println!("  Queue URL: {}", url.cyan());
            }
            Ok(())
        }
        Some(failure) => {
            print_recovery(&failure);
            Err(failure.into())
        }
    }
}
