// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Validate command - check configuration and the stack/pipeline definition

use colored::Colorize;
use miette::Result;

use super::{print_recovery, ConfigArgs};
use crate::app::MailServiceApp;
use crate::secrets::DynamicReferenceProvider;

/// Run the validate command
pub async fn run(config: &ConfigArgs, verbose: bool) -> Result<()> {
    println!("{}", "Validating mail service...".bold());
    println!();

    let fail = |stage: &str, e: crate::MailstackError| {
        eprintln!("  {} {}", "✗".red(), stage);
        eprintln!();
        print_recovery(&e);
        miette::Report::from(e)
    };

    let raw = config.raw_config().map_err(|e| fail("Failed to read configuration", e))?;
    let service = raw.validate().map_err(|e| fail("Configuration is incomplete", e))?;
    println!("  {} All required configuration keys are set", "✓".green());
    if let Some(ref qualifier) = service.qualifier {
        println!("  {} Qualifier: {}", "✓".green(), qualifier);
    }

    let app = MailServiceApp::assemble(&service, &DynamicReferenceProvider::new())
        .map_err(|e| fail("Stack and pipeline definition is invalid", e))?;
    println!(
        "  {} {} stacks, {} pipeline actions",
        "✓".green(),
        app.stacks().len(),
        app.pipeline().actions().count()
    );

    if !app.warnings().is_empty() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in app.warnings() {
            println!("  {} {}", "⚠".yellow(), warning);
        }
    }

    if verbose {
        println!();
        println!("{}:", "Pipeline summary".bold());
        println!("  Name: {}", app.pipeline().name);
        println!("  Artifact bucket: {}", app.pipeline().artifact_bucket);
        for stage in &app.pipeline().stages {
            let actions: Vec<&str> = stage.actions.iter().map(|a| a.name.as_str()).collect();
            println!("    - {} {}", stage.name, format!("[{}]", actions.join(", ")).dimmed());
        }
        println!("  Stacks:");
        for stack in app.stacks().iter() {
            println!("    - {}", stack.name());
        }
    }

    println!();
    if app.warnings().is_empty() {
        println!("{}", "Definition is valid!".green().bold());
    } else {
        println!("{}", "Definition is valid but has warnings.".yellow().bold());
    }

    Ok(())
}
