// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Synth command - write templates and the manifest

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::{load_app, print_recovery, ConfigArgs};
use crate::utils::{create_spinner, print_success, print_warning};

/// Run the synth command
pub async fn run(config: &ConfigArgs, output: PathBuf, verbose: bool) -> Result<()> {
    let app = load_app(config)?;

    // debug logs would interleave with the spinner
    let spinner = create_spinner("Synthesizing stacks...", verbose);
    let written = app.synthesize(&output);
    spinner.finish_and_clear();

    let written = written.map_err(|e| {
        print_recovery(&e);
        miette::Report::from(e)
    })?;

    println!("{}", "Synthesized mail service stacks".bold());
    println!();
    for template in &written.templates {
        print_success(&template.display().to_string());
    }
    print_success(&written.manifest.display().to_string());

    for warning in app.warnings() {
        print_warning(warning);
    }

    println!();
    println!(
        "{} {} templates in {}",
        "Wrote".green().bold(),
        written.templates.len(),
        written.directory.display()
    );

    Ok(())
}
