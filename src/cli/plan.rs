// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Plan command - show what the pipeline would do

use colored::Colorize;
use miette::Result;

use super::{load_app, ConfigArgs};
use crate::binding::ResolutionTime;
use crate::pipeline::ActionKind;
use crate::utils::{print_bullet, print_header, print_info, print_section, print_warning};

/// Run the plan command
pub async fn run(config: &ConfigArgs, json: bool, verbose: bool) -> Result<()> {
    let app = load_app(config)?;
    let pipeline = app.pipeline();

    if json {
        let rendered = serde_json::to_string_pretty(pipeline)
            .map_err(|e| miette::miette!("Failed to render pipeline: {}", e))?;
        println!("{}", rendered);
        return Ok(());
    }

    let graph = app.graph()?;

    print_header(&format!("Pipeline {}", pipeline.name));
    println!("  Artifact bucket: {}", pipeline.artifact_bucket.cyan());

    for (stage_index, stage) in pipeline.stages.iter().enumerate() {
        print_section(&format!("Stage {}", stage.name));

        for (wave_index, wave) in graph.stage_waves(stage_index).iter().enumerate() {
            for &action_index in wave {
                let action = &stage.actions[action_index];
                println!(
                    "  {} {} {}",
                    format!("[{}]", wave_index + 1).dimmed(),
                    action.name.bold(),
                    format!("({})", action.kind_name()).dimmed()
                );
                if !action.inputs.is_empty() {
                    println!("      reads:  {}", action.inputs.join(", "));
                }
                if !action.outputs.is_empty() {
                    println!("      writes: {}", action.outputs.join(", "));
                }

                if let ActionKind::Deploy(ref target) = action.kind {
                    println!("      stack:  {}", target.stack_name);
                    println!("      template: {}", target.template_path);
                    for (key, source) in target.parameter_overrides.iter() {
                        let when = match source.resolution_time() {
                            ResolutionTime::Synthesis => "synth".green(),
                            ResolutionTime::Deploy => "deploy".yellow(),
                        };
                        println!("      {} {} <- {} [{}]", "param".dimmed(), key, source.describe(), when);
                    }
                }

                if verbose {
                    for (key, value) in action.configuration() {
                        println!("      {} {} = {}", "cfg".dimmed(), key, value);
                    }
                }
            }
        }
    }

    print_section("Stacks");
    for stack in app.stacks().iter() {
        print_bullet(stack.name());
    }

    if !app.warnings().is_empty() {
        print_section("Warnings");
        for warning in app.warnings() {
            print_warning(warning);
        }
    }

    println!();
    print_info("Run 'mailstack run' to rehearse this pipeline");

    Ok(())
}
