// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Graph command - visualize the pipeline's action graph

use miette::Result;

use super::{load_app, ConfigArgs, GraphFormat};

/// Run the graph command
pub async fn run(config: &ConfigArgs, format: GraphFormat, _verbose: bool) -> Result<()> {
    let app = load_app(config)?;
    let graph = app.graph()?;
    let pipeline = app.pipeline();

    let output = match format {
        GraphFormat::Text => graph.to_text(pipeline),
        GraphFormat::Dot => graph.to_dot(pipeline),
        GraphFormat::Mermaid => graph.to_mermaid(pipeline),
    };

    println!("{}", output);

    Ok(())
}
