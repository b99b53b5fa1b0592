// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Delivery pipeline: stages, actions and the artifacts between them
//!
//! This module defines the pipeline model, the static checks run before
//! anything executes, and the stage-by-stage executor.

mod artifact;
mod dag;
mod definition;
mod executor;
mod validation;

pub use artifact::{ArtifactLocation, ArtifactPath, ArtifactStore, ProducedArtifact};
pub use dag::{ActionGraph, ActionNode, Dependency};
pub use definition::*;
pub use executor::{
    ActionReport, ActionState, ExecutionOptions, PipelineExecutor, PipelineRun,
};
pub use validation::{PipelineValidator, ValidationResult};
