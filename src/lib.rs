// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! # mailstack - Mail Service Stack Orchestrator
//!
//! `mailstack` defines the infrastructure behind an asynchronous mail
//! service: an encrypted message queue with a dead-letter queue, the
//! consumer function that drains it, and a three-stage delivery pipeline
//! (source, build, deploy) that keeps both up to date.
//!
//! ## Features
//!
//! - **Validated configuration** - every required key is checked before any stack exists
//! - **Environment qualifiers** - deploy side-by-side copies with distinct names
//! - **Typed wiring** - stack inputs, outputs and artifacts are checked at definition time
//! - **Rehearsal** - run the pipeline against a simulated engine
//!
//! ## Quick Start
//!
//! ```bash
//! # Check configuration and the definition
//! mailstack validate
//!
//! # Write templates to cdk.out
//! mailstack synth
//!
//! # Rehearse a failing build
//! mailstack run --fail LambdaBuild
//! ```

pub mod app;
pub mod binding;
pub mod cli;
pub mod config;
pub mod errors;
pub mod executors;
pub mod pipeline;
pub mod secrets;
pub mod stack;
pub mod utils;

// Re-export commonly used types
pub use app::MailServiceApp;
pub use config::{RawConfig, ServiceConfig};
pub use errors::{MailstackError, MailstackResult};
pub use pipeline::{Pipeline, Stage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
