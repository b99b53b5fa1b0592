// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Parameter bindings
//!
//! A [`ParameterBinding`] routes a value into a stack input. Literals and
//! configuration values are known at synthesis time. Stack outputs and
//! artifact locations are deferred: the executor resolves them right before
//! the deploy action applies its template, and refuses to apply if any is
//! still unresolved.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::config::ConfigKey;
use crate::errors::{MailstackError, MailstackResult};
use crate::pipeline::{ArtifactLocation, ArtifactStore};
use crate::stack::{OutputHandle, Stack};

/// Part of an artifact's storage coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LocationField {
    BucketName,
    ObjectKey,
}

impl LocationField {
    pub fn read(&self, location: &ArtifactLocation) -> String {
        match self {
            Self::BucketName => location.bucket_name.clone(),
            Self::ObjectKey => location.object_key.clone(),
        }
    }
}

impl std::fmt::Display for LocationField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BucketName => write!(f, "BucketName"),
            Self::ObjectKey => write!(f, "ObjectKey"),
        }
    }
}

/// When a binding's value becomes known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTime {
    Synthesis,
    Deploy,
}

/// Where a bound value comes from
#[derive(Debug, Clone)]
pub enum BindingSource {
    /// Fixed at definition time
    Literal(String),
    /// Taken from validated configuration
    Config { key: ConfigKey, value: String },
    /// Another stack's output, known once that stack is deployed
    StackOutput(OutputHandle),
    /// Storage coordinates of an artifact, known once it is produced
    ArtifactLocation { artifact: String, field: LocationField },
}

impl BindingSource {
    /// Lower is stronger: literal, then configuration, then deferred sources
    pub fn priority(&self) -> u8 {
        match self {
            Self::Literal(_) => 0,
            Self::Config { .. } => 1,
            Self::StackOutput(_) | Self::ArtifactLocation { .. } => 2,
        }
    }

    pub fn resolution_time(&self) -> ResolutionTime {
        match self {
            Self::Literal(_) | Self::Config { .. } => ResolutionTime::Synthesis,
            Self::StackOutput(_) | Self::ArtifactLocation { .. } => ResolutionTime::Deploy,
        }
    }

    pub fn is_deferred(&self) -> bool {
        self.resolution_time() == ResolutionTime::Deploy
    }

    /// Artifact this source reads, if any
    pub fn artifact(&self) -> Option<&str> {
        match self {
            Self::ArtifactLocation { artifact, .. } => Some(artifact),
            _ => None,
        }
    }

    /// Human readable description, used in errors and plans
    pub fn describe(&self) -> String {
        match self {
            Self::Literal(value) => format!("literal '{}'", value),
            Self::Config { key, .. } => format!("config {}", key),
            Self::StackOutput(handle) => {
                format!("output '{}' of stack '{}'", handle.name(), handle.stack())
            }
            Self::ArtifactLocation { artifact, field } => {
                format!("{} of artifact '{}'", field, artifact)
            }
        }
    }

    /// Rendered form for a pipeline definition
    pub fn render(&self) -> Value {
        match self {
            Self::Literal(value) | Self::Config { value, .. } => json!(value),
            Self::StackOutput(handle) => json!({ "Fn::ImportValue": handle.export_name() }),
            Self::ArtifactLocation { artifact, field } => {
                json!({ "Fn::GetArtifactAtt": [artifact, field.to_string()] })
            }
        }
    }
}

/// A named value routed into a stack input
#[derive(Debug, Clone)]
pub struct ParameterBinding {
    pub key: String,
    pub source: BindingSource,
}

impl ParameterBinding {
    pub fn new(key: impl Into<String>, source: BindingSource) -> Self {
        Self {
            key: key.into(),
            source,
        }
    }

    pub fn literal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, BindingSource::Literal(value.into()))
    }

    pub fn artifact_location(
        key: impl Into<String>,
        artifact: impl Into<String>,
        field: LocationField,
    ) -> Self {
        Self::new(
            key,
            BindingSource::ArtifactLocation {
                artifact: artifact.into(),
                field,
            },
        )
    }

    pub fn stack_output(key: impl Into<String>, handle: &OutputHandle) -> Self {
        Self::new(key, BindingSource::StackOutput(handle.clone()))
    }
}

/// The parameter overrides of one deploy action, one source per key
#[derive(Debug, Clone, Default)]
pub struct BindingSet {
    bindings: BTreeMap<String, BindingSource>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding. If the key is already bound, the higher-priority source
    /// is kept.
    pub fn insert(&mut self, binding: ParameterBinding) {
        match self.bindings.get(&binding.key) {
            Some(existing) if existing.priority() <= binding.source.priority() => {
                tracing::debug!(
                    key = %binding.key,
                    kept = %existing.describe(),
                    ignored = %binding.source.describe(),
                    "binding shadowed by higher-priority source"
                );
            }
            _ => {
                self.bindings.insert(binding.key, binding.source);
            }
        }
    }

    pub fn extend(&mut self, bindings: impl IntoIterator<Item = ParameterBinding>) {
        for binding in bindings {
            self.insert(binding);
        }
    }

    pub fn get(&self, key: &str) -> Option<&BindingSource> {
        self.bindings.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BindingSource)> {
        self.bindings.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.bindings.keys()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings resolved only at deploy time
    pub fn deferred(&self) -> impl Iterator<Item = (&String, &BindingSource)> {
        self.bindings.iter().filter(|(_, s)| s.is_deferred())
    }

    /// Artifacts read by deferred bindings
    pub fn artifacts(&self) -> Vec<&str> {
        let mut artifacts: Vec<&str> = self.bindings.values().filter_map(|s| s.artifact()).collect();
        artifacts.sort_unstable();
        artifacts.dedup();
        artifacts
    }

    /// Every key must be a declared input and every declared input bound
    pub fn validate_against(&self, stack: &Stack) -> MailstackResult<()> {
        for key in self.bindings.keys() {
            if stack.input(key).is_none() {
                return Err(MailstackError::UndeclaredInput {
                    stack: stack.name().to_string(),
                    input: key.clone(),
                });
            }
        }

        for input in stack.inputs() {
            if !self.bindings.contains_key(input.name()) {
                return Err(MailstackError::UnboundInput {
                    stack: stack.name().to_string(),
                    input: input.name().to_string(),
                });
            }
        }

        Ok(())
    }
}

impl FromIterator<ParameterBinding> for BindingSet {
    fn from_iter<I: IntoIterator<Item = ParameterBinding>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Serialize for BindingSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.bindings.len()))?;
        for (key, source) in &self.bindings {
            map.serialize_entry(key, &source.render())?;
        }
        map.end()
    }
}

/// Resolves a deploy action's bindings against what has run so far
pub struct BindingResolver<'a> {
    artifacts: &'a ArtifactStore,
}

impl<'a> BindingResolver<'a> {
    pub fn new(artifacts: &'a ArtifactStore) -> Self {
        Self { artifacts }
    }

    /// Resolve every binding to a concrete value
    pub fn resolve(&self, action: &str, set: &BindingSet) -> MailstackResult<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();

        for (key, source) in set.iter() {
            let value = match source {
                BindingSource::Literal(value) | BindingSource::Config { value, .. } => value.clone(),
                BindingSource::StackOutput(handle) => handle
                    .get()
                    .map_err(|_| Self::unresolved(action, key, source))?
                    .to_string(),
                BindingSource::ArtifactLocation { artifact, field } => {
                    let location = self
                        .artifacts
                        .location(artifact)
                        .ok_or_else(|| Self::unresolved(action, key, source))?;
                    field.read(location)
                }
            };

            tracing::debug!(action, key = %key, source = %source.describe(), "binding resolved");
            resolved.insert(key.clone(), value);
        }

        Ok(resolved)
    }

    fn unresolved(action: &str, key: &str, source: &BindingSource) -> MailstackError {
        tracing::error!(action, key, source = %source.describe(), "deferred binding unresolved at apply time");
        MailstackError::UnresolvedBinding {
            action: action.to_string(),
            key: key.to_string(),
            reference: source.describe(),
        }
    }
}
