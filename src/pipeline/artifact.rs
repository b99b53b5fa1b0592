// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Artifacts passed between actions
//!
//! Artifacts are the only channel from one action's output to another
//! action's input. Each is produced at most once per run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{MailstackError, MailstackResult};

/// Storage coordinates of a produced artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub bucket_name: String,
    pub object_key: String,
    /// Source revision the artifact was built from, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl ArtifactLocation {
    pub fn new(bucket_name: impl Into<String>, object_key: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            object_key: object_key.into(),
            revision: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn object_url(&self) -> String {
        format!("s3://{}/{}", self.bucket_name, self.object_key)
    }
}

/// A file inside an artifact, e.g. a rendered template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPath {
    pub artifact: String,
    pub file: String,
}

impl ArtifactPath {
    pub fn new(artifact: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            file: file.into(),
        }
    }
}

impl std::fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.artifact, self.file)
    }
}

/// An artifact that an action has produced during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProducedArtifact {
    pub name: String,
    pub producer: String,
    pub location: ArtifactLocation,
}

impl ProducedArtifact {
    pub fn new(name: impl Into<String>, producer: impl Into<String>, location: ArtifactLocation) -> Self {
        Self {
            name: name.into(),
            producer: producer.into(),
            location,
        }
    }
}

/// Artifacts produced so far in a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArtifactStore {
    produced: BTreeMap<String, ProducedArtifact>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a produced artifact; a second production of the same name is
    /// rejected
    pub fn record(&mut self, artifact: ProducedArtifact) -> MailstackResult<()> {
        if self.produced.contains_key(&artifact.name) {
            return Err(MailstackError::ArtifactAlreadyProduced {
                artifact: artifact.name,
            });
        }

        tracing::debug!(
            artifact = %artifact.name,
            producer = %artifact.producer,
            location = %artifact.location.object_url(),
            "artifact recorded"
        );
        self.produced.insert(artifact.name.clone(), artifact);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ProducedArtifact> {
        self.produced.get(name)
    }

    pub fn location(&self, name: &str) -> Option<&ArtifactLocation> {
        self.produced.get(name).map(|a| &a.location)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.produced.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProducedArtifact> {
        self.produced.values()
    }

    pub fn len(&self) -> usize {
        self.produced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.produced.is_empty()
    }
}
