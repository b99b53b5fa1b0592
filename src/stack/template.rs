// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Template rendering
//!
//! Renders a [`Stack`] into the JSON document the provisioning engine applies.

use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

use super::Stack;
use crate::errors::{MailstackError, MailstackResult};

/// Rendered infrastructure template for one stack
#[derive(Debug, Clone)]
pub struct StackTemplate {
    pub stack_name: String,
    pub document: Value,
}

impl StackTemplate {
    /// Template file name for a stack: `<StackName>.template.json`
    pub fn file_name(stack_name: &str) -> String {
        format!("{}.template.json", stack_name)
    }

    /// Render a stack
    pub fn render(stack: &Stack) -> Self {
        let mut document = Map::new();

        if let Some(description) = stack.description() {
            document.insert("Description".into(), json!(description));
        }

        let parameters: Map<String, Value> = stack
            .inputs()
            .map(|input| {
                (
                    input.name().to_string(),
                    json!({
                        "Type": "String",
                        "Description": input.description(),
                    }),
                )
            })
            .collect();
        if !parameters.is_empty() {
            document.insert("Parameters".into(), Value::Object(parameters));
        }

        let resources: Map<String, Value> = stack
            .resources()
            .iter()
            .map(|resource| {
                let mut body = Map::new();
                body.insert("Type".into(), json!(resource.resource_type));
                if !resource.properties.is_null() {
                    body.insert("Properties".into(), resource.properties.clone());
                }
                if !resource.depends_on.is_empty() {
                    body.insert("DependsOn".into(), json!(resource.depends_on));
                }
                (resource.logical_id.clone(), Value::Object(body))
            })
            .collect();
        document.insert("Resources".into(), Value::Object(resources));

        let outputs: Map<String, Value> = stack
            .outputs()
            .map(|output| {
                let mut body = Map::new();
                if let Some(ref description) = output.description {
                    body.insert("Description".into(), json!(description));
                }
                body.insert("Value".into(), output.value.clone());
                body.insert(
                    "Export".into(),
                    json!({ "Name": output.handle.export_name() }),
                );
                (output.handle.name().to_string(), Value::Object(body))
            })
            .collect();
        if !outputs.is_empty() {
            document.insert("Outputs".into(), Value::Object(outputs));
        }

        Self {
            stack_name: stack.name().to_string(),
            document: Value::Object(document),
        }
    }

    pub fn file_name_for(&self) -> String {
        Self::file_name(&self.stack_name)
    }

    pub fn to_json(&self) -> MailstackResult<String> {
        serde_json::to_string_pretty(&self.document).map_err(Into::into)
    }

    /// Write the template into `dir`, returning the written path
    pub fn write_to(&self, dir: &Path) -> MailstackResult<PathBuf> {
        let path = dir.join(self.file_name_for());
        let content = self.to_json()?;

        std::fs::write(&path, content).map_err(|e| MailstackError::FileWriteError {
            path: path.clone(),
            error: e.to_string(),
        })?;

        tracing::info!(stack = %self.stack_name, path = %path.display(), "template written");
        Ok(path)
    }
}
