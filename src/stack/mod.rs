// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Stacks: independently deployable units of infrastructure
//!
//! A [`Stack`] owns resource declarations, deploy-time inputs
//! ([`InputPlaceholder`]) and deferred outputs ([`OutputHandle`]). Stacks refer
//! to each other only through these declarations, never directly.

pub mod delivery;
mod output;
pub mod queue;
mod template;

pub use delivery::{pipeline_stack, PIPELINE_STACK};
pub use output::OutputHandle;
pub use queue::{LambdaCodeParameters, QueueStack, QueueStackProps, QUEUE_STACK};
pub use template::StackTemplate;

use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::{MailstackError, MailstackResult};

/// A single resource declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Identifier unique within the stack
    pub logical_id: String,
    /// Provider resource type, e.g. `AWS::SQS::Queue`
    pub resource_type: String,
    /// Physical name given to the live resource, if we choose it
    pub physical_name: Option<String>,
    pub properties: Value,
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(logical_id: impl Into<String>, resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            logical_id: logical_id.into(),
            resource_type: resource_type.into(),
            physical_name: None,
            properties,
            depends_on: Vec::new(),
        }
    }

    /// Record the physical name; the caller also places it in `properties`
    pub fn with_physical_name(mut self, name: impl Into<String>) -> Self {
        self.physical_name = Some(name.into());
        self
    }

    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }
}

/// A deploy-time parameter a stack cannot know at definition time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPlaceholder {
    stack: String,
    name: String,
    description: String,
}

impl InputPlaceholder {
    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// An output together with the expression that produces its value
#[derive(Debug, Clone)]
pub struct DeclaredOutput {
    pub handle: OutputHandle,
    pub value: Value,
    pub description: Option<String>,
}

/// A deployable unit of infrastructure
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    description: Option<String>,
    resources: Vec<Resource>,
    inputs: BTreeMap<String, InputPlaceholder>,
    outputs: BTreeMap<String, DeclaredOutput>,
}

impl Stack {
    /// Create an empty stack. `name` is the final, already qualified name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            resources: Vec::new(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Add a resource declaration
    pub fn add_resource(&mut self, resource: Resource) -> MailstackResult<()> {
        if self.resource(&resource.logical_id).is_some() {
            return Err(MailstackError::DuplicateResource {
                stack: self.name.clone(),
                logical_id: resource.logical_id,
            });
        }
        self.resources.push(resource);
        Ok(())
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.logical_id == logical_id)
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Register a deploy-time input
    pub fn declare_input(
        &mut self,
        name: &str,
        description: impl Into<String>,
    ) -> MailstackResult<InputPlaceholder> {
        if self.inputs.contains_key(name) {
            return Err(MailstackError::DuplicateInput {
                stack: self.name.clone(),
                input: name.to_string(),
            });
        }

        let input = InputPlaceholder {
            stack: self.name.clone(),
            name: name.to_string(),
            description: description.into(),
        };
        self.inputs.insert(name.to_string(), input.clone());
        Ok(input)
    }

    pub fn input(&self, name: &str) -> Option<&InputPlaceholder> {
        self.inputs.get(name)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputPlaceholder> {
        self.inputs.values()
    }

    /// Register an output produced by `value` once deployed; the returned
    /// handle can be bound by other stacks right away
    pub fn declare_output(&mut self, name: &str, value: Value) -> MailstackResult<OutputHandle> {
        if self.outputs.contains_key(name) {
            return Err(MailstackError::DuplicateOutput {
                stack: self.name.clone(),
                output: name.to_string(),
            });
        }

        let handle = OutputHandle::new(&self.name, name);
        self.outputs.insert(
            name.to_string(),
            DeclaredOutput {
                handle: handle.clone(),
                value,
                description: None,
            },
        );
        Ok(handle)
    }

    pub fn output(&self, name: &str) -> Option<&OutputHandle> {
        self.outputs.get(name).map(|o| &o.handle)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &DeclaredOutput> {
        self.outputs.values()
    }

    /// Names this stack exposes outside itself: the stack name, chosen
    /// physical resource names and export names
    pub fn exported_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        names.extend(self.resources.iter().filter_map(|r| r.physical_name.clone()));
        names.extend(self.outputs.values().map(|o| o.handle.export_name().to_string()));
        names
    }
}

/// The stacks of one orchestration run
#[derive(Debug, Clone, Default)]
pub struct StackSet {
    stacks: Vec<Stack>,
}

impl StackSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stack; names must be unique within the run
    pub fn add(&mut self, stack: Stack) -> MailstackResult<()> {
        if self.get(stack.name()).is_some() {
            return Err(MailstackError::DuplicateStack {
                stack: stack.name().to_string(),
            });
        }
        tracing::debug!(stack = %stack.name(), resources = stack.resources().len(), "stack added");
        self.stacks.push(stack);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.iter()
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}
