// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 mailstack contributors

//! Action dependency graph
//!
//! Edges run from the producer of an artifact (or of a stack output) to every
//! action that consumes it. The graph drives wave scheduling inside a stage
//! and failure propagation across the run.

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

use crate::binding::BindingSource;
use crate::errors::{MailstackError, MailstackResult};
use crate::pipeline::{ActionKind, Pipeline};

/// Node payload: where the action lives in the pipeline
#[derive(Debug, Clone)]
pub struct ActionNode {
    pub name: String,
    pub stage_index: usize,
    pub action_index: usize,
}

/// Why one action depends on another
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    Artifact(String),
    StackOutput { stack: String, output: String },
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Artifact(name) => write!(f, "{}", name),
            Self::StackOutput { stack, output } => write!(f, "{}.{}", stack, output),
        }
    }
}

/// Dependency graph over the actions of a pipeline
pub struct ActionGraph {
    graph: DiGraph<ActionNode, Dependency>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl ActionGraph {
    /// Build the graph from a pipeline. Unproduced artifacts add no edge;
    /// reporting them is the validator's job.
    pub fn build(pipeline: &Pipeline) -> MailstackResult<Self> {
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();
        let mut producers: HashMap<&str, NodeIndex> = HashMap::new();
        let mut deployers: HashMap<&str, NodeIndex> = HashMap::new();

        for position in pipeline.positioned_actions() {
            let node = graph.add_node(ActionNode {
                name: position.action.name.clone(),
                stage_index: position.stage_index,
                action_index: position.action_index,
            });
            name_to_index.insert(position.action.name.clone(), node);

            for output in &position.action.outputs {
                producers.entry(output.as_str()).or_insert(node);
            }
            if let ActionKind::Deploy(ref target) = position.action.kind {
                deployers.entry(target.stack_name.as_str()).or_insert(node);
            }
        }

        for action in pipeline.actions() {
            let consumer = name_to_index[&action.name];

            for input in &action.inputs {
                if let Some(&producer) = producers.get(input.as_str()) {
                    if !graph.contains_edge(producer, consumer) {
                        graph.add_edge(producer, consumer, Dependency::Artifact(input.clone()));
                    }
                }
            }

            if let ActionKind::Deploy(ref target) = action.kind {
                for (_, source) in target.parameter_overrides.iter() {
                    if let BindingSource::StackOutput(handle) = source {
                        if let Some(&producer) = deployers.get(handle.stack()) {
                            if producer != consumer && !graph.contains_edge(producer, consumer) {
                                graph.add_edge(
                                    producer,
                                    consumer,
                                    Dependency::StackOutput {
                                        stack: handle.stack().to_string(),
                                        output: handle.name().to_string(),
                                    },
                                );
                            }
                        }
                    }
                }
            }
        }

        let dag = Self {
            graph,
            name_to_index,
        };
        dag.validate_acyclic()?;

        tracing::debug!(
            actions = dag.graph.node_count(),
            edges = dag.graph.edge_count(),
            "action graph built"
        );
        Ok(dag)
    }

    fn validate_acyclic(&self) -> MailstackResult<()> {
        toposort(&self.graph, None).map(|_| ()).map_err(|cycle| {
            let start = cycle.node_id();
            let mut actions: Vec<String> = self
                .graph
                .node_indices()
                .filter(|&n| {
                    n == start
                        || (has_path_connecting(&self.graph, start, n, None)
                            && has_path_connecting(&self.graph, n, start, None))
                })
                .map(|n| self.graph[n].name.clone())
                .collect();
            actions.sort();
            MailstackError::CircularDependency { actions }
        })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Actions that must complete before `action` (direct producers)
    pub fn dependencies(&self, action: &str) -> Option<Vec<String>> {
        let node = self.name_to_index.get(action)?;
        Some(
            self.graph
                .neighbors_directed(*node, Direction::Incoming)
                .map(|n| self.graph[n].name.clone())
                .collect(),
        )
    }

    /// Every action reachable from `action`, i.e. everything its failure blocks
    pub fn downstream(&self, action: &str) -> BTreeSet<String> {
        let mut reached = BTreeSet::new();
        let Some(&start) = self.name_to_index.get(action) else {
            return reached;
        };

        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(node) = bfs.next(&self.graph) {
            if node != start {
                reached.insert(self.graph[node].name.clone());
            }
        }
        reached
    }

    /// Longest chain of same-stage producers ahead of `node`
    fn depth(&self, node: NodeIndex) -> usize {
        let stage = self.graph[node].stage_index;
        self.graph
            .neighbors_directed(node, Direction::Incoming)
            .filter(|&n| self.graph[n].stage_index == stage)
            .map(|n| self.depth(n) + 1)
            .max()
            .unwrap_or(0)
    }

    /// Action indices of one stage grouped into waves. Every action in a wave
    /// depends only on earlier stages or on earlier waves of the same stage.
    pub fn stage_waves(&self, stage_index: usize) -> Vec<Vec<usize>> {
        let mut waves: Vec<Vec<usize>> = Vec::new();
        let mut members: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| self.graph[n].stage_index == stage_index)
            .collect();
        members.sort_by_key(|&n| self.graph[n].action_index);

        for node in members {
            let depth = self.depth(node);
            if waves.len() <= depth {
                waves.resize_with(depth + 1, Vec::new);
            }
            waves[depth].push(self.graph[node].action_index);
        }
        waves
    }

    fn edges(&self) -> impl Iterator<Item = (&str, &str, &Dependency)> {
        self.graph.edge_references().map(|e| {
            (
                self.graph[e.source()].name.as_str(),
                self.graph[e.target()].name.as_str(),
                e.weight(),
            )
        })
    }

    /// Mermaid flowchart, one subgraph per stage
    pub fn to_mermaid(&self, pipeline: &Pipeline) -> String {
        let mut out = String::from("graph LR\n");

        for stage in &pipeline.stages {
            out.push_str(&format!("    subgraph {}\n", stage.name));
            for action in &stage.actions {
                out.push_str(&format!("        {}[{}]\n", action.name, action.name));
            }
            out.push_str("    end\n");
        }

        for (from, to, dependency) in self.edges() {
            out.push_str(&format!("    {} -->|{}| {}\n", from, dependency, to));
        }

        out
    }

    /// Graphviz DOT, one cluster per stage
    pub fn to_dot(&self, pipeline: &Pipeline) -> String {
        let mut out = format!("digraph \"{}\" {{\n", pipeline.name);
        out.push_str("    rankdir=LR;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for (i, stage) in pipeline.stages.iter().enumerate() {
            out.push_str(&format!("    subgraph cluster_{} {{\n", i));
            out.push_str(&format!("        label=\"{}\";\n", stage.name));
            for action in &stage.actions {
                out.push_str(&format!("        \"{}\";\n", action.name));
            }
            out.push_str("    }\n");
        }
        out.push('\n');

        for (from, to, dependency) in self.edges() {
            out.push_str(&format!(
                "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
                from, to, dependency
            ));
        }

        out.push_str("}\n");
        out
    }

    /// Text listing of stages and waves with each action's dependencies
    pub fn to_text(&self, pipeline: &Pipeline) -> String {
        let mut out = String::new();

        for (stage_index, stage) in pipeline.stages.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", stage_index + 1, stage.name));

            for (wave_index, wave) in self.stage_waves(stage_index).iter().enumerate() {
                for &action_index in wave {
                    let action = &stage.actions[action_index];
                    out.push_str(&format!(
                        "   [wave {}] {} ({})",
                        wave_index + 1,
                        action.name,
                        action.kind_name()
                    ));

                    let deps = self.dependencies(&action.name).unwrap_or_default();
                    if !deps.is_empty() {
                        out.push_str(&format!(" <- {}", deps.join(", ")));
                    }
                    out.push('\n');
                }
            }
        }

        out
    }
}
