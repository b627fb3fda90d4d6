//! Circular dependency tracking
//!
//! An entity is "in progress" from the moment its compilation starts until it
//! is published. A request for an in-progress entity never recurses: the
//! requester receives the entity's partial view instead. Every such request
//! is recorded as an edge so the run can report the cycles it broke.

use indexmap::IndexSet;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug, Default)]
pub(crate) struct CycleTracker {
    in_progress: IndexSet<String>,
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl CycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, name: &str) {
        trace!("Compilation of {} started", name);
        self.in_progress.insert(name.to_string());
    }

    pub fn finish(&mut self, name: &str) {
        self.in_progress.shift_remove(name);
    }

    pub fn is_in_progress(&self, name: &str) -> bool {
        self.in_progress.contains(name)
    }

    /// Entities currently being compiled, outermost first
    pub fn stack(&self) -> impl Iterator<Item = &str> {
        self.in_progress.iter().map(String::as_str)
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(&node) = self.nodes.get(name) {
            return node;
        }
        let node = self.graph.add_node(name.to_string());
        self.nodes.insert(name.to_string(), node);
        node
    }

    /// `from` needed `to` while compiling
    pub fn record(&mut self, from: &str, to: &str) {
        let a = self.node(from);
        let b = self.node(to);
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, ());
        }
    }

    /// Strongly connected groups of more than one entity, in discovery order
    pub fn cycles(&self) -> Vec<Vec<String>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut names: Vec<String> = component
                    .into_iter()
                    .map(|node| self.graph[node].clone())
                    .collect();
                names.sort();
                names
            })
            .collect()
    }
}
