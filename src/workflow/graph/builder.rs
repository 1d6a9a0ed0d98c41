// SPDX-License-Identifier: MIT

//! Graph construction and validation

use super::types::{Edge, Node, Target};
use crate::error::WorkflowError;
use crate::workflow::router::{LoopGuard, Router};
use crate::workflow::state::WorkflowState;
use std::collections::HashMap;
use std::sync::Arc;

/// Validated, immutable workflow graph
pub struct Graph {
    entry: String,
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Edge>,
    guards: HashMap<String, LoopGuard>,
}

impl Graph {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, name: &str) -> Result<&Arc<dyn Node>, WorkflowError> {
        self.nodes
            .get(name)
            .ok_or_else(|| WorkflowError::UnknownNode(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Resolve the successor of `from` for the given (already merged) state
    pub fn next(&self, from: &str, state: &WorkflowState) -> Result<Target, WorkflowError> {
        let edge = self
            .edges
            .get(from)
            .ok_or_else(|| WorkflowError::MissingEdge(from.to_string()))?;

        match edge {
            Edge::Static(target) => Ok(target.clone()),
            Edge::Conditional { router, branches } => {
                let decision = router.route(state);
                let target = branches.get(decision).cloned().ok_or_else(|| {
                    WorkflowError::UnmappedDecision {
                        node: from.to_string(),
                        decision: decision.to_string(),
                    }
                })?;
                log::info!("Routed {} --{}--> {}", from, decision, target);
                Ok(target)
            }
        }
    }

    /// Refuse to schedule a guarded node whose loop budget is spent
    pub fn check_guard(&self, node: &str, state: &WorkflowState) -> Result<(), WorkflowError> {
        match self.guards.get(node) {
            Some(guard) if !guard.allows(state) => Err(WorkflowError::LoopBudgetExhausted {
                node: node.to_string(),
                used: guard.used(state),
                limit: guard.limit(),
            }),
            _ => Ok(()),
        }
    }
}

/// Builder for `Graph`
#[derive(Default)]
pub struct GraphBuilder {
    entry: Option<String>,
    nodes: HashMap<String, Arc<dyn Node>>,
    order: Vec<String>,
    edges: HashMap<String, Edge>,
    guards: HashMap<String, LoopGuard>,
    errors: Vec<WorkflowError>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(mut self, node: Arc<dyn Node>) -> Self {
        let name = node.name().to_string();
        if self.nodes.contains_key(&name) {
            self.errors.push(WorkflowError::DuplicateNode(name));
            return self;
        }
        self.order.push(name.clone());
        self.nodes.insert(name, node);
        self
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn add_edge(self, from: impl Into<String>, to: Target) -> Self {
        self.insert_edge(from.into(), Edge::Static(to))
    }

    pub fn add_conditional_edge<I, K>(
        self,
        from: impl Into<String>,
        router: Arc<dyn Router>,
        branches: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, Target)>,
        K: Into<String>,
    {
        let branches = branches.into_iter().map(|(k, t)| (k.into(), t)).collect();
        self.insert_edge(from.into(), Edge::Conditional { router, branches })
    }

    /// Attach a loop guard checked before `node` is scheduled
    pub fn guard(mut self, node: impl Into<String>, guard: LoopGuard) -> Self {
        self.guards.insert(node.into(), guard);
        self
    }

    fn insert_edge(mut self, from: String, edge: Edge) -> Self {
        if self.edges.contains_key(&from) {
            self.errors.push(WorkflowError::DuplicateEdge(from));
        } else {
            self.edges.insert(from, edge);
        }
        self
    }

    /// Validate and freeze the graph
    pub fn compile(mut self) -> Result<Graph, WorkflowError> {
        if !self.errors.is_empty() {
            return Err(self.errors.remove(0));
        }

        let entry = self.entry.ok_or(WorkflowError::MissingEntry)?;
        if !self.nodes.contains_key(&entry) {
            return Err(WorkflowError::UnknownNode(entry));
        }

        for from in self.edges.keys() {
            if !self.nodes.contains_key(from) {
                return Err(WorkflowError::UnknownNode(from.clone()));
            }
        }

        for name in &self.order {
            let edge = self
                .edges
                .get(name)
                .ok_or_else(|| WorkflowError::MissingEdge(name.clone()))?;
            if edge.targets().is_empty() {
                return Err(WorkflowError::MissingEdge(name.clone()));
            }
            for target in edge.targets() {
                if let Target::Node(to) = target {
                    if !self.nodes.contains_key(to) {
                        return Err(WorkflowError::UnknownNode(to.clone()));
                    }
                }
            }
        }

        for node in self.guards.keys() {
            if !self.nodes.contains_key(node) {
                return Err(WorkflowError::UnknownNode(node.clone()));
            }
        }

        Ok(Graph {
            entry,
            nodes: self.nodes,
            edges: self.edges,
            guards: self.guards,
        })
    }
}
