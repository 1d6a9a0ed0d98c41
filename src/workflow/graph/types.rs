// SPDX-License-Identifier: MIT

//! Graph workflow type definitions
//!
//! Nodes, edge targets and edges. Node identity is its name; the same name is
//! stored in checkpoints as the execution cursor.

use super::context::NodeContext;
use crate::error::DigestError;
use crate::workflow::router::Router;
use crate::workflow::state::{StateUpdate, WorkflowState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One pipeline stage
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique name within a graph
    fn name(&self) -> &str;

    /// Compute a partial update from a read-only snapshot of the state.
    /// Must be safe to run again on the same snapshot after a crash.
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, DigestError>;

    /// Entry point used by the engine. Nodes with external side effects
    /// override it to record their intent through `ctx` first.
    async fn run_with_context(
        &self,
        ctx: &mut NodeContext<'_>,
    ) -> Result<StateUpdate, DigestError> {
        self.run(ctx.state()).await
    }
}

/// Where an edge leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Node(String),
    End,
}

impl Target {
    pub fn node(name: impl Into<String>) -> Self {
        Target::Node(name.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Node(name) => f.write_str(name),
            Target::End => f.write_str("__end__"),
        }
    }
}

/// Outgoing edge of a node
#[derive(Clone)]
pub enum Edge {
    /// Always the same successor
    Static(Target),
    /// Successor picked by a router decision through a transition table
    Conditional {
        router: Arc<dyn Router>,
        branches: HashMap<String, Target>,
    },
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Static(target) => f.debug_tuple("Static").field(target).finish(),
            Edge::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("branches", branches)
                .finish_non_exhaustive(),
        }
    }
}

impl Edge {
    /// Every target this edge can lead to
    pub fn targets(&self) -> Vec<&Target> {
        match self {
            Edge::Static(target) => vec![target],
            Edge::Conditional { branches, .. } => branches.values().collect(),
        }
    }
}
