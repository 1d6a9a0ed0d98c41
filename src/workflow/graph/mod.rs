// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! This module provides the node/edge model, the validating builder and the
//! checkpointing executor.

mod builder;
mod context;
pub mod executor;
pub mod types;

pub use builder::{Graph, GraphBuilder};
pub use context::NodeContext;
pub use executor::{Engine, EngineEvent, DEFAULT_MAX_STEPS};
pub use types::{Edge, Node, Target};
