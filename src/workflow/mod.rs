// SPDX-License-Identifier: MIT

//! Workflow module - the article pipeline and its execution engine

pub mod checkpoint;
pub mod graph;
pub mod nodes;
pub mod pipeline;
pub mod registry;
pub mod router;
pub mod state;

pub use checkpoint::{Checkpoint, Checkpointer, Cursor, InMemoryCheckpointer, SqliteCheckpointer};
pub use graph::{Engine, EngineEvent, Graph, GraphBuilder, NodeContext};
pub use pipeline::{build_engine, build_pipeline, Collaborators, PipelineSettings};
pub use router::{LoopGuard, QualityRouter, Router, MAX_FIXES};
pub use state::{AudienceLevel, StateUpdate, WorkflowState};
