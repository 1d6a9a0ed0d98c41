// SPDX-License-Identifier: MIT

//! Checkpoints: per-session state plus execution cursor
//!
//! One checkpoint line per session id, overwritten after every completed
//! node. Nothing here deletes checkpoints.

mod memory;
mod sqlite;

pub use memory::InMemoryCheckpointer;
pub use sqlite::SqliteCheckpointer;

use crate::error::CheckpointError;
use crate::workflow::state::WorkflowState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where execution stands for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "node", rename_all = "snake_case")]
pub enum Cursor {
    /// This node runs next
    Next(String),
    /// The run reached the end of the graph
    Terminal,
}

impl Cursor {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Cursor::Terminal)
    }
}

/// Snapshot of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Checkpoint {
    pub state: WorkflowState,
    pub cursor: Cursor,
    /// Nodes completed so far in this session
    pub step: u64,
    pub last_completed: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Checkpoint for a run that has not executed anything yet
    pub fn initial(state: WorkflowState, entry: impl Into<String>) -> Self {
        Self {
            state,
            cursor: Cursor::Next(entry.into()),
            step: 0,
            last_completed: None,
            updated_at: Utc::now(),
        }
    }

    /// Record a completed node and the new cursor
    pub fn advance(&mut self, completed: &str, cursor: Cursor) {
        self.cursor = cursor;
        self.step += 1;
        self.last_completed = Some(completed.to_string());
        self.updated_at = Utc::now();
    }

    pub(crate) fn decode(session_id: &str, payload: &str) -> Result<Self, CheckpointError> {
        serde_json::from_str(payload).map_err(|e| CheckpointError::Corrupt {
            session_id: session_id.to_string(),
            message: e.to_string(),
        })
    }
}

/// Persists and retrieves checkpoints keyed by session id
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Store `checkpoint` as the latest one for `session_id`
    async fn save(&self, session_id: &str, checkpoint: &Checkpoint)
        -> Result<(), CheckpointError>;

    /// Latest checkpoint for `session_id`, if any
    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Claim `session_id` for `owner` across every process sharing this
    /// store. Returns false while another owner holds a live claim. Calling
    /// it again as the same owner renews the claim.
    ///
    /// Stores private to one process rely on the engine's in-process
    /// registry and accept every claim.
    async fn try_lock(&self, _session_id: &str, _owner: &str) -> Result<bool, CheckpointError> {
        Ok(true)
    }

    /// Drop `owner`'s claim on `session_id`, if it still holds one
    async fn unlock(&self, _session_id: &str, _owner: &str) -> Result<(), CheckpointError> {
        Ok(())
    }
}
