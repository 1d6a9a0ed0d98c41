// SPDX-License-Identifier: MIT

//! Per-step context handed to nodes by the engine

use crate::error::DigestError;
use crate::workflow::checkpoint::{Checkpoint, Checkpointer};
use crate::workflow::state::{StateUpdate, WorkflowState};
use chrono::Utc;

/// The running session's checkpoint, with a way to persist progress before
/// the node finishes
pub struct NodeContext<'a> {
    session_id: &'a str,
    checkpointer: &'a dyn Checkpointer,
    checkpoint: &'a mut Checkpoint,
}

impl<'a> NodeContext<'a> {
    pub fn new(
        session_id: &'a str,
        checkpointer: &'a dyn Checkpointer,
        checkpoint: &'a mut Checkpoint,
    ) -> Self {
        Self {
            session_id,
            checkpointer,
            checkpoint,
        }
    }

    pub fn session_id(&self) -> &str {
        self.session_id
    }

    pub fn state(&self) -> &WorkflowState {
        &self.checkpoint.state
    }

    /// Merge `update` and save it at once. The cursor stays on the running
    /// node, so a crash after this call re-enters the node with the update
    /// applied.
    pub async fn record(&mut self, update: StateUpdate) -> Result<(), DigestError> {
        log::debug!(
            "Session {} recording {:?} mid-step",
            self.session_id,
            update.present_fields()
        );
        self.checkpoint.state.merge(update);
        self.checkpoint.updated_at = Utc::now();
        self.checkpointer
            .save(self.session_id, &*self.checkpoint)
            .await?;
        Ok(())
    }
}
