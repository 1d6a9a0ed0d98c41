// SPDX-License-Identifier: MIT

//! In-memory checkpointer. Not persistent; for dev and tests.

use super::{Checkpoint, Checkpointer};
use crate::error::CheckpointError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryCheckpointer {
    sessions: Arc<RwLock<HashMap<String, Checkpoint>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(
        &self,
        session_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.to_string(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }
}
