// SPDX-License-Identifier: MIT

use crate::error::WorkflowError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Tracks which session ids currently have a run in flight
#[derive(Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

/// Exclusive claim on a session id, released on drop
#[derive(Debug)]
pub struct SessionLease {
    session_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `session_id`, or fail with `SessionBusy` if another run holds it
    pub fn try_acquire(&self, session_id: &str) -> Result<SessionLease, WorkflowError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(session_id.to_string()) {
            return Err(WorkflowError::SessionBusy(session_id.to_string()));
        }
        Ok(SessionLease {
            session_id: session_id.to_string(),
            active: self.active.clone(),
        })
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.contains(session_id)
    }
}

impl SessionLease {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.session_id);
    }
}
