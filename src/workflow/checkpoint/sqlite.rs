// SPDX-License-Identifier: MIT

//! SQLite-backed checkpointer. Persistent across process restarts.
//!
//! One row per session holding the checkpoint as JSON, plus a `leases`
//! table so that processes sharing the file never drive the same session at
//! once. Blocking rusqlite calls run on `spawn_blocking`.

use super::{Checkpoint, Checkpointer};
use crate::error::CheckpointError;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Age after which an unreleased lease (crashed holder) may be taken over
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(3600);

pub struct SqliteCheckpointer {
    db_path: PathBuf,
    lease_ttl: Duration,
}

impl SqliteCheckpointer {
    /// Open (or create) the database and ensure the table exists
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                session_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                step INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS leases (
                session_id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                acquired_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;
        Ok(Self {
            db_path,
            lease_ttl: DEFAULT_LEASE_TTL,
        })
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, CheckpointError>
    where
        T: Send + 'static,
        F: FnOnce(rusqlite::Connection) -> Result<T, CheckpointError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            f(conn)
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn save(
        &self,
        session_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        let session_id = session_id.to_string();
        let payload = serde_json::to_string(checkpoint)?;
        let step = checkpoint.step as i64;
        let updated_at = checkpoint.updated_at.to_rfc3339();

        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO checkpoints (session_id, payload, step, updated_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![session_id, payload, step, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let id = session_id.to_string();
        let payload: Option<String> = self
            .blocking(move |conn| {
                let payload: Option<String> = conn
                    .query_row(
                        "SELECT payload FROM checkpoints WHERE session_id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(payload)
            })
            .await?;

        payload
            .map(|p| Checkpoint::decode(session_id, &p))
            .transpose()
    }

    async fn try_lock(&self, session_id: &str, owner: &str) -> Result<bool, CheckpointError> {
        let session_id = session_id.to_string();
        let owner = owner.to_string();
        let now = Utc::now().timestamp_millis();
        let stale_before = now - self.lease_ttl.as_millis() as i64;

        // One statement so that two processes cannot both see the row as free
        let changed = self
            .blocking(move |conn| {
                Ok(conn.execute(
                    "INSERT INTO leases (session_id, owner, acquired_at) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(session_id) DO UPDATE \
                     SET owner = excluded.owner, acquired_at = excluded.acquired_at \
                     WHERE leases.owner = excluded.owner OR leases.acquired_at < ?4",
                    params![session_id, owner, now, stale_before],
                )?)
            })
            .await?;
        Ok(changed == 1)
    }

    async fn unlock(&self, session_id: &str, owner: &str) -> Result<(), CheckpointError> {
        let session_id = session_id.to_string();
        let owner = owner.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "DELETE FROM leases WHERE session_id = ?1 AND owner = ?2",
                params![session_id, owner],
            )?;
            Ok(())
        })
        .await
    }
}
