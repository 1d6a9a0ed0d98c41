// SPDX-License-Identifier: MIT

//! Graph workflow executor
//!
//! Runs one node at a time from the session's cursor, merges its update,
//! resolves the successor and persists a checkpoint before moving on. A node
//! failure aborts the run and leaves the cursor on the failed node, so the
//! next invocation with the same session id retries it.
//!
//! A session is claimed twice before it runs: in this process through the
//! session registry, and in the checkpoint store for engines in other
//! processes sharing it.

use super::builder::Graph;
use super::context::NodeContext;
use super::types::Target;
use crate::error::{DigestError, WorkflowError};
use crate::workflow::checkpoint::{Checkpoint, Checkpointer, Cursor};
use crate::workflow::registry::SessionRegistry;
use crate::workflow::state::WorkflowState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Safety limit on node executions per invocation
pub const DEFAULT_MAX_STEPS: u32 = 50;

/// Progress notifications emitted while a session runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    Resumed { node: Option<String>, step: u64 },
    NodeStarted { node: String, step: u64 },
    NodeCompleted { node: String, fields: Vec<String> },
    Routed { from: String, to: String },
    Finished { published: bool },
    Failed { node: String, error: String },
}

/// Executes a compiled graph with checkpointing per session id
pub struct Engine {
    graph: Arc<Graph>,
    checkpointer: Arc<dyn Checkpointer>,
    sessions: SessionRegistry,
    max_steps: u32,
    /// Identifies this engine's claims in the checkpoint store
    owner: String,
}

impl Engine {
    pub fn new(graph: Graph, checkpointer: Arc<dyn Checkpointer>) -> Self {
        Self {
            graph: Arc::new(graph),
            checkpointer,
            sessions: SessionRegistry::new(),
            max_steps: DEFAULT_MAX_STEPS,
            owner: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Run (or resume) the session and return its final state
    pub async fn invoke(
        &self,
        session_id: &str,
        prompt: &str,
    ) -> Result<WorkflowState, DigestError> {
        self.invoke_with_events(session_id, prompt, None).await
    }

    /// Like `invoke`, reporting progress on `events`
    ///
    /// A fresh session id starts at the entry node with `prompt`. An existing
    /// one continues from its stored cursor and keeps its stored prompt.
    pub async fn invoke_with_events(
        &self,
        session_id: &str,
        prompt: &str,
        events: Option<mpsc::Sender<EngineEvent>>,
    ) -> Result<WorkflowState, DigestError> {
        let _lease = self.sessions.try_acquire(session_id)?;
        self.claim(session_id).await?;
        let result = self.start_or_continue(session_id, prompt, &events).await;
        self.release(session_id).await;
        result
    }

    /// Continue an existing session from its checkpoint
    pub async fn resume(&self, session_id: &str) -> Result<WorkflowState, DigestError> {
        let _lease = self.sessions.try_acquire(session_id)?;
        self.claim(session_id).await?;
        let result = self.continue_existing(session_id).await;
        self.release(session_id).await;
        result
    }

    /// Read-only view of a session's latest state
    pub async fn get_state(&self, session_id: &str) -> Result<Option<WorkflowState>, DigestError> {
        Ok(self.get_checkpoint(session_id).await?.map(|cp| cp.state))
    }

    pub async fn get_checkpoint(
        &self,
        session_id: &str,
    ) -> Result<Option<Checkpoint>, DigestError> {
        Ok(self.checkpointer.load(session_id).await?)
    }

    async fn start_or_continue(
        &self,
        session_id: &str,
        prompt: &str,
        events: &Option<mpsc::Sender<EngineEvent>>,
    ) -> Result<WorkflowState, DigestError> {
        let mut checkpoint = match self.checkpointer.load(session_id).await? {
            Some(cp) => {
                if cp.state.original_prompt != prompt {
                    log::warn!(
                        "Session {} already exists; ignoring new prompt and resuming",
                        session_id
                    );
                }
                self.announce_resume(session_id, &cp, events).await;
                cp
            }
            None => {
                log::info!("Starting session {} at {}", session_id, self.graph.entry());
                let cp = Checkpoint::initial(WorkflowState::new(prompt), self.graph.entry());
                self.checkpointer.save(session_id, &cp).await?;
                cp
            }
        };

        self.drive(session_id, &mut checkpoint, events).await
    }

    async fn continue_existing(&self, session_id: &str) -> Result<WorkflowState, DigestError> {
        let mut checkpoint = self.checkpointer.load(session_id).await?.ok_or_else(|| {
            DigestError::InvalidArgument(format!("no checkpoint for session '{}'", session_id))
        })?;
        self.announce_resume(session_id, &checkpoint, &None).await;
        self.drive(session_id, &mut checkpoint, &None).await
    }

    /// Claim (or renew the claim on) `session_id` in the checkpoint store
    async fn claim(&self, session_id: &str) -> Result<(), DigestError> {
        if self.checkpointer.try_lock(session_id, &self.owner).await? {
            Ok(())
        } else {
            log::warn!("Session {} is held by another process", session_id);
            Err(WorkflowError::SessionBusy(session_id.to_string()).into())
        }
    }

    async fn release(&self, session_id: &str) {
        if let Err(e) = self.checkpointer.unlock(session_id, &self.owner).await {
            log::warn!("Could not release session {}: {}", session_id, e);
        }
    }

    async fn announce_resume(
        &self,
        session_id: &str,
        checkpoint: &Checkpoint,
        events: &Option<mpsc::Sender<EngineEvent>>,
    ) {
        let node = match &checkpoint.cursor {
            Cursor::Next(node) => Some(node.clone()),
            Cursor::Terminal => None,
        };
        log::info!(
            "Resuming session {} at {} (step {})",
            session_id,
            node.as_deref().unwrap_or("terminal"),
            checkpoint.step
        );
        emit(
            events,
            EngineEvent::Resumed {
                node,
                step: checkpoint.step,
            },
        )
        .await;
    }

    async fn drive(
        &self,
        session_id: &str,
        checkpoint: &mut Checkpoint,
        events: &Option<mpsc::Sender<EngineEvent>>,
    ) -> Result<WorkflowState, DigestError> {
        let mut steps = 0u32;

        loop {
            let node_name = match &checkpoint.cursor {
                Cursor::Terminal => {
                    log::info!(
                        "Session {} finished after {} steps (published: {})",
                        session_id,
                        checkpoint.step,
                        checkpoint.state.published
                    );
                    emit(
                        events,
                        EngineEvent::Finished {
                            published: checkpoint.state.published,
                        },
                    )
                    .await;
                    return Ok(checkpoint.state.clone());
                }
                Cursor::Next(name) => name.clone(),
            };

            if steps >= self.max_steps {
                log::error!(
                    "Session {} exceeded {} steps at {}",
                    session_id,
                    self.max_steps,
                    node_name
                );
                return Err(WorkflowError::StepLimit(self.max_steps).into());
            }
            steps += 1;

            self.graph.check_guard(&node_name, &checkpoint.state)?;
            let node = self.graph.node(&node_name)?.clone();

            log::info!(
                "Session {} step {}: executing {}",
                session_id,
                checkpoint.step + 1,
                node_name
            );
            emit(
                events,
                EngineEvent::NodeStarted {
                    node: node_name.clone(),
                    step: checkpoint.step + 1,
                },
            )
            .await;

            let outcome = {
                let mut ctx = NodeContext::new(session_id, self.checkpointer.as_ref(), checkpoint);
                node.run_with_context(&mut ctx).await
            };
            let update = match outcome {
                Ok(update) => update,
                Err(e) => {
                    log::error!("Node {} failed: {}", node_name, e);
                    emit(
                        events,
                        EngineEvent::Failed {
                            node: node_name.clone(),
                            error: e.to_string(),
                        },
                    )
                    .await;
                    return Err(WorkflowError::NodeExecution {
                        node: node_name,
                        source: Box::new(e),
                    }
                    .into());
                }
            };

            let fields: Vec<String> = update
                .present_fields()
                .into_iter()
                .map(str::to_string)
                .collect();
            checkpoint.state.merge(update);

            let next = self.graph.next(&node_name, &checkpoint.state)?;
            let cursor = match &next {
                Target::Node(name) => Cursor::Next(name.clone()),
                Target::End => Cursor::Terminal,
            };
            checkpoint.advance(&node_name, cursor);
            self.checkpointer.save(session_id, checkpoint).await?;
            self.claim(session_id).await?;

            log::info!("Node {} completed, updated {:?}", node_name, fields);
            emit(
                events,
                EngineEvent::NodeCompleted {
                    node: node_name.clone(),
                    fields,
                },
            )
            .await;
            emit(
                events,
                EngineEvent::Routed {
                    from: node_name,
                    to: next.to_string(),
                },
            )
            .await;
        }
    }
}

async fn emit(events: &Option<mpsc::Sender<EngineEvent>>, event: EngineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}
