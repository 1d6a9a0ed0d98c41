// SPDX-License-Identifier: MIT

//! Typed error handling for digest-pipeline
//!
//! `DigestError` is the single error type returned by collaborators, nodes and
//! the engine. Workflow, checkpoint and state errors have their own enums and
//! convert into it.

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for digest-pipeline
#[derive(Debug, Error)]
pub enum DigestError {
    /// Network/HTTP failure talking to a collaborator
    #[error("Transport error from {service}: {message}")]
    Transport { service: String, message: String },

    /// Expected structure absent from fetched content
    #[error("Parse error: {0}")]
    Parse(String),

    /// Schema-constrained model call returned a non-conforming shape
    #[error("Model output does not match {expected}: {output}")]
    ClassificationAmbiguity { expected: String, output: String },

    /// Publish endpoint answered with a structured error
    #[error("Publish rejected (code {code}): {message}")]
    PublishRejected { code: i64, message: String },

    /// A collaborator call did not finish in time
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// The article feed had nothing for the requested day
    #[error("No source articles available")]
    NoSourceArticles,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Workflow-specific errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A node failed; the run is aborted
    #[error("Node '{node}' failed: {source}")]
    NodeExecution {
        node: String,
        #[source]
        source: Box<DigestError>,
    },

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Node '{0}' has no outgoing edge")]
    MissingEdge(String),

    #[error("Node '{0}' already has an outgoing edge")]
    DuplicateEdge(String),

    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    #[error("Graph has no entry node")]
    MissingEntry,

    /// Router produced a decision with no branch in the transition table
    #[error("Router after '{node}' returned unmapped decision '{decision}'")]
    UnmappedDecision { node: String, decision: String },

    /// The guarded node was scheduled with its iteration budget spent
    #[error("Loop budget exhausted before '{node}': {used} of {limit} iterations used")]
    LoopBudgetExhausted { node: String, used: u32, limit: u32 },

    /// Safety limit on total node executions per invocation
    #[error("Max steps reached: {0}")]
    StepLimit(u32),

    /// Another invocation currently owns this session id
    #[error("Session '{0}' is already running")]
    SessionBusy(String),
}

/// Checkpoint persistence errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored payload could not be decoded
    #[error("Corrupt checkpoint for session '{session_id}': {message}")]
    Corrupt { session_id: String, message: String },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// State record errors
#[derive(Debug, Error)]
pub enum StateError {
    /// A partial update named a field the state does not have
    #[error("Unknown state field: {0}")]
    UnknownField(String),

    #[error("Invalid state update: {0}")]
    Invalid(String),
}

impl DigestError {
    /// Create a transport error
    pub fn transport(service: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn ambiguity(expected: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ClassificationAmbiguity {
            expected: expected.into(),
            output: output.into(),
        }
    }

    /// Whether an I/O retry may succeed where this attempt failed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

impl From<rusqlite::Error> for CheckpointError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
