// SPDX-License-Identifier: MIT

//! State management for the article workflow
//!
//! This module provides:
//! - `WorkflowState` - the typed record threaded through every node
//! - `StateUpdate` - a partial update; only present fields are written
//! - `AudienceLevel` - the reader sophistication the article targets

mod audience;
mod store;
mod update;

pub use audience::AudienceLevel;
pub use store::WorkflowState;
pub use update::StateUpdate;
