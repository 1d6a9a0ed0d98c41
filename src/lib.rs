// SPDX-License-Identifier: MIT

//! digest-pipeline: a checkpointed graph workflow that turns a request into a
//! reviewed, published article.

pub mod config;
pub mod error;
pub mod model;
pub mod retry;
pub mod tools;
pub mod workflow;

pub use error::DigestError;
