// SPDX-License-Identifier: MIT

//! External collaborators: the article feed and the publish endpoint
//!
//! Nodes only see the `ArticleFeed` and `Publisher` traits; the HTTP
//! implementations live in [habr] and [vk].

pub mod habr;
pub mod vk;

use crate::error::DigestError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hard upper bound on articles per fetch
pub const MAX_ARTICLES: usize = 7;

/// One source article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub link: String,
    pub full_text: String,
    pub summary: String,
}

/// Source of fresh articles
#[async_trait]
pub trait ArticleFeed: Send + Sync {
    /// Return at most `min(n, MAX_ARTICLES)` articles published on the
    /// calendar day before the current UTC day.
    async fn fetch(&self, n: usize) -> Result<Vec<Article>, DigestError>;
}

/// Identifier of a published post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub post_id: String,
}

/// Publish endpoint. The text is posted verbatim.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str) -> Result<PostReceipt, DigestError>;
}

/// Validate a requested article count: zero is rejected, anything above
/// `MAX_ARTICLES` is clamped.
pub fn effective_count(n: usize) -> Result<usize, DigestError> {
    if n == 0 {
        return Err(DigestError::InvalidArgument(
            "article count must be at least 1".to_string(),
        ));
    }
    if n > MAX_ARTICLES {
        log::warn!(
            "Requested {} articles, clamping to {}",
            n,
            MAX_ARTICLES
        );
    }
    Ok(n.min(MAX_ARTICLES))
}

/// Publisher that only logs the post
#[derive(Debug, Default)]
pub struct DryRunPublisher {
    counter: AtomicU64,
}

impl DryRunPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn publish(&self, text: &str) -> Result<PostReceipt, DigestError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!("Dry-run publish #{} ({} chars):\n{}", n, text.len(), text);
        Ok(PostReceipt {
            post_id: format!("dry-run-{}", n),
        })
    }
}
