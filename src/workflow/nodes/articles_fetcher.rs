// SPDX-License-Identifier: MIT

use super::ARTICLES_FETCHER;
use crate::error::DigestError;
use crate::retry::with_timeout;
use crate::tools::{effective_count, Article, ArticleFeed};
use crate::workflow::graph::Node;
use crate::workflow::state::{StateUpdate, WorkflowState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Default number of source articles per run
pub const DEFAULT_ARTICLES_PER_RUN: usize = 2;

/// Pulls yesterday's articles from the feed
pub struct ArticlesFetcher {
    feed: Arc<dyn ArticleFeed>,
    count: usize,
    timeout: Duration,
}

impl ArticlesFetcher {
    pub fn new(feed: Arc<dyn ArticleFeed>, count: usize, timeout: Duration) -> Result<Self, DigestError> {
        Ok(Self {
            feed,
            count: effective_count(count)?,
            timeout,
        })
    }
}

#[async_trait]
impl Node for ArticlesFetcher {
    fn name(&self) -> &str {
        ARTICLES_FETCHER
    }

    async fn run(&self, _state: &WorkflowState) -> Result<StateUpdate, DigestError> {
        let articles = with_timeout("article feed", self.timeout, self.feed.fetch(self.count)).await?;
        if articles.is_empty() {
            return Err(DigestError::NoSourceArticles);
        }
        log::info!("Fetched {} source articles", articles.len());

        Ok(StateUpdate {
            original_articles: Some(render_articles(&articles)),
            ..Default::default()
        })
    }
}

/// Concatenate articles into the source text handed to later stages
pub fn render_articles(articles: &[Article]) -> String {
    articles
        .iter()
        .enumerate()
        .map(|(i, article)| {
            format!(
                "### {}. {}\n{}\n\n{}\n\n{}",
                i + 1,
                article.title,
                article.link,
                article.summary.trim(),
                article.full_text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
