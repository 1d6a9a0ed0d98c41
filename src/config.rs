// SPDX-License-Identifier: MIT

//! Application configuration
//!
//! Loaded from an optional YAML file, then overridden from environment
//! variables (a `.env` file is read by the binary first).

use crate::error::DigestError;
use crate::model::openai::OpenAiChatModel;
use crate::model::{GenerationConfig, ModelClient};
use crate::retry::RetryPolicy;
use crate::tools::habr::{HabrFeed, DEFAULT_FEED_URL};
use crate::tools::vk::VkPublisher;
use crate::tools::{effective_count, DryRunPublisher, Publisher};
use crate::workflow::checkpoint::{Checkpointer, InMemoryCheckpointer, SqliteCheckpointer};
use crate::workflow::nodes::DEFAULT_ARTICLES_PER_RUN;
use crate::workflow::{Collaborators, PipelineSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub feed: FeedConfig,
    pub publish: PublishConfig,
    pub pipeline: PipelineSettings,
    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            temperature: Some(0.1),
            max_output_tokens: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub articles_per_run: usize,
    /// Per HTTP request
    pub timeout_secs: u64,
    /// Whole fetch, retries included
    pub deadline_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            articles_per_run: DEFAULT_ARTICLES_PER_RUN,
            timeout_secs: 30,
            deadline_secs: 300,
            retry: RetryPolicy::fixed(2, Duration::from_secs(2)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishKind {
    /// Log the post instead of sending it
    #[default]
    DryRun,
    Vk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub kind: PublishKind,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    /// Wall owner; negative for a community
    pub owner_id: Option<String>,
    pub api_url: Option<String>,
    pub api_version: Option<String>,
    pub timeout_secs: u64,
    pub deadline_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            kind: PublishKind::DryRun,
            access_token: None,
            owner_id: None,
            api_url: None,
            api_version: None,
            timeout_secs: 30,
            deadline_secs: 120,
            retry: RetryPolicy::fixed(2, Duration::from_secs(2)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// SQLite database file; checkpoints stay in memory when unset
    pub sqlite_path: Option<PathBuf>,
}

impl AppConfig {
    /// Read `path` (if any), apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self, DigestError> {
        let mut config = match path {
            Some(path) => {
                log::info!("Loading config from {}", path.display());
                Self::from_yaml(&fs::read_to_string(path)?)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, DigestError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Override fields from variables returned by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), DigestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = lookup("OPENAI_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = lookup("DIGEST_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("DIGEST_FEED_URL") {
            self.feed.url = v;
        }
        if let Some(v) = lookup("DIGEST_ARTICLES") {
            self.feed.articles_per_run = parse_env("DIGEST_ARTICLES", &v)?;
        }
        if let Some(v) = lookup("DIGEST_MAX_FIXES") {
            self.pipeline.max_fixes = parse_env("DIGEST_MAX_FIXES", &v)?;
        }
        if let Some(v) = lookup("DIGEST_PUBLISH") {
            self.publish.kind = match v.to_lowercase().as_str() {
                "vk" => PublishKind::Vk,
                "dry_run" | "dry-run" => PublishKind::DryRun,
                other => {
                    return Err(DigestError::config(format!(
                        "DIGEST_PUBLISH must be 'vk' or 'dry_run', got '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(v) = lookup("VK_ACCESS_TOKEN") {
            self.publish.access_token = Some(v);
        }
        if let Some(v) = lookup("VK_OWNER_ID") {
            self.publish.owner_id = Some(v);
        }
        if let Some(v) = lookup("DIGEST_CHECKPOINT_DB") {
            self.checkpoint.sqlite_path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DigestError> {
        if self.feed.articles_per_run == 0 {
            return Err(DigestError::config("feed.articles_per_run must be at least 1"));
        }
        if self.publish.kind == PublishKind::Vk
            && (self.publish.access_token.is_none() || self.publish.owner_id.is_none())
        {
            return Err(DigestError::config(
                "VK publishing needs VK_ACCESS_TOKEN and VK_OWNER_ID",
            ));
        }
        self.feed
            .retry
            .validate()
            .map_err(|e| DigestError::config(format!("feed.retry: {}", e)))?;
        self.publish
            .retry
            .validate()
            .map_err(|e| DigestError::config(format!("publish.retry: {}", e)))?;
        self.pipeline.validate()
    }

    pub fn publisher(&self) -> Result<Arc<dyn Publisher>, DigestError> {
        let publish = &self.publish;
        match publish.kind {
            PublishKind::DryRun => Ok(Arc::new(DryRunPublisher::new())),
            PublishKind::Vk => {
                let (token, owner) = match (&publish.access_token, &publish.owner_id) {
                    (Some(token), Some(owner)) => (token.clone(), owner.clone()),
                    _ => return Err(DigestError::config("VK credentials are not set")),
                };
                let mut vk = VkPublisher::new(token, owner)
                    .with_timeout(Duration::from_secs(publish.timeout_secs))
                    .with_retry(publish.retry.clone());
                if let Some(url) = &publish.api_url {
                    vk = vk.with_api_url(url.clone());
                }
                if let Some(version) = &publish.api_version {
                    vk = vk.with_api_version(version.clone());
                }
                Ok(Arc::new(vk))
            }
        }
    }

    pub fn checkpointer(&self) -> Result<Arc<dyn Checkpointer>, DigestError> {
        match &self.checkpoint.sqlite_path {
            Some(path) => {
                log::info!("Using SQLite checkpoints at {}", path.display());
                Ok(Arc::new(SqliteCheckpointer::new(path)?))
            }
            None => {
                log::info!("Using in-memory checkpoints");
                Ok(Arc::new(InMemoryCheckpointer::new()))
            }
        }
    }
}

impl Collaborators {
    /// Build the production collaborator set
    pub fn from_config(config: &AppConfig) -> Result<Self, DigestError> {
        let llm = &config.llm;
        let api_key = llm
            .api_key
            .clone()
            .ok_or_else(|| DigestError::config("OPENAI_API_KEY must be set"))?;
        let base_url = llm
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let chat = OpenAiChatModel::with_endpoint(api_key, base_url, llm.model.clone());
        let generation = GenerationConfig {
            temperature: llm.temperature,
            max_output_tokens: llm.max_output_tokens,
            top_p: None,
        };
        let model = ModelClient::new(
            Arc::new(chat),
            generation,
            Duration::from_secs(llm.timeout_secs),
        );

        let feed = HabrFeed::new(
            config.feed.url.clone(),
            Duration::from_secs(config.feed.timeout_secs),
            config.feed.retry.clone(),
        );

        Ok(Self {
            model,
            feed: Arc::new(feed),
            publisher: config.publisher()?,
            articles_per_run: effective_count(config.feed.articles_per_run)?,
            feed_timeout: Duration::from_secs(config.feed.deadline_secs),
            publish_timeout: Duration::from_secs(config.publish.deadline_secs),
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DigestError> {
    value
        .trim()
        .parse()
        .map_err(|_| DigestError::config(format!("{} has an invalid value '{}'", key, value)))
}
