// SPDX-License-Identifier: MIT

//! Model module - generative-text collaborator
//!
//! `ChatModel` is the narrow interface every pipeline node talks to. It takes
//! role-tagged messages and optionally a JSON schema the answer must follow.
//! `ModelClient` bundles a model with its generation settings and a per-call
//! timeout, and offers typed structured output on top of raw completions.
//! Implementations:
//! - [openai] - any OpenAI-compatible `/chat/completions` endpoint

pub mod openai;

use crate::error::DigestError;
use crate::retry::with_timeout;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// JSON schema the model output must conform to
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

impl ResponseSchema {
    /// Build the schema for `T` from its `JsonSchema` derive
    pub fn of<T: JsonSchema>(name: impl Into<String>) -> Self {
        let root = schemars::schema_for!(T);
        Self {
            name: name.into(),
            schema: serde_json::to_value(root).unwrap_or_default(),
        }
    }
}

/// Core trait for generative-text implementations
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete the conversation. With `schema`, the returned text is expected
    /// to be a JSON document conforming to it.
    async fn complete(
        &self,
        messages: &[Message],
        config: Option<&GenerationConfig>,
        schema: Option<&ResponseSchema>,
    ) -> Result<String, DigestError>;
}

/// Model handle injected into nodes
#[derive(Clone)]
pub struct ModelClient {
    model: Arc<dyn ChatModel>,
    config: GenerationConfig,
    timeout: Duration,
}

impl ModelClient {
    pub fn new(model: Arc<dyn ChatModel>, config: GenerationConfig, timeout: Duration) -> Self {
        Self {
            model,
            config,
            timeout,
        }
    }

    /// Free-text completion
    pub async fn text(&self, messages: &[Message]) -> Result<String, DigestError> {
        with_timeout(
            "model completion",
            self.timeout,
            self.model.complete(messages, Some(&self.config), None),
        )
        .await
    }

    /// Schema-constrained completion returning the raw JSON value
    pub async fn json(
        &self,
        messages: &[Message],
        schema: &ResponseSchema,
    ) -> Result<Value, DigestError> {
        let raw = with_timeout(
            "model completion",
            self.timeout,
            self.model.complete(messages, Some(&self.config), Some(schema)),
        )
        .await?;

        extract_json(&raw).ok_or_else(|| DigestError::ambiguity(&schema.name, raw))
    }

    /// Schema-constrained completion decoded into `T`
    pub async fn structured<T>(&self, name: &str, messages: &[Message]) -> Result<T, DigestError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = ResponseSchema::of::<T>(name);
        let value = self.json(messages, &schema).await?;
        serde_json::from_value(value.clone())
            .map_err(|_| DigestError::ambiguity(&schema.name, value.to_string()))
    }
}

/// Pull a JSON document out of model text, tolerating markdown code fences
/// and leading chatter.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .map(str::trim);
    if let Some(inner) = unfenced {
        if let Ok(value) = serde_json::from_str(inner) {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}
