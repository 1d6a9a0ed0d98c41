// SPDX-License-Identifier: MIT

//! OpenAI Model - chat completions over any OpenAI-compatible endpoint

use super::{ChatModel, GenerationConfig, Message, ResponseSchema, Role};
use crate::error::DigestError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const SERVICE: &str = "openai";

/// OpenAI-compatible chat model implementation
pub struct OpenAiChatModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl OpenAiChatModel {
    pub fn with_endpoint(api_key: String, base_url: String, model_name: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn message_to_openai(message: &Message) -> Value {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        json!({ "role": role, "content": message.content })
    }

    /// Build the `/chat/completions` request body
    fn request_body(
        &self,
        messages: &[Message],
        config: Option<&GenerationConfig>,
        schema: Option<&ResponseSchema>,
    ) -> Value {
        let messages: Vec<Value> = messages.iter().map(Self::message_to_openai).collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
        }

        if let Some(schema) = schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema
                }
            });
        }

        body
    }

    /// Parse OpenAI response into the first choice's text
    fn parse_openai_response(response: &Value) -> Result<String, DigestError> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| DigestError::parse("No choices in OpenAI response"))?;

        choice["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DigestError::parse("OpenAI response choice has no text content"))
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(
        &self,
        messages: &[Message],
        config: Option<&GenerationConfig>,
        schema: Option<&ResponseSchema>,
    ) -> Result<String, DigestError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(messages, config, schema);

        log::debug!(
            "OpenAI request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| DigestError::transport(SERVICE, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(DigestError::transport(
                SERVICE,
                format!("HTTP {}: {}", status, text),
            ));
        }

        let resp_json: Value = resp
            .json()
            .await
            .map_err(|e| DigestError::transport(SERVICE, e))?;
        log::debug!("OpenAI response: {}", resp_json);

        Self::parse_openai_response(&resp_json)
    }
}
