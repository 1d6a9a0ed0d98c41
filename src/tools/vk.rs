// SPDX-License-Identifier: MIT

//! VK wall publisher

use super::{PostReceipt, Publisher};
use crate::error::DigestError;
use crate::retry::{retry_transient, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const SERVICE: &str = "vk";

pub const DEFAULT_API_URL: &str = "https://api.vk.com/method";
pub const DEFAULT_API_VERSION: &str = "5.199";

#[derive(Debug, Deserialize)]
struct WallPostResponse {
    response: Option<WallPostResult>,
    error: Option<VkApiError>,
}

#[derive(Debug, Deserialize)]
struct WallPostResult {
    post_id: i64,
}

#[derive(Debug, Deserialize)]
struct VkApiError {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

/// Posts to a VK wall through `wall.post`
pub struct VkPublisher {
    client: Client,
    api_url: String,
    access_token: String,
    owner_id: String,
    api_version: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl VkPublisher {
    pub fn new(access_token: String, owner_id: String) -> Self {
        Self {
            client: Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            access_token,
            owner_id,
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::None,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn post_once(&self, text: &str) -> Result<PostReceipt, DigestError> {
        let url = format!("{}/wall.post", self.api_url);
        // Group walls have negative owner ids; post on behalf of the group there.
        let from_group = if self.owner_id.starts_with('-') { "1" } else { "0" };

        let resp = self
            .client
            .post(&url)
            .form(&[
                ("owner_id", self.owner_id.as_str()),
                ("from_group", from_group),
                ("message", text),
                ("access_token", self.access_token.as_str()),
                ("v", self.api_version.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DigestError::transport(SERVICE, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DigestError::transport(
                SERVICE,
                format!("HTTP {}: {}", status, body),
            ));
        }

        let body: WallPostResponse = resp
            .json()
            .await
            .map_err(|e| DigestError::parse(format!("unexpected VK response: {}", e)))?;
        parse_wall_post(body)
    }
}

fn parse_wall_post(body: WallPostResponse) -> Result<PostReceipt, DigestError> {
    if let Some(err) = body.error {
        return Err(DigestError::PublishRejected {
            code: err.error_code,
            message: err.error_msg,
        });
    }
    body.response
        .map(|r| PostReceipt {
            post_id: r.post_id.to_string(),
        })
        .ok_or_else(|| DigestError::parse("VK response has neither 'response' nor 'error'"))
}

#[async_trait]
impl Publisher for VkPublisher {
    async fn publish(&self, text: &str) -> Result<PostReceipt, DigestError> {
        log::info!("Posting {} chars to VK wall {}", text.len(), self.owner_id);
        let receipt = retry_transient("vk wall.post", &self.retry, self.timeout, || {
            self.post_once(text)
        })
        .await?;
        log::info!("Published VK post {}", receipt.post_id);
        Ok(receipt)
    }
}
