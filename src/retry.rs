// SPDX-License-Identifier: MIT

//! Timeouts and bounded retry for collaborator I/O
//!
//! Only the article feed and the publish endpoint are retried, and only on
//! transient errors. Workflow control flow never goes through here.

use crate::error::DigestError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry policy for transient collaborator failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Fail on the first error
    #[default]
    None,
    /// Constant delay between attempts
    Fixed {
        /// Retries after the first attempt
        max_retries: u32,
        #[serde(with = "millis")]
        interval: Duration,
    },
    /// Delay grows by `multiplier` each retry, capped at `max_interval`
    Exponential {
        max_retries: u32,
        #[serde(with = "millis")]
        initial_interval: Duration,
        #[serde(with = "millis")]
        max_interval: Duration,
        multiplier: f64,
    },
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, interval: Duration) -> Self {
        Self::Fixed {
            max_retries,
            interval,
        }
    }

    pub fn exponential(
        max_retries: u32,
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
    ) -> Self {
        Self::Exponential {
            max_retries,
            initial_interval,
            max_interval,
            multiplier,
        }
    }

    /// Whether retry number `retry` (0-based) is allowed
    pub fn should_retry(&self, retry: u32) -> bool {
        match self {
            Self::None => false,
            Self::Fixed { max_retries, .. } | Self::Exponential { max_retries, .. } => {
                retry < *max_retries
            }
        }
    }

    /// Reject policies whose delays cannot be computed
    pub fn validate(&self) -> Result<(), String> {
        if let Self::Exponential { multiplier, .. } = self {
            if !multiplier.is_finite() || *multiplier < 1.0 {
                return Err(format!(
                    "exponential multiplier must be a finite number >= 1, got {}",
                    multiplier
                ));
            }
        }
        Ok(())
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed { interval, .. } => *interval,
            Self::Exponential {
                initial_interval,
                max_interval,
                multiplier,
                ..
            } => {
                let secs = initial_interval.as_secs_f64() * multiplier.powi(retry as i32);
                Duration::try_from_secs_f64(secs)
                    .unwrap_or(*max_interval)
                    .min(*max_interval)
            }
        }
    }
}

/// Run `fut`, failing with `DigestError::Timeout` if it takes longer than `after`
pub async fn with_timeout<T, F>(operation: &str, after: Duration, fut: F) -> Result<T, DigestError>
where
    F: Future<Output = Result<T, DigestError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(DigestError::Timeout {
            operation: operation.to_string(),
            after,
        }),
    }
}

/// Call `op` under a timeout, retrying transient failures per `policy`
pub async fn retry_transient<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    timeout: Duration,
    mut op: F,
) -> Result<T, DigestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DigestError>>,
{
    let mut retry = 0;
    loop {
        match with_timeout(operation, timeout, op()).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && policy.should_retry(retry) => {
                let delay = policy.delay(retry);
                retry += 1;
                log::warn!(
                    "{} failed ({}), retry {} in {:?}",
                    operation,
                    e,
                    retry,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
