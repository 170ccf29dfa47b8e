//! Rate-limited LLM client.
//!
//! Wraps a provider with the per-replica token bucket, bounded retries with
//! full-jitter backoff on 429s and transport failures, and a two-way error
//! split the processor can act on: transient failures leave the queue
//! message for redelivery, permanent ones terminate the poison loop.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use mill_core::config::LlmConfig;
use mill_throttle::{BackoffConfig, TokenBucket};

use crate::provider::{Completion, LlmError, LlmProvider, Message};
use crate::providers::create_provider;

/// Failure of a fully retried call.
#[derive(Debug, thiserror::Error)]
pub enum LlmCallError {
    /// Worth re-processing the message later.
    #[error("transient LLM failure: {0}")]
    Transient(String),
    /// Retrying cannot help (auth, bad request, misconfiguration).
    #[error("permanent LLM failure: {0}")]
    Permanent(String),
}

/// Shared per-replica LLM client.
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    limiter: Arc<TokenBucket>,
    backoff: BackoffConfig,
    temperature: f32,
    max_tokens: u32,
    prompt_cost_per_1k: f64,
    completion_cost_per_1k: f64,
}

impl LlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider = create_provider(config)?;
        Ok(Self::new(provider, config))
    }

    /// Build around an existing provider (tests inject scripted ones).
    pub fn new(provider: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        Self {
            provider,
            limiter: Arc::new(TokenBucket::per_minute(config.rate_limit_per_min)),
            backoff: BackoffConfig::default(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            prompt_cost_per_1k: config.prompt_cost_per_1k,
            completion_cost_per_1k: config.completion_cost_per_1k,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn limiter(&self) -> &TokenBucket {
        &self.limiter
    }

    /// Dollar cost of a completion at the configured per-1k-token rates.
    pub fn cost_usd(&self, completion: &Completion) -> f64 {
        completion.prompt_tokens as f64 / 1000.0 * self.prompt_cost_per_1k
            + completion.completion_tokens as f64 / 1000.0 * self.completion_cost_per_1k
    }

    /// One logical completion: acquire quota, call, retry transient failures
    /// with backoff, classify the final outcome.
    pub async fn complete(
        &self,
        messages: Vec<Message>,
        deadline: Duration,
    ) -> Result<Completion, LlmCallError> {
        if !self.limiter.acquire(1.0, deadline).await {
            return Err(LlmCallError::Transient(
                "rate limiter deadline elapsed".to_string(),
            ));
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self
                .provider
                .complete(messages.clone(), self.temperature, self.max_tokens)
                .await
            {
                Ok(completion) => {
                    debug!(
                        attempt,
                        prompt_tokens = completion.prompt_tokens,
                        completion_tokens = completion.completion_tokens,
                        "LLM completion"
                    );
                    return Ok(completion);
                }
                Err(e) if e.is_transient() => {
                    if !self.backoff.should_retry(attempt) {
                        return Err(LlmCallError::Transient(format!(
                            "gave up after {attempt} attempts: {e}"
                        )));
                    }
                    let delay = self.backoff.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        rate_limited = e.is_rate_limited(),
                        error = %e,
                        "transient LLM error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(LlmCallError::Permanent(e.to_string())),
            }
        }
    }
}
