//! HTTP Decision Provider
//!
//! Posts `{"query": <prompt JSON>}` to the configured endpoint and reads the
//! model's free text from `{"response": ...}` in the reply.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use teller_api::{Decision, DecisionRequest};
use teller_config::DeciderConfig;
use teller_host_api::{DecisionProvider, ProviderResult};
use tracing::{debug, info, warn};

use crate::{build_prompt, fallback_decision, parse_decision, DeciderError, DeciderResult};

/// First retry delay
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Longest delay between attempts
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(4);

#[derive(Debug, Serialize)]
struct QueryBody {
    query: String,
}

#[derive(Debug, Deserialize)]
struct ReplyBody {
    response: Option<String>,
}

/// Decision Provider backed by an LLM HTTP endpoint
pub struct HttpDecider {
    client: Client,
    url: String,
    max_attempts: u32,
    strict: bool,
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl HttpDecider {
    pub fn new(config: &DeciderConfig) -> DeciderResult<Self> {
        let url = config.url.clone().ok_or(DeciderError::NotConfigured)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()?;

        info!(
            url = %url,
            timeout_secs = config.timeout.as_secs(),
            max_attempts = config.max_attempts,
            strict = config.strict,
            "HTTP decider ready"
        );

        Ok(Self {
            client,
            url,
            max_attempts: config.max_attempts.max(1),
            strict: config.strict,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
        })
    }

    /// Override the retry delays
    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap.max(base);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Delay before retry number `attempt` (1-based)
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }

    async fn post_once(&self, query: &str) -> DeciderResult<String> {
        let reply: ReplyBody = self
            .client
            .post(&self.url)
            .json(&QueryBody {
                query: query.to_string(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        reply.response.ok_or(DeciderError::MissingResponse)
    }

    /// Send the query, retrying transport failures
    async fn post(&self, query: &str) -> DeciderResult<String> {
        let mut attempt = 1;
        loop {
            match self.post_once(query).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Decider request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Classify `request`, degrading every failure to `cancel`
    pub async fn classify(&self, request: &DecisionRequest) -> Decision {
        let query = build_prompt(request).to_string();
        debug!(state = %request.state, query_len = query.len(), "Querying decider");

        let text = match self.post(&query).await {
            Ok(text) => text,
            Err(e) => {
                warn!(state = %request.state, error = %e, "Decider unavailable");
                return fallback_decision(&e, None);
            }
        };

        match parse_decision(&text, request, self.strict) {
            Ok(decision) => {
                debug!(state = %request.state, intent = %decision.intent, "Decider answered");
                decision
            }
            Err(e) => {
                warn!(state = %request.state, error = %e, "Unusable decider output");
                fallback_decision(&e, Some(&text))
            }
        }
    }
}

#[async_trait]
impl DecisionProvider for HttpDecider {
    async fn decide(&self, request: &DecisionRequest) -> ProviderResult<Decision> {
        Ok(self.classify(request).await)
    }

    fn name(&self) -> &str {
        "http"
    }
}
