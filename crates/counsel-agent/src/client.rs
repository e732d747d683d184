//! Anthropic Messages API client
//!
//! Every call is stateless: the whole prompt (history included) is rendered
//! by the caller. Rate limits and 5xx responses are retried with exponential
//! backoff; anything else counts against the client's circuit breaker.

use crate::auth;
use crate::circuit_breaker::CircuitBreaker;
use crate::generator::TextGenerator;
use crate::types::{AnthropicMessage, AnthropicRequest, AnthropicResponse};
use async_trait::async_trait;
use counsel_core::config::ModelSettings;
use counsel_core::{CounselError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 4096;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;

/// Text generator backed by the Anthropic Messages API
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    model: String,
    max_tokens: usize,
    temperature: Option<f32>,
    api_key_env: String,
    breaker: Arc<CircuitBreaker>,
}

impl AnthropicClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            breaker: Arc::new(CircuitBreaker::default()),
        }
    }

    /// Client for `model` using the key variable and token budget from settings
    pub fn from_settings(settings: &ModelSettings, model: impl Into<String>) -> Self {
        Self::new(model)
            .with_max_tokens(settings.max_tokens)
            .with_api_key_env(settings.api_key_env.clone())
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_api_key_env(mut self, api_key_env: impl Into<String>) -> Self {
        self.api_key_env = api_key_env.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn request_for(&self, prompt: &str) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: None,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
        }
    }

    async fn send(&self, request: &AnthropicRequest) -> Result<String> {
        if !self.breaker.can_execute() {
            return Err(CounselError::ApiLimit(format!(
                "Circuit breaker is open after repeated API failures. Retry in {}s",
                self.breaker.time_until_retry().as_secs()
            )));
        }

        let auth_token = auth::get_auth_token(&self.api_key_env)?;

        let mut retries = 0;
        let mut backoff_secs = INITIAL_BACKOFF_SECS;

        loop {
            tracing::debug!("Sending request to Anthropic API (attempt {})", retries + 1);

            let response = self
                .http
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &auth_token)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(request)
                .send()
                .await
                .map_err(|e| CounselError::Api(format!("Failed to send request: {}", e)))?;

            let status = response.status();

            if status.as_u16() == 429 {
                retries += 1;
                if retries > MAX_RETRIES {
                    let body = response.text().await.unwrap_or_default();
                    return Err(CounselError::ApiLimit(format!(
                        "Rate limit exceeded after {} retries: {}",
                        MAX_RETRIES, body
                    )));
                }

                let wait_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                tracing::warn!(
                    "Rate limited (429). Waiting {}s before retry {}/{}",
                    wait_secs,
                    retries,
                    MAX_RETRIES
                );
                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();

                if status.is_server_error() && retries < MAX_RETRIES {
                    retries += 1;
                    tracing::warn!(
                        "Server error ({}). Waiting {}s before retry {}/{}",
                        status,
                        backoff_secs,
                        retries,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }

                self.breaker.record_failure();
                tracing::error!(
                    "Anthropic API error {} (breaker failures: {})",
                    status,
                    self.breaker.failure_count()
                );
                return Err(CounselError::Api(format!(
                    "Anthropic API error {}: {}",
                    status, body
                )));
            }

            let parsed: AnthropicResponse = response
                .json()
                .await
                .map_err(|e| CounselError::Api(format!("Failed to parse response: {}", e)))?;

            self.breaker.record_success();

            let text = parsed.text();
            match parsed.usage {
                Some(usage) => tracing::info!(
                    "Completion finished ({} chars, {} input tokens, {} output tokens)",
                    text.len(),
                    usage.input_tokens,
                    usage.output_tokens
                ),
                None => tracing::info!("Completion finished ({} chars)", text.len()),
            }

            if text.trim().is_empty() {
                return Err(CounselError::Api("No text content in response".to_string()));
            }
            return Ok(text);
        }
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = self.request_for(prompt);
        self.send(&request).await
    }
}
