//! Text-generation capability and its HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sitelens_core::config::LlmConfig;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("text generation was rate limited (429 Too Many Requests)")]
    RateLimited,
    #[error("text generation rejected the configured credentials ({status})")]
    Unauthorized { status: StatusCode },
    #[error("text generation endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("text generation timed out")]
    Timeout,
    #[error("text generation transport failed: {0}")]
    Transport(String),
    #[error("text generation returned no content")]
    EmptyCompletion,
    #[error("text generation response could not be decoded: {0}")]
    Decode(String),
    #[error("text generation client could not be built: {0}")]
    Setup(String),
}

impl LlmError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[async_trait]
impl<T> LlmClient for std::sync::Arc<T>
where
    T: LlmClient + ?Sized,
{
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        (**self).complete(prompt).await
    }
}

/// Chat-completions client for OpenAI-compatible gateways.
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if config.accept_invalid_certs {
            warn!(
                event_name = "llm.tls_verification_disabled",
                correlation_id = "bootstrap",
                base_url = %config.base_url,
                "TLS certificate verification is disabled for the text generation endpoint"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(|error| LlmError::Setup(error.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(LlmError::Unauthorized { status });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body: truncate(&body, 500) });
        }

        let completion: ChatResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(LlmError::EmptyCompletion)
    }
}

/// Retries rate-limited calls with exponential backoff (`base * 2^n`). Every
/// other failure is returned on first sight.
pub struct RateLimitRetry<C> {
    inner: C,
    max_attempts: u32,
    base_delay: Duration,
}

impl<C> RateLimitRetry<C> {
    pub fn new(inner: C, max_attempts: u32, base_delay: Duration) -> Self {
        Self { inner, max_attempts: max_attempts.max(1), base_delay }
    }

    pub fn from_config(inner: C, config: &LlmConfig) -> Self {
        Self::new(
            inner,
            config.max_rate_limit_retries,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }
}

#[async_trait]
impl<C> LlmClient for RateLimitRetry<C>
where
    C: LlmClient,
{
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(prompt).await {
                Err(error) if error.is_rate_limited() && attempt + 1 < self.max_attempts => {
                    let delay = self.base_delay.saturating_mul(2_u32.saturating_pow(attempt));
                    warn!(
                        event_name = "llm.rate_limited",
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "text generation rate limited; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Returns the body of the first Markdown code fence (```` ```json ```` or
/// ```` ``` ````) in model output, wherever it appears. Replies without a
/// fence are returned trimmed; an unclosed fence runs to the end.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find(FENCE) else {
        return trimmed;
    };
    let rest = &trimmed[open + FENCE.len()..];

    let body = match rest.split_once('\n') {
        Some((tag, body)) if tag.trim().chars().all(|ch| ch.is_ascii_alphanumeric()) => body,
        _ => rest.trim_start_matches(|ch: char| ch.is_ascii_alphabetic()),
    };
    let body = match body.find(FENCE) {
        Some(close) => &body[..close],
        None => body,
    };
    body.trim()
}

const FENCE: &str = "```";

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
