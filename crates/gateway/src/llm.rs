//! Language model client
//!
//! Azure OpenAI chat completions with exponential backoff and full jitter.
//! Transport errors, malformed responses and 429/502/503/504 are retried;
//! 401/403 and other statuses fail on the first attempt.

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use momochat_common::config::LlmConfig;
use momochat_common::errors::{AppError, Result};
use momochat_common::metrics;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A chat-completion backend
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Assistant reply to the conversation
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    fn name(&self) -> &str;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// How a failed status is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Retryable,
    Unauthorized,
    Fatal,
}

fn classify_status(status: StatusCode) -> StatusClass {
    match status.as_u16() {
        401 | 403 => StatusClass::Unauthorized,
        429 | 502 | 503 | 504 => StatusClass::Retryable,
        _ => StatusClass::Fatal,
    }
}

enum Failure {
    Retryable(AppError),
    Fatal(AppError),
}

/// Azure OpenAI deployment client
pub struct AzureChatModel {
    client: reqwest::Client,
    url: String,
    api_key: String,
    config: LlmConfig,
}

impl AzureChatModel {
    pub fn new(config: &LlmConfig, endpoint: &str, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: completion_url(endpoint, &config.deployment, &config.api_version),
            api_key: api_key.to_string(),
            config: config.clone(),
        })
    }

    fn backoff_policy(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.config.max_backoff_ms))
            .with_multiplier(2.0)
            .with_randomization_factor(1.0)
            .with_max_elapsed_time(None)
            .build()
    }

    async fn send_once(&self, body: &CompletionRequest<'_>) -> std::result::Result<String, Failure> {
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Failure::Retryable(AppError::HttpClient(e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(1000).collect();
            warn!(status = status.as_u16(), body = %snippet, "Language model returned an error status");

            return Err(match classify_status(status) {
                StatusClass::Unauthorized => Failure::Fatal(AppError::UpstreamUnauthorized),
                StatusClass::Retryable => Failure::Retryable(AppError::Upstream { status: status.as_u16() }),
                StatusClass::Fatal => Failure::Fatal(AppError::Upstream { status: status.as_u16() }),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Failure::Retryable(AppError::HttpClient(e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                Failure::Retryable(AppError::Internal {
                    message: "Response 'message.content' missing".to_string(),
                })
            })
    }
}

#[async_trait]
impl ChatModel for AzureChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let start = Instant::now();
        let max_attempts = self.config.max_retries.max(1);
        let body = CompletionRequest {
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let attempts = AtomicU32::new(0);
        let (attempts_ref, body_ref) = (&attempts, &body);

        let operation = move || async move {
            let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst) + 1;
            match self.send_once(body_ref).await {
                Ok(content) => Ok(content),
                Err(Failure::Fatal(e)) => Err(backoff::Error::permanent(e)),
                Err(Failure::Retryable(e)) if attempt >= max_attempts => {
                    error!(attempts = attempt, error = %e, "Exhausted retries calling the language model");
                    Err(backoff::Error::permanent(AppError::ServiceUnavailable {
                        message: "Service unavailable after retries.".to_string(),
                    }))
                }
                Err(Failure::Retryable(e)) => Err(backoff::Error::transient(e)),
            }
        };

        let notify = |e: AppError, wait: Duration| {
            info!(
                error = %e,
                attempt = attempts.load(Ordering::SeqCst),
                max_attempts,
                wait_ms = wait.as_millis() as u64,
                "Retrying language model call"
            );
        };

        let result = backoff::future::retry_notify(self.backoff_policy(), operation, notify).await;

        let attempts = attempts.load(Ordering::SeqCst);
        metrics::record_llm(
            start.elapsed().as_secs_f64(),
            &self.config.deployment,
            attempts,
            result.is_ok(),
        );

        result
    }

    fn name(&self) -> &str {
        &self.config.deployment
    }
}

/// Canned replies for running without provider credentials
#[derive(Debug, Clone, Default)]
pub struct MockChatModel;

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let question = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        Ok(format!(
            "Thank you for your question about \"{}\". \
             [Mock response - language model API key not configured]",
            question.trim()
        ))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={version}`
pub fn completion_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    )
}

/// Azure client when endpoint and key are configured, mock otherwise
pub fn build_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match (config.resolved_endpoint(), config.resolved_api_key()) {
        (Some(endpoint), Some(api_key)) => {
            info!(deployment = %config.deployment, "Using Azure OpenAI deployment");
            Ok(Arc::new(AzureChatModel::new(config, &endpoint, &api_key)?))
        }
        _ => {
            warn!("Language model endpoint or API key not set, replies will be mocked");
            Ok(Arc::new(MockChatModel))
        }
    }
}
