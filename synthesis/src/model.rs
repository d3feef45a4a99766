//! Language-model clients.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use helpdesk_retrieval::GenerationParams;

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};

/// A single completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub params: GenerationParams,

    /// The client must give up after this long.
    pub timeout: Duration,
}

/// Model output.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub tokens_used: Option<u64>,
}

/// Trait for language-model clients.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Get the name of this client, for logs.
    fn name(&self) -> &str;

    /// Whether credentials are present.
    fn is_configured(&self) -> bool;

    /// Complete a prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAIChatModel {
    api_key: Option<String>,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAIChatModel {
    /// Create a client from endpoint settings, reading the key from the
    /// environment variable the settings name.
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            api_key: std::env::var(&config.api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn name(&self) -> &str {
        "openai-chat"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::NotConfigured)?;

        debug!(
            model = %self.model,
            max_tokens = request.params.max_tokens,
            "Requesting chat completion"
        );

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": request.params.temperature,
            "max_tokens": request.params.max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| timeout_or_http(e, request.timeout))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(LlmError::Unauthorized {
                status: status.as_u16(),
            });
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(LlmError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| timeout_or_http(e, request.timeout))?;

        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("no completion text".to_string()))?;

        Ok(Completion {
            text,
            model: result.model.unwrap_or_else(|| self.model.clone()),
            tokens_used: result.usage.map(|u| u.total_tokens),
        })
    }
}

fn timeout_or_http(error: reqwest::Error, timeout: Duration) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout(timeout)
    } else {
        LlmError::Http(error)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    model: Option<String>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}
