//! Embedding providers.
//!
//! The helpdesk embeds each incoming question with the same model that
//! produced the corpus snapshot. Any OpenAI-compatible `/embeddings`
//! endpoint works.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// One text to embed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub text: String,

    /// Overrides the provider's model.
    pub model: Option<String>,

    /// Overrides the provider's output width.
    pub dimensions: Option<usize>,
}

impl EmbeddingRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            dimensions: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// A computed embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Embedding,

    /// Model that actually served the request.
    pub model: String,

    pub dimension: usize,
    pub tokens_used: Option<u64>,
}

/// Something that maps text to a fixed-width vector.
///
/// Implementations must produce vectors comparable with the corpus
/// snapshot: same model, same width.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn default_model(&self) -> &str;

    /// Width of the vectors `embed` returns.
    fn default_dimension(&self) -> usize;

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Whether `embed` can be attempted at all, e.g. a key is present.
    fn is_available(&self) -> bool;
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAIProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
    model: String,
    dimension: usize,
    timeout: Duration,

    /// Inputs longer than this are refused without a network call.
    max_input_chars: usize,
}

impl OpenAIProvider {
    /// Provider keyed from `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self::from_env("OPENAI_API_KEY")
    }

    /// Provider keyed from the named variable. A blank value counts as unset.
    pub fn from_env(var: &str) -> Self {
        Self {
            api_key: std::env::var(var).ok().filter(|k| !k.trim().is_empty()),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
            model: "text-embedding-3-small".to_string(),
            dimension: crate::DEFAULT_DIMENSION,
            timeout: Duration::from_millis(1500),
            max_input_chars: 8_000,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Output width. Must match the corpus snapshot.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn default_dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(EmbeddingError::ProviderNotConfigured);
        };

        let length = request.text.chars().count();
        if length > self.max_input_chars {
            return Err(EmbeddingError::TextTooLong {
                length,
                max_length: self.max_input_chars,
            });
        }

        let body = WireRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            input: &request.text,
            dimensions: request.dimensions.unwrap_or(self.dimension),
        };
        debug!(model = body.model, chars = length, "Embedding question");

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok());
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after, detail));
        }

        let parsed: WireResponse = response.json().await?;
        let Some(first) = parsed.data.into_iter().next() else {
            return Err(EmbeddingError::InvalidResponse(
                "response carried no embedding".to_string(),
            ));
        };

        let expected = body.dimensions;
        let dimension = first.embedding.len();
        if dimension != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: dimension,
            });
        }

        Ok(EmbeddingResponse {
            embedding: first.embedding,
            model: parsed.model,
            dimension,
            tokens_used: parsed.usage.map(|u| u.total_tokens),
        })
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Map a non-success status to an error. 429 without `retry-after` waits a minute.
fn status_error(
    status: reqwest::StatusCode,
    retry_after: Option<u64>,
    detail: String,
) -> EmbeddingError {
    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            EmbeddingError::Unauthorized {
                status: status.as_u16(),
            }
        }
        reqwest::StatusCode::TOO_MANY_REQUESTS => EmbeddingError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(60),
        },
        _ => EmbeddingError::ApiRequest(format!("{status}: {detail}")),
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct WireResponse {
    data: Vec<WireEmbedding>,
    model: String,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireEmbedding {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct WireUsage {
    total_tokens: u64,
}
