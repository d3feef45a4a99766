//! Embedding failures.
//!
//! Callers on the request path never surface these to users; retrieval
//! falls back to keyword matching instead.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbeddingError>;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// No API key was found in the environment.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    #[error("embedding provider rejected credentials (status {status})")]
    Unauthorized { status: u16 },

    /// Non-success status other than auth and rate limiting.
    #[error("embedding request failed: {0}")]
    ApiRequest(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The vector width disagrees with the corpus.
    #[error("embedding width mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("question too long to embed: {length} characters, max {max_length}")]
    TextTooLong { length: usize, max_length: usize },
}
