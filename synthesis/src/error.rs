//! Error types for language-model calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for language-model operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors returned by a [`LanguageModel`](crate::LanguageModel).
///
/// None of these reach the helpdesk caller. The synthesis service maps each
/// one to a [`FailureClass`] and answers from the fallback template.
#[derive(Error, Debug)]
pub enum LlmError {
    /// No API key is configured.
    #[error("language model not configured")]
    NotConfigured,

    /// Credentials were rejected.
    #[error("language model rejected credentials (status {status})")]
    Unauthorized { status: u16 },

    /// Rate limit exceeded.
    #[error("language model rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// The call did not finish in time.
    #[error("language model call timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success status other than auth or rate limiting.
    #[error("language model API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body did not contain a completion.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Coarse class used for logging and health reporting.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::NotConfigured => FailureClass::Unavailable,
            Self::Unauthorized { .. } => FailureClass::Auth,
            Self::RateLimited { .. } => FailureClass::RateLimit,
            Self::Timeout(_) => FailureClass::Timeout,
            Self::Http(e) if e.is_timeout() => FailureClass::Timeout,
            Self::Api { .. } | Self::Http(_) | Self::InvalidResponse(_) => FailureClass::Unknown,
        }
    }
}

/// Why an answer came from the fallback template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureClass {
    Auth,
    RateLimit,
    Timeout,
    CircuitOpen,
    /// Too little of the response budget was left to call the model.
    BudgetExhausted,
    /// No model is configured.
    Unavailable,
    Unknown,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate-limit",
            Self::Timeout => "timeout",
            Self::CircuitOpen => "circuit-open",
            Self::BudgetExhausted => "budget-exhausted",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
