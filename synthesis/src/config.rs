//! Configuration for synthesis, the circuit breaker and the model client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Budgets and retry policy for answer synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Size of the passage context handed to the model, in tokens.
    pub context_budget_tokens: usize,

    /// Characters assumed per token when sizing the context.
    pub chars_per_token: usize,

    /// End-to-end target for one `ask`, retrieval included.
    pub response_budget_ms: u64,

    /// Upper bound on a single model call.
    pub llm_timeout_ms: u64,

    /// Below this much remaining budget the model is not called at all.
    pub min_llm_window_ms: u64,

    /// Retries after a rate-limit response, within the same timeout.
    pub rate_limit_retries: u32,

    /// Delay before the first rate-limit retry; doubles afterwards.
    pub rate_limit_backoff_ms: u64,

    /// Passages listed in a templated answer.
    pub fallback_passages: usize,

    /// Longest snippet quoted per passage in a templated answer.
    pub snippet_chars: usize,
}

impl SynthesisConfig {
    /// Context budget in characters.
    pub fn context_budget_chars(&self) -> usize {
        self.context_budget_tokens
            .saturating_mul(self.chars_per_token.max(1))
    }

    pub fn response_budget(&self) -> Duration {
        Duration::from_millis(self.response_budget_ms)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    pub fn min_llm_window(&self) -> Duration {
        Duration::from_millis(self.min_llm_window_ms)
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn rate_limit_backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(10);
        Duration::from_millis(self.rate_limit_backoff_ms.saturating_mul(factor))
    }

    /// Set the model-call timeout.
    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the context budget in tokens.
    pub fn with_context_budget_tokens(mut self, tokens: usize) -> Self {
        self.context_budget_tokens = tokens;
        self
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            context_budget_tokens: 2000,
            chars_per_token: 4,
            response_budget_ms: 3000,
            llm_timeout_ms: 2500,
            min_llm_window_ms: 250,
            rate_limit_retries: 2,
            rate_limit_backoff_ms: 200,
            fallback_passages: 5,
            snippet_chars: 200,
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,

    /// Time the breaker stays open before allowing a trial call.
    pub reset_timeout_secs: u64,
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 30,
        }
    }
}

/// Chat-completion endpoint settings. The key itself is read from the
/// environment variable named by `api_key_env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}
