//! # Answer Synthesis
//!
//! Turns ranked passages into a conversational answer, or into a
//! deterministic templated answer when the language model cannot help.
//!
//! ## Call path
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        SynthesisService                           │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  auth latch ─► budget check ─► CircuitBreaker ─► LanguageModel    │
//! │       │              │               │            (timeout,       │
//! │       │              │               │             rate-limit     │
//! │       │              │               │             retries)       │
//! │       └──────────────┴───────────────┴──────► fallback template   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure becomes a [`SynthesisResult`] in `fallback` mode tagged
//! with a [`FailureClass`]. Nothing here returns an error to the caller.

pub mod breaker;
pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod model;
pub mod params;
pub mod service;
pub mod sources;

pub use breaker::{BreakerPermit, BreakerState, CircuitBreaker};
pub use config::{BreakerConfig, LlmConfig, SynthesisConfig};
pub use context::{ContextBlock, build_context};
pub use error::{FailureClass, LlmError, Result};
pub use fallback::{NO_RELEVANT_INFORMATION, fallback_answer};
pub use model::{Completion, CompletionRequest, LanguageModel, OpenAIChatModel};
pub use params::{generation_params, params_for};
pub use service::{SynthesisMode, SynthesisResult, SynthesisService};
pub use sources::{clean_source, clean_sources};
