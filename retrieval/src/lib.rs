//! # Retrieval Engine
//!
//! This crate turns a helpdesk question into a ranked, diverse set of
//! passages from a tenant's [`VectorIndex`](helpdesk_vector_index::VectorIndex).
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       RetrievalEngine                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  QueryContext ──► embed ──► over-fetch 2×top_k                  │
//! │       │             │              │                            │
//! │       │        (failure)           ▼                            │
//! │       │             └──► keyword   relevance filter (min_score) │
//! │       ▼                            │                            │
//! │  QueryShape ──► λ ──────────►  MMR re-rank ──► SearchHit[]      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! When fewer than `min_results` candidates pass the relevance threshold
//! the threshold is ignored and the best raw candidates are used instead,
//! so a non-empty corpus never produces an empty result.

pub mod config;
pub mod engine;
pub mod error;
pub mod hit;
pub mod mmr;
pub mod query;

pub use config::RetrievalConfig;
pub use engine::{Retrieval, RetrievalEngine, RetrievalMethod};
pub use error::{Result, RetrievalError};
pub use hit::SearchHit;
pub use mmr::rerank;
pub use query::{GenerationParams, QueryContext, QueryShape};
