//! # Embeddings
//!
//! This crate turns question text into dense vectors for the helpdesk
//! retrieval path and provides the similarity math shared by the vector
//! index and the diversity re-ranker.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors using a remote model
//! - **Similarity Math**: Cosine similarity, normalization, pairwise diversity
//! - **Caching**: Per-process cache for identical question text
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► similarity                 │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  OpenAIProvider ◄── CachedProvider ── EmbeddingCache            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod provider;
pub mod similarity;

pub use cache::{CacheStats, CachedProvider, EmbeddingCache};
pub use error::{EmbeddingError, Result};
pub use provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIProvider};
pub use similarity::{
    average_pairwise_similarity, cosine_similarity, dot_product, normalize, relevance_score,
};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of corpus embeddings produced by the default model.
pub const DEFAULT_DIMENSION: usize = 768;
