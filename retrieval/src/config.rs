//! Configuration for the retrieval engine.

use serde::{Deserialize, Serialize};

use crate::query::QueryShape;

/// Configuration for the retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of passages to return.
    pub top_k: usize,

    /// Default minimum relevance score (0.0 to 1.0).
    pub min_score: f32,

    /// Floor on the result count for a non-empty corpus.
    pub min_results: usize,

    /// Candidates fetched per returned passage, for re-ranking headroom.
    pub overfetch_factor: usize,

    /// Hard cap on fetched candidates. Re-ranking is quadratic in this.
    pub max_candidates: usize,

    /// Whether to apply diversity re-ranking.
    pub mmr_enabled: bool,

    /// λ for narrow factual questions.
    pub lambda_factual: f32,

    /// λ for questions with no particular shape.
    pub lambda_general: f32,

    /// λ for list, comparison and recommendation questions.
    pub lambda_diverse: f32,
}

impl RetrievalConfig {
    /// Set the default result count.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the default relevance threshold.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Enable or disable diversity re-ranking.
    pub fn with_mmr(mut self, enabled: bool) -> Self {
        self.mmr_enabled = enabled;
        self
    }

    /// λ used for a question of the given shape, clamped to `[0, 1]`.
    pub fn lambda_for(&self, shape: QueryShape) -> f32 {
        let lambda = match shape {
            QueryShape::Factual => self.lambda_factual,
            QueryShape::General => self.lambda_general,
            QueryShape::List | QueryShape::Comparison | QueryShape::Recommendation => {
                self.lambda_diverse
            }
        };
        lambda.clamp(0.0, 1.0)
    }

    /// Number of candidates to fetch for `top_k` results.
    pub fn fetch_size(&self, top_k: usize) -> usize {
        top_k
            .saturating_mul(self.overfetch_factor.max(1))
            .min(self.max_candidates.max(top_k))
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            min_score: 0.3,
            min_results: 3,
            overfetch_factor: 2,
            max_candidates: 64,
            mmr_enabled: true,
            lambda_factual: 0.8,
            lambda_general: 0.7,
            lambda_diverse: 0.6,
        }
    }
}
