//! Retrieval engine implementation.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use helpdesk_embeddings::{EmbeddingProvider, EmbeddingRequest};
use helpdesk_vector_index::{CorpusIndex, Neighbor, VectorIndex};

use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};
use crate::hit::SearchHit;
use crate::mmr;
use crate::query::{QueryContext, QueryShape};

/// How candidates were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    /// Vector similarity against the embedded question.
    Semantic,

    /// Term overlap, used when the question could not be embedded.
    Keyword,
}

/// Outcome of one retrieval.
#[derive(Debug, Clone)]
pub struct Retrieval {
    /// Ranked passages, best first.
    pub hits: Vec<SearchHit>,

    pub method: RetrievalMethod,

    /// Why the keyword path was taken, if it was.
    pub fallback_reason: Option<String>,

    pub shape: QueryShape,

    /// λ used for re-ranking, `None` when re-ranking was skipped.
    pub lambda: Option<f32>,

    /// Highest raw relevance among the candidates, 0 for an empty corpus.
    pub best_score: f32,

    /// Whether the relevance threshold was ignored to keep the result floor.
    pub threshold_relaxed: bool,

    /// Number of candidates fetched from the index.
    pub candidates_considered: usize,

    pub elapsed_ms: u64,
}

/// Turns a question into ranked, diverse passages.
pub struct RetrievalEngine {
    config: RetrievalConfig,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl RetrievalEngine {
    /// Create an engine embedding questions with `embedder`.
    pub fn new(config: RetrievalConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { config, embedder }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Load the index if needed, then retrieve against its current corpus.
    pub async fn retrieve(&self, index: &VectorIndex, query: &QueryContext) -> Result<Retrieval> {
        if query.question.trim().is_empty() {
            return Err(RetrievalError::EmptyQuestion);
        }
        let corpus = index.ensure_loaded().await?;
        self.retrieve_from(&corpus, query).await
    }

    /// Retrieve against a specific corpus.
    ///
    /// The corpus is held for the whole call, so a concurrent refresh never
    /// mixes two snapshots into one result.
    pub async fn retrieve_from(
        &self,
        corpus: &CorpusIndex,
        query: &QueryContext,
    ) -> Result<Retrieval> {
        let started = Instant::now();
        let question = query.question.trim();
        if question.is_empty() {
            return Err(RetrievalError::EmptyQuestion);
        }

        let shape = query.shape();
        let k = query.top_k.max(self.config.min_results);
        let fetch = self.config.fetch_size(k);
        if k.saturating_mul(self.config.overfetch_factor.max(1)) > fetch {
            warn!(
                tenant_id = %query.tenant_id,
                top_k = k,
                cap = self.config.max_candidates,
                "Candidate count capped for re-ranking"
            );
        }

        let (candidates, method, fallback_reason) = match self.semantic(corpus, question, fetch).await
        {
            Ok(candidates) => (candidates, RetrievalMethod::Semantic, None),
            Err(reason) => {
                warn!(
                    tenant_id = %query.tenant_id,
                    "Semantic search unavailable, using keyword retrieval: {reason}"
                );
                (
                    corpus.keyword_search(question, fetch),
                    RetrievalMethod::Keyword,
                    Some(reason),
                )
            }
        };

        let candidates_considered = candidates.len();
        let best_score = candidates.first().map_or(0.0, |c| c.score);

        let passing = candidates
            .iter()
            .take_while(|c| c.score >= query.min_score)
            .count();
        let threshold_relaxed = passing < self.config.min_results && passing < candidates.len();
        let keep = if threshold_relaxed {
            self.config.min_results.max(passing)
        } else {
            passing
        };
        let pool: Vec<SearchHit> = candidates
            .into_iter()
            .take(keep)
            .map(SearchHit::from)
            .collect();

        let (hits, lambda) = if self.config.mmr_enabled {
            let lambda = self.config.lambda_for(shape);
            (mmr::rerank(pool, k, lambda), Some(lambda))
        } else {
            (pool.into_iter().take(k).collect(), None)
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(
            tenant_id = %query.tenant_id,
            shape = shape.as_str(),
            hits = hits.len(),
            best_score,
            threshold_relaxed,
            elapsed_ms,
            "Retrieved passages"
        );

        Ok(Retrieval {
            hits,
            method,
            fallback_reason,
            shape,
            lambda,
            best_score,
            threshold_relaxed,
            candidates_considered,
            elapsed_ms,
        })
    }

    /// Embed and search. Errors come back as a reason for the keyword path.
    async fn semantic(
        &self,
        corpus: &CorpusIndex,
        question: &str,
        fetch: usize,
    ) -> std::result::Result<Vec<Neighbor>, String> {
        if !self.embedder.is_available() {
            return Err(format!("embedding provider {} is not configured", self.embedder.name()));
        }
        let response = self
            .embedder
            .embed(EmbeddingRequest::new(question))
            .await
            .map_err(|e| e.to_string())?;
        corpus
            .search(&response.embedding, fetch)
            .map_err(|e| e.to_string())
    }
}
