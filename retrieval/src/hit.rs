//! Per-query search results.

use std::sync::Arc;

use helpdesk_vector_index::{Document, Neighbor};

/// One retrieved passage. Lives for a single request.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document: Arc<Document>,

    /// Raw relevance to the question, `[0, 1]`.
    pub relevance_score: f32,

    /// Score assigned by diversity re-ranking, when it ran.
    pub rerank_score: Option<f32>,
}

impl SearchHit {
    /// Id of the underlying document.
    pub fn document_ref(&self) -> &str {
        &self.document.id
    }
}

impl From<Neighbor> for SearchHit {
    fn from(neighbor: Neighbor) -> Self {
        Self {
            document: neighbor.document,
            relevance_score: neighbor.score,
            rerank_score: None,
        }
    }
}
