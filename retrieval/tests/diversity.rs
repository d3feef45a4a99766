//! Re-ranking against a corpus full of near-identical listings.

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use helpdesk_embeddings::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, average_pairwise_similarity,
};
use helpdesk_retrieval::{
    QueryContext, QueryShape, RetrievalConfig, RetrievalEngine, RetrievalError, SearchHit,
};
use helpdesk_vector_index::{
    DirectorySnapshotSource, Document, IndexConfig, IndexError, Snapshot, VectorIndex,
};

struct FixedEmbedder(Vec<f32>);

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn name(&self) -> &str {
        "fixed"
    }

    fn default_model(&self) -> &str {
        "fixed"
    }

    fn default_dimension(&self) -> usize {
        self.0.len()
    }

    async fn embed(
        &self,
        _request: EmbeddingRequest,
    ) -> helpdesk_embeddings::Result<EmbeddingResponse> {
        Ok(EmbeddingResponse {
            embedding: self.0.clone(),
            model: "fixed".to_string(),
            dimension: self.0.len(),
            tokens_used: None,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn listing(id: &str, embedding: Vec<f32>) -> Document {
    Document {
        id: id.to_string(),
        text: format!("Listing {id}"),
        source_label: format!("listings/{id}.md"),
        title: None,
        embedding,
        tenant_scope: "acme".to_string(),
    }
}

/// Five copies of one villa listing plus five distinct properties.
fn write_corpus(dir: &TempDir) {
    let mut documents: Vec<Document> = (0..5)
        .map(|i| {
            listing(
                &format!("nungwi-villa-{i}"),
                vec![1.0, 0.05 * i as f32, 0.02 * (4 - i) as f32, 0.0],
            )
        })
        .collect();
    documents.extend([
        listing("stone-town-hotel", vec![0.6, 0.8, 0.0, 0.0]),
        listing("serengeti-lodge", vec![0.3, 0.0, 1.0, 0.0]),
        listing("kendwa-resort", vec![0.7, 0.0, 0.0, 0.7]),
        listing("pemba-dive-camp", vec![0.2, 0.3, 0.3, 0.9]),
        listing("nairobi-city", vec![0.0, 1.0, 0.3, 0.0]),
    ]);

    let snapshot = Snapshot {
        version: "2024-06-01".to_string(),
        tenant_id: "acme".to_string(),
        dimension: 4,
        created_at: None,
        documents,
    };
    std::fs::write(
        dir.path().join("acme.json"),
        serde_json::to_vec(&snapshot).unwrap(),
    )
    .unwrap();
}

fn index(dir: &TempDir) -> VectorIndex {
    VectorIndex::new(
        "acme",
        Arc::new(DirectorySnapshotSource::new(dir.path())),
        IndexConfig::default(),
    )
}

fn avg_similarity(hits: &[SearchHit]) -> f32 {
    let vectors: Vec<&[f32]> = hits
        .iter()
        .map(|h| h.document.embedding.as_slice())
        .collect();
    average_pairwise_similarity(&vectors).unwrap()
}

#[tokio::test]
async fn test_rerank_is_never_more_redundant_than_raw_top_k() {
    let dir = TempDir::new().unwrap();
    write_corpus(&dir);
    let index = index(&dir);

    let queries = [
        vec![1.0, 0.1, 0.1, 0.1],
        vec![1.0, 0.3, 0.2, 0.2],
        vec![0.8, 0.2, 0.5, 0.3],
    ];
    let questions = [
        "What hotels do you have in Zanzibar?",
        "How much is a night in Nungwi?",
        "Tell me about places to stay",
    ];

    for vector in queries {
        let engine = RetrievalEngine::new(
            RetrievalConfig::default(),
            Arc::new(FixedEmbedder(vector.clone())),
        );
        for question in questions {
            let query = QueryContext::new("acme", question).with_top_k(5);
            let result = engine.retrieve(&index, &query).await.unwrap();

            let raw: Vec<SearchHit> = index
                .search(&vector, 5)
                .unwrap()
                .into_iter()
                .map(SearchHit::from)
                .collect();

            assert_eq!(result.hits.len(), 5);
            assert!(
                avg_similarity(&result.hits) <= avg_similarity(&raw) + 1e-5,
                "re-ranked set for {question:?} is more redundant than raw top-k"
            );
        }
    }
}

#[tokio::test]
async fn test_list_question_surfaces_distinct_properties() {
    let dir = TempDir::new().unwrap();
    write_corpus(&dir);
    let index = index(&dir);
    let engine = RetrievalEngine::new(
        RetrievalConfig::default(),
        Arc::new(FixedEmbedder(vec![0.8, 0.2, 0.5, 0.3])),
    );

    let query = QueryContext::new("acme", "What hotels do you have?").with_top_k(5);
    let result = engine.retrieve(&index, &query).await.unwrap();

    assert_eq!(result.shape, QueryShape::List);
    let villas = result
        .hits
        .iter()
        .filter(|h| h.document_ref().starts_with("nungwi-villa"))
        .count();
    assert_eq!(villas, 1);
    assert_eq!(result.hits[0].document_ref(), "nungwi-villa-1");
}

#[tokio::test]
async fn test_missing_corpus_is_an_index_error() {
    let dir = TempDir::new().unwrap();
    let index = index(&dir);
    let engine = RetrievalEngine::new(
        RetrievalConfig::default(),
        Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0, 0.0])),
    );

    let err = engine
        .retrieve(&index, &QueryContext::new("acme", "anything"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RetrievalError::Index(IndexError::Unavailable { .. })
    ));
}
