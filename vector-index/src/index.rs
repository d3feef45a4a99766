//! Loaded corpora and the single-flight loader around them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use helpdesk_embeddings::{dot_product, normalize, relevance_score};

use crate::config::IndexConfig;
use crate::document::{Document, Snapshot};
use crate::error::{IndexError, Result};
use crate::source::{SnapshotOrigin, SnapshotSource};

/// A document paired with its relevance to a query.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub document: Arc<Document>,

    /// Relevance in `[0, 1]`, higher is more relevant.
    pub score: f32,
}

/// An immutable, fully built corpus for one tenant.
///
/// Embeddings are normalized at build time so search is a dot product.
#[derive(Debug)]
pub struct CorpusIndex {
    tenant_id: String,
    version: String,
    dimension: usize,
    documents: Vec<Arc<Document>>,
    loaded_at: DateTime<Utc>,
}

impl CorpusIndex {
    /// Build a corpus from a validated snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let documents = snapshot
            .documents
            .into_iter()
            .map(|mut doc| {
                normalize(&mut doc.embedding);
                Arc::new(doc)
            })
            .collect();

        Self {
            tenant_id: snapshot.tenant_id,
            version: snapshot.version,
            dimension: snapshot.dimension,
            documents,
            loaded_at: Utc::now(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn documents(&self) -> &[Arc<Document>] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Return up to `top_k` nearest documents by cosine similarity.
    ///
    /// Ties are broken by document id so repeated calls return the same order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored = Vec::with_capacity(self.documents.len());
        for doc in &self.documents {
            let cosine = dot_product(&query, &doc.embedding).map_err(|_| {
                IndexError::DimensionMismatch {
                    expected: self.dimension,
                    actual: doc.embedding.len(),
                }
            })?;
            scored.push((OrderedFloat(relevance_score(cosine)), doc));
        }

        Ok(rank(scored, top_k))
    }

    /// Score documents by the share of query terms they contain.
    ///
    /// Used when the question cannot be embedded. Every document is a
    /// candidate, so a non-empty corpus always yields results.
    pub fn keyword_search(&self, text: &str, top_k: usize) -> Vec<Neighbor> {
        let terms = query_terms(text);
        let scored = self
            .documents
            .iter()
            .map(|doc| {
                let score = if terms.is_empty() {
                    0.0
                } else {
                    let haystack: HashSet<String> =
                        query_terms(&format!("{} {}", doc.text, doc.source_label))
                            .into_iter()
                            .collect();
                    let matched = terms.iter().filter(|t| haystack.contains(*t)).count();
                    matched as f32 / terms.len() as f32
                };
                (OrderedFloat(score), doc)
            })
            .collect();

        rank(scored, top_k)
    }
}

fn rank(mut scored: Vec<(OrderedFloat<f32>, &Arc<Document>)>, top_k: usize) -> Vec<Neighbor> {
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
    scored
        .into_iter()
        .take(top_k)
        .map(|(score, doc)| Neighbor {
            document: Arc::clone(doc),
            score: score.0,
        })
        .collect()
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "you", "your", "what", "which", "who", "how", "are", "was",
    "have", "has", "does", "can", "any", "about", "from", "that", "this", "there", "their",
    "when", "where", "into", "our", "its",
];

fn query_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() > 2 && !STOPWORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Point-in-time view of an index, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub tenant_id: String,
    pub loaded: bool,
    pub document_count: usize,
    pub version: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub loads_started: u64,
}

#[derive(Debug, Clone)]
struct LoadFailure {
    epoch: u64,
    reason: String,
}

/// One tenant's corpus with a thread-safe, load-once lifecycle.
///
/// `new → ensure_loaded / refresh → search`. At most one load runs at a
/// time; callers that queued behind a failed load receive that load's
/// failure instead of starting their own.
pub struct VectorIndex {
    tenant_id: String,
    source: Arc<dyn SnapshotSource>,
    config: IndexConfig,

    /// Published corpus. Writers hold the lock only to swap the pointer.
    current: RwLock<Option<Arc<CorpusIndex>>>,

    /// Serializes loads and refreshes.
    load_lock: Mutex<()>,

    /// Number of completed load executions, successful or not.
    load_epoch: AtomicU64,

    /// Number of load executions started.
    loads_started: AtomicU64,

    last_failure: RwLock<Option<LoadFailure>>,
}

impl VectorIndex {
    /// Create an unloaded index for `tenant_id`.
    pub fn new(
        tenant_id: impl Into<String>,
        source: Arc<dyn SnapshotSource>,
        config: IndexConfig,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            source,
            config,
            current: RwLock::new(None),
            load_lock: Mutex::new(()),
            load_epoch: AtomicU64::new(0),
            loads_started: AtomicU64::new(0),
            last_failure: RwLock::new(None),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// The published corpus, if any.
    pub fn current(&self) -> Option<Arc<CorpusIndex>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    /// Number of load executions started over the life of this index.
    pub fn loads_started(&self) -> u64 {
        self.loads_started.load(Ordering::SeqCst)
    }

    /// Load the corpus if it is not published yet and return it.
    ///
    /// Idempotent. Concurrent first callers share one load.
    pub async fn ensure_loaded(&self) -> Result<Arc<CorpusIndex>> {
        if let Some(corpus) = self.current() {
            return Ok(corpus);
        }

        let observed_epoch = self.load_epoch.load(Ordering::SeqCst);
        let _guard = self.load_lock.lock().await;

        if let Some(corpus) = self.current() {
            return Ok(corpus);
        }

        // A load finished while we waited and published nothing.
        if let Some(failure) = self.failure_since(observed_epoch) {
            return Err(IndexError::Unavailable {
                tenant_id: self.tenant_id.clone(),
                reason: failure.reason,
            });
        }

        self.load_and_publish(false).await
    }

    /// Load a fresh corpus and swap it in.
    ///
    /// Queries already holding the previous corpus complete against it. On
    /// failure the previous corpus stays published.
    pub async fn refresh(&self) -> Result<Arc<CorpusIndex>> {
        let _guard = self.load_lock.lock().await;
        self.load_and_publish(true).await
    }

    /// Nearest-neighbor search against the published corpus.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>> {
        self.loaded()?.search(query, top_k)
    }

    /// Term-overlap search against the published corpus.
    pub fn keyword_search(&self, text: &str, top_k: usize) -> Result<Vec<Neighbor>> {
        Ok(self.loaded()?.keyword_search(text, top_k))
    }

    pub fn status(&self) -> IndexStatus {
        let current = self.current();
        IndexStatus {
            tenant_id: self.tenant_id.clone(),
            loaded: current.is_some(),
            document_count: current.as_ref().map_or(0, |c| c.len()),
            version: current.as_ref().map(|c| c.version().to_string()),
            loaded_at: current.as_ref().map(|c| c.loaded_at()),
            loads_started: self.loads_started(),
        }
    }

    fn loaded(&self) -> Result<Arc<CorpusIndex>> {
        self.current()
            .ok_or_else(|| IndexError::NotLoaded(self.tenant_id.clone()))
    }

    fn failure_since(&self, epoch: u64) -> Option<LoadFailure> {
        self.last_failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|f| f.epoch > epoch)
    }

    /// Caller must hold `load_lock`.
    async fn load_and_publish(&self, force_refresh: bool) -> Result<Arc<CorpusIndex>> {
        self.loads_started.fetch_add(1, Ordering::SeqCst);
        let result = self.load_with_retry(force_refresh).await;
        let epoch = self.load_epoch.fetch_add(1, Ordering::SeqCst) + 1;

        match result {
            Ok(corpus) => {
                let corpus = Arc::new(corpus);
                *self.current.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::clone(&corpus));
                *self
                    .last_failure
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = None;
                info!(
                    tenant_id = %self.tenant_id,
                    version = corpus.version(),
                    documents = corpus.len(),
                    "Published corpus"
                );
                Ok(corpus)
            }
            Err(e) => {
                let reason = e.to_string();
                error!(tenant_id = %self.tenant_id, "Corpus load failed: {reason}");
                *self
                    .last_failure
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(LoadFailure {
                    epoch,
                    reason: reason.clone(),
                });
                Err(IndexError::Unavailable {
                    tenant_id: self.tenant_id.clone(),
                    reason,
                })
            }
        }
    }

    async fn load_with_retry(&self, force_refresh: bool) -> Result<CorpusIndex> {
        let attempts = self.config.max_load_attempts.max(1);
        let mut attempt = 1;
        loop {
            info!(
                tenant_id = %self.tenant_id,
                attempt,
                source = self.source.name(),
                "Loading corpus snapshot"
            );
            match self.load_once(force_refresh).await {
                Ok(corpus) => return Ok(corpus),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    let delay = self.config.backoff_after(attempt);
                    warn!(
                        tenant_id = %self.tenant_id,
                        attempt,
                        "Snapshot load failed, retrying in {}ms: {e}",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn load_once(&self, force_refresh: bool) -> Result<CorpusIndex> {
        let fetched = self.source.fetch(&self.tenant_id, force_refresh).await?;
        let expected = self.config.expected_dimension;

        let snapshot = match Snapshot::parse(&fetched.bytes, &self.tenant_id, expected) {
            Ok(snapshot) => snapshot,
            Err(e) if fetched.origin == SnapshotOrigin::Cache => {
                warn!(
                    tenant_id = %self.tenant_id,
                    "Cached snapshot is unusable, downloading a fresh copy: {e}"
                );
                let fresh = self.source.fetch(&self.tenant_id, true).await?;
                Snapshot::parse(&fresh.bytes, &self.tenant_id, expected)?
            }
            Err(e) => return Err(e),
        };

        debug!(
            tenant_id = %self.tenant_id,
            documents = snapshot.documents.len(),
            "Parsed snapshot {}",
            snapshot.version
        );
        Ok(CorpusIndex::from_snapshot(snapshot))
    }
}
