//! Per-request composition of retrieval and synthesis.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use helpdesk_embeddings::{CachedProvider, EmbeddingCache, EmbeddingProvider, OpenAIProvider};
use helpdesk_retrieval::{QueryContext, RetrievalEngine, RetrievalError, RetrievalMethod};
use helpdesk_synthesis::{
    CircuitBreaker, FailureClass, LanguageModel, OpenAIChatModel, SynthesisMode, SynthesisService,
};
use helpdesk_tenant_directory::{Resolution, TenantDirectory};
use helpdesk_vector_index::{IndexError, IndexRegistry, IndexStatus, SnapshotSource};

use crate::config::HelpdeskConfig;
use crate::error::{HelpdeskError, Result};

/// One helpdesk question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub tenant_id: String,
    pub question: String,

    /// Defaults to the configured `top_k`.
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Defaults to the configured `min_score`.
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl AskRequest {
    pub fn new(tenant_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            question: question.into(),
            top_k: None,
            min_score: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// Wall-clock split of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timing {
    pub search_ms: u64,
    pub synthesis_ms: u64,
    pub total_ms: u64,
}

/// The answer to an [`AskRequest`].
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,

    /// Display names of the passages used. Never storage paths.
    pub sources: Vec<String>,

    pub mode: SynthesisMode,
    pub timing: Timing,

    /// Why the answer came from the fallback template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureClass>,

    pub retrieval: RetrievalMethod,
}

/// Process health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub vector_index_loaded: bool,
    pub document_count: usize,
    pub synthesis_mode: SynthesisMode,
    pub circuit_breaker_state: String,
}

/// One tenant's health after an attempted load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantHealth {
    #[serde(flatten)]
    pub health: Health,

    /// Why the corpus could not be loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

/// Answers helpdesk questions and resolves inbound addresses.
///
/// Built once per process and shared by reference. Every component it
/// owns is safe to use from many tasks at once.
pub struct HelpdeskOrchestrator {
    indexes: IndexRegistry,
    retrieval: RetrievalEngine,
    synthesis: SynthesisService,
    tenants: TenantDirectory,
    response_budget: Duration,
}

impl HelpdeskOrchestrator {
    pub fn new(
        indexes: IndexRegistry,
        retrieval: RetrievalEngine,
        synthesis: SynthesisService,
        tenants: TenantDirectory,
    ) -> Self {
        let response_budget = synthesis.config().response_budget();
        Self {
            indexes,
            retrieval,
            synthesis,
            tenants,
            response_budget,
        }
    }

    /// Wire every component from configuration.
    ///
    /// Nothing is loaded here: corpora load on first use per tenant and the
    /// tenant snapshot builds on the first resolve.
    pub fn from_config(config: &HelpdeskConfig) -> Self {
        let embedding = &config.embedding;
        let provider = OpenAIProvider::from_env(&embedding.api_key_env)
            .with_base_url(&embedding.base_url)
            .with_model(&embedding.model)
            .with_dimension(embedding.dimension)
            .with_timeout(embedding.timeout());
        if !provider.is_available() {
            warn!(
                "{} is not set, questions will use keyword retrieval",
                embedding.api_key_env
            );
        }
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(CachedProvider::new(
            provider,
            EmbeddingCache::new(embedding.cache_entries),
        ));

        let model = OpenAIChatModel::from_config(&config.llm);
        if !model.is_configured() {
            warn!(
                "{} is not set, answers will use the fallback template",
                config.llm.api_key_env
            );
        }
        let model: Arc<dyn LanguageModel> = Arc::new(model);

        let source: Arc<dyn SnapshotSource> = config.index.source.build();
        Self::new(
            IndexRegistry::new(source, config.index.clone()),
            RetrievalEngine::new(config.retrieval.clone(), embedder),
            SynthesisService::new(
                config.synthesis.clone(),
                model,
                Arc::new(CircuitBreaker::new(config.breaker.clone())),
            ),
            TenantDirectory::new(config.tenants.store.build(), config.tenants.ttl()),
        )
    }

    /// Answer a question from the tenant's corpus.
    ///
    /// Fails only when the corpus cannot be loaded or the request is
    /// malformed. Model and embedding failures produce a fallback answer.
    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse> {
        let started = Instant::now();
        let tenant_id = request.tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(HelpdeskError::InvalidRequest("tenant_id is empty".to_string()));
        }
        if request.question.trim().is_empty() {
            return Err(HelpdeskError::InvalidRequest("question is empty".to_string()));
        }

        let defaults = self.retrieval.config();
        let query = QueryContext::new(tenant_id, request.question.trim())
            .with_top_k(request.top_k.unwrap_or(defaults.top_k))
            .with_min_score(request.min_score.unwrap_or(defaults.min_score));

        let index = self
            .indexes
            .get(tenant_id)
            .map_err(|e| index_unavailable(tenant_id, e))?;
        let retrieval = match self.retrieval.retrieve(&index, &query).await {
            Ok(retrieval) => retrieval,
            Err(RetrievalError::Index(e)) => {
                self.indexes.release_unloaded(&index);
                return Err(index_unavailable(tenant_id, e));
            }
            Err(RetrievalError::EmptyQuestion) => {
                return Err(HelpdeskError::InvalidRequest("question is empty".to_string()));
            }
        };
        let search_ms = elapsed_ms(started);
        debug!(
            tenant_id,
            hits = retrieval.hits.len(),
            method = ?retrieval.method,
            search_ms,
            "Retrieved passages"
        );

        let budget = self.response_budget.saturating_sub(started.elapsed());
        let result = self.synthesis.synthesize(&query, &retrieval, budget).await;

        let timing = Timing {
            search_ms,
            synthesis_ms: result.elapsed_ms,
            total_ms: elapsed_ms(started),
        };
        info!(
            tenant_id,
            mode = result.mode.as_str(),
            sources = result.sources.len(),
            search_ms = timing.search_ms,
            synthesis_ms = timing.synthesis_ms,
            total_ms = timing.total_ms,
            "Answered helpdesk question"
        );

        Ok(AskResponse {
            answer: result.answer,
            sources: result.sources,
            mode: result.mode,
            timing,
            failure: result.failure,
            retrieval: retrieval.method,
        })
    }

    /// Map an inbound address to a tenant.
    pub async fn resolve_tenant(&self, address: &str) -> Result<Resolution> {
        Ok(self.tenants.resolve(address).await?)
    }

    /// Process-wide health. The index counts as loaded if any tenant's is.
    pub fn health(&self) -> Health {
        let statuses = self.indexes.statuses();
        self.health_from(
            statuses.iter().any(|s| s.loaded),
            statuses.iter().map(|s| s.document_count).sum(),
        )
    }

    /// Health as seen by one tenant.
    pub fn tenant_health(&self, tenant_id: &str) -> Health {
        let status = self.indexes.existing(tenant_id).map(|index| index.status());
        self.health_from(
            status.as_ref().is_some_and(|s| s.loaded),
            status.as_ref().map_or(0, |s| s.document_count),
        )
    }

    fn health_from(&self, loaded: bool, document_count: usize) -> Health {
        Health {
            vector_index_loaded: loaded,
            document_count,
            synthesis_mode: self.synthesis.expected_mode(),
            circuit_breaker_state: self.synthesis.breaker_state().as_str().to_string(),
        }
    }

    /// Load a tenant's corpus if needed and report its health. A load
    /// failure is reported as an unloaded index, with the reason.
    pub async fn load_tenant_health(&self, tenant_id: &str) -> TenantHealth {
        let load_error = match self.indexes.get(tenant_id) {
            Ok(index) => match index.ensure_loaded().await {
                Ok(_) => None,
                Err(e) => {
                    self.indexes.release_unloaded(&index);
                    Some(e)
                }
            },
            Err(e) => Some(e),
        };
        TenantHealth {
            health: self.tenant_health(tenant_id),
            load_error: load_error.map(unavailable_reason),
        }
    }

    /// Reload a tenant's corpus and swap it in.
    ///
    /// On failure the previously loaded corpus stays in service.
    pub async fn refresh(&self, tenant_id: &str) -> Result<IndexStatus> {
        let index = self
            .indexes
            .get(tenant_id)
            .map_err(|e| index_unavailable(tenant_id, e))?;
        if let Err(e) = index.refresh().await {
            self.indexes.release_unloaded(&index);
            return Err(index_unavailable(tenant_id, e));
        }
        Ok(index.status())
    }

    /// Rebuild the tenant alias snapshot now. Returns its generation.
    pub async fn refresh_tenants(&self) -> Result<u64> {
        Ok(self.tenants.refresh().await?)
    }

    /// Resume model calls after a credential fix.
    pub fn clear_auth_failure(&self) {
        self.synthesis.clear_auth_failure();
    }
}

fn index_unavailable(tenant_id: &str, error: IndexError) -> HelpdeskError {
    HelpdeskError::IndexUnavailable {
        tenant_id: tenant_id.to_string(),
        reason: unavailable_reason(error),
    }
}

fn unavailable_reason(error: IndexError) -> String {
    match error {
        IndexError::Unavailable { reason, .. } => reason,
        other => other.to_string(),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
