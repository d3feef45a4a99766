//! Answer synthesis with bounded latency.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use helpdesk_retrieval::{QueryContext, Retrieval};

use crate::breaker::{BreakerState, CircuitBreaker};
use crate::config::SynthesisConfig;
use crate::context::build_context;
use crate::error::{FailureClass, LlmError};
use crate::fallback::fallback_answer;
use crate::model::{CompletionRequest, LanguageModel};
use crate::params::params_for;
use crate::sources::clean_sources;

const SYSTEM_PROMPT: &str = "You are a helpful travel-company helpdesk assistant. Answer using \
only the numbered passages provided. Mention specific options by name when the question asks \
for several. If the passages do not contain the answer, say plainly that you don't have \
specific information about it and do not offer unrelated content.";

const OFF_TOPIC_NOTE: &str = "Note: none of these passages appear relevant to the question. \
Tell the customer you don't have specific information about it.";

/// How an answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    Llm,
    Fallback,
}

impl SynthesisMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Fallback => "fallback",
        }
    }
}

/// A synthesized answer. Never an error: failures become `Fallback`.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisResult {
    pub answer: String,

    /// Cleaned, human-readable source names.
    pub sources: Vec<String>,

    pub mode: SynthesisMode,

    /// Set when `mode` is `Fallback`.
    pub failure: Option<FailureClass>,

    pub elapsed_ms: u64,
}

/// Turns retrieved passages into an answer, through the breaker, within a
/// time budget.
pub struct SynthesisService {
    config: SynthesisConfig,
    model: Arc<dyn LanguageModel>,
    breaker: Arc<CircuitBreaker>,

    /// Latched by a credential rejection. Cleared only by `clear_auth_failure`.
    auth_failed: AtomicBool,
}

impl SynthesisService {
    pub fn new(
        config: SynthesisConfig,
        model: Arc<dyn LanguageModel>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            config,
            model,
            breaker,
            auth_failed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Mode the next request would most likely get.
    pub fn expected_mode(&self) -> SynthesisMode {
        if self.auth_failed()
            || !self.model.is_configured()
            || self.breaker.state() == BreakerState::Open
        {
            SynthesisMode::Fallback
        } else {
            SynthesisMode::Llm
        }
    }

    pub fn auth_failed(&self) -> bool {
        self.auth_failed.load(Ordering::SeqCst)
    }

    /// Resume calling the model after credentials were fixed.
    pub fn clear_auth_failure(&self) {
        if self.auth_failed.swap(false, Ordering::SeqCst) {
            warn!("Language model auth failure cleared, resuming model calls");
        }
    }

    /// Produce an answer for `query` from `retrieval`.
    ///
    /// `budget` is what remains of the response-time target. The model call
    /// is bounded by the smaller of the configured timeout and the budget.
    pub async fn synthesize(
        &self,
        query: &QueryContext,
        retrieval: &Retrieval,
        budget: Duration,
    ) -> SynthesisResult {
        let started = Instant::now();
        let off_topic = retrieval.hits.is_empty() || retrieval.best_score < query.min_score;
        let sources = if off_topic {
            Vec::new()
        } else {
            clean_sources(&retrieval.hits)
        };

        let (answer, mode, failure) = match self.call_model(query, retrieval, off_topic, budget).await
        {
            Ok(text) => (text, SynthesisMode::Llm, None),
            Err(class) => {
                warn!(
                    tenant_id = %query.tenant_id,
                    failure = class.as_str(),
                    "Answering from fallback template"
                );
                let text = fallback_answer(
                    &query.question,
                    &retrieval.hits,
                    off_topic,
                    self.config.fallback_passages,
                    self.config.snippet_chars,
                );
                (text, SynthesisMode::Fallback, Some(class))
            }
        };

        SynthesisResult {
            answer,
            sources,
            mode,
            failure,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn call_model(
        &self,
        query: &QueryContext,
        retrieval: &Retrieval,
        off_topic: bool,
        budget: Duration,
    ) -> Result<String, FailureClass> {
        if self.auth_failed() {
            return Err(FailureClass::Auth);
        }
        if !self.model.is_configured() {
            return Err(FailureClass::Unavailable);
        }

        let timeout = self.config.llm_timeout().min(budget);
        if timeout < self.config.min_llm_window() {
            return Err(FailureClass::BudgetExhausted);
        }

        let Some(permit) = self.breaker.try_acquire() else {
            return Err(FailureClass::CircuitOpen);
        };

        let context = build_context(&retrieval.hits, self.config.context_budget_chars());
        debug!(
            tenant_id = %query.tenant_id,
            included = context.included,
            trimmed = context.trimmed,
            dropped = context.dropped,
            "Built prompt context"
        );
        let mut user = format!("Passages:\n{}\n\n", context.text);
        if off_topic {
            user.push_str(OFF_TOPIC_NOTE);
            user.push_str("\n\n");
        }
        user.push_str(&format!("Question: {}", query.question.trim()));

        let deadline = Instant::now() + timeout;
        let params = params_for(query);
        let mut retries = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let request = CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                user: user.clone(),
                params,
                timeout: remaining,
            };

            let outcome = match tokio::time::timeout(remaining, self.model.complete(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(timeout)),
            };

            match outcome {
                Ok(completion) => {
                    permit.success();
                    return Ok(completion.text);
                }
                Err(LlmError::RateLimited { retry_after })
                    if retries < self.config.rate_limit_retries =>
                {
                    retries += 1;
                    let delay = retry_after
                        .unwrap_or_default()
                        .max(self.config.rate_limit_backoff(retries));
                    if Instant::now() + delay + self.config.min_llm_window() > deadline {
                        permit.failure();
                        return Err(FailureClass::RateLimit);
                    }
                    debug!(
                        tenant_id = %query.tenant_id,
                        retry = retries,
                        "Rate limited, retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let class = e.class();
                    if class == FailureClass::Auth
                        && !self.auth_failed.swap(true, Ordering::SeqCst)
                    {
                        error!(
                            tenant_id = %query.tenant_id,
                            model = self.model.name(),
                            "Language model rejected credentials; all answers will use the \
                             fallback template until the configuration is fixed: {e}"
                        );
                    }
                    permit.failure();
                    return Err(class);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use crate::model::Completion;
    use async_trait::async_trait;
    use helpdesk_retrieval::{QueryShape, RetrievalMethod, SearchHit};
    use helpdesk_vector_index::Document;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    enum Step {
        Reply(&'static str),
        Fail(fn() -> LlmError),
        Hang,
    }

    /// Replays scripted outcomes, repeating the last one.
    struct ScriptedModel {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn complete(&self, request: CompletionRequest) -> crate::Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.user);
            let step = {
                let mut steps = self.steps.lock().unwrap();
                if steps.len() > 1 {
                    steps.pop_front()
                } else {
                    steps.front().map(|s| match s {
                        Step::Reply(t) => Step::Reply(*t),
                        Step::Fail(f) => Step::Fail(*f),
                        Step::Hang => Step::Hang,
                    })
                }
            };
            match step {
                Some(Step::Reply(text)) => Ok(Completion {
                    text: text.to_string(),
                    model: "scripted".to_string(),
                    tokens_used: None,
                }),
                Some(Step::Fail(make)) => Err(make()),
                Some(Step::Hang) | None => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(LlmError::InvalidResponse("unreachable".to_string()))
                }
            }
        }
    }

    fn service(model: Arc<ScriptedModel>) -> SynthesisService {
        SynthesisService::new(
            SynthesisConfig::default(),
            model,
            Arc::new(CircuitBreaker::new(BreakerConfig::default())),
        )
    }

    fn retrieval(best_score: f32) -> Retrieval {
        let hits = ["zanzibar_villa.pdf", "kendwa_resort.pdf", "nungwi_beach.pdf"]
            .iter()
            .map(|label| SearchHit {
                document: Arc::new(Document {
                    id: label.to_string(),
                    text: format!("Beachfront stay at {label}."),
                    source_label: format!("/srv/uploads/{label}"),
                    title: None,
                    embedding: vec![1.0, 0.0],
                    tenant_scope: "acme".to_string(),
                }),
                relevance_score: best_score,
                rerank_score: Some(best_score * 0.6),
            })
            .collect();
        Retrieval {
            hits,
            method: RetrievalMethod::Semantic,
            fallback_reason: None,
            shape: QueryShape::List,
            lambda: Some(0.6),
            best_score,
            threshold_relaxed: false,
            candidates_considered: 3,
            elapsed_ms: 1,
        }
    }

    fn query() -> QueryContext {
        QueryContext::new("acme", "What beach hotels do you have?")
    }

    const BUDGET: Duration = Duration::from_millis(2800);

    #[tokio::test]
    async fn test_llm_answer_with_clean_sources() {
        let model = ScriptedModel::new(vec![Step::Reply("We have three beach stays.")]);
        let result = service(model.clone())
            .synthesize(&query(), &retrieval(0.8), BUDGET)
            .await;

        assert_eq!(result.mode, SynthesisMode::Llm);
        assert_eq!(result.answer, "We have three beach stays.");
        assert_eq!(
            result.sources,
            vec!["Zanzibar Villa", "Kendwa Resort", "Nungwi Beach"]
        );
        assert!(model.prompts.lock().unwrap()[0].contains("[1] Zanzibar Villa"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back_without_retry() {
        let model = ScriptedModel::new(vec![Step::Hang]);
        let service = service(model.clone());

        let started = Instant::now();
        let result = service.synthesize(&query(), &retrieval(0.8), BUDGET).await;

        assert_eq!(result.mode, SynthesisMode::Fallback);
        assert_eq!(result.failure, Some(FailureClass::Timeout));
        assert_eq!(model.calls(), 1);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(2500) && waited < Duration::from_millis(2600));
        assert!(result.answer.contains("Kendwa Resort"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_small_budget_caps_the_call() {
        let model = ScriptedModel::new(vec![Step::Hang]);
        let service = service(model);

        let started = Instant::now();
        let result = service
            .synthesize(&query(), &retrieval(0.8), Duration::from_millis(900))
            .await;

        assert_eq!(result.failure, Some(FailureClass::Timeout));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(900) && waited < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_exhausted_budget_skips_the_model() {
        let model = ScriptedModel::new(vec![Step::Reply("unused")]);
        let result = service(model.clone())
            .synthesize(&query(), &retrieval(0.8), Duration::from_millis(100))
            .await;

        assert_eq!(result.failure, Some(FailureClass::BudgetExhausted));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_is_retried_within_budget() {
        let model = ScriptedModel::new(vec![
            Step::Fail(|| LlmError::RateLimited { retry_after: None }),
            Step::Reply("Second time lucky."),
        ]);
        let result = service(model.clone())
            .synthesize(&query(), &retrieval(0.8), BUDGET)
            .await;

        assert_eq!(result.mode, SynthesisMode::Llm);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_rate_limit_falls_back() {
        let model = ScriptedModel::new(vec![Step::Fail(|| LlmError::RateLimited {
            retry_after: None,
        })]);
        let result = service(model.clone())
            .synthesize(&query(), &retrieval(0.8), BUDGET)
            .await;

        assert_eq!(result.failure, Some(FailureClass::RateLimit));
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_latches_until_cleared() {
        let model = ScriptedModel::new(vec![
            Step::Fail(|| LlmError::Unauthorized { status: 401 }),
            Step::Reply("Back online."),
        ]);
        let service = service(model.clone());

        let first = service.synthesize(&query(), &retrieval(0.8), BUDGET).await;
        let second = service.synthesize(&query(), &retrieval(0.8), BUDGET).await;

        assert_eq!(first.failure, Some(FailureClass::Auth));
        assert_eq!(second.failure, Some(FailureClass::Auth));
        assert_eq!(model.calls(), 1);
        assert_eq!(service.expected_mode(), SynthesisMode::Fallback);

        service.clear_auth_failure();
        let third = service.synthesize(&query(), &retrieval(0.8), BUDGET).await;
        assert_eq!(third.mode, SynthesisMode::Llm);
        assert_eq!(third.answer, "Back online.");
    }

    #[tokio::test]
    async fn test_off_topic_is_acknowledged() {
        let model = ScriptedModel::new(vec![Step::Fail(|| LlmError::Api {
            status: 500,
            message: "down".to_string(),
        })]);
        let q = QueryContext::new("acme", "What is the capital of France?");
        let result = service(model).synthesize(&q, &retrieval(0.05), BUDGET).await;

        assert_eq!(result.mode, SynthesisMode::Fallback);
        assert!(result.answer.contains("don't have specific information"));
        assert!(!result.answer.contains("Beachfront"));
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn test_off_topic_prompt_carries_the_note() {
        let model = ScriptedModel::new(vec![Step::Reply("I don't know that one.")]);
        let q = QueryContext::new("acme", "What is the capital of France?");
        service(model.clone())
            .synthesize(&q, &retrieval(0.05), BUDGET)
            .await;

        assert!(model.prompts.lock().unwrap()[0].contains(OFF_TOPIC_NOTE));
    }

    #[tokio::test]
    async fn test_fallback_is_deterministic() {
        let model = ScriptedModel::new(vec![Step::Fail(|| LlmError::InvalidResponse(
            "empty".to_string(),
        ))]);
        let service = service(model);
        let a = service.synthesize(&query(), &retrieval(0.8), BUDGET).await;
        let b = service.synthesize(&query(), &retrieval(0.8), BUDGET).await;
        assert_eq!(a.answer, b.answer);
        assert_eq!(a.sources, b.sources);
    }
}
