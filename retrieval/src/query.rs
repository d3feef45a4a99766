//! Request context and question classification.

use serde::{Deserialize, Serialize};

/// Language-model sampling parameters for one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Everything a single helpdesk request carries. Built once, then only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryContext {
    /// Tenant whose corpus is searched.
    pub tenant_id: String,

    /// The question as asked.
    pub question: String,

    /// Number of passages wanted.
    pub top_k: usize,

    /// Minimum relevance for a passage to count.
    pub min_score: f32,

    /// Caller override for sampling parameters; `None` lets the
    /// synthesis layer pick by question shape.
    pub generation_params: Option<GenerationParams>,
}

impl QueryContext {
    /// Create a context with the default `top_k` of 8 and `min_score` of 0.3.
    pub fn new(tenant_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            question: question.into(),
            top_k: 8,
            min_score: 0.3,
            generation_params: None,
        }
    }

    /// Set the number of passages.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the relevance threshold.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Override sampling parameters.
    pub fn with_generation_params(mut self, params: GenerationParams) -> Self {
        self.generation_params = Some(params);
        self
    }

    /// Coarse shape of the question.
    pub fn shape(&self) -> QueryShape {
        QueryShape::classify(&self.question)
    }
}

/// Coarse question shape. Drives re-ranking diversity and sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryShape {
    /// A single fact: a price, a date, a yes/no.
    Factual,

    /// Asks for several options.
    List,

    /// Weighs two or more options against each other.
    Comparison,

    /// Asks what to choose.
    Recommendation,

    /// Anything else.
    General,
}

const COMPARISON_CUES: &[&str] = &[
    "compare",
    "comparison",
    " vs ",
    " vs.",
    "versus",
    "difference between",
    "better than",
    "which is better",
];

const RECOMMENDATION_CUES: &[&str] = &[
    "recommend",
    "suggest",
    "should i",
    "best ",
    "ideal",
    "good for",
    "would you",
];

const LIST_CUES: &[&str] = &[
    "do you have",
    "list",
    "options",
    "show me",
    "what are",
    "which ",
    "any ",
    "all ",
    "available",
];

const FACTUAL_CUES: &[&str] = &[
    "how much",
    "price",
    "cost",
    " rate",
    " fee",
    "when ",
    "what time",
    "how many",
    "how long",
    "what is",
    "is there",
    "does ",
    "do i need",
];

impl QueryShape {
    /// Classify a question by keyword cues. Deterministic, no model call.
    pub fn classify(question: &str) -> Self {
        let q = format!(" {} ", question.trim().to_lowercase());
        let has = |cues: &[&str]| cues.iter().any(|cue| q.contains(cue));

        if has(COMPARISON_CUES) {
            Self::Comparison
        } else if has(RECOMMENDATION_CUES) {
            Self::Recommendation
        } else if has(LIST_CUES) {
            Self::List
        } else if has(FACTUAL_CUES) {
            Self::Factual
        } else {
            Self::General
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::List => "list",
            Self::Comparison => "comparison",
            Self::Recommendation => "recommendation",
            Self::General => "general",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_shapes() {
        assert_eq!(
            QueryShape::classify("What hotels do you have in Zanzibar with beach access?"),
            QueryShape::List
        );
        assert_eq!(
            QueryShape::classify("What is the capital of France?"),
            QueryShape::Factual
        );
        assert_eq!(
            QueryShape::classify("How much is a night at the Serengeti lodge?"),
            QueryShape::Factual
        );
        assert_eq!(
            QueryShape::classify("Compare the Kendwa and Nungwi resorts"),
            QueryShape::Comparison
        );
        assert_eq!(
            QueryShape::classify("Safari lodge vs beach villa for a honeymoon"),
            QueryShape::Comparison
        );
        assert_eq!(
            QueryShape::classify("Can you recommend a family-friendly safari?"),
            QueryShape::Recommendation
        );
        assert_eq!(QueryShape::classify("Tell me about Pemba"), QueryShape::General);
    }

    #[test]
    fn test_context_builder() {
        let ctx = QueryContext::new("acme", "hi")
            .with_top_k(5)
            .with_min_score(0.5)
            .with_generation_params(GenerationParams {
                temperature: 0.1,
                max_tokens: 64,
            });

        assert_eq!(ctx.top_k, 5);
        assert_eq!(ctx.min_score, 0.5);
        assert_eq!(ctx.generation_params.map(|p| p.max_tokens), Some(64));
    }
}
