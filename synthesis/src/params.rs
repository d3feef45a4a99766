//! Sampling parameters by question shape.

use helpdesk_retrieval::{GenerationParams, QueryContext, QueryShape};

/// Fixed lookup: short, low-temperature answers for facts; longer, looser
/// ones for lists, comparisons and recommendations.
pub fn generation_params(shape: QueryShape) -> GenerationParams {
    match shape {
        QueryShape::Factual => GenerationParams {
            temperature: 0.2,
            max_tokens: 300,
        },
        QueryShape::List | QueryShape::Comparison | QueryShape::Recommendation => {
            GenerationParams {
                temperature: 0.7,
                max_tokens: 700,
            }
        }
        QueryShape::General => GenerationParams {
            temperature: 0.4,
            max_tokens: 500,
        },
    }
}

/// Caller override if present, otherwise the lookup for the question's shape.
pub fn params_for(query: &QueryContext) -> GenerationParams {
    query
        .generation_params
        .unwrap_or_else(|| generation_params(query.shape()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_price_question_is_short_and_cold() {
        let params = params_for(&QueryContext::new("acme", "How much is the Kendwa villa?"));
        assert_eq!(params.max_tokens, 300);
        assert!(params.temperature < 0.3);
    }

    #[test]
    fn test_override_wins() {
        let custom = GenerationParams {
            temperature: 0.0,
            max_tokens: 10,
        };
        let query = QueryContext::new("acme", "Recommend a lodge").with_generation_params(custom);
        assert_eq!(params_for(&query), custom);
    }
}
