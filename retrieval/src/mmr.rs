//! Maximal Marginal Relevance re-ranking.
//!
//! Each round selects the candidate maximizing
//! `λ · relevance − (1 − λ) · max_similarity_to_selected`.
//! Lower λ favors novelty, so near-duplicate passages stop crowding out
//! distinct options. Cost is `O(n · k)` similarity evaluations over `n`
//! candidates.

use std::cmp::Ordering;

use helpdesk_embeddings::{average_pairwise_similarity, cosine_similarity};
use tracing::debug;

use crate::hit::SearchHit;

/// Re-rank `candidates` and return the best `k`, each tagged with its MMR score.
///
/// Ties go to the more relevant candidate, then the smaller document id.
/// Greedy selection can still land on a more redundant set than plain
/// relevance order; when it does, the relevance order is returned instead,
/// scored the same way.
pub fn rerank(candidates: Vec<SearchHit>, k: usize, lambda: f32) -> Vec<SearchHit> {
    let lambda = lambda.clamp(0.0, 1.0);
    let mut by_relevance = candidates.clone();
    by_relevance.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.document.id.cmp(&b.document.id))
    });
    by_relevance.truncate(k);

    let selected = select(candidates, k, lambda);
    if redundancy(&selected) > redundancy(&by_relevance) + 1e-6 {
        debug!(k, lambda, "MMR set more redundant than relevance order, keeping relevance order");
        return score_in_order(by_relevance, lambda);
    }
    selected
}

fn select(candidates: Vec<SearchHit>, k: usize, lambda: f32) -> Vec<SearchHit> {
    let mut remaining: Vec<(SearchHit, f32)> = candidates
        .into_iter()
        .map(|hit| (hit, f32::NEG_INFINITY))
        .collect();
    let mut selected: Vec<SearchHit> = Vec::with_capacity(k.min(remaining.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best: Option<(usize, f32)> = None;
        for (i, (hit, max_sim)) in remaining.iter().enumerate() {
            let redundancy = if selected.is_empty() { 0.0 } else { *max_sim };
            let score = lambda * hit.relevance_score - (1.0 - lambda) * redundancy;
            let better = match best {
                None => true,
                Some((j, best_score)) => {
                    match score.partial_cmp(&best_score).unwrap_or(Ordering::Equal) {
                        Ordering::Greater => true,
                        Ordering::Less => false,
                        Ordering::Equal => prefer(hit, &remaining[j].0),
                    }
                }
            };
            if better {
                best = Some((i, score));
            }
        }

        let Some((index, score)) = best else {
            break;
        };
        let (mut chosen, _) = remaining.swap_remove(index);
        chosen.rerank_score = Some(score);

        for (hit, max_sim) in remaining.iter_mut() {
            let sim = similarity(hit, &chosen);
            if sim > *max_sim {
                *max_sim = sim;
            }
        }
        selected.push(chosen);
    }

    selected
}

/// Tag hits with the MMR score they get when picked in the given order.
fn score_in_order(mut hits: Vec<SearchHit>, lambda: f32) -> Vec<SearchHit> {
    for i in 0..hits.len() {
        let max_sim = hits[..i]
            .iter()
            .map(|earlier| similarity(&hits[i], earlier))
            .fold(None, |acc: Option<f32>, sim| Some(acc.map_or(sim, |m| m.max(sim))))
            .unwrap_or(0.0);
        hits[i].rerank_score = Some(lambda * hits[i].relevance_score - (1.0 - lambda) * max_sim);
    }
    hits
}

fn similarity(a: &SearchHit, b: &SearchHit) -> f32 {
    cosine_similarity(&a.document.embedding, &b.document.embedding).unwrap_or(0.0)
}

/// Average pairwise similarity. Mismatched widths count as unrelated.
fn redundancy(hits: &[SearchHit]) -> f32 {
    let vectors: Vec<&[f32]> = hits.iter().map(|h| h.document.embedding.as_slice()).collect();
    average_pairwise_similarity(&vectors).unwrap_or(0.0)
}

fn prefer(a: &SearchHit, b: &SearchHit) -> bool {
    match a
        .relevance_score
        .partial_cmp(&b.relevance_score)
        .unwrap_or(Ordering::Equal)
    {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => a.document.id < b.document.id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_vector_index::Document;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn hit(id: &str, relevance: f32, embedding: Vec<f32>) -> SearchHit {
        SearchHit {
            document: Arc::new(Document {
                id: id.to_string(),
                text: String::new(),
                source_label: String::new(),
                title: None,
                embedding,
                tenant_scope: "acme".to_string(),
            }),
            relevance_score: relevance,
            rerank_score: None,
        }
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(SearchHit::document_ref).collect()
    }

    fn avg_similarity(hits: &[SearchHit]) -> f32 {
        let vectors: Vec<&[f32]> = hits.iter().map(|h| h.document.embedding.as_slice()).collect();
        average_pairwise_similarity(&vectors).unwrap()
    }

    fn near_duplicate_pool() -> Vec<SearchHit> {
        vec![
            hit("villa-a", 0.92, vec![1.0, 0.0, 0.0]),
            hit("villa-a-copy", 0.91, vec![0.99, 0.14, 0.0]),
            hit("villa-a-copy-2", 0.90, vec![0.98, 0.0, 0.2]),
            hit("lodge", 0.80, vec![0.0, 1.0, 0.0]),
            hit("resort", 0.75, vec![0.0, 0.0, 1.0]),
        ]
    }

    #[test]
    fn test_first_pick_is_most_relevant() {
        let ranked = rerank(near_duplicate_pool(), 3, 0.6);
        assert_eq!(ranked[0].document_ref(), "villa-a");
        assert!((ranked[0].rerank_score.unwrap() - 0.6 * 0.92).abs() < 1e-6);
    }

    #[test]
    fn test_near_duplicates_give_way_to_distinct_options() {
        let ranked = rerank(near_duplicate_pool(), 3, 0.6);
        assert_eq!(ids(&ranked), vec!["villa-a", "lodge", "resort"]);
    }

    #[test]
    fn test_rerank_never_increases_redundancy() {
        let pool = near_duplicate_pool();
        let raw_top: Vec<SearchHit> = pool.iter().take(3).cloned().collect();
        for lambda in [0.6, 0.7, 0.8] {
            let ranked = rerank(pool.clone(), 3, lambda);
            assert!(avg_similarity(&ranked) <= avg_similarity(&raw_top) + 1e-6);
        }
    }

    #[test]
    fn test_duplicate_pair_keeps_relevance_order_when_mmr_is_worse() {
        // "2" and "0" are near-identical; MMR skips "2" then drifts onto "9",
        // which sits close to both "3" and "0".
        let pool = vec![
            hit("3", 0.95, vec![0.6, 0.8, 0.0]),
            hit("2", 0.90, vec![0.99, 0.0, 0.1]),
            hit("0", 0.85, vec![1.0, 0.0, 0.05]),
            hit("9", 0.70, vec![0.8, 0.6, 0.05]),
            hit("7", 0.68, vec![0.0, 0.1, 1.0]),
        ];
        let mut raw = pool.clone();
        raw.truncate(3);

        let ranked = rerank(pool, 3, 0.6);
        assert!(avg_similarity(&ranked) <= avg_similarity(&raw) + 1e-6);
        assert!(ranked.iter().all(|h| h.rerank_score.is_some()));
    }

    #[test]
    fn test_rerank_never_increases_redundancy_over_generated_pools() {
        // Small deterministic LCG so pools vary without a rand dependency.
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            ((state >> 33) as f32) / ((1u64 << 31) as f32)
        };

        for round in 0..200 {
            let size = 3 + round % 8;
            let mut pool: Vec<SearchHit> = Vec::with_capacity(size);
            for i in 0..size {
                let embedding = if i > 0 && next() < 0.4 {
                    // Near-duplicate of an earlier candidate.
                    let base = &pool[(next() * i as f32) as usize % i].document.embedding;
                    base.iter().map(|x| x + (next() - 0.5) * 0.05).collect()
                } else {
                    (0..4).map(|_| next()).collect()
                };
                pool.push(hit(&format!("d{i}"), 0.3 + 0.7 * next(), embedding));
            }

            let mut raw = pool.clone();
            raw.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
            for k in [2, 3, 5] {
                let raw_top: Vec<SearchHit> = raw.iter().take(k).cloned().collect();
                for lambda in [0.6, 0.7, 0.8] {
                    let ranked = rerank(pool.clone(), k, lambda);
                    assert_eq!(ranked.len(), raw_top.len());
                    assert!(
                        avg_similarity(&ranked) <= avg_similarity(&raw_top) + 1e-5,
                        "round {round} k {k} lambda {lambda}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_lambda_one_is_pure_relevance() {
        let ranked = rerank(near_duplicate_pool(), 3, 1.0);
        assert_eq!(ids(&ranked), vec!["villa-a", "villa-a-copy", "villa-a-copy-2"]);
    }

    #[test]
    fn test_ties_break_by_relevance_then_id() {
        let pool = vec![
            hit("b", 0.5, vec![1.0, 0.0]),
            hit("a", 0.5, vec![0.0, 1.0]),
        ];
        let ranked = rerank(pool, 2, 0.7);
        assert_eq!(ids(&ranked), vec!["a", "b"]);
    }

    #[test]
    fn test_k_larger_than_pool() {
        let ranked = rerank(near_duplicate_pool(), 10, 0.7);
        assert_eq!(ranked.len(), 5);
        assert!(rerank(Vec::new(), 3, 0.7).is_empty());
    }
}
