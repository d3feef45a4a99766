//! Vector math shared by the index and the re-ranker.

use crate::error::{EmbeddingError, Result};

fn same_width(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() == b.len() {
        Ok(())
    } else {
        Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        })
    }
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine of the angle between two vectors, in `[-1, 1]`.
///
/// A zero vector is similar to nothing.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let dot = dot_product(a, b)?;
    let norms = magnitude(a) * magnitude(b);
    if norms == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / norms)
}

/// Dot product. Equals cosine similarity for unit vectors.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    same_width(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Scale to unit length in place. Zero vectors are left alone.
pub fn normalize(embedding: &mut [f32]) {
    let norm = magnitude(embedding);
    if norm > 0.0 {
        embedding.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Map a cosine similarity onto a `[0, 1]` relevance score.
///
/// Negative similarity carries no relevance, so it clamps to zero rather
/// than being shifted; an orthogonal passage must score as irrelevant.
pub fn relevance_score(cosine: f32) -> f32 {
    if cosine.is_nan() {
        return 0.0;
    }
    cosine.clamp(0.0, 1.0)
}

/// Mean cosine similarity over all unordered pairs.
///
/// Returns 0.0 for fewer than two vectors.
pub fn average_pairwise_similarity(vectors: &[&[f32]]) -> Result<f32> {
    let mut total = 0.0f32;
    let mut pairs = 0usize;
    for (i, a) in vectors.iter().enumerate() {
        for b in &vectors[i + 1..] {
            total += cosine_similarity(a, b)?;
            pairs += 1;
        }
    }

    if pairs == 0 {
        return Ok(0.0);
    }
    Ok(total / pairs as f32)
}
