//! Embedding collaborator trait and vector utilities.
//!
//! Concrete clients (OpenAI, Ollama, fastembed) live in the `finrag` app
//! crate. The retriever only needs something that turns texts into vectors.

use anyhow::Result;
use async_trait::async_trait;

/// Turns texts into fixed-dimension vectors.
///
/// Implementations must return exactly one vector per input text, in input
/// order. Transport failures are returned as errors, never as empty vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, and zero-magnitude vectors.
///
/// ```rust
/// use finrag_core::embedding::cosine_similarity;
///
/// assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
/// assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance, `1 - cosine_similarity`. Lower means more similar.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_distance_ordering() {
        let q = [1.0, 0.0];
        let near = cosine_distance(&q, &[0.9, 0.1]);
        let far = cosine_distance(&q, &[0.1, 0.9]);
        assert!(near < far);
        assert!(cosine_distance(&q, &q).abs() < 1e-6);
    }
}
