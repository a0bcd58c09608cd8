//! Embedding producer contract.
//!
//! The embedding function is an external collaborator: production
//! deployments plug in a model-backed implementation, while
//! [`HashEmbedder`] provides a deterministic lexical-overlap fallback
//! for the CLI and tests. Embedding calls are suspension points, so the
//! trait is async even though the fallback computes synchronously.

mod fallback;

pub use fallback::HashEmbedder;

use async_trait::async_trait;

use crate::error::RetrievalError;

/// Default embedding dimensions for the reference embedder.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for embedding producers.
///
/// Implementations must be deterministic for a given input (up to
/// backend stability) and thread-safe.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the fixed embedding dimension.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Embedding`] if generation fails; the
    /// caller treats this as a retrieval failure for the query.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

/// Computes cosine similarity between two embedding vectors.
///
/// Returns a value between -1.0 (opposite) and 1.0 (identical), or 0.0
/// for mismatched lengths or zero-magnitude vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_different_lengths() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }
}
