//! Similarity computation with scalar and SIMD implementations.
//!
//! Scores are similarities: higher means closer. The public API picks the
//! fastest available dot-product kernel at runtime.

pub mod scalar;
pub mod simd;

use serde::{Deserialize, Serialize};

pub use simd::dot_product;

/// Similarity functions a shard index can be built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Similarity {
    /// Raw dot product. Equals cosine similarity on unit vectors.
    #[default]
    DotProduct,
    /// Cosine similarity, normalizing both operands on the fly.
    Cosine,
}

impl Similarity {
    /// Compute the similarity between two vectors using this function.
    ///
    /// # Panics
    /// Panics if the vectors have different dimensions.
    #[inline]
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Similarity::DotProduct => dot_product(a, b),
            Similarity::Cosine => scalar::cosine_similarity(a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product_similarity() {
        let a = vec![1.0, 2.0];
        let b = vec![3.0, -1.0];
        assert!((Similarity::DotProduct.score(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_matches_dot_on_unit_vectors() {
        let a = vec![0.6, 0.8];
        let b = vec![0.8, 0.6];
        let dot = Similarity::DotProduct.score(&a, &b);
        let cos = Similarity::Cosine.score(&a, &b);
        assert!((dot - cos).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_ignores_magnitude() {
        let a = vec![2.0, 0.0];
        let b = vec![5.0, 0.0];
        assert!((Similarity::Cosine.score(&a, &b) - 1.0).abs() < 1e-6);
    }
}
