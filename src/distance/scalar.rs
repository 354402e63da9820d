//! Portable similarity kernels: the reference the SIMD paths are checked
//! against, and the fallback on targets without them.

/// `sum(a[i] * b[i])`.
///
/// # Panics
/// Panics if the slices differ in length.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");
    a.iter().zip(b).fold(0.0f32, |acc, (x, y)| acc + x * y)
}

/// `dot(a, b) / (|a| * |b|)`; 0.0 if either side has zero norm.
///
/// # Panics
/// Panics if the slices differ in length.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, aa, bb), (&x, &y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });

    let norms = aa.sqrt() * bb.sqrt();
    if norms == 0.0 {
        return 0.0;
    }
    dot / norms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product_by_hand() {
        assert!((dot_product(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]) - 32.0).abs() < 1e-6);
        assert_eq!(dot_product(&[], &[]), 0.0);
    }

    #[test]
    fn test_cosine_orthogonal_and_parallel() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[2.0, 2.0], &[0.5, 0.5]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
