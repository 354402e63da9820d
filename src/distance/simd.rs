//! SIMD dot-product kernels with runtime dispatch.
//!
//! - **AVX-512** (x86_64, `avx512` feature, nightly): 16 lanes
//! - **AVX2+FMA** (x86_64): two 8-lane accumulators
//! - **NEON** (aarch64): two 4-lane accumulators
//! - **Scalar**: everything else
//!
//! Every path accumulates in a different order, so results may differ from
//! the scalar kernel in the last bits. Shards and the exact oracle both score
//! through [`dot_product`], so their rankings stay comparable.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

use super::scalar;

/// Sum of the remaining elements from `from` on.
#[inline(always)]
fn tail(a: &[f32], b: &[f32], from: usize) -> f32 {
    a[from..].iter().zip(&b[from..]).map(|(x, y)| x * y).sum()
}

/// # Safety
/// The CPU must support AVX-512F.
#[cfg(all(target_arch = "x86_64", feature = "avx512"))]
#[target_feature(enable = "avx512f")]
pub unsafe fn dot_product_avx512(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let blocks = a.len() / 16;
    let mut acc = _mm512_setzero_ps();
    for block in 0..blocks {
        let at = block * 16;
        acc = _mm512_fmadd_ps(
            _mm512_loadu_ps(a.as_ptr().add(at)),
            _mm512_loadu_ps(b.as_ptr().add(at)),
            acc,
        );
    }
    _mm512_reduce_add_ps(acc) + tail(a, b, blocks * 16)
}

/// Horizontal sum of the eight lanes of `v`.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn hsum256(v: __m256) -> f32 {
    let quad = _mm_add_ps(_mm256_castps256_ps128(v), _mm256_extractf128_ps(v, 1));
    let pair = _mm_add_ps(quad, _mm_movehl_ps(quad, quad));
    let single = _mm_add_ss(pair, _mm_shuffle_ps(pair, pair, 0b01));
    _mm_cvtss_f32(single)
}

/// # Safety
/// The CPU must support AVX2 and FMA.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
pub unsafe fn dot_product_avx2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let (pa, pb) = (a.as_ptr(), b.as_ptr());
    let mut even = _mm256_setzero_ps();
    let mut odd = _mm256_setzero_ps();

    let pairs = a.len() / 16;
    for pair in 0..pairs {
        let at = pair * 16;
        even = _mm256_fmadd_ps(_mm256_loadu_ps(pa.add(at)), _mm256_loadu_ps(pb.add(at)), even);
        odd = _mm256_fmadd_ps(_mm256_loadu_ps(pa.add(at + 8)), _mm256_loadu_ps(pb.add(at + 8)), odd);
    }
    let mut done = pairs * 16;
    if a.len() - done >= 8 {
        even = _mm256_fmadd_ps(_mm256_loadu_ps(pa.add(done)), _mm256_loadu_ps(pb.add(done)), even);
        done += 8;
    }

    hsum256(_mm256_add_ps(even, odd)) + tail(a, b, done)
}

/// NEON is baseline on aarch64, so this needs no runtime check.
#[cfg(target_arch = "aarch64")]
pub fn dot_product_neon(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let pairs = a.len() / 8;
    // SAFETY: every load reads 4 floats starting below `pairs * 8 <= len`.
    unsafe {
        let (pa, pb) = (a.as_ptr(), b.as_ptr());
        let mut even = vdupq_n_f32(0.0);
        let mut odd = vdupq_n_f32(0.0);
        for pair in 0..pairs {
            let at = pair * 8;
            even = vfmaq_f32(even, vld1q_f32(pa.add(at)), vld1q_f32(pb.add(at)));
            odd = vfmaq_f32(odd, vld1q_f32(pa.add(at + 4)), vld1q_f32(pb.add(at + 4)));
        }
        vaddvq_f32(vaddq_f32(even, odd)) + tail(a, b, pairs * 8)
    }
}

/// Dot product using the fastest kernel the CPU supports.
///
/// # Panics
/// Panics if the slices differ in length.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    #[cfg(target_arch = "x86_64")]
    {
        #[cfg(feature = "avx512")]
        {
            if is_x86_feature_detected!("avx512f") {
                // SAFETY: AVX-512F support was just verified.
                return unsafe { dot_product_avx512(a, b) };
            }
        }
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            // SAFETY: AVX2 and FMA support was just verified.
            return unsafe { dot_product_avx2(a, b) };
        }
        return scalar::dot_product(a, b);
    }

    #[cfg(target_arch = "aarch64")]
    {
        return dot_product_neon(a, b);
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    scalar::dot_product(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_matches_scalar() {
        // Lengths around every block boundary of every kernel.
        for dim in [1usize, 7, 8, 9, 15, 16, 17, 24, 31, 33, 128, 1000] {
            let a: Vec<f32> = (0..dim).map(|i| (i as f32 * 0.37).sin()).collect();
            let b: Vec<f32> = (0..dim).map(|i| (i as f32 * 0.11).cos()).collect();
            let diff = (dot_product(&a, &b) - scalar::dot_product(&a, &b)).abs();
            assert!(diff < 1e-3, "dim {}: diff {}", dim, diff);
        }
    }

    #[test]
    fn test_dispatch_is_deterministic() {
        let a: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let b: Vec<f32> = (0..100).map(|i| 1.0 - i as f32 / 100.0).collect();
        assert_eq!(dot_product(&a, &b).to_bits(), dot_product(&a, &b).to_bits());
    }

    #[test]
    #[should_panic(expected = "Vector dimensions must match")]
    fn test_length_mismatch_panics() {
        dot_product(&[1.0, 2.0], &[1.0]);
    }
}
