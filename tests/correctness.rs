//! Correctness tests: SIMD kernels against scalar baselines, and the HNSW
//! shard index and parallel oracle against the sequential exact scan.
//!
//! Run with: cargo test

use rand::rngs::StdRng;
use rand::SeedableRng;
use shard_knn::distance::{scalar, simd};
use shard_knn::{ExactNn, HnswIndex, HnswParams, Similarity, Vector, VectorSet};
use std::sync::Arc;

#[test]
fn test_dot_product_simd_matches_scalar() {
    // Test various dimensions including edge cases
    let dims = vec![1, 7, 8, 15, 16, 64, 128, 256, 1024];
    let mut rng = StdRng::seed_from_u64(1);

    for dim in dims {
        let v1 = Vector::random_unit(1u64, dim, &mut rng);
        let v2 = Vector::random_unit(2u64, dim, &mut rng);

        let scalar_result = scalar::dot_product(&v1.data, &v2.data);
        let simd_result = simd::dot_product(&v1.data, &v2.data);
        let diff = (scalar_result - simd_result).abs();

        assert!(
            diff < 1e-5,
            "Dot product mismatch at dim {}: scalar={}, simd={}, diff={}",
            dim,
            scalar_result,
            simd_result,
            diff
        );
    }
}

#[test]
fn test_cosine_equals_dot_on_unit_vectors() {
    let mut rng = StdRng::seed_from_u64(2);
    for dim in [3, 64, 384] {
        let v1 = Vector::random_unit(1u64, dim, &mut rng);
        let v2 = Vector::random_unit(2u64, dim, &mut rng);
        let dot = Similarity::DotProduct.score(&v1.data, &v2.data);
        let cos = Similarity::Cosine.score(&v1.data, &v2.data);
        assert!((dot - cos).abs() < 1e-5, "dim {}: dot={}, cos={}", dim, dot, cos);
    }
}

#[test]
fn test_parallel_oracle_matches_sequential() {
    let mut rng = StdRng::seed_from_u64(3);
    let docs = Arc::new(VectorSet::random_unit(5_000, 32, &mut rng));
    let queries = VectorSet::random_unit(10, 32, &mut rng);
    let oracle = ExactNn::new(docs);

    for query in queries.iter() {
        let sequential = oracle.exact_top_k_scored(query, 25).unwrap();
        let parallel = oracle.exact_top_k_parallel(query, 25).unwrap();
        assert_eq!(sequential, parallel);
    }

    let batch = oracle.batch_exact_top_k(&queries, 25).unwrap();
    assert_eq!(batch.len(), 10);
    assert_eq!(batch[0], oracle.exact_top_k(queries.get(0), 25).unwrap());
}

#[test]
fn test_hnsw_recall_against_oracle() {
    let mut rng = StdRng::seed_from_u64(4);
    let docs = VectorSet::random_unit(2_000, 32, &mut rng);
    let queries = VectorSet::random_unit(50, 32, &mut rng);
    let k = 10;

    let index = HnswIndex::build(&docs, 0, HnswParams::default()).unwrap();
    let oracle = ExactNn::new(Arc::new(docs));

    let mut total = 0.0;
    for query in queries.iter() {
        let found: Vec<_> = index.search(query, k).into_iter().map(|hit| hit.id).collect();
        let exact = oracle.exact_top_k(query, k).unwrap();
        total += shard_knn::recall_at_k(&found, &exact, k);
    }
    let recall = total / queries.len() as f64;
    assert!(recall > 0.9, "HNSW recall@{} too low: {:.3}", k, recall);
}
