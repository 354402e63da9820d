//! Brute-force exact top-K, the ground truth for recall.
//!
//! Scores every document against the query with the same dot-product kernel
//! the shard indices use. O(N * dim) per query, with no approximation: this is
//! the yardstick for the ANN search being measured, not a competitor to it.

use crate::constants::cache::EXACT_CHUNK_SIZE;
use crate::distance::dot_product;
use crate::error::{Result, ShardKnnError};
use crate::types::{GlobalDocId, ScoredHit};
use crate::vector::VectorSet;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Heap entry ordered so that the *worst* hit sits at the top of a max-heap.
#[derive(Clone, Copy)]
struct WorstFirst(ScoredHit);

impl PartialEq for WorstFirst {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for WorstFirst {}

impl PartialOrd for WorstFirst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorstFirst {
    fn cmp(&self, other: &Self) -> Ordering {
        // rank_cmp says Less for the better hit; a max-heap then peeks the worst.
        self.0.rank_cmp(&other.0)
    }
}

/// Bounded heap keeping the `k` best hits seen so far.
struct TopK {
    k: usize,
    heap: BinaryHeap<WorstFirst>,
}

impl TopK {
    fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    #[inline]
    fn offer(&mut self, hit: ScoredHit) {
        if self.heap.len() < self.k {
            self.heap.push(WorstFirst(hit));
        } else if let Some(worst) = self.heap.peek() {
            if hit.rank_cmp(&worst.0) == Ordering::Less {
                self.heap.pop();
                self.heap.push(WorstFirst(hit));
            }
        }
    }

    fn merge(mut self, other: TopK) -> TopK {
        for entry in other.heap {
            self.offer(entry.0);
        }
        self
    }

    fn into_sorted(self) -> Vec<ScoredHit> {
        let mut hits: Vec<ScoredHit> = self.heap.into_iter().map(|e| e.0).collect();
        hits.sort_by(ScoredHit::rank_cmp);
        hits
    }
}

/// Exact nearest-neighbor oracle over a full, unsharded document collection.
///
/// Document `i` of the collection has global id `i`. The collection is shared
/// read-only, so one oracle can serve any number of query threads.
#[derive(Clone)]
pub struct ExactNn {
    docs: Arc<VectorSet>,
}

impl ExactNn {
    /// Create an oracle over `docs`.
    pub fn new(docs: Arc<VectorSet>) -> Self {
        Self { docs }
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Return true if there are no documents.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Vector dimension.
    pub fn dim(&self) -> usize {
        self.docs.dim()
    }

    /// Global ids of the exact top-`k`, best first.
    ///
    /// `k` is clamped to the document count; `k == 0` returns an empty list.
    pub fn exact_top_k(&self, query: &[f32], k: usize) -> Result<Vec<GlobalDocId>> {
        Ok(self
            .exact_top_k_scored(query, k)?
            .into_iter()
            .map(|hit| hit.id)
            .collect())
    }

    /// Exact top-`k` with scores, best first. Ties break by ascending id.
    pub fn exact_top_k_scored(&self, query: &[f32], k: usize) -> Result<Vec<ScoredHit>> {
        self.check_dim(query)?;
        let k = k.min(self.docs.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut top = TopK::new(k);
        for (i, doc) in self.docs.iter().enumerate() {
            top.offer(ScoredHit::new(i as u64, dot_product(query, doc)));
        }
        Ok(top.into_sorted())
    }

    /// Same result as [`exact_top_k_scored`](Self::exact_top_k_scored), scanning
    /// chunks of the collection in parallel.
    pub fn exact_top_k_parallel(&self, query: &[f32], k: usize) -> Result<Vec<ScoredHit>> {
        self.check_dim(query)?;
        let k = k.min(self.docs.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let dim = self.docs.dim();
        let top = self
            .docs
            .as_flat()
            .par_chunks(EXACT_CHUNK_SIZE * dim)
            .enumerate()
            .map(|(chunk_idx, chunk)| {
                let base = chunk_idx * EXACT_CHUNK_SIZE;
                let mut local = TopK::new(k);
                for (offset, doc) in chunk.chunks_exact(dim).enumerate() {
                    local.offer(ScoredHit::new((base + offset) as u64, dot_product(query, doc)));
                }
                local
            })
            .reduce(|| TopK::new(k), TopK::merge);
        Ok(top.into_sorted())
    }

    /// Ground-truth ids for every query, computed in parallel across queries.
    pub fn batch_exact_top_k(&self, queries: &VectorSet, k: usize) -> Result<Vec<Vec<GlobalDocId>>> {
        (0..queries.len())
            .into_par_iter()
            .map(|q| self.exact_top_k(queries.get(q), k))
            .collect()
    }

    fn check_dim(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.docs.dim() {
            return Err(ShardKnnError::dimension_mismatch(self.docs.dim(), query.len()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny_oracle() -> ExactNn {
        // Scores against the query [1, 0]: 0.9, -1.0, 0.5, 0.99, 0.0
        let docs = VectorSet::from_rows(
            2,
            [
                [0.9f32, 0.435_889_9],
                [-1.0, 0.0],
                [0.5, 0.866_025_4],
                [0.99, 0.141_067_4],
                [0.0, 1.0],
            ],
        )
        .unwrap();
        ExactNn::new(Arc::new(docs))
    }

    #[test]
    fn test_exact_top_k_hand_computed() {
        let oracle = tiny_oracle();
        let ids = oracle.exact_top_k(&[1.0, 0.0], 3).unwrap();
        assert_eq!(ids, vec![GlobalDocId(3), GlobalDocId(0), GlobalDocId(2)]);
    }

    #[test]
    fn test_k_is_clamped_and_zero_is_empty() {
        let oracle = tiny_oracle();
        assert_eq!(oracle.exact_top_k(&[1.0, 0.0], 50).unwrap().len(), 5);
        assert!(oracle.exact_top_k(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let oracle = tiny_oracle();
        assert!(matches!(
            oracle.exact_top_k(&[1.0, 0.0, 0.0], 1),
            Err(ShardKnnError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_ties_break_by_ascending_id() {
        let docs = VectorSet::from_rows(1, [[1.0f32], [1.0], [1.0], [0.5]]).unwrap();
        let oracle = ExactNn::new(Arc::new(docs));
        let ids = oracle.exact_top_k(&[1.0], 2).unwrap();
        assert_eq!(ids, vec![GlobalDocId(0), GlobalDocId(1)]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut rng = StdRng::seed_from_u64(11);
        let docs = VectorSet::random_unit(EXACT_CHUNK_SIZE * 3 + 17, 16, &mut rng);
        let oracle = ExactNn::new(Arc::new(docs));
        let query = VectorSet::random_unit(1, 16, &mut rng);

        let sequential = oracle.exact_top_k_scored(query.get(0), 25).unwrap();
        let parallel = oracle.exact_top_k_parallel(query.get(0), 25).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_batch_matches_single() {
        let mut rng = StdRng::seed_from_u64(5);
        let docs = VectorSet::random_unit(200, 8, &mut rng);
        let queries = VectorSet::random_unit(10, 8, &mut rng);
        let oracle = ExactNn::new(Arc::new(docs));

        let batch = oracle.batch_exact_top_k(&queries, 5).unwrap();
        for (q, ids) in batch.iter().enumerate() {
            assert_eq!(ids, &oracle.exact_top_k(queries.get(q), 5).unwrap());
        }
    }
}
