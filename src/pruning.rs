//! Shared pruning state for collaborative multi-shard search.
//!
//! One [`SharedPruningState`] lives for the duration of a single query. Every
//! shard owns one slot and overwrites it with its best hits so far; any shard
//! may read all slots to compute the current global K-th best score, which is
//! a lower bound on the final global K-th score. A shard can stop exploring
//! candidates that score below that bound.
//!
//! ```text
//! shard 0 ──store──▶ [slot 0: Arc<ShardSnapshot>] ─┐
//! shard 1 ──store──▶ [slot 1: Arc<ShardSnapshot>] ─┼─load all──▶ K-th best score
//! shard 2 ──store──▶ [slot 2: Arc<ShardSnapshot>] ─┘
//! ```
//!
//! Slots are independent [`ArcSwap`] cells, so readers never block writers and
//! a reader always sees a complete snapshot of each slot.

use crate::types::ScoredHit;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Immutable copy of one shard's published hits, best first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardSnapshot {
    hits: Vec<ScoredHit>,
}

impl ShardSnapshot {
    /// Copy `hits` into a new snapshot.
    pub fn from_hits(hits: &[ScoredHit]) -> Self {
        Self { hits: hits.to_vec() }
    }

    /// The published hits.
    pub fn hits(&self) -> &[ScoredHit] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Per-query, per-shard slots of published hits.
pub struct SharedPruningState {
    slots: Vec<ArcSwap<ShardSnapshot>>,
}

impl SharedPruningState {
    /// Create `num_shards` empty slots.
    pub fn new(num_shards: usize) -> Self {
        Self {
            slots: (0..num_shards)
                .map(|_| ArcSwap::from_pointee(ShardSnapshot::default()))
                .collect(),
        }
    }

    /// Replace shard `shard`'s slot with a copy of `hits`.
    ///
    /// Out-of-range shard indices are ignored.
    pub fn update(&self, shard: usize, hits: &[ScoredHit]) {
        if let Some(slot) = self.slots.get(shard) {
            slot.store(Arc::new(ShardSnapshot::from_hits(hits)));
        }
    }

    /// K-th best score across every slot, or `f32::NEG_INFINITY` when fewer
    /// than `k` hits have been published (or `k == 0`).
    ///
    /// Slots are read one at a time; the result reflects whatever each slot
    /// held when it was read.
    pub fn global_min_top_k_score(&self, k: usize) -> f32 {
        if k == 0 {
            return f32::NEG_INFINITY;
        }

        let mut scores: Vec<f32> = Vec::new();
        for slot in &self.slots {
            let snapshot = slot.load();
            scores.extend(snapshot.hits.iter().map(|hit| hit.score));
        }
        if scores.len() < k {
            return f32::NEG_INFINITY;
        }

        // Partition so that index k-1 holds the K-th largest score.
        let (_, kth, _) = scores.select_nth_unstable_by(k - 1, |a, b| b.total_cmp(a));
        *kth
    }

    /// Number of slots.
    pub fn num_shards(&self) -> usize {
        self.slots.len()
    }

    /// Current contents of shard `shard`'s slot, if the index is in range.
    pub fn snapshot(&self, shard: usize) -> Option<Arc<ShardSnapshot>> {
        self.slots.get(shard).map(|slot| slot.load_full())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn hits(scores: &[f32], first_id: u64) -> Vec<ScoredHit> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| ScoredHit::new(first_id + i as u64, s))
            .collect()
    }

    #[test]
    fn test_three_shard_example() {
        let state = SharedPruningState::new(3);
        state.update(0, &hits(&[0.9, 0.8, 0.7], 0));
        state.update(1, &hits(&[0.85, 0.6], 10));
        state.update(2, &[]);

        assert_eq!(state.global_min_top_k_score(3), 0.8);
        assert_eq!(state.global_min_top_k_score(1), 0.9);
        assert_eq!(state.global_min_top_k_score(5), 0.6);
    }

    #[test]
    fn test_too_few_hits_is_unbounded() {
        let state = SharedPruningState::new(2);
        assert_eq!(state.global_min_top_k_score(1), f32::NEG_INFINITY);

        state.update(0, &hits(&[0.5, 0.4], 0));
        assert_eq!(state.global_min_top_k_score(3), f32::NEG_INFINITY);
        assert_eq!(state.global_min_top_k_score(0), f32::NEG_INFINITY);
    }

    #[test]
    fn test_out_of_range_update_ignored() {
        let state = SharedPruningState::new(2);
        state.update(2, &hits(&[1.0], 0));
        state.update(usize::MAX, &hits(&[1.0], 0));
        assert_eq!(state.global_min_top_k_score(1), f32::NEG_INFINITY);
        assert!(state.snapshot(2).is_none());
        assert_eq!(state.num_shards(), 2);
    }

    #[test]
    fn test_update_replaces_slot() {
        let state = SharedPruningState::new(1);
        state.update(0, &hits(&[0.3], 0));
        state.update(0, &hits(&[0.9, 0.7], 0));

        let snapshot = state.snapshot(0).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(state.global_min_top_k_score(2), 0.7);
    }

    #[test]
    fn test_bound_never_exceeds_true_kth_and_only_rises() {
        let mut rng = StdRng::seed_from_u64(17);
        let k = 5;
        let num_shards = 4;
        let truth: Vec<Vec<f32>> = (0..num_shards)
            .map(|_| {
                let mut s: Vec<f32> = (0..20).map(|_| rng.gen_range(-1.0..1.0)).collect();
                s.sort_by(|a, b| b.total_cmp(a));
                s
            })
            .collect();
        let mut all: Vec<f32> = truth.iter().flatten().copied().collect();
        all.sort_by(|a, b| b.total_cmp(a));
        let true_kth = all[k - 1];

        // Shards reveal growing prefixes of their sorted results.
        let state = SharedPruningState::new(num_shards);
        let mut previous = f32::NEG_INFINITY;
        for prefix in 1..=20 {
            for (shard, scores) in truth.iter().enumerate() {
                state.update(shard, &hits(&scores[..prefix], shard as u64 * 100));
                let bound = state.global_min_top_k_score(k);
                assert!(bound <= true_kth);
                assert!(bound >= previous);
                previous = bound;
            }
        }
        assert_eq!(previous, true_kth);
    }

    #[test]
    fn test_concurrent_updates_and_reads() {
        let state = SharedPruningState::new(4);
        std::thread::scope(|scope| {
            for shard in 0..4 {
                let state = &state;
                scope.spawn(move || {
                    for round in 0..200 {
                        let score = round as f32 / 200.0;
                        state.update(shard, &hits(&[score], shard as u64));
                        let bound = state.global_min_top_k_score(2);
                        assert!(bound == f32::NEG_INFINITY || (0.0..1.0).contains(&bound));
                    }
                });
            }
        });
        assert!(state.global_min_top_k_score(4) > 0.9);
    }
}
