//! The per-shard search capability.
//!
//! The coordinator never looks inside a shard: it only needs to know how many
//! documents a shard holds and how to run a top-K query against it, optionally
//! under a pruning bound. Anything implementing [`ShardIndex`] can serve as a
//! shard, which is also how tests inject slow or failing shards.

use crate::error::Result;
use crate::types::ScoredHit;

/// Cross-shard pruning bound seen from inside one shard's search.
///
/// Implementations must be cheap to call repeatedly and safe to share with
/// other threads searching the same query.
pub trait ScoreBound: Sync {
    /// Current bound: a candidate scoring below it cannot enter the global top-K.
    ///
    /// `f32::NEG_INFINITY` means nothing can be pruned yet.
    fn current(&self) -> f32;

    /// Push this shard's best hits found so far, best first.
    fn publish(&self, hits: &[ScoredHit]);
}

/// A bound that never prunes and drops published hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBound;

impl ScoreBound for NoBound {
    fn current(&self) -> f32 {
        f32::NEG_INFINITY
    }

    fn publish(&self, _hits: &[ScoredHit]) {}
}

/// Result of one shard-local top-K query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardHits {
    /// Up to `k` hits with global ids, best first.
    pub hits: Vec<ScoredHit>,
    /// Nodes whose similarity was computed, or `None` if the index cannot tell.
    ///
    /// `None` is "not measured", which is different from `Some(0)`.
    pub visited: Option<u64>,
}

/// An opened, read-only shard that can answer top-K similarity queries.
///
/// # Thread Safety
///
/// Searches take `&self` and may run concurrently from any number of threads.
pub trait ShardIndex: Send + Sync {
    /// Top-`k` documents of this shard by descending similarity.
    ///
    /// With a `bound`, the index may stop exploring candidates that cannot beat
    /// it and may push partial results through [`ScoreBound::publish`].
    fn search(&self, query: &[f32], k: usize, bound: Option<&dyn ScoreBound>) -> Result<ShardHits>;

    /// Number of documents in the shard.
    fn num_docs(&self) -> usize;

    /// Dimensionality of the shard's vectors.
    fn dimension(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_bound_never_prunes() {
        let bound = NoBound;
        bound.publish(&[ScoredHit::new(1u64, 0.5)]);
        assert_eq!(bound.current(), f32::NEG_INFINITY);
    }

    #[test]
    fn test_default_hits_visited_unknown() {
        let hits = ShardHits::default();
        assert!(hits.hits.is_empty());
        assert_eq!(hits.visited, None);
    }
}
