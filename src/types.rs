//! Core newtypes shared by the shard indices, the oracle and the coordinator.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Position of a document in the logical, unsharded document sequence.
///
/// Shards own disjoint ranges of global ids, so a merged result never
/// contains the same id twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct GlobalDocId(pub u64);

impl GlobalDocId {
    /// Create a new GlobalDocId.
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GlobalDocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for GlobalDocId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<GlobalDocId> for u64 {
    #[inline]
    fn from(id: GlobalDocId) -> Self {
        id.0
    }
}

/// A document id with its similarity to the query. Higher scores rank first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredHit {
    /// Global id of the matched document.
    pub id: GlobalDocId,
    /// Similarity to the query (dot product on unit vectors).
    pub score: f32,
}

impl ScoredHit {
    /// Create a new ScoredHit.
    #[inline]
    pub fn new(id: impl Into<GlobalDocId>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }

    /// Ranking order: descending score, then ascending id.
    ///
    /// `Ordering::Less` means `self` ranks ahead of `other`. Sorting with this
    /// comparator yields the same sequence regardless of input order.
    #[inline]
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl From<(u64, f32)> for ScoredHit {
    fn from(tuple: (u64, f32)) -> Self {
        Self::new(tuple.0, tuple.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_doc_id() {
        let id = GlobalDocId::new(42);
        assert_eq!(id.as_u64(), 42);
        assert_eq!(format!("{}", id), "42");

        let id2: GlobalDocId = 100u64.into();
        assert_eq!(id2.as_u64(), 100);

        let raw: u64 = id.into();
        assert_eq!(raw, 42);
    }

    #[test]
    fn test_rank_cmp_orders_by_score_then_id() {
        let mut hits = vec![
            ScoredHit::new(5u64, 0.5),
            ScoredHit::new(2u64, 0.9),
            ScoredHit::new(1u64, 0.5),
            ScoredHit::new(7u64, -0.1),
        ];
        hits.sort_by(ScoredHit::rank_cmp);

        let ids: Vec<u64> = hits.iter().map(|h| h.id.as_u64()).collect();
        assert_eq!(ids, vec![2, 1, 5, 7]);
    }
}
