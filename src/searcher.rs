//! Per-shard search strategies.
//!
//! The coordinator runs every shard through a [`ShardSearcher`] chosen once
//! from the configured [`SearchMode`]. [`StandardSearcher`] searches each shard
//! independently; [`PruningSearcher`] hands the shard a bound backed by the
//! query's [`SharedPruningState`] and publishes the shard's final hits into it.

use crate::error::Result;
use crate::index::traits::ScoreBound;
use crate::pruning::SharedPruningState;
use crate::shard::ShardHandle;
use crate::types::ScoredHit;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How shards cooperate on a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchMode {
    /// Each shard searches alone.
    #[default]
    Standard,
    /// Shards share their running top-K to prune each other's search.
    Collaborative,
}

/// The pruning state of one query, as seen by one shard.
#[derive(Clone, Copy)]
pub struct PruningContext<'a> {
    pub state: &'a SharedPruningState,
    /// Slot this shard publishes into.
    pub shard: usize,
    pub k: usize,
}

impl ScoreBound for PruningContext<'_> {
    fn current(&self) -> f32 {
        self.state.global_min_top_k_score(self.k)
    }

    fn publish(&self, hits: &[ScoredHit]) {
        self.state.update(self.shard, hits);
    }
}

/// What one shard returned for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardSearchOutcome {
    /// Up to `k` hits, best first.
    pub hits: Vec<ScoredHit>,
    /// Nodes scored, `None` when the shard cannot tell.
    pub visited: Option<u64>,
    /// Wall-clock time spent in this shard.
    pub elapsed: Duration,
}

/// Searches a single shard on behalf of the coordinator.
pub trait ShardSearcher: Send + Sync {
    /// Top-`k` of `shard` for `query`.
    ///
    /// `pruning` is present only for collaborative queries.
    fn search_shard(
        &self,
        shard: &ShardHandle,
        query: &[f32],
        k: usize,
        pruning: Option<&PruningContext<'_>>,
    ) -> Result<ShardSearchOutcome>;
}

/// Plain per-shard search; ignores any pruning context.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardSearcher;

impl ShardSearcher for StandardSearcher {
    fn search_shard(
        &self,
        shard: &ShardHandle,
        query: &[f32],
        k: usize,
        _pruning: Option<&PruningContext<'_>>,
    ) -> Result<ShardSearchOutcome> {
        let start = Instant::now();
        let out = shard.search(query, k, None)?;
        Ok(ShardSearchOutcome {
            hits: out.hits,
            visited: out.visited,
            elapsed: start.elapsed(),
        })
    }
}

/// Search under the query's shared bound, then publish the final hits.
#[derive(Debug, Default, Clone, Copy)]
pub struct PruningSearcher;

impl ShardSearcher for PruningSearcher {
    fn search_shard(
        &self,
        shard: &ShardHandle,
        query: &[f32],
        k: usize,
        pruning: Option<&PruningContext<'_>>,
    ) -> Result<ShardSearchOutcome> {
        let Some(ctx) = pruning else {
            return StandardSearcher.search_shard(shard, query, k, None);
        };

        let start = Instant::now();
        let out = shard.search(query, k, Some(ctx as &dyn ScoreBound))?;
        ctx.publish(&out.hits);
        Ok(ShardSearchOutcome {
            hits: out.hits,
            visited: out.visited,
            elapsed: start.elapsed(),
        })
    }
}

/// The searcher implementing `mode`.
pub fn searcher_for(mode: SearchMode) -> Box<dyn ShardSearcher> {
    match mode {
        SearchMode::Standard => Box::new(StandardSearcher),
        SearchMode::Collaborative => Box::new(PruningSearcher),
    }
}
