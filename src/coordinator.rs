//! Fan-out of one query to every shard, and the exact merge of their results.
//!
//! [`ShardQueryCoordinator`] owns the opened shards and, when configured with
//! more than one search thread, a dedicated rayon pool sized to the shard
//! count. A query is answered by searching every shard for its own top-K and
//! merging those lists into the global top-K. Because each shard returns its
//! exact local top-K of its own candidates, the merge itself loses nothing.

use crate::error::{Result, ShardKnnError};
use crate::pruning::SharedPruningState;
use crate::searcher::{searcher_for, PruningContext, SearchMode, ShardSearchOutcome, ShardSearcher};
use crate::shard::{ShardHandle, ShardSet};
use crate::types::{GlobalDocId, ScoredHit};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::time::{Duration, Instant};
use tracing::debug;

/// How the coordinator searches shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Shard-search threads; `<= 1` searches shards sequentially.
    pub search_threads: usize,
    pub mode: SearchMode,
    /// Keep each shard's latency in [`QueryResult::shard_latencies`].
    pub record_shard_timings: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            search_threads: 1,
            mode: SearchMode::Standard,
            record_shard_timings: false,
        }
    }
}

/// The merged answer to one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Global top-K, best first.
    pub hits: Vec<ScoredHit>,
    /// Dispatch to merge completion.
    pub elapsed: Duration,
    /// Total nodes scored, when every shard reported a count.
    pub visited: Option<u64>,
    /// `total_docs - visited`, when `visited` is known.
    pub visited_savings: Option<u64>,
    /// Per-shard latencies in shard order, when timings are recorded.
    pub shard_latencies: Option<Vec<Duration>>,
}

impl QueryResult {
    /// Merged global ids, best first.
    pub fn ids(&self) -> Vec<GlobalDocId> {
        self.hits.iter().map(|hit| hit.id).collect()
    }
}

/// Runs each query against all shards and merges the per-shard top-K lists.
pub struct ShardQueryCoordinator {
    shards: ShardSet,
    searcher: Box<dyn ShardSearcher>,
    pool: Option<ThreadPool>,
    options: CoordinatorOptions,
    total_docs: usize,
}

impl ShardQueryCoordinator {
    /// Create a coordinator over `shards`.
    ///
    /// # Errors
    /// `Config` if the shard search pool cannot be created.
    pub fn new(shards: ShardSet, options: CoordinatorOptions) -> Result<Self> {
        let pool = if options.search_threads > 1 {
            let threads = options.search_threads.min(shards.len()).max(1);
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("shard-search-{i}"))
                .build()
                .map_err(|e| ShardKnnError::config(format!("failed to build shard search pool: {e}")))?;
            Some(pool)
        } else {
            None
        };

        debug!(
            shards = shards.len(),
            threads = pool.as_ref().map_or(1, ThreadPool::current_num_threads),
            mode = ?options.mode,
            "created shard query coordinator"
        );

        Ok(Self {
            total_docs: shards.total_docs(),
            searcher: searcher_for(options.mode),
            shards,
            pool,
            options,
        })
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Documents across all shards.
    pub fn total_docs(&self) -> usize {
        self.total_docs
    }

    pub fn options(&self) -> CoordinatorOptions {
        self.options
    }

    pub fn shards(&self) -> &ShardSet {
        &self.shards
    }

    /// Global top-`k` for `query` across all shards.
    ///
    /// # Errors
    /// `ShardSearch` for the lowest-numbered shard that failed; no partial
    /// result is returned.
    pub fn search_one(&self, query: &[f32], k: usize) -> Result<QueryResult> {
        let start = Instant::now();

        let pruning_state = match self.options.mode {
            SearchMode::Collaborative => Some(SharedPruningState::new(self.shards.len())),
            SearchMode::Standard => None,
        };

        let run_shard = |shard: &ShardHandle| -> Result<ShardSearchOutcome> {
            let ctx = pruning_state.as_ref().map(|state| PruningContext {
                state,
                shard: shard.index(),
                k,
            });
            self.searcher
                .search_shard(shard, query, k, ctx.as_ref())
                .map_err(|e| ShardKnnError::shard_search(shard.index(), e))
        };

        let outcomes: Vec<ShardSearchOutcome> = match &self.pool {
            None => self.shards.handles().iter().map(run_shard).collect::<Result<_>>()?,
            Some(pool) => {
                let results: Vec<Result<ShardSearchOutcome>> =
                    pool.install(|| self.shards.handles().par_iter().map(run_shard).collect());
                // Collected in shard order, so the first error is the lowest shard.
                results.into_iter().collect::<Result<_>>()?
            }
        };

        let visited: Option<u64> = outcomes.iter().map(|o| o.visited).sum();
        let shard_latencies = self
            .options
            .record_shard_timings
            .then(|| outcomes.iter().map(|o| o.elapsed).collect());
        let hits = merge_top_k(outcomes.into_iter().map(|o| o.hits), k);
        let elapsed = start.elapsed();

        Ok(QueryResult {
            hits,
            elapsed,
            visited,
            visited_savings: visited.map(|v| (self.total_docs as u64).saturating_sub(v)),
            shard_latencies,
        })
    }

    /// Release the shards.
    pub fn close(self) {
        self.shards.close();
    }
}

/// Merge per-shard top-K lists into the global top-`k`.
///
/// Sorts by descending score with ties broken by ascending id, so the result
/// does not depend on the order of `lists`.
pub fn merge_top_k<I, L>(lists: I, k: usize) -> Vec<ScoredHit>
where
    I: IntoIterator<Item = L>,
    L: IntoIterator<Item = ScoredHit>,
{
    let mut all: Vec<ScoredHit> = lists.into_iter().flatten().collect();
    all.sort_by(ScoredHit::rank_cmp);
    all.truncate(k);
    all
}
