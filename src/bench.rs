//! The benchmark driver.
//!
//! For each K, every query is sent through the [`ShardQueryCoordinator`] and
//! its merged top-K compared against the exact top-K when ground truth is
//! available. Per-K averages are rendered as a tab-separated table followed by
//! `SUMMARY` lines that are easy to grep out of a log.
//!
//! ```text
//! topK  latency_ms  merged_recall  lookups_saved  nDoc  numShards  num_queries
//! 10    1.204       0.9870         93120          100000  4        1000
//!
//! SUMMARY  wiki-1m  10  1.204  0.9870  93120  100000  4  1000
//! ```
//!
//! Queries run on the caller's thread or, with `query_threads > 1`, on a
//! dedicated rayon pool. Either way the per-K aggregates are the same up to
//! floating-point summation order.

use crate::config::RunConfig;
use crate::constants::bench::{NOT_AVAILABLE, PROGRESS_INTERVAL, REPORT_HEADER, SUMMARY_TAG};
use crate::coordinator::{CoordinatorOptions, QueryResult, ShardQueryCoordinator};
use crate::dataset::recall_at_k;
use crate::error::{Result, ShardKnnError};
use crate::exact::ExactNn;
use crate::metrics::{ShardTimingStats, SkewAccumulator, SkewSummary};
use crate::shard::ShardSet;
use crate::vec_file::{read_docs_from_path, read_vec_file};
use crate::vector::VectorSet;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tolerance on |norm - 1| before queries are reported as not normalized.
const NORM_TOLERANCE: f32 = 1e-3;

/// What the driver runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchOptions {
    pub k_values: Vec<usize>,
    /// Concurrent queries; `<= 1` runs queries one after another.
    pub query_threads: usize,
    /// Log progress every [`PROGRESS_INTERVAL`] completed queries.
    pub progress: bool,
}

/// Running sums for one K.
#[derive(Debug, Clone, Default)]
struct Accumulator {
    queries: usize,
    total_latency: Duration,
    recall_sum: f64,
    recall_count: usize,
    savings_sum: u128,
    savings_count: usize,
    skew: SkewAccumulator,
}

impl Accumulator {
    fn add(&mut self, result: &QueryResult, recall: Option<f64>) {
        self.queries += 1;
        self.total_latency += result.elapsed;
        if let Some(recall) = recall {
            self.recall_sum += recall;
            self.recall_count += 1;
        }
        if let Some(saved) = result.visited_savings {
            self.savings_sum += u128::from(saved);
            self.savings_count += 1;
        }
        if let Some(stats) = result
            .shard_latencies
            .as_deref()
            .and_then(ShardTimingStats::from_durations)
        {
            self.skew.add(&stats);
        }
    }

    fn merge(mut self, other: Accumulator) -> Accumulator {
        self.queries += other.queries;
        self.total_latency += other.total_latency;
        self.recall_sum += other.recall_sum;
        self.recall_count += other.recall_count;
        self.savings_sum += other.savings_sum;
        self.savings_count += other.savings_count;
        self.skew = self.skew.merge(other.skew);
        self
    }
}

/// Averages for one K.
#[derive(Debug, Clone, PartialEq)]
pub struct KReport {
    pub k: usize,
    pub avg_latency_ms: f64,
    /// `None` without ground truth.
    pub avg_recall: Option<f64>,
    /// `None` when no shard reported a visited count.
    pub avg_visited_savings: Option<u64>,
    pub total_docs: usize,
    pub num_shards: usize,
    pub num_queries: usize,
    /// Present when per-shard timings were recorded.
    pub shard_skew: Option<SkewSummary>,
}

impl KReport {
    fn from_accumulator(k: usize, acc: &Accumulator, total_docs: usize, num_shards: usize) -> Self {
        let avg_latency_ms = if acc.queries > 0 {
            acc.total_latency.as_secs_f64() * 1000.0 / acc.queries as f64
        } else {
            0.0
        };
        Self {
            k,
            avg_latency_ms,
            avg_recall: (acc.recall_count > 0).then(|| acc.recall_sum / acc.recall_count as f64),
            avg_visited_savings: (acc.savings_count > 0)
                .then(|| (acc.savings_sum / acc.savings_count as u128) as u64),
            total_docs,
            num_shards,
            num_queries: acc.queries,
            shard_skew: acc.skew.finish(),
        }
    }

    /// One tab-separated report line, matching the report header columns.
    pub fn line(&self) -> String {
        let recall = self
            .avg_recall
            .map_or_else(|| NOT_AVAILABLE.to_string(), |r| format!("{:.4}", r));
        let saved = self
            .avg_visited_savings
            .map_or_else(|| NOT_AVAILABLE.to_string(), |s| s.to_string());
        format!(
            "{}\t{:.3}\t{}\t{}\t{}\t{}\t{}",
            self.k, self.avg_latency_ms, recall, saved, self.total_docs, self.num_shards, self.num_queries
        )
    }
}

/// Per-K results of a run, in configured K order.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchReport {
    pub k_reports: Vec<KReport>,
}

impl BenchReport {
    /// Header, one line per K, a blank line, then one `SUMMARY` line per K.
    pub fn render(&self, dataset_name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", REPORT_HEADER);
        for report in &self.k_reports {
            let _ = writeln!(out, "{}", report.line());
        }
        let _ = writeln!(out);
        for report in &self.k_reports {
            let _ = writeln!(out, "{}\t{}\t{}", SUMMARY_TAG, dataset_name, report.line());
        }
        out
    }
}

/// Runs the query batch for every K against a coordinator.
pub struct BenchRunner<'a> {
    coordinator: &'a ShardQueryCoordinator,
    queries: &'a VectorSet,
    oracle: Option<&'a ExactNn>,
    options: BenchOptions,
    query_pool: Option<ThreadPool>,
}

impl<'a> BenchRunner<'a> {
    /// # Errors
    /// `Config` if `k_values` is empty or contains 0, or if the query pool
    /// cannot be created.
    pub fn new(
        coordinator: &'a ShardQueryCoordinator,
        queries: &'a VectorSet,
        oracle: Option<&'a ExactNn>,
        options: BenchOptions,
    ) -> Result<Self> {
        if options.k_values.is_empty() || options.k_values.contains(&0) {
            return Err(ShardKnnError::config("K values must be non-empty and >= 1"));
        }
        let query_pool = if options.query_threads > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(options.query_threads)
                .thread_name(|i| format!("query-{i}"))
                .build()
                .map_err(|e| ShardKnnError::config(format!("failed to build query pool: {e}")))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            coordinator,
            queries,
            oracle,
            options,
            query_pool,
        })
    }

    /// Run every K in order. The first failing query aborts the run.
    pub fn run(&self) -> Result<BenchReport> {
        let mut k_reports = Vec::with_capacity(self.options.k_values.len());
        for &k in &self.options.k_values {
            let report = self.run_k(k)?;
            debug!(k, line = %report.line(), "finished K");
            if let Some(skew) = &report.shard_skew {
                info!(k, "{}", skew.summary());
            }
            k_reports.push(report);
        }
        Ok(BenchReport { k_reports })
    }

    fn run_k(&self, k: usize) -> Result<KReport> {
        let num_queries = self.queries.len();
        info!(k, queries = num_queries, "running K");

        let completed = AtomicUsize::new(0);
        let one = |mut acc: Accumulator, q: usize| -> Result<Accumulator> {
            let query = self.queries.get(q);
            let result = self.coordinator.search_one(query, k)?;
            let recall = match self.oracle {
                Some(oracle) => {
                    let exact = oracle.exact_top_k(query, k)?;
                    Some(recall_at_k(&result.ids(), &exact, k))
                }
                None => None,
            };
            acc.add(&result, recall);

            if self.options.progress {
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % PROGRESS_INTERVAL == 0 {
                    info!(k, done, total = num_queries, "progress");
                }
            }
            Ok(acc)
        };

        let acc = match &self.query_pool {
            None => (0..num_queries).try_fold(Accumulator::default(), one)?,
            Some(pool) => pool.install(|| {
                (0..num_queries)
                    .into_par_iter()
                    .try_fold(Accumulator::default, one)
                    .try_reduce(Accumulator::default, |a, b| Ok(a.merge(b)))
            })?,
        };

        Ok(KReport::from_accumulator(
            k,
            &acc,
            self.coordinator.total_docs(),
            self.coordinator.num_shards(),
        ))
    }
}

/// A finished run: the report and the dataset name it is tagged with.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub dataset_name: String,
    pub report: BenchReport,
}

impl RunOutcome {
    pub fn render(&self) -> String {
        self.report.render(&self.dataset_name)
    }
}

/// Load inputs, open the shards, run every K, and close the shards.
///
/// Shards are closed before this returns, whether the run succeeded or not.
pub fn run_benchmark(config: &RunConfig) -> Result<RunOutcome> {
    config.validate()?;

    let queries = read_vec_file(&config.queries_path, config.dim)?;
    warn_if_not_normalized(&queries);

    let oracle = match &config.docs_path {
        Some(path) => Some(ExactNn::new(Arc::new(read_docs_from_path(path, config.dim)?))),
        None => None,
    };

    let shards = ShardSet::open_dir(&config.shards_dir, config.ef_search)?;
    if let Some(shard_dim) = shards.dimension() {
        if shard_dim != config.dim {
            return Err(ShardKnnError::config(format!(
                "--dim {} does not match shard dimension {}",
                config.dim, shard_dim
            )));
        }
    }
    if let Some(oracle) = &oracle {
        if oracle.len() != shards.total_docs() {
            warn!(
                docs = oracle.len(),
                shard_docs = shards.total_docs(),
                "ground-truth document count differs from indexed document count"
            );
        }
    }

    let search_threads = config.effective_search_threads(shards.len());
    let options = CoordinatorOptions {
        search_threads,
        mode: config.search_mode(),
        record_shard_timings: config.shard_timings,
    };
    info!(
        shards_dir = %config.shards_dir.display(),
        shards = shards.len(),
        docs = shards.total_docs(),
        queries = queries.len(),
        dim = config.dim,
        search_threads,
        query_threads = config.query_threads,
        mode = ?options.mode,
        recall = oracle.is_some(),
        k_values = ?config.k_values,
        "starting run"
    );

    let coordinator = ShardQueryCoordinator::new(shards, options)?;
    let report = BenchRunner::new(
        &coordinator,
        &queries,
        oracle.as_ref(),
        BenchOptions {
            k_values: config.k_values.clone(),
            query_threads: config.query_threads,
            progress: config.progress,
        },
    )
    .and_then(|runner| runner.run());
    coordinator.close();

    Ok(RunOutcome {
        dataset_name: config.dataset_name(),
        report: report?,
    })
}

fn warn_if_not_normalized(queries: &VectorSet) {
    let off = queries
        .iter()
        .filter(|q| {
            let norm = q.iter().map(|x| x * x).sum::<f32>().sqrt();
            (norm - 1.0).abs() > NORM_TOLERANCE
        })
        .count();
    if off > 0 {
        warn!(
            count = off,
            total = queries.len(),
            "queries are not unit-normalized; dot-product scores are not cosine similarities"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::traits::{ScoreBound, ShardHits, ShardIndex};
    use crate::shard::ShardHandle;
    use crate::types::ScoredHit;

    /// Returns ids `base..base + k` with descending scores, visiting nothing.
    struct CountingIndex {
        base: u64,
        docs: usize,
    }

    impl ShardIndex for CountingIndex {
        fn search(&self, _query: &[f32], k: usize, _bound: Option<&dyn ScoreBound>) -> Result<ShardHits> {
            let hits = (0..k.min(self.docs))
                .map(|i| ScoredHit::new(self.base + i as u64, 1.0 - i as f32 * 0.01))
                .collect();
            Ok(ShardHits {
                hits,
                visited: Some(k.min(self.docs) as u64),
            })
        }

        fn num_docs(&self) -> usize {
            self.docs
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn coordinator(search_threads: usize) -> ShardQueryCoordinator {
        let shards = (0..2)
            .map(|i| {
                let inner = CountingIndex {
                    base: i as u64 * 100,
                    docs: 100,
                };
                ShardHandle::new(i, format!("shard-{i}"), Box::new(inner))
            })
            .collect();
        let options = CoordinatorOptions {
            search_threads,
            ..CoordinatorOptions::default()
        };
        ShardQueryCoordinator::new(ShardSet::from_handles(shards).unwrap(), options).unwrap()
    }

    fn queries(n: usize) -> VectorSet {
        VectorSet::from_rows(2, (0..n).map(|_| [1.0f32, 0.0])).unwrap()
    }

    #[test]
    fn test_report_without_oracle_has_na_recall() {
        let c = coordinator(1);
        let q = queries(5);
        let options = BenchOptions {
            k_values: vec![3, 10],
            query_threads: 1,
            progress: false,
        };
        let report = BenchRunner::new(&c, &q, None, options).unwrap().run().unwrap();

        assert_eq!(report.k_reports.len(), 2);
        let first = &report.k_reports[0];
        assert_eq!(first.k, 3);
        assert_eq!(first.avg_recall, None);
        // Each shard scores 3 of its 100 docs.
        assert_eq!(first.avg_visited_savings, Some(194));
        assert_eq!(first.num_queries, 5);
        assert_eq!(first.total_docs, 200);
        assert_eq!(first.num_shards, 2);

        let line = first.line();
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 7);
        assert_eq!(fields[0], "3");
        assert_eq!(fields[2], "N/A");
        assert_eq!(&fields[3..], &["194", "200", "2", "5"]);
    }

    #[test]
    fn test_parallel_queries_aggregate_like_sequential() {
        let c = coordinator(2);
        let q = queries(40);
        let run = |threads| {
            let options = BenchOptions {
                k_values: vec![4],
                query_threads: threads,
                progress: true,
            };
            BenchRunner::new(&c, &q, None, options).unwrap().run().unwrap()
        };
        let sequential = &run(1).k_reports[0];
        let parallel = &run(4).k_reports[0];
        assert_eq!(sequential.num_queries, parallel.num_queries);
        assert_eq!(sequential.avg_visited_savings, parallel.avg_visited_savings);
    }

    #[test]
    fn test_render_layout() {
        let report = BenchReport {
            k_reports: vec![KReport {
                k: 10,
                avg_latency_ms: 1.5,
                avg_recall: Some(0.98765),
                avg_visited_savings: None,
                total_docs: 1000,
                num_shards: 4,
                num_queries: 50,
                shard_skew: None,
            }],
        };
        let rendered = report.render("wiki");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], REPORT_HEADER);
        assert_eq!(lines[1], "10\t1.500\t0.9877\tN/A\t1000\t4\t50");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "SUMMARY\twiki\t10\t1.500\t0.9877\tN/A\t1000\t4\t50");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_zero_queries_report_na() {
        let c = coordinator(1);
        let q = VectorSet::new(2);
        let options = BenchOptions {
            k_values: vec![1],
            query_threads: 1,
            progress: false,
        };
        let report = BenchRunner::new(&c, &q, None, options).unwrap().run().unwrap();
        let only = &report.k_reports[0];
        assert_eq!(only.num_queries, 0);
        assert_eq!(only.avg_latency_ms, 0.0);
        assert_eq!(only.avg_visited_savings, None);
    }

    #[test]
    fn test_rejects_empty_k_list() {
        let c = coordinator(1);
        let q = queries(1);
        let options = BenchOptions {
            k_values: vec![],
            query_threads: 1,
            progress: false,
        };
        assert!(matches!(
            BenchRunner::new(&c, &q, None, options),
            Err(ShardKnnError::Config(_))
        ));
    }
}
