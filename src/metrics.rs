//! Statistics over per-shard latencies.
//!
//! With shard timings enabled, every query records how long each shard took.
//! [`ShardTimingStats`] summarizes one query's shard latencies; the spread
//! between the fastest and slowest shard is the query's skew, since the
//! merged result waits for the slowest shard.
//!
//! ```ignore
//! let stats = ShardTimingStats::from_durations(&result.shard_latencies.unwrap()).unwrap();
//! println!("{}", stats.summary());
//! // ShardTimingStats: 4 shards, mean=1.204ms, min=0.981ms, max=1.630ms, std=0.245ms
//! ```
//!
//! [`SkewAccumulator`] averages those summaries over many queries.

use std::time::Duration;

/// Mean, extremes and population standard deviation of shard latencies.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShardTimingStats {
    /// Number of shards measured.
    pub num_shards: usize,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Population standard deviation.
    pub std_ms: f64,
}

impl ShardTimingStats {
    /// Summarize `durations`, or `None` if there are none.
    pub fn from_durations(durations: &[Duration]) -> Option<Self> {
        if durations.is_empty() {
            return None;
        }

        let ms: Vec<f64> = durations.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        let n = ms.len() as f64;
        let mean = ms.iter().sum::<f64>() / n;
        let variance = ms.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let min = ms.iter().copied().fold(f64::INFINITY, f64::min);
        let max = ms.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            num_shards: ms.len(),
            mean_ms: mean,
            min_ms: min,
            max_ms: max,
            std_ms: variance.sqrt(),
        })
    }

    /// Slowest minus fastest shard.
    pub fn skew_ms(&self) -> f64 {
        self.max_ms - self.min_ms
    }

    /// Create a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "ShardTimingStats: {} shards, mean={:.3}ms, min={:.3}ms, max={:.3}ms, std={:.3}ms",
            self.num_shards, self.mean_ms, self.min_ms, self.max_ms, self.std_ms
        )
    }
}

/// Running averages of [`ShardTimingStats`] across queries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkewAccumulator {
    queries: usize,
    sum_mean_ms: f64,
    sum_max_ms: f64,
    sum_std_ms: f64,
    sum_skew_ms: f64,
}

impl SkewAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one query's stats.
    pub fn add(&mut self, stats: &ShardTimingStats) {
        self.queries += 1;
        self.sum_mean_ms += stats.mean_ms;
        self.sum_max_ms += stats.max_ms;
        self.sum_std_ms += stats.std_ms;
        self.sum_skew_ms += stats.skew_ms();
    }

    /// Combine two accumulators, as produced by separate query workers.
    pub fn merge(mut self, other: SkewAccumulator) -> SkewAccumulator {
        self.queries += other.queries;
        self.sum_mean_ms += other.sum_mean_ms;
        self.sum_max_ms += other.sum_max_ms;
        self.sum_std_ms += other.sum_std_ms;
        self.sum_skew_ms += other.sum_skew_ms;
        self
    }

    /// Number of queries folded in.
    pub fn queries(&self) -> usize {
        self.queries
    }

    /// Averages over all queries, or `None` if none were recorded.
    pub fn finish(&self) -> Option<SkewSummary> {
        if self.queries == 0 {
            return None;
        }
        let n = self.queries as f64;
        Some(SkewSummary {
            queries: self.queries,
            avg_mean_ms: self.sum_mean_ms / n,
            avg_max_ms: self.sum_max_ms / n,
            avg_std_ms: self.sum_std_ms / n,
            avg_skew_ms: self.sum_skew_ms / n,
        })
    }
}

/// Per-K averages of shard timing statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct SkewSummary {
    pub queries: usize,
    pub avg_mean_ms: f64,
    pub avg_max_ms: f64,
    pub avg_std_ms: f64,
    /// Average gap between the slowest and fastest shard.
    pub avg_skew_ms: f64,
}

impl SkewSummary {
    /// Create a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "shard latency over {} queries: mean={:.3}ms, max={:.3}ms, std={:.3}ms, skew={:.3}ms",
            self.queries, self.avg_mean_ms, self.avg_max_ms, self.avg_std_ms, self.avg_skew_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_population_std() {
        let durations = [2, 4, 4, 4, 5, 5, 7, 9].map(Duration::from_millis);
        let stats = ShardTimingStats::from_durations(&durations).unwrap();

        assert_eq!(stats.num_shards, 8);
        assert!((stats.mean_ms - 5.0).abs() < 1e-9);
        assert!((stats.std_ms - 2.0).abs() < 1e-9);
        assert!((stats.min_ms - 2.0).abs() < 1e-9);
        assert!((stats.max_ms - 9.0).abs() < 1e-9);
        assert!((stats.skew_ms() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_durations() {
        assert!(ShardTimingStats::from_durations(&[]).is_none());
        assert!(SkewAccumulator::new().finish().is_none());
    }

    #[test]
    fn test_summary_format() {
        let stats = ShardTimingStats::from_durations(&[Duration::from_micros(1500)]).unwrap();
        let summary = stats.summary();
        assert!(summary.contains("1 shards"));
        assert!(summary.contains("mean=1.500ms"));
        assert!(summary.contains("std=0.000ms"));
    }

    #[test]
    fn test_accumulator_merge_matches_sequential() {
        let a = ShardTimingStats::from_durations(&[1, 3].map(Duration::from_millis)).unwrap();
        let b = ShardTimingStats::from_durations(&[2, 2].map(Duration::from_millis)).unwrap();
        let c = ShardTimingStats::from_durations(&[5, 9].map(Duration::from_millis)).unwrap();

        let mut all = SkewAccumulator::new();
        for s in [&a, &b, &c] {
            all.add(s);
        }

        let mut left = SkewAccumulator::new();
        left.add(&a);
        let mut right = SkewAccumulator::new();
        right.add(&b);
        right.add(&c);

        let merged = left.merge(right);
        assert_eq!(merged.queries(), 3);
        let (m, s) = (merged.finish().unwrap(), all.finish().unwrap());
        assert!((m.avg_skew_ms - s.avg_skew_ms).abs() < 1e-9);
        // skews: 2, 0, 4
        assert!((m.avg_skew_ms - 2.0).abs() < 1e-9);
    }
}
