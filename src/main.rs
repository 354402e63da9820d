//! shard-knn CLI
//!
//! Generate a dataset, build sharded HNSW indices from it, and measure merged
//! recall and latency across those shards.
//!
//! ## Usage
//!
//! ```bash
//! # Synthetic dataset: 100k docs, 1k queries, 4 pre-sharded doc files
//! shard-knn generate --output data/synth --num-docs 100000 --num-queries 1000 --dim 128 --num-vec-shards 4
//!
//! # One HNSW index per shard
//! shard-knn build --dataset data/synth --output indexes/synth --num-shards 4 --threads 4
//!
//! # Measure recall against brute force, with collaborative pruning
//! shard-knn run --shards indexes/synth --queries data/synth/queries.vec --dim 128 \
//!     --docs data/synth --k 10,100 --collaborative
//! ```
//!
//! The report goes to stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shard_knn::config::{parse_k_list, BuildConfig, GenerateConfig, RunConfig};
use shard_knn::constants::hnsw as hnsw_defaults;
use shard_knn::index::HnswParams;
use shard_knn::{build_shards, generate_dataset, run_benchmark};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// shard-knn - sharded ANN recall and latency harness
#[derive(Parser)]
#[command(name = "shard-knn")]
#[command(about = "Fan-out KNN search over HNSW shards, merged and scored against brute force")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the query batch against a sharded index and report per-K results
    Run {
        /// Directory holding shard-<n> subdirectories
        #[arg(long)]
        shards: PathBuf,

        /// Query vectors (.vec)
        #[arg(long)]
        queries: PathBuf,

        /// Vector dimension
        #[arg(long)]
        dim: usize,

        /// Documents for exact ground truth: a .vec file or a dataset directory
        #[arg(long)]
        docs: Option<PathBuf>,

        /// Comma-separated K values
        #[arg(long, default_value = "10,100,1000,10000")]
        k: String,

        /// Shard search threads (default: shards x query threads)
        #[arg(long)]
        search_threads: Option<usize>,

        /// Concurrent queries
        #[arg(long, default_value = "1")]
        query_threads: usize,

        /// Share per-shard top-K scores so shards can prune each other
        #[arg(long)]
        collaborative: bool,

        /// Log progress every 1000 queries
        #[arg(long)]
        progress: bool,

        /// Record per-shard latencies and log skew statistics
        #[arg(long)]
        shard_timings: bool,

        /// Override the beam width saved with each shard
        #[arg(long)]
        ef_search: Option<usize>,
    },

    /// Build one HNSW index per shard from a dataset directory
    Build {
        /// Dataset directory with meta.json
        #[arg(long)]
        dataset: PathBuf,

        /// Output directory for shard-<n> subdirectories
        #[arg(long)]
        output: PathBuf,

        /// Number of shards
        #[arg(long, default_value = "1")]
        num_shards: usize,

        /// Shards built concurrently
        #[arg(short = 't', long, default_value = "1")]
        threads: usize,

        /// HNSW M parameter (max connections per node)
        #[arg(short = 'm', long, default_value_t = hnsw_defaults::DEFAULT_M)]
        m: usize,

        /// HNSW ef_construction parameter
        #[arg(long, default_value_t = hnsw_defaults::DEFAULT_EF_CONSTRUCTION)]
        ef_construction: usize,

        /// HNSW ef_search saved with each shard
        #[arg(long, default_value_t = hnsw_defaults::DEFAULT_EF_SEARCH)]
        ef_search: usize,

        /// Seed for HNSW level assignment
        #[arg(long, default_value_t = hnsw_defaults::DEFAULT_SEED)]
        seed: u64,
    },

    /// Write a synthetic dataset of random unit vectors
    Generate {
        /// Output dataset directory
        #[arg(long)]
        output: PathBuf,

        #[arg(long)]
        num_docs: usize,

        #[arg(long)]
        num_queries: usize,

        /// Vector dimension
        #[arg(long)]
        dim: usize,

        /// Split documents over this many docs-shard-<i>.vec files
        #[arg(long, default_value = "1")]
        num_vec_shards: usize,

        #[arg(long, default_value_t = hnsw_defaults::DEFAULT_SEED)]
        seed: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = dispatch(cli.command) {
        tracing::error!("{:#}", e);
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
}

fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            shards,
            queries,
            dim,
            docs,
            k,
            search_threads,
            query_threads,
            collaborative,
            progress,
            shard_timings,
            ef_search,
        } => {
            let config = RunConfig {
                docs_path: docs,
                k_values: parse_k_list(&k).context("invalid --k")?,
                search_threads,
                query_threads,
                collaborative,
                progress,
                shard_timings,
                ef_search,
                ..RunConfig::new(shards, queries, dim)
            };
            run(&config)
        }
        Commands::Build {
            dataset,
            output,
            num_shards,
            threads,
            m,
            ef_construction,
            ef_search,
            seed,
        } => {
            let config = BuildConfig {
                num_shards,
                threads,
                params: HnswParams {
                    m,
                    ef_construction,
                    ef_search,
                    seed,
                    ..HnswParams::default()
                },
                ..BuildConfig::new(dataset, output)
            };
            build(&config)
        }
        Commands::Generate {
            output,
            num_docs,
            num_queries,
            dim,
            num_vec_shards,
            seed,
        } => {
            let config = GenerateConfig {
                num_vec_shards,
                seed,
                ..GenerateConfig::new(output, num_docs, num_queries, dim)
            };
            generate(&config)
        }
    }
}

fn run(config: &RunConfig) -> Result<()> {
    let outcome = run_benchmark(config)
        .with_context(|| format!("run over {} failed", config.shards_dir.display()))?;
    print!("{}", outcome.render());
    Ok(())
}

fn build(config: &BuildConfig) -> Result<()> {
    let summary = build_shards(config)
        .with_context(|| format!("building shards from {} failed", config.dataset_dir.display()))?;
    println!(
        "built {} shards ({} docs) in {}",
        summary.num_shards,
        summary.total_docs,
        config.output_dir.display()
    );
    Ok(())
}

fn generate(config: &GenerateConfig) -> Result<()> {
    let manifest = generate_dataset(config)
        .with_context(|| format!("generating dataset in {} failed", config.output_dir.display()))?;
    println!(
        "wrote {} docs and {} queries (dim {}) to {}",
        manifest.num_docs,
        manifest.num_query_vectors,
        manifest.dim,
        config.output_dir.display()
    );
    Ok(())
}
