//! CLI entry point. Loads configuration, builds the default HTTP-backed
//! collaborators, runs the cluster engine, and writes the CSV/JSON result
//! artifacts.
//!
//! Grounded in `backend/src/bin/repo.rs`'s `clap::Parser` + `tracing_subscriber`
//! wiring, adapted to a single non-interactive run rather than a subcommand
//! dispatch table.

use std::path::PathBuf;

use clap::Parser;
use intent_cluster::config::Config;
use intent_cluster::dataset::{subsample, CachedDatasetLoader, DatasetLoader};
use intent_cluster::embedding::ReqwestEmbeddingProvider;
use intent_cluster::engine::{ClusterEngine, RunOutcome};
use intent_cluster::llm::ReqwestLlmReviewer;
use intent_cluster::partitioner::KMeansPartitioner;
use intent_cluster::serializer::ResultSerializer;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "intent-cluster", about = "LLM-guided hierarchical intent clustering")]
struct Cli {
    /// Path to a TOML config file. Missing file falls back to defaults.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Dataset name, used to locate source/cache files and to name outputs.
    #[arg(long)]
    dataset: Option<String>,

    /// Directory holding `<dataset>.json` source files.
    #[arg(long, default_value = "data")]
    source_dir: PathBuf,

    /// Directory holding the embedding cache.
    #[arg(long, default_value = "cache")]
    cache_dir: PathBuf,

    /// Enable verbose (debug-level) logging.
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::level_filters::LevelFilter::INFO.into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(&cli.config)?;
    let dataset_name = cli.dataset.unwrap_or_else(|| config.runtime.dataset.clone());

    let embedder = ReqwestEmbeddingProvider::new(&config.embedding)?;
    let loader = CachedDatasetLoader::new(&cli.source_dir, &cli.cache_dir, &embedder);
    let queries = loader.load(&dataset_name).await?;
    let queries = subsample(queries, config.runtime.sample_size);

    tracing::info!(dataset = %dataset_name, queries = queries.len(), "loaded dataset");

    let reviewer = ReqwestLlmReviewer::new(&config.llm)?;
    let partitioner = KMeansPartitioner::new();
    let engine = ClusterEngine::new(&config, &reviewer, &partitioner);

    let outcome = engine
        .run_reporting_outcome(queries, config.clustering.initial_k, dataset_name)
        .await;

    let (state, capped) = match outcome {
        RunOutcome::Completed(state) => (state, false),
        RunOutcome::RecursionCapReached(state) => (state, true),
    };

    let output_dir = PathBuf::from(&config.runtime.output_dir);
    ResultSerializer::write(&state, &output_dir, chrono::Utc::now())?;

    tracing::info!(
        categories = state.categories.len(),
        output_dir = %output_dir.display(),
        "wrote result artifacts"
    );

    if capped {
        eprintln!(
            "warning: recursion cap reached with {} task(s) still queued; results are incomplete",
            state.tasks.len()
        );
        std::process::exit(2);
    }

    Ok(())
}
