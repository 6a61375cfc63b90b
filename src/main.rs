use anyhow::Context;
use clap::Parser;
use nestfind::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Natural-language search over rental listings
#[derive(Parser, Debug)]
#[command(name = "nestfind")]
#[command(about = "Search rental listings with plain-language queries", long_about = None)]
struct Args {
    /// Listing corpus (JSON array or JSON Lines)
    #[arg(short, long)]
    corpus: PathBuf,

    /// Directory for persisted embeddings and amenity clusters
    #[arg(long, default_value = "./cache")]
    cache_dir: PathBuf,

    /// Engine configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Query to run; featured listings are printed when omitted
    #[arg(short, long)]
    query: Option<String>,

    /// Maximum number of results
    #[arg(short, long)]
    limit: Option<usize>,

    /// Per-query timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Include per-signal score breakdowns
    #[arg(long)]
    explain: bool,

    /// Hashing embedder dimension
    #[arg(long, default_value_t = nestfind::DEFAULT_HASH_DIM)]
    dim: usize,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting nestfind v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            EngineConfig::from_json(&text)?
        }
        None => EngineConfig::default(),
    };

    let listings = load_corpus(&args.corpus)?;
    let store = IndexStore::open(&args.cache_dir)?;
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(args.dim));

    // building is CPU-bound
    let (index, outcome) =
        tokio::task::spawn_blocking(move || store.load_or_build(listings, embedder, config)).await??;
    match outcome {
        BuildOutcome::Restored => info!("Index restored from {:?}", args.cache_dir),
        BuildOutcome::Rebuilt { reason } => info!("Index rebuilt: {}", reason),
    }

    let service = SearchService::new(index).with_timeout(Duration::from_millis(args.timeout_ms));

    let output = match &args.query {
        Some(query) => {
            let response = service.search(query, args.limit, args.explain).await?;
            info!(
                "{} candidates, returning {}",
                response.total_candidates,
                response.result.len()
            );
            serde_json::to_string_pretty(&response)?
        }
        None => {
            let featured = service.featured(args.limit.unwrap_or(8)).await?;
            serde_json::to_string_pretty(&featured)?
        }
    };
    println!("{}", output);
    Ok(())
}
