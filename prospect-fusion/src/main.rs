//! prospect-fusion - batch runner
//!
//! Reads a batch file of athlete queries and recorded source responses, builds
//! one profile per query and writes them as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use prospect_fusion::db::SqliteProfileStore;
use prospect_fusion::{
    BatchInput, BatchResult, FusionConfig, IdentityResolver, Pipeline, SourceRegistry,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Command-line arguments for prospect-fusion
#[derive(Parser, Debug)]
#[command(name = "prospect-fusion")]
#[command(about = "Build fused athlete profiles from recorded source data")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "PROSPECT_CONFIG")]
    config: Option<PathBuf>,

    /// Batch input file (JSON with `queries` and `sources`)
    #[arg(short, long)]
    input: PathBuf,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// SQLite database for built profiles (overrides `[storage] database_path`)
    #[arg(short, long, env = "PROSPECT_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        FusionConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = &args.database {
        config.storage.database_path = Some(database.clone());
    }

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(config.logging.ansi)
                .with_writer(std::io::stderr),
        )
        .init();

    let run_id = Uuid::new_v4();
    info!(run_id = %run_id, input = %args.input.display(), "Starting batch run");

    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read batch input {}", args.input.display()))?;
    let batch: BatchInput = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse batch input {}", args.input.display()))?;

    let resolver = match &config.identity.snapshot_path {
        Some(path) if path.exists() => IdentityResolver::load_from_path(path, &config.identity)
            .with_context(|| format!("Failed to restore identity snapshot {}", path.display()))?,
        _ => IdentityResolver::new(&config.identity),
    };
    let resolver = Arc::new(resolver);

    let registry = SourceRegistry::from_specs(batch.sources);
    info!(run_id = %run_id, sources = registry.len(), queries = batch.queries.len(), "Batch loaded");

    let snapshot_path = config.identity.snapshot_path.clone();
    let database_path = config.storage.database_path.clone();
    let max_lock_wait_ms = config.storage.max_lock_wait_ms;

    let mut pipeline = Pipeline::new(config, resolver.clone(), registry)
        .context("Failed to initialize pipeline")?;

    if let Some(path) = &database_path {
        let store = SqliteProfileStore::open(path)
            .await
            .with_context(|| format!("Failed to open database {}", path.display()))?
            .with_max_lock_wait(max_lock_wait_ms);
        info!(database = %path.display(), "Profile persistence enabled");
        pipeline = pipeline.with_store(Arc::new(store));
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling remaining work");
            signal_token.cancel();
        }
    });

    let queries = batch.queries.clone();
    let results = pipeline.build_profiles(batch.queries, &cancel).await;

    let output: Vec<BatchResult> = queries
        .into_iter()
        .zip(results)
        .map(|(query, result)| match result {
            Ok(profile) => BatchResult::Built {
                profile: Box::new(profile),
            },
            Err(e) => BatchResult::Failed {
                query,
                error: e.to_string(),
            },
        })
        .collect();

    let json = serde_json::to_string_pretty(&output).context("Failed to serialize profiles")?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write output {}", path.display()))?;
            info!(output = %path.display(), "Profiles written");
        }
        None => println!("{}", json),
    }

    if let Some(path) = &snapshot_path {
        resolver
            .save_to_path(path)
            .with_context(|| format!("Failed to save identity snapshot {}", path.display()))?;
        info!(snapshot = %path.display(), "Identity snapshot saved");
    }

    let built = output
        .iter()
        .filter(|r| matches!(r, BatchResult::Built { .. }))
        .count();
    info!(
        run_id = %run_id,
        built,
        failed = output.len() - built,
        cancelled = cancel.is_cancelled(),
        "Batch run complete"
    );

    Ok(())
}
