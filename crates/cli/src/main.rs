use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use aeropipe_core::{
    discover_manifest, load_config_or_default, load_manifest, validate_config, ArtifactStore,
    BatchOrchestrator, BatchSummary, HttpFetcher, LlmTransformer, RetryPolicy, StageRunner,
    StageTimeouts, StateLedger, VisionExtractor,
};

/// Exit code when at least one document ended in a terminal failed or
/// incomplete state.
const EXIT_INCOMPLETE: i32 = 1;
/// Exit code for batch-fatal conditions (config, manifest, ledger).
const EXIT_FATAL: i32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "aeropipe",
    version,
    about = "Resumable batch pipeline for aeronautical publication documents"
)]
struct Cli {
    /// Country batch to process, e.g. "spain". Auto-detected from the
    /// work dir when omitted.
    #[arg(long)]
    country: Option<String>,

    /// Explicit manifest file; overrides country-based discovery.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Working directory holding the _AIPs trees; overrides the config.
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Configuration file (TOML). Defaults plus AEROPIPE_* environment
    /// variables are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reset failed stage records to pending before running, forcing a
    /// re-attempt of previously failed documents.
    #[arg(long, default_value_t = false)]
    retry_failed: bool,

    /// Log at debug level.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            std::process::exit(EXIT_FATAL);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(summary) if summary.is_full_success() => std::process::exit(0),
        Ok(_) => std::process::exit(EXIT_INCOMPLETE),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            std::process::exit(EXIT_FATAL);
        }
    }
}

async fn run(cli: Cli) -> Result<BatchSummary> {
    let mut config = load_config_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    validate_config(&config).context("Configuration validation failed")?;
    if let Some(work_dir) = cli.work_dir {
        config.work_dir = work_dir;
    }

    let (manifest_path, country) = discover_manifest(
        &config.work_dir,
        cli.country.as_deref(),
        cli.manifest.as_deref(),
    )
    .context("Failed to locate a batch manifest")?;
    info!("Processing batch '{}' from {}", country, manifest_path.display());

    let manifest = load_manifest(&manifest_path).context("Failed to load manifest")?;
    if manifest.is_empty() {
        warn!("Manifest is empty; nothing to do");
    }

    let state_dir = config
        .work_dir
        .join("_AIPs")
        .join(&country)
        .join("state");
    let ledger = Arc::new(
        StateLedger::open(&state_dir, &country).context("Failed to open state ledger")?,
    );

    if cli.retry_failed {
        let reset = ledger
            .reset_failed(None)
            .context("Failed to reset failed stages")?;
        info!("Reset {} failed stage records for re-run", reset);
    }

    let fetcher = HttpFetcher::new(&config.fetcher).context("Failed to build fetcher")?;
    let extractor =
        VisionExtractor::new(&config.extractor).context("Failed to build extractor")?;
    let transformer =
        LlmTransformer::new(&config.transformer).context("Failed to build transformer")?;

    let runner = Arc::new(StageRunner::new(
        Arc::new(fetcher),
        Arc::new(extractor),
        Arc::new(transformer),
        ArtifactStore::new(&config.work_dir),
        Arc::clone(&ledger),
        RetryPolicy::from(&config.retry),
        StageTimeouts::from(&config.timeouts),
        Duration::from_secs(config.orchestrator.running_stale_after_secs),
    ));
    let orchestrator = Arc::new(BatchOrchestrator::new(
        runner,
        ledger,
        config.orchestrator.clone(),
    ));

    // Ctrl-C / SIGTERM stops the batch between stages; completed
    // transitions are already persisted by then.
    let shutdown_target = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_target.request_shutdown();
    });

    let summary = orchestrator.run_batch(&manifest).await?;
    info!(
        "Results summary written to {}",
        orchestrator.summary_path().display()
    );
    Ok(summary)
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
