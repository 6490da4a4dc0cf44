//! tourstat - consent-aware tourism data aggregation and reporting
//!
//! A CLI tool that aggregates consented platform records and upstream
//! analytics for a period, enforces a minimum-disclosure threshold, and
//! delivers a narrative report and a structured data export.
//!
//! Exit codes:
//!   0 - Report delivered (or --check found enough data)
//!   1 - Runtime error (consent/data store down, render or storage failure, config)
//!   2 - Rejected: not enough data for the requested period

mod analysis;
mod cli;
mod config;
mod consent;
mod error;
mod models;
mod pipeline;
mod report;
mod sources;
mod status;
mod storage;
mod store;

use anyhow::{Context, Result};
use cli::Args;
use config::{ArtifactBackend, Config, StoreKind, CONFIG_FILE};
use models::PipelineOutcome;
use pipeline::Pipeline;
use sources::{AnalyticsAdapter, PlatformAdapter};
use status::{RestStatusSink, StatusSink, TracingStatusSink};
use std::path::Path;
use std::sync::Arc;
use storage::{ArtifactStore, LocalStore, RemoteStore};
use store::{DataStore, RestStore, SnapshotStore};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args)?;

    info!("tourstat v{}", env!("CARGO_PKG_VERSION"));
    debug!("Request {:?} from {:?} to {:?}", args.request_id, args.from, args.to);

    match run(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            if e
                .downcast_ref::<error::PipelineError>()
                .is_some_and(|p| p.is_retryable())
            {
                eprintln!("The request can be re-run safely once the cause is resolved.");
            }
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .tourstat.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("{} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("Created {} with default settings.", CONFIG_FILE);
    println!("Edit it to configure the data store, analytics provider and artifact storage.");
    Ok(())
}

/// Logs go to stderr so stdout carries only the outcome JSON.
fn init_logging(args: &Args) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

/// Run one request end to end. Returns the exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;

    let request = args
        .to_request()
        .map_err(anyhow::Error::msg)
        .context("Invalid report request")?;

    let pipeline = build_pipeline(&config).await?;
    info!(
        "Sources: {} | threshold: {}",
        pipeline.adapter_ids().join(", "),
        config.pipeline.threshold
    );

    let result = if args.check {
        pipeline.check(&request).await
    } else {
        pipeline.run(&request).await
    };
    let outcome = result.with_context(|| format!("Request {} failed", request.id))?;
    let verdict = outcome.verdict();
    info!(
        "{} aggregated records, threshold {}: {}",
        verdict.total_records,
        verdict.threshold,
        if verdict.is_valid { "sufficient" } else { "insufficient" }
    );

    let json = serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?;
    println!("{}", json);

    if let Some(ref output) = config.general.output {
        std::fs::write(output, &json)
            .with_context(|| format!("Failed to write outcome to {}", output.display()))?;
    }

    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &PipelineOutcome) -> i32 {
    match outcome {
        PipelineOutcome::Delivered { .. } => 0,
        PipelineOutcome::Checked { verdict } if verdict.is_valid => 0,
        PipelineOutcome::Checked { .. } | PipelineOutcome::Rejected { .. } => 2,
    }
}

/// Wire the configured collaborators into a pipeline.
async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let store: Arc<dyn DataStore> = match config.store.kind {
        StoreKind::Snapshot => {
            let path = &config.store.snapshot_path;
            Arc::new(
                SnapshotStore::load(path)
                    .await
                    .with_context(|| format!("Failed to load snapshot {}", path.display()))?,
            )
        }
        StoreKind::Rest => Arc::new(
            RestStore::new(
                &config.store.base_url,
                config.store.api_key.clone(),
                config.store.timeout_seconds,
            )
            .context("Failed to create data store client")?,
        ),
    };

    let artifacts: Box<dyn ArtifactStore> = match config.artifacts.backend {
        ArtifactBackend::Local => Box::new(LocalStore::new(&config.artifacts.output_dir)),
        ArtifactBackend::Remote => Box::new(
            RemoteStore::new(
                &config.artifacts.base_url,
                &config.artifacts.bucket,
                config.artifacts.api_key.clone(),
                config.artifacts.timeout_seconds,
            )
            .context("Failed to create blob storage client")?,
        ),
    };

    let status: Box<dyn StatusSink> = if config.store.report_status {
        if config.store.kind != StoreKind::Rest {
            warn!("report_status needs the rest store; status goes to the log only");
            Box::new(TracingStatusSink)
        } else {
            Box::new(RestStatusSink::new(
                &config.store.base_url,
                &config.store.status_table,
                config.store.api_key.clone(),
                config.store.timeout_seconds,
            )?)
        }
    } else {
        Box::new(TracingStatusSink)
    };

    let analytics = AnalyticsAdapter::new(config.analytics_settings())
        .context("Failed to create analytics client")?;

    Ok(
        Pipeline::new(store.clone(), artifacts, status, config.pipeline_settings())
            .with_adapter(Box::new(PlatformAdapter::new(store)))
            .with_adapter(Box::new(analytics)),
    )
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
