use chrono::Utc;
use clap::Parser;
use log::{debug, error, info, warn};
use monit_intel::analysis::backend_from_config;
use monit_intel::config::Config;
use monit_intel::error::ConfigError;
use monit_intel::logs::LogRegistry;
use monit_intel::monit::MonitClient;
use monit_intel::pipeline::Pipeline;
use monit_intel::poller::{Poller, StatusSource};
use monit_intel::store::SnapshotStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Command-line arguments for the Monit intelligence daemon
#[derive(Parser)]
#[command(
    name = "monit-intel",
    about = "Monit health intelligence - scheduled polling, failure tracking, and LLM advisories",
    long_about = "Polls a Monit HTTP status endpoint on a fixed schedule, keeps a SQLite history \
                  of per-service snapshots, classifies failure transitions against stored state, \
                  gathers log context for services that just failed or changed failure mode, and \
                  hands the bundle to an LLM backend for an operator-facing advisory."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Run a single cycle instead of the scheduler
    #[arg(long, help = "Run one poll and analysis cycle, then exit")]
    once: bool,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // A missing file is created with defaults at startup; only an
            // existing path that is not a regular file is rejected here.
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

/// Load configuration, apply environment overrides, and validate the result
///
/// A missing file at an explicit path is written out with defaults. A file
/// that fails to parse is reported and replaced by defaults so the daemon
/// still starts; a configuration that fails validation is fatal.
fn load_config(config_path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            match Config::load_or_create(path) {
                Ok(config) => config,
                Err(e) => {
                    error!("Configuration error in '{}': {}", path.display(), e);
                    warn!("Using default configuration due to invalid config file");
                    Config::default()
                }
            }
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Execute one poll and analysis cycle
///
/// A failed poll abandons the cycle; the scheduler retries at the next tick.
/// After a successful ingest the detection pipeline always runs, and its
/// failures are logged without stopping the loop.
async fn run_cycle(poller: &Poller, pipeline: &Pipeline) {
    let started = Utc::now();

    let ingest = match poller.ingest_once().await {
        Ok(summary) => summary,
        Err(e) => {
            warn!("poll failed, cycle abandoned: {e}");
            return;
        }
    };
    debug!(
        "ingested {}/{} services, pruned {} expired snapshots",
        ingest.persisted, ingest.observed, ingest.pruned
    );

    match pipeline.run_once(started).await {
        Ok(cycle) => {
            if cycle.critical > 0 {
                info!(
                    "cycle complete: {} services, {} critical",
                    cycle.services, cycle.critical
                );
            } else {
                debug!(
                    "cycle complete: {} services, none critical",
                    cycle.services
                );
            }
        }
        Err(e) => warn!("detection pass failed: {e}"),
    }
}

/// Run poll cycles on a fixed interval until interrupted
///
/// Each cycle runs to completion before the next tick is honored; ticks that
/// elapse while a cycle is still in flight are skipped rather than queued.
async fn run_scheduler(poller: &Poller, pipeline: &Pipeline, interval_secs: u64) {
    info!("scheduler started (interval: {interval_secs}s)");
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_cycle(poller, pipeline).await;
            }
            _ = &mut shutdown => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting monit-intel");

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let config = load_config(cli.config.as_deref())?;

    // Wiring: main is the only place that knows the concrete components.
    let store = Arc::new(SnapshotStore::open(&config.storage.db_path)?);
    let source: Arc<dyn StatusSource> = Arc::new(MonitClient::new(&config.monit)?);
    let registry = Arc::new(LogRegistry::from_config(&config.logs));
    let backend = backend_from_config(&config.analysis)?;

    info!(
        "polling {} every {}s ({} log fetchers registered)",
        config.monit.url,
        config.poller.interval_secs,
        registry.len()
    );

    let poller = Poller::new(source, Arc::clone(&store), config.poller.retention_days);
    let pipeline = Pipeline::new(store, registry, backend);

    if cli.once {
        run_cycle(&poller, &pipeline).await;
        return Ok(());
    }

    run_scheduler(&poller, &pipeline, config.poller.interval_secs).await;

    info!("monit-intel shutdown complete");
    Ok(())
}
