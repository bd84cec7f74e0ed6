//! se-gateway: school-events main binary
//!
//! Usage:
//!   school-events              - Start server mode (HTTP API + scheduler)
//!   school-events --sync [N]   - Run one sync pass and print the outcome
//!   school-events --help       - Show help

mod cli;

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cli::RunMode;
use se_api::AppState;
use se_core::{Config, LocalStore, RemoteDirectoryClient, SqliteStore};
use se_graph::GraphDirectory;
use se_schedule::{JobRunner, ScheduleConfig, Scheduler};
use se_sync::{MetricsCollector, MetricsOptions, Reconciler, RetentionPruner, SyncOptions};

/// Everything built from configuration at startup
struct Services {
    store: Arc<dyn LocalStore>,
    directory: Arc<dyn RemoteDirectoryClient>,
    reconciler: Arc<Reconciler>,
    collector: Arc<MetricsCollector>,
    pruner: Arc<RetentionPruner>,
}

impl Services {
    fn build(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn LocalStore> = Arc::new(
            SqliteStore::open(&config.database.db_path)
                .with_context(|| format!("Failed to open database {}", config.database.db_path))?,
        );
        let directory: Arc<dyn RemoteDirectoryClient> = Arc::new(
            GraphDirectory::new(&config.graph).context("Failed to create directory client")?,
        );

        let reconciler = Arc::new(Reconciler::new(
            directory.clone(),
            store.clone(),
            SyncOptions::from(&config.sync),
        ));
        let collector = Arc::new(MetricsCollector::new(
            directory.clone(),
            MetricsOptions::from(&config.metrics),
        ));
        let pruner = Arc::new(RetentionPruner::new(
            store.clone(),
            config.retention.horizon_days,
        ));

        Ok(Self {
            store,
            directory,
            reconciler,
            collector,
            pruner,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CleanupReport {
    removed: usize,
    horizon_days: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = cli::parse_args(std::env::args().skip(1))?;

    match mode {
        RunMode::Help => {
            cli::print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("school-events {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging; stdout stays clean for one-shot JSON
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?));
    if mode.is_one_shot() {
        subscriber.with_writer(std::io::stderr).init();
    } else {
        subscriber.init();
    }

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().context("Config error")?;
    config.validate().context("Config error")?;

    let services = Services::build(&config)?;

    match mode {
        RunMode::Sync(sample_size) => {
            let sample_size = sample_size.unwrap_or(config.sync.sample_size);
            let outcome = services.reconciler.run(sample_size).await?;
            print_json(&outcome)
        }
        RunMode::Metrics => print_json(&services.collector.collect_metrics().await),
        RunMode::Volumetry => print_json(&services.collector.analyze_volumetry().await),
        RunMode::Cleanup => {
            let removed = services.pruner.prune(Utc::now())?;
            print_json(&CleanupReport {
                removed,
                horizon_days: config.retention.horizon_days,
            })
        }
        RunMode::Server => run_server(config, services).await,
        RunMode::Help | RunMode::Version => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run server mode (HTTP API + scheduler)
async fn run_server(config: Config, services: Services) -> anyhow::Result<()> {
    tracing::info!("Starting school-events...");

    let scheduler = if config.scheduler.enabled {
        let schedule = match &config.scheduler.config_path {
            Some(path) => {
                tracing::info!("Loading schedule from: {}", path);
                ScheduleConfig::from_file(path)?
            }
            None => ScheduleConfig::load_default()?,
        };

        let runner = JobRunner::new(
            services.reconciler.clone(),
            services.collector.clone(),
            services.pruner.clone(),
            &config.sync,
        );
        let scheduler = Scheduler::new(schedule, Arc::new(runner))?;
        Some(scheduler.start())
    } else {
        tracing::info!("Scheduler is disabled");
        None
    };

    let state = AppState {
        api_key: config.api.key.clone(),
        default_sample_size: config.sync.sample_size,
        reconciler: services.reconciler,
        collector: services.collector,
        store: services.store,
        directory: services.directory,
    };

    tracing::info!("Press Ctrl+C to exit");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
        tracing::info!("Shutting down...");
    };

    let served = se_api::start_server(
        config.api.port,
        state,
        config.api.allowed_origins.clone(),
        shutdown,
    )
    .await;

    if let Some(handle) = scheduler {
        handle.stop().await;
    }

    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}
