//! statpoll - metrics collection daemon for rule/inference engine fleets.
//!
//! Polls the management interface of every configured engine on a fixed
//! interval and appends the samples to per-engine, per-category CSV
//! files, rotated daily.
//!
//! # Usage
//! ```sh
//! statpoll --config statpoll.toml
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use statpoll::application::collector::Collector;
use statpoll::application::scheduler::Scheduler;
use statpoll::config::Config;
use statpoll::domain::filter::EntityFilter;
use statpoll::domain::ports::SourceConnector;
use statpoll::infrastructure::http::HttpSourceConnector;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(
    name = "statpoll",
    version,
    about = "Collect cache, agent-entity and transaction-manager metrics from engine fleets"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("statpoll {} starting...", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    info!("Loading configuration from {}", args.config.display());
    let config = Config::load(&args.config)?;

    for engine in &config.engines {
        info!("Monitor engine {}", engine);
    }
    for category in &config.categories {
        info!("Add report type {}", category);
    }
    if let Some(folder) = &config.report_folder {
        info!("Statistics reports are written to {}", folder.display());
    }
    if config.ignore_internal_entities {
        info!("Ignoring stats of engine-internal entities");
    }
    info!("Write stats every {} seconds", config.poll_interval.as_secs());

    let filter = Arc::new(
        EntityFilter::new(config.ignore_internal_entities, &config.include)
            .context("Failed to compile inclusion patterns")?,
    );
    let connector: Arc<dyn SourceConnector> = Arc::new(HttpSourceConnector::new());

    let collectors: Vec<Collector> = config
        .engines
        .iter()
        .map(|endpoint| {
            Collector::new(
                endpoint.clone(),
                config.categories.clone(),
                filter.clone(),
                connector.clone(),
                config.report_folder.clone(),
            )
        })
        .collect();

    let scheduler = Scheduler::new(collectors, config.poll_interval);
    scheduler
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Shutdown complete. Goodbye!");
    Ok(())
}
