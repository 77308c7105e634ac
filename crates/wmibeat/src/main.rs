//! wmibeat daemon
//!
//! Polls the local management provider on a schedule and writes one JSON
//! event per result row to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wmibeat_core::{ChannelSinkFactory, Orchestrator};

mod config;
mod factory;
mod output;

use config::{Config, LogFormat, LoggingConfig};
use factory::{ProviderKind, create_provider};

/// wmibeat: periodic WMI query collector
#[derive(Parser, Debug)]
#[command(name = "wmibeat", version, about)]
struct Args {
    /// Configuration file (defaults to $WMIBEAT_CONFIG, ./wmibeat.toml, ...)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Override the configured log format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Management provider to query
    #[arg(long, value_enum, default_value_t = ProviderKind::Wmi)]
    provider: ProviderKind,

    /// JSON fixture rows for the fake provider
    #[arg(long)]
    fixtures: Option<PathBuf>,
}

fn init_tracing(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }

    init_tracing(&config.logging);

    let provider = create_provider(args.provider, args.fixtures.as_deref())?;
    let (sink_factory, events) = ChannelSinkFactory::new();
    let writer = output::spawn_writer(events, tokio::io::stdout());

    let orchestrator = Orchestrator::new(provider, Arc::new(sink_factory));
    let engine = orchestrator.start(config.queries).await?;

    let stop = engine.stop_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        stop.stop();
    });

    info!("wmibeat is running! Hit CTRL-C to stop it.");

    let reports = engine.run().await;
    for report in &reports {
        match report.stats {
            Some(ref stats) => info!(
                class = %report.class,
                ticks = stats.ticks,
                failed_ticks = stats.failed_ticks,
                events = stats.events,
                skipped_fields = stats.skipped_fields,
                "query finished"
            ),
            None => warn!(class = %report.class, "query task aborted"),
        }
    }

    // Dropping the last sink sender lets the writer drain and exit.
    drop(orchestrator);
    let written = writer.await?;
    info!(written, "wmibeat stopped");

    Ok(())
}
