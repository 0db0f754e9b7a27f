//! foxtel - queue, inspect and flush FoxTelemetry events from the shell.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use telemetry_agent::{AgentOptions, FlushStatus, LogLevel, Telemetry};
use telemetry_config::{init_logging, Paths, TelemetryConfig};
use tracing::debug;

/// FoxTelemetry command-line interface.
#[derive(Parser)]
#[command(name = "foxtel")]
#[command(about = "Queue, inspect and flush FoxTelemetry events")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true, env = "FOXTEL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Base directory for the queue and install id. Defaults to ~/.foxtelemetry
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Configuration file. Defaults to foxtelemetry.json in the base directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a log event
    Log {
        /// Severity (debug, info, warn, error)
        #[arg(long, default_value = "info")]
        level: String,
        /// Tag identifying the component
        #[arg(long, default_value = "foxtel")]
        tag: String,
        /// Message text
        #[arg(long)]
        message: String,
    },
    /// Queue an error event
    Report {
        /// Context describing where the error happened
        #[arg(long, default_value = "MANUAL")]
        context: String,
        /// Error message
        #[arg(long)]
        message: String,
    },
    /// Send queued events now
    Flush {
        /// Keep flushing until the queue is empty or a pass does not deliver
        #[arg(long)]
        all: bool,
    },
    /// Show the queue size
    Status,
}

/// Error raised on behalf of the user by `foxtel report`.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct ReportedError(String);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config_path = cli.config.unwrap_or_else(|| paths.config_file());
    let config = TelemetryConfig::load_path(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));
    debug!(config = %config_path.display(), "Configuration loaded");

    let telemetry = Telemetry::init(config, &paths, AgentOptions::foreground())
        .await
        .context("Failed to start telemetry agent")?;

    match cli.command {
        Commands::Log {
            level,
            tag,
            message,
        } => {
            let level: LogLevel = level.parse()?;
            telemetry.log(level, &tag, &message).await;
            println!("Queued {level} event");
        }
        Commands::Report { context, message } => {
            telemetry
                .report(&ReportedError(message), &context)
                .await;
            println!("Queued error event ({context})");
        }
        Commands::Flush { all } => {
            let mut delivered = 0;
            loop {
                let report = telemetry.flush_now().await;
                delivered += report.dropped;
                match (&report.status, &report.outcome) {
                    (FlushStatus::NoOp, _) => println!("Queue empty"),
                    (status, Some(outcome)) => {
                        println!("{status:?}: {outcome} ({} events)", report.batch_len)
                    }
                    (status, None) => println!("{status:?}"),
                }
                if !all || report.dropped == 0 {
                    break;
                }
            }
            println!("Delivered {delivered} events");
        }
        Commands::Status => {
            let stats = telemetry.queue_stats().await?;
            println!("Install id:    {}", telemetry.install_id());
            println!("Queued events: {}", stats.count);
            println!("Queued bytes:  {}", stats.bytes);
            println!("Queue file:    {}", paths.queue_database_file().display());
        }
    }

    telemetry.shutdown().await;
    Ok(())
}
