//! Snapvault - Main entry point
//!
//! Runs the scheduled snapshot loop as a foreground daemon, or performs a
//! one-shot restore.

use anyhow::Result;
use clap::{Parser, Subcommand};
use snapvault::{config::Config, events::EngineEvent, job::JobController, utils, JobConfig};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduled snapshot loop until interrupted
    Run {
        /// Source directory (overrides config)
        #[arg(long)]
        source: Option<PathBuf>,

        /// Destination directory (overrides config)
        #[arg(long)]
        destination: Option<PathBuf>,

        /// Seconds between snapshot attempts (overrides config)
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Restore a snapshot archive into a target directory
    Restore {
        /// Snapshot archive to restore
        archive: PathBuf,

        /// Directory to restore into
        target: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!("starting snapvault v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Run {
            source,
            destination,
            interval_secs,
        } => {
            if let Some(source) = source {
                config.job.source_path = source;
            }
            if let Some(destination) = destination {
                config.job.destination_path = destination;
            }
            if let Some(interval_secs) = interval_secs {
                config.job.tick_interval_secs = interval_secs;
            }
            run(config.job).await
        }
        Command::Restore { archive, target } => restore(archive, target).await,
    }
}

/// Run the snapshot schedule until Ctrl+C, then stop gracefully: the
/// worker finishes its current file before shutting down.
async fn run(job: JobConfig) -> Result<()> {
    let controller = JobController::new();
    let mut events = controller.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(?event, "engine event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("event stream lagged, {skipped} events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    controller.configure(job)?;
    controller.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("received Ctrl+C, stopping");
    controller.stop().await;

    Ok(())
}

/// One-shot restore; waits for the worker to finish before exiting.
async fn restore(archive: PathBuf, target: PathBuf) -> Result<()> {
    let controller = JobController::new();
    let mut events = controller.subscribe();

    controller.restore(&archive, &target).await?;

    loop {
        match events.recv().await {
            Ok(EngineEvent::RestoreCompleted { target, members }) => {
                tracing::info!("restored {members} members into {target}");
                return Ok(());
            }
            Ok(EngineEvent::RestoreFailed { error }) => {
                anyhow::bail!("restore failed: {error}");
            }
            Ok(event) => tracing::debug!(?event, "engine event"),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => anyhow::bail!("engine event stream closed unexpectedly"),
        }
    }
}
