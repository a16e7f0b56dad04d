//! Command line client for interacting with the camline array.

use anyhow::{bail, Context, Result};
use camline_ctl::error::CtlError;
use camline_ctl::orchestrator;
use camline_core::{CliRunner, Config, Resolver};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Command {
    /// Start a collection on every node
    Start,
    /// Stop collecting on every node
    Stop,
    /// Capture a single image from one node
    Sample,
    /// Shut down every node in the array
    Shutdown,
}

/// Operator client for the camline camera array.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command to send to the array
    #[arg(long, value_enum)]
    cmd: Command,

    /// Text name for the recording; synthesized from the current time if
    /// absent
    #[arg(long)]
    recording_id: Option<String>,

    /// Node that should answer the request (sample only)
    #[arg(long)]
    target_node_id: Option<String>,

    /// Directory containing configuration files (default: ./config)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Configuration file name inside the config directory (repeatable)
    #[arg(long = "config")]
    config_files: Vec<String>,

    /// key=value override applied after the config files (repeatable)
    #[arg(long = "set")]
    bindings: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let config = Config::load(args.config_dir.as_deref(), &args.config_files, &args.bindings)
        .context("failed to load configuration")?;

    let resolver = Resolver::from_config(&config);
    let resolver = if config.probe_nodes {
        let runner = CliRunner::new(&config)?;
        resolver.probe(&runner).await
    } else {
        resolver
    };

    let recording_id = args
        .recording_id
        .clone()
        .unwrap_or_else(|| format!("r_{}", Utc::now().timestamp()));

    match args.cmd {
        Command::Start | Command::Stop | Command::Shutdown => {
            let coordinator = orchestrator::find_coordinator(&resolver)
                .await
                .ok_or(CtlError::CoordinatorNotFound)?;
            info!(%coordinator, "coordinator found");

            match args.cmd {
                Command::Start => {
                    let message =
                        orchestrator::start_collecting(&coordinator, &resolver, &recording_id, None)
                            .await?;
                    println!("start collecting ({recording_id}): {message}");
                }
                Command::Stop => {
                    orchestrator::stop_collecting(&coordinator, &resolver).await?;
                    println!("stopped collecting");
                }
                Command::Shutdown => {
                    orchestrator::shutdown_cluster(&coordinator, &resolver).await?;
                    println!("cluster shutdown sent");
                }
                Command::Sample => unreachable!(),
            }
        }
        Command::Sample => {
            let Some(target) = args
                .target_node_id
                .clone()
                .or_else(|| config.target_node_id.clone())
            else {
                bail!("target_node_id is required for sample (flag or config)");
            };
            let path = orchestrator::request_sample(&target, &resolver, Path::new(".")).await?;
            println!("wrote {}", path.display());
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    let filter = if debug { "debug,camline=trace" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
