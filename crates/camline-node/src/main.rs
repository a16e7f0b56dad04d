//! Camline node server - one participant in the camera array.
//!
//! Loads the resolved configuration, builds the resolver (probing the name
//! service first when configured), and serves the Node service - plus the
//! Coordinator service when this node is the configured coordinator.

use anyhow::{bail, Context, Result};
use camline_core::{CliRunner, Config, Resolver};
use camline_node::server;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Camline node server - one participant in the camera array.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Friendly identifier for this node; must match a configured node
    /// name and determines the listen port
    #[arg(long)]
    node_id: Option<String>,

    /// Name of the node that coordinates the array
    #[arg(long)]
    coordinator_node_id: Option<String>,

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

    let Some(node_id) = args.node_id.clone().or_else(|| config.node_id.clone()) else {
        bail!("node_id is required (flag or config)");
    };
    let Some(coordinator_id) = args
        .coordinator_node_id
        .clone()
        .or_else(|| config.coordinator_node_id.clone())
    else {
        bail!("coordinator_node_id is required (flag or config)");
    };

    let runner = CliRunner::new(&config)?;

    let resolver = Resolver::from_config(&config);
    let resolver = if config.probe_nodes {
        resolver.probe(&runner).await
    } else {
        resolver
    };
    let resolver = Arc::new(resolver);

    let listen = resolver.address_for_name(&node_id, true)?;
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address {listen}"))?;
    info!(node = %node_id, coordinator = %coordinator_id, %addr, "starting node server");

    let router = server::build_router(&node_id, &coordinator_id, resolver, runner);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut serve = tokio::spawn(router.serve_with_shutdown(addr, async {
        let _ = shutdown_rx.await;
    }));

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        res = &mut serve => {
            res.context("server task failed")?.context("server exited with error")?;
            return Ok(());
        }
        _ = sigterm.recv() => info!(node = %node_id, "received SIGTERM"),
        _ = tokio::signal::ctrl_c() => info!(node = %node_id, "received interrupt"),
    }

    // Stop accepting new requests and give in-flight RPCs a bounded grace
    // period. A live recording process is deliberately not part of this;
    // only an explicit record request with nothing to start ends it.
    let _ = shutdown_tx.send(());
    match tokio::time::timeout(server::SHUTDOWN_GRACE, &mut serve).await {
        Ok(res) => {
            res.context("server task failed")?
                .context("server exited with error")?;
            info!("shut down gracefully");
        }
        Err(_) => {
            warn!("grace period expired; aborting in-flight requests");
            serve.abort();
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
