//! fleetd — the FleetGrid daemon.
//!
//! Single binary that assembles the FleetGrid subsystems:
//! - State store (redb)
//! - Upgrader loop
//! - REST API
//!
//! # Usage
//!
//! ```text
//! fleetd run --config /etc/fleetgrid/fleetd.toml --port 8480
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::FleetdConfig;

#[derive(Parser)]
#[command(name = "fleetd", about = "FleetGrid daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the upgrader loop and the API server.
    Run {
        /// Path to fleetd.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for persistent state.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Upgrader interval in seconds.
        #[arg(long)]
        interval: Option<u64>,

        /// Serve the API without starting the upgrader loop.
        #[arg(long)]
        no_upgrader: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            config,
            data_dir,
            port,
            interval,
            no_upgrader,
        } => {
            let mut config = FleetdConfig::load(config.as_deref())?;
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            if let Some(port) = port {
                config.api.port = port;
            }
            if let Some(interval) = interval {
                config.upgrader.interval_secs = interval;
            }
            if no_upgrader {
                config.upgrader.enabled = false;
            }
            config.validate()?;
            run(config).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fleetd=debug,fleetgrid=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: FleetdConfig) -> anyhow::Result<()> {
    info!("FleetGrid daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.db_path();

    let store = fleetgrid_state::StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Upgrader loop ──────────────────────────────────────────

    let upgrader_handle = if config.upgrader.enabled {
        let upgrader =
            fleetgrid_upgrader::Upgrader::from_store(store.clone(), config.upgrader.interval());
        let upgrader_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            upgrader.run(upgrader_shutdown).await;
        }))
    } else {
        info!("upgrader disabled");
        None
    };

    // ── API server ─────────────────────────────────────────────

    let router = fleetgrid_api::build_router(store);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    if let Some(handle) = upgrader_handle {
        let _ = handle.await;
    }

    info!("FleetGrid daemon stopped");
    Ok(())
}
