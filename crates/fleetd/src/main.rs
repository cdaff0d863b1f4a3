//! fleetd — the FleetGrid daemon.
//!
//! Single binary running:
//! - Registry (redb)
//! - Scaling service over the configured engines
//! - Work distributor
//! - REST API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! fleetd run --config fleet.toml --data-dir /var/lib/fleetgrid --port 8080
//! fleetd run --config fleet.toml --simulate
//! fleetd check-config --config fleet.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fleet_core::{FleetConfig, SystemClock};
use fleetd::Fleet;
use fleetgrid_providers::{ProviderClients, SimulatedCloud};
use fleetgrid_state::StateStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,fleetd=debug,fleetgrid=debug";

#[derive(Parser)]
#[command(name = "fleetd", about = "FleetGrid GPU fleet daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scaling service, work distributor and API.
    Run {
        /// Path to fleet.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/fleetgrid")]
        data_dir: PathBuf,

        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Back every engine with the in-memory simulated cloud.
        #[arg(long)]
        simulate: bool,
    },
    /// Parse and validate a config file.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
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
            simulate,
        } => run(config.as_deref(), &data_dir, port, simulate).await,
        Command::CheckConfig { config } => check_config(&config),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<FleetConfig> {
    match path {
        Some(path) => Ok(FleetConfig::from_file(path)?),
        None => Ok(FleetConfig::default()),
    }
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = FleetConfig::from_file(path)?;
    println!("config ok: {}", path.display());
    println!("  models: {}", config.distributor.models.join(", "));
    for (i, engine) in config.engines.iter().enumerate() {
        println!(
            "  engine {}: {} {} (max allocation {:.0}%)",
            i + 1,
            engine.provider,
            engine.gpu_type,
            engine.max_allocation_percentage * 100.0
        );
    }
    Ok(())
}

async fn run(
    config_path: Option<&Path>,
    data_dir: &Path,
    port: u16,
    simulate: bool,
) -> anyhow::Result<()> {
    info!("FleetGrid daemon starting");
    let config = load_config(config_path)?;

    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("fleetgrid.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let clients = if simulate {
        let cloud = Arc::new(SimulatedCloud::new(&config.simulation.inventory));
        info!(
            entries = config.simulation.inventory.len(),
            "simulated cloud enabled"
        );
        ProviderClients::simulated(cloud)
    } else {
        ProviderClients::default()
    };

    let fleet = Fleet::assemble(config, store, &clients, Arc::new(SystemClock))?;
    let timers = fleet.start();

    let router = fleet.router();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await?;

    timers.stop();
    info!("FleetGrid daemon stopped");
    Ok(())
}
