//! fusionsrv binary
//!
//! Loads the service configuration, wires transports into the registry and
//! runs the tick coordinator until ctrl-c. The standalone binary attaches
//! the simulated transport backend to every endpoint; deployments with real
//! hardware embed the library and supply their own clients.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fusion_model::CanaryPolicy;
use fusionsrv::registry::{TransportRegistry, TransportSlot};
use fusionsrv::transport::SimTransport;
use fusionsrv::{Coordinator, ServiceConfig, SnapshotStore, Validator};

#[derive(Parser, Debug)]
#[command(name = "fusionsrv", about = "Solar fleet data coordination and fusion service")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "fusionsrv.toml", env = "FUSIONSRV_CONFIG")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ServiceConfig::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    if args.check {
        info!(
            devices = config.devices.len(),
            transports = config.transports.len(),
            groups = config.groups.len(),
            "configuration valid"
        );
        return Ok(());
    }

    let slots: Vec<TransportSlot> = config
        .transports
        .iter()
        .map(|entry| {
            info!(endpoint = %entry.key(), devices = entry.devices.len(),
                  "attaching simulated backend");
            TransportSlot {
                entry: entry.clone(),
                client: Arc::new(SimTransport::new(entry.kind)),
            }
        })
        .collect();

    let config = Arc::new(config);
    let registry = Arc::new(TransportRegistry::new(slots));
    let validator = Arc::new(Validator::new(
        CanaryPolicy::default(),
        config.canary_enabled,
        config.rejection_log_cooldown(),
    ));
    let store = Arc::new(SnapshotStore::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_refresh_tx, refresh_rx) = mpsc::channel(16);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, draining current tick");
        let _ = shutdown_tx.send(true);
    });

    let mut coordinator = Coordinator::new(
        config,
        registry,
        validator,
        store,
        shutdown_rx,
        refresh_rx,
    );
    coordinator.run().await;

    info!("fusionsrv stopped");
    Ok(())
}
