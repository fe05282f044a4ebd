/// RDZ Bridge
///
/// Polls an RDZ controller and prints every published snapshot as JSON.
///
/// Usage: `rdz-bridge <config.yaml> [--simulate]`
///
/// `--simulate` replaces the TCP connection with an in-memory controller
/// seeded with a small demo installation.

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use rdz_hmi_control::utils::format::format_metrics;
use rdz_hmi_control::{BridgeConfig, Coordinator, RegisterBank, SimulatedController};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut config_path = None;
    let mut simulate = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--simulate" => simulate = true,
            "-h" | "--help" => {
                println!("Usage: rdz-bridge <config.yaml> [--simulate]");
                return Ok(());
            }
            _ if config_path.is_none() => config_path = Some(arg),
            _ => bail!("Unexpected argument: {}", arg),
        }
    }
    let Some(config_path) = config_path else {
        bail!("Usage: rdz-bridge <config.yaml> [--simulate]");
    };

    let config = BridgeConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config file {}", config_path))?;
    info!("{}", rdz_hmi_control::info());

    let coordinator = if simulate {
        info!("Simulating controller for {} zones", config.zones.len());
        let bank = RegisterBank::new();
        bank.seed_demo();
        Coordinator::with_client(&config, SimulatedController::with_bank(bank))
    } else {
        info!(
            "Polling {}:{} every {}s",
            config.host, config.port, config.poll_interval_secs
        );
        Coordinator::from_config(&config)
    }
    .context("Failed to create coordinator")?;

    let mut updates = coordinator.subscribe();
    let poller = coordinator.spawn();

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(snapshot) => {
                    let report = serde_json::to_string_pretty(&snapshot.report())
                        .context("Failed to serialize snapshot")?;
                    println!("{}", report);
                    let stale = snapshot.stale_groups();
                    if !stale.is_empty() {
                        warn!("Snapshot {} has {} stale groups", snapshot.version(), stale.len());
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} snapshots", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down...");
                break;
            }
        }
    }

    poller.shutdown().await.context("Failed to shut down coordinator")?;
    println!("{}", format_metrics(&coordinator.metrics()));
    Ok(())
}
