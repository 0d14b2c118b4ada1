mod capture;
mod monitor;
mod server;
mod simctl;

use std::path::PathBuf;

use framecast_common::config::Config;
use monitor::Monitor;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        port = config.server.port,
        frequency = config.capture.frequency,
        "starting framecast relay"
    );

    let udid = match &config.capture.simulator_udid {
        Some(udid) => udid.clone(),
        None => match simctl::booted_simulators().await {
            Ok(sims) if !sims.is_empty() => {
                let sim = &sims[0];
                info!(name = sim.name, udid = sim.udid, "using first booted simulator");
                sim.udid.clone()
            }
            Ok(_) => {
                error!("no booted simulators found; boot one or set capture.simulator_udid");
                std::process::exit(1);
            }
            Err(e) => {
                error!(error = %e, "failed to list simulators");
                std::process::exit(1);
            }
        },
    };

    let mut monitor = Monitor::new(
        simctl::screenshot_capture(udid),
        config.server.port,
        config.capture.frequency,
    );
    if let Err(e) = monitor.start().await {
        error!(error = %e, "failed to start monitoring");
        std::process::exit(1);
    }
    info!(address = monitor.address(), "serving latest frame");

    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");
    monitor.shutdown().await;
}
