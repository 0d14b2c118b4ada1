mod crossfade;
mod renderer;
mod surface;

use std::path::PathBuf;
use std::sync::Arc;

use framecast_common::config::Config;
use tracing::{error, info};

use crossfade::FadeOptions;
use renderer::PollingRenderer;
use surface::LogSurface;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("invalid poll frequency {0}: must be a positive number of polls per second")]
    InvalidFrequency(f64),
    #[error("fetch failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("source returned HTTP status {0}")]
    HttpStatus(u16),
    #[error("fetched bytes are not a decodable image: {0}")]
    Decode(#[from] image::ImageError),
}

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
        source_url = config.viewer.source_url,
        frequency = config.viewer.frequency,
        "starting framecast viewer"
    );

    let renderer = PollingRenderer::new(
        Arc::new(LogSurface::new()),
        FadeOptions::from_millis(config.viewer.fade_duration_ms, config.viewer.fade_steps),
    );
    if let Err(e) = renderer.start(&config.viewer.source_url, config.viewer.frequency) {
        error!(error = %e, "failed to start renderer");
        std::process::exit(1);
    }

    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");
    renderer.stop();
}
