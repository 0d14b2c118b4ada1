use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use framecast_common::config::{validate_frequency, ConfigError};
use framecast_common::store::FrameStore;
use tracing::info;

use crate::capture::{CaptureFn, CaptureScheduler};
use crate::server::{ImageServer, ServeError};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Serve(#[from] ServeError),
}

/// The producer-side session: owns the frame store, the capture schedule
/// and the HTTP listener. This is the surface a settings UI or CLI
/// drives; there is no process-wide state behind it.
pub struct Monitor {
    store: Arc<FrameStore>,
    scheduler: CaptureScheduler,
    server: Option<ImageServer>,
    capture: CaptureFn,
    port: u16,
    frequency: f64,
}

impl Monitor {
    pub fn new(capture: CaptureFn, port: u16, frequency: f64) -> Self {
        let store = Arc::new(FrameStore::new());
        let scheduler = CaptureScheduler::new(Arc::clone(&store));
        Self {
            store,
            scheduler,
            server: None,
            capture,
            port,
            frequency,
        }
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency)
    }

    /// Begin monitoring: bring the listener up if it is not already
    /// serving, then start the capture schedule.
    pub async fn start(&mut self) -> Result<(), RelayError> {
        if self.server.is_none() {
            self.server = Some(ImageServer::start(self.port, Arc::clone(&self.store)).await?);
        }
        self.scheduler.start(self.period(), Arc::clone(&self.capture));
        info!(port = self.port, frequency = self.frequency, "monitoring started");
        Ok(())
    }

    /// Halt the capture schedule. The listener stays up and keeps serving
    /// the last captured frame.
    #[allow(dead_code)]
    pub fn stop(&self) {
        self.scheduler.stop();
        info!("monitoring stopped");
    }

    /// Switch to a new capture frequency. A running schedule is restarted
    /// whole; the period of a live ticking loop is never mutated in place.
    #[allow(dead_code)]
    pub fn set_frequency(&mut self, frequency: f64) -> Result<(), RelayError> {
        validate_frequency("capture", frequency)?;
        self.frequency = frequency;
        if self.scheduler.is_running() {
            self.scheduler.stop();
            self.scheduler.start(self.period(), Arc::clone(&self.capture));
        }
        info!(frequency, "capture frequency updated");
        Ok(())
    }

    /// Move the listener to a new port. The old listener is torn down
    /// first; a bind failure propagates instead of quietly keeping the
    /// old port.
    #[allow(dead_code)]
    pub async fn apply_port(&mut self, port: u16) -> Result<(), RelayError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort.into());
        }
        let was_serving = self.server.is_some();
        if let Some(server) = self.server.take() {
            server.stop().await;
        }
        self.port = port;
        if was_serving {
            self.server = Some(ImageServer::start(port, Arc::clone(&self.store)).await?);
        }
        info!(port, "listener port updated");
        Ok(())
    }

    /// Tear everything down: schedule and listener.
    pub async fn shutdown(&mut self) {
        self.scheduler.stop();
        if let Some(server) = self.server.take() {
            server.stop().await;
        }
    }

    /// Address consumers should poll. The path is cosmetic; the listener
    /// serves the latest frame on every path.
    pub fn address(&self) -> String {
        format!("http://localhost:{}/latest.png", self.port)
    }

    #[allow(dead_code)]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|s| s.local_addr())
    }

    #[allow(dead_code)]
    pub fn store(&self) -> &Arc<FrameStore> {
        &self.store
    }
}
