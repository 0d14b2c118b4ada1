use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use framecast_common::store::FrameStore;
use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// One capture attempt: produce the latest frame bytes, possibly failing.
/// The mechanism (subprocess, network fetch, ...) is the caller's choice.
pub type CaptureFuture = BoxFuture<'static, Result<Bytes, CaptureError>>;
pub type CaptureFn = Arc<dyn Fn() -> CaptureFuture + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to spawn capture command: {0}")]
    Spawn(std::io::Error),
    #[error("capture command exited with {0}")]
    CommandFailed(std::process::ExitStatus),
    #[error("failed to parse capture command output: {0}")]
    Parse(String),
    #[error("failed to read captured image: {0}")]
    ReadOutput(std::io::Error),
    #[error("capture produced no data")]
    Empty,
}

/// Drives a capture function at a fixed period and commits successful
/// results into the shared [`FrameStore`]. A failed capture skips its
/// tick and leaves the previous frame untouched; the next tick still
/// fires at the normal period.
pub struct CaptureScheduler {
    store: Arc<FrameStore>,
    running: Mutex<Option<Schedule>>,
}

struct Schedule {
    alive: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl CaptureScheduler {
    pub fn new(store: Arc<FrameStore>) -> Self {
        Self {
            store,
            running: Mutex::new(None),
        }
    }

    /// Begin ticking every `period`. A no-op if already running. Changing
    /// the period requires `stop` first, so a reconfigured tick never
    /// races an in-flight one.
    pub fn start(&self, period: Duration, capture: CaptureFn) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            debug!("capture scheduler already running, ignoring start");
            return;
        }
        let alive = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(run_schedule(
            Arc::clone(&self.store),
            period,
            capture,
            Arc::clone(&alive),
        ));
        *running = Some(Schedule { alive, handle });
        debug!(period_ms = period.as_millis() as u64, "capture scheduler started");
    }

    /// Stop ticking. Effective before this returns: no tick body starts
    /// afterwards, and a capture already in flight has its result
    /// discarded rather than committed to a dead session.
    pub fn stop(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(schedule) = running.take() {
            schedule.alive.store(false, Ordering::SeqCst);
            debug!("capture scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }
}

async fn run_schedule(
    store: Arc<FrameStore>,
    period: Duration,
    capture: CaptureFn,
    alive: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if !alive.load(Ordering::SeqCst) {
            break;
        }
        match capture().await {
            Ok(bytes) => {
                // Stopped while the capture was in flight: the late
                // result must not revive a dead session.
                if !alive.load(Ordering::SeqCst) {
                    debug!("discarding capture that completed after stop");
                    break;
                }
                let version = store.set(bytes);
                debug!(version, "frame committed");
            }
            Err(e) => {
                warn!(error = %e, "capture failed, keeping previous frame");
            }
        }
    }
}
