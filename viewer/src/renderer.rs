use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::crossfade::{fade_in, FadeOptions};
use crate::surface::{decode, DisplaySurface, ElementId};
use crate::ViewerError;

/// Per-surface render state: what is on screen and what is fading in.
/// Exactly one of "current at full opacity" or "pending transitioning in
/// above current" is the visible truth at any time.
#[derive(Debug, Default)]
pub struct RenderState {
    pub current: Option<ElementId>,
    pub pending: Option<ElementId>,
    pub transition_progress: f64,
}

/// Polls a source URL at a fixed rate and crossfades each fetched frame
/// over the previous one. Fetch and decode failures skip their tick and
/// leave the display untouched; the schedule itself never stops on error.
pub struct PollingRenderer<S: DisplaySurface + 'static> {
    surface: Arc<S>,
    state: Arc<Mutex<RenderState>>,
    fade: FadeOptions,
    running: Mutex<Option<Poll>>,
}

struct Poll {
    alive: Arc<AtomicBool>,
}

impl<S: DisplaySurface + 'static> PollingRenderer<S> {
    pub fn new(surface: Arc<S>, fade: FadeOptions) -> Self {
        Self {
            surface,
            state: Arc::new(Mutex::new(RenderState::default())),
            fade,
            running: Mutex::new(None),
        }
    }

    /// Begin polling. A no-op while already polling; changing settings
    /// goes through [`PollingRenderer::update_settings`].
    pub fn start(&self, source_url: &str, frequency: f64) -> Result<(), ViewerError> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(ViewerError::InvalidFrequency(frequency));
        }
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            debug!("renderer already polling, ignoring start");
            return Ok(());
        }
        let alive = Arc::new(AtomicBool::new(true));
        tokio::spawn(run_poll(
            Arc::clone(&self.surface),
            Arc::clone(&self.state),
            self.fade.clone(),
            source_url.to_string(),
            Duration::from_secs_f64(1.0 / frequency),
            Arc::clone(&alive),
        ));
        *running = Some(Poll { alive });
        info!(source_url, frequency, "polling started");
        Ok(())
    }

    /// Stop polling and cancel any in-flight fade. Effective before this
    /// returns: no tick starts afterwards, and a stale fade can never
    /// complete and resurrect a retired element.
    pub fn stop(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(poll) = running.take() {
            poll.alive.store(false, Ordering::SeqCst);
            info!("polling stopped");
        }
    }

    /// Restart with new settings, atomically from the caller's point of
    /// view: no tick ever runs with a mixed old/new URL or period.
    #[allow(dead_code)]
    pub fn update_settings(&self, source_url: &str, frequency: f64) -> Result<(), ViewerError> {
        self.stop();
        self.start(source_url, frequency)
    }

    #[allow(dead_code)]
    pub fn state(&self) -> Arc<Mutex<RenderState>> {
        Arc::clone(&self.state)
    }
}

async fn run_poll<S: DisplaySurface + 'static>(
    surface: Arc<S>,
    state: Arc<Mutex<RenderState>>,
    fade: FadeOptions,
    source_url: String,
    period: Duration,
    alive: Arc<AtomicBool>,
) {
    let client = match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "failed to build HTTP client; polling aborted");
            return;
        }
    };

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if !alive.load(Ordering::SeqCst) {
            break;
        }
        if let Err(e) =
            fetch_and_crossfade(&client, &source_url, &surface, &state, &fade, &alive).await
        {
            warn!(error = %e, "poll tick skipped, display left untouched");
        }
    }
}

/// One tick: fetch, decode, then either show immediately (first frame) or
/// fade the new frame in above the current one. Fades run concurrently
/// with later ticks; the last writer wins and skipped frames are not
/// buffered.
async fn fetch_and_crossfade<S: DisplaySurface + 'static>(
    client: &reqwest::Client,
    source_url: &str,
    surface: &Arc<S>,
    state: &Arc<Mutex<RenderState>>,
    fade: &FadeOptions,
    alive: &Arc<AtomicBool>,
) -> Result<(), ViewerError> {
    let response = client.get(source_url).send().await?;
    if !response.status().is_success() {
        return Err(ViewerError::HttpStatus(response.status().as_u16()));
    }
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        // The relay answers an empty body until its first capture lands.
        debug!("source has no frame yet");
        return Ok(());
    }
    let image = decode(bytes)?;

    let old = state.lock().unwrap_or_else(|e| e.into_inner()).current;
    match old {
        None => {
            let id = surface.place(&image, 1.0);
            let mut st = state.lock().unwrap_or_else(|e| e.into_inner());
            st.current = Some(id);
            st.transition_progress = 1.0;
            debug!(id, "first frame displayed");
        }
        Some(_) => {
            let new_id = surface.place(&image, 0.0);
            state.lock().unwrap_or_else(|e| e.into_inner()).pending = Some(new_id);
            let surface = Arc::clone(surface);
            let state = Arc::clone(state);
            let fade = fade.clone();
            let alive = Arc::clone(alive);
            tokio::spawn(async move {
                fade_in(surface.as_ref(), &state, new_id, &fade, &alive).await;
            });
        }
    }
    Ok(())
}
