use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use crate::renderer::RenderState;
use crate::surface::{DisplaySurface, ElementId};

/// Crossfade pacing. The defaults are a 300 ms fade in 15 discrete steps
/// (20 ms apiece).
#[derive(Debug, Clone)]
pub struct FadeOptions {
    pub duration: Duration,
    pub steps: u32,
}

impl Default for FadeOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(300),
            steps: 15,
        }
    }
}

impl FadeOptions {
    /// `steps` must be at least 1; config validation enforces this.
    pub fn from_millis(duration_ms: u64, steps: u32) -> Self {
        Self {
            duration: Duration::from_millis(duration_ms),
            steps,
        }
    }

    fn step_time(&self) -> Duration {
        self.duration / self.steps
    }
}

/// Fade `new` in, then retire the previous element and adopt `new` as
/// the current one. The predecessor is removed only once `new` is fully
/// opaque, so the surface is never visibly blank mid-transition.
///
/// Which element gets retired is decided at completion time, not at fade
/// start: when fades overlap, an earlier fade may have already swapped
/// `current` underneath this one, and removing the id that was current
/// when this fade began would strand that earlier element on the surface
/// at full opacity.
///
/// The cancellation flag is checked before every step: once the renderer
/// is stopped, a stale fade must neither keep animating nor complete and
/// resurrect an element the surface already dropped.
pub async fn fade_in<S: DisplaySurface + ?Sized>(
    surface: &S,
    state: &Mutex<RenderState>,
    new: ElementId,
    opts: &FadeOptions,
    alive: &AtomicBool,
) {
    let step_time = opts.step_time();
    for step in 1..=opts.steps {
        tokio::time::sleep(step_time).await;
        if !alive.load(Ordering::SeqCst) {
            debug!(new, step, "fade cancelled");
            return;
        }
        let opacity = f64::from(step) / f64::from(opts.steps);
        surface.set_opacity(new, opacity);
        state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .transition_progress = opacity;
    }

    surface.set_opacity(new, 1.0);
    let retired = {
        let mut st = state.lock().unwrap_or_else(|e| e.into_inner());
        let retired = st.current.filter(|&id| id != new);
        st.current = Some(new);
        if st.pending == Some(new) {
            st.pending = None;
        }
        st.transition_progress = 1.0;
        retired
    };
    if let Some(old) = retired {
        surface.remove(old);
    }
    debug!(new, "crossfade complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::testing::MockSurface;
    use crate::surface::ImageHandle;
    use bytes::Bytes;
    use std::sync::Arc;

    fn handle() -> ImageHandle {
        ImageHandle {
            width: 1,
            height: 1,
            bytes: Bytes::from_static(b"x"),
        }
    }

    fn seeded(surface: &MockSurface) -> (ElementId, ElementId, Mutex<RenderState>) {
        let old = surface.place(&handle(), 1.0);
        let new = surface.place(&handle(), 0.0);
        let state = Mutex::new(RenderState {
            current: Some(old),
            pending: Some(new),
            transition_progress: 0.0,
        });
        (old, new, state)
    }

    #[tokio::test]
    async fn completed_fade_retires_the_old_element() {
        let surface = MockSurface::new();
        let (old, new, state) = seeded(&surface);
        let alive = AtomicBool::new(true);

        fade_in(&surface, &state, new, &FadeOptions::from_millis(50, 5), &alive).await;

        assert_eq!(surface.snapshot(), vec![(new, 1.0)]);
        assert!(!surface.snapshot().iter().any(|&(id, _)| id == old));
        let st = state.lock().unwrap();
        assert_eq!(st.current, Some(new));
        assert_eq!(st.pending, None);
        assert_eq!(st.transition_progress, 1.0);
    }

    #[tokio::test]
    async fn both_elements_visible_mid_fade() {
        let surface = Arc::new(MockSurface::new());
        let (old, new, state) = seeded(&surface);
        let state = Arc::new(state);
        let alive = Arc::new(AtomicBool::new(true));

        let fade = {
            let surface = Arc::clone(&surface);
            let state = Arc::clone(&state);
            let alive = Arc::clone(&alive);
            tokio::spawn(async move {
                fade_in(
                    surface.as_ref(),
                    &state,
                    new,
                    &FadeOptions::from_millis(200, 10),
                    &alive,
                )
                .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(90)).await;
        let snapshot = surface.snapshot();
        assert_eq!(snapshot.len(), 2, "both elements should be present mid-fade");
        let old_op = snapshot.iter().find(|&&(id, _)| id == old).unwrap().1;
        let new_op = snapshot.iter().find(|&&(id, _)| id == new).unwrap().1;
        assert_eq!(old_op, 1.0, "old element must stay fully opaque");
        assert!(new_op > 0.0 && new_op < 1.0, "new element opacity: {new_op}");

        fade.await.unwrap();
        assert_eq!(surface.fully_opaque(), vec![new]);
    }

    #[tokio::test]
    async fn cancelled_fade_touches_nothing_further() {
        let surface = Arc::new(MockSurface::new());
        let (old, new, state) = seeded(&surface);
        let state = Arc::new(state);
        let alive = Arc::new(AtomicBool::new(true));

        let fade = {
            let surface = Arc::clone(&surface);
            let state = Arc::clone(&state);
            let alive = Arc::clone(&alive);
            tokio::spawn(async move {
                fade_in(
                    surface.as_ref(),
                    &state,
                    new,
                    &FadeOptions::from_millis(200, 10),
                    &alive,
                )
                .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(70)).await;
        alive.store(false, Ordering::SeqCst);
        fade.await.unwrap();

        let snapshot = surface.snapshot();
        assert_eq!(snapshot.len(), 2, "cancellation must not remove elements");
        let new_op = snapshot.iter().find(|&&(id, _)| id == new).unwrap().1;
        assert!(new_op < 1.0, "cancelled fade must not reach full opacity");
        // The old element is still what the state considers current.
        assert_eq!(state.lock().unwrap().current, Some(old));
    }

    #[tokio::test]
    async fn overlapping_fades_leave_one_opaque_element() {
        let surface = Arc::new(MockSurface::new());
        let (first, second, state) = seeded(&surface);
        let state = Arc::new(state);
        let alive = Arc::new(AtomicBool::new(true));

        let spawn_fade = |new: ElementId| {
            let surface = Arc::clone(&surface);
            let state = Arc::clone(&state);
            let alive = Arc::clone(&alive);
            tokio::spawn(async move {
                fade_in(
                    surface.as_ref(),
                    &state,
                    new,
                    &FadeOptions::from_millis(120, 6),
                    &alive,
                )
                .await;
            })
        };

        // A faster-than-fade poll: the third element starts fading in
        // while the second is still animating, so the first fade swaps
        // `current` underneath the second one.
        let fade_a = spawn_fade(second);
        tokio::time::sleep(Duration::from_millis(40)).await;
        let third = surface.place(&handle(), 0.0);
        state.lock().unwrap().pending = Some(third);
        let fade_b = spawn_fade(third);

        fade_a.await.unwrap();
        fade_b.await.unwrap();

        // Both predecessors were retired in turn: the first by the
        // earlier fade, the second by the later one.
        assert_eq!(surface.fully_opaque(), vec![third]);
        assert_eq!(surface.snapshot().len(), 1, "earlier elements leaked");
        assert!(!surface.snapshot().iter().any(|&(id, _)| id == first));
        let st = state.lock().unwrap();
        assert_eq!(st.current, Some(third));
        assert_eq!(st.pending, None);
    }
}
