use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use image::ImageReader;
use tracing::{info, trace};

use crate::ViewerError;

pub type ElementId = u64;

/// A decoded, displayable image. The original bytes travel along with the
/// decoded dimensions so a surface can blit or re-encode as it pleases.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    pub width: u32,
    pub height: u32,
    pub bytes: Bytes,
}

/// Where decoded frames are shown. Implementations stack elements:
/// `place` inserts a new element above everything already on the surface.
///
/// `remove` of an element that is already gone must be a no-op.
pub trait DisplaySurface: Send + Sync {
    fn place(&self, image: &ImageHandle, opacity: f64) -> ElementId;
    fn set_opacity(&self, id: ElementId, opacity: f64);
    fn remove(&self, id: ElementId);
}

/// Validate fetched bytes as an image and build a handle for the surface.
pub fn decode(bytes: Bytes) -> Result<ImageHandle, ViewerError> {
    let img = ImageReader::new(Cursor::new(bytes.as_ref()))
        .with_guessed_format()
        .map_err(|e| ViewerError::Decode(image::ImageError::IoError(e)))?
        .decode()?;
    Ok(ImageHandle {
        width: img.width(),
        height: img.height(),
        bytes,
    })
}

/// Surface that narrates transitions through tracing, used when the
/// viewer runs headless.
pub struct LogSurface {
    next_id: AtomicU64,
}

impl LogSurface {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for LogSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySurface for LogSurface {
    fn place(&self, image: &ImageHandle, opacity: f64) -> ElementId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(
            id,
            width = image.width,
            height = image.height,
            opacity,
            "placed element"
        );
        id
    }

    fn set_opacity(&self, id: ElementId, opacity: f64) {
        trace!(id, opacity, "element opacity");
    }

    fn remove(&self, id: ElementId) {
        info!(id, "removed element");
    }
}
