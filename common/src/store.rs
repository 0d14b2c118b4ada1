use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::RwLock;

/// One captured image together with its version and capture time.
///
/// Versions are assigned by [`FrameStore::set`] and strictly increase on
/// every successful capture. The "nothing captured yet" sentinel carries
/// version 0 and empty bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: Bytes,
    pub version: u64,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// The empty sentinel returned before the first capture.
    pub fn empty() -> Self {
        Self {
            bytes: Bytes::new(),
            version: 0,
            captured_at: DateTime::UNIX_EPOCH,
        }
    }

    /// True while no frame has been captured yet.
    pub fn is_empty(&self) -> bool {
        self.version == 0
    }
}

/// Single-slot, last-writer-wins holder for the latest frame.
///
/// The lock is held only for the swap/copy, never across an await point,
/// so a slow capture can never make readers wait on anything but the swap
/// itself. Payload bytes are refcounted (`Bytes`), so `get` hands out an
/// atomic snapshot without copying the image. Readers share the read lock
/// and are not serialized against each other.
pub struct FrameStore {
    slot: RwLock<Frame>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Frame::empty()),
        }
    }

    /// Replace the stored frame wholesale. Always succeeds; returns the
    /// version assigned to the new frame.
    pub fn set(&self, bytes: Bytes) -> u64 {
        // A poisoned lock still holds a whole frame (every write is a
        // total replacement), so recover the guard instead of propagating.
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        let version = slot.version + 1;
        *slot = Frame {
            bytes,
            version,
            captured_at: Utc::now(),
        };
        version
    }

    /// Snapshot of the current frame, or the empty sentinel before the
    /// first `set`. Never observes a torn write.
    pub fn get(&self) -> Frame {
        self.slot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}
