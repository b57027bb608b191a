use core::fmt;
use glam::Mat4;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

static NEXT_REQUESTER: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a camera user. The arbiter only ever compares these
/// for equality; what sits behind the handle is the caller's business.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RequesterId(u64);

impl RequesterId {
    pub fn new() -> Self {
        Self(NEXT_REQUESTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequesterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "requester#{id}", id = self.0)
    }
}

/// One captured photo together with the projection matrix that was active
/// when it was taken. Pixels are BGRA32, row-major.
#[derive(Clone, Debug)]
pub struct CapturedImage {
    pub bgra: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub projection: Mat4,
    pub ts: Option<OffsetDateTime>,
}

/// Lifecycle of the capture device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CaptureState {
    Idle,
    StartingCapture,
    Error,
    Ready,
    Capturing,
    Stopping,
}
