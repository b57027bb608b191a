use crate::{CapturedImage, Result};

/// A minimal blocking photo-capture interface.
///
/// Implementations are driven exclusively by [`CameraArbiter`], which calls
/// them one operation at a time.
///
/// [`CameraArbiter`]: crate::CameraArbiter
pub trait CaptureDevice: Send {
    /// Initialize photo mode so captures can be taken.
    fn start(&mut self) -> Result<()>;

    /// Take one photo. Only valid after a successful `start`.
    fn capture(&mut self) -> Result<CapturedImage>;

    /// Tear photo mode down again.
    fn stop(&mut self) -> Result<()>;
}
