//! camera-arbiter: exclusive-access arbitration for the locatable camera
//!
//! One physical camera, several would-be users. The arbiter hands out
//! exclusive usage, owns the photo-capture lifecycle, and serializes every
//! device transition through a single lock. The default build enables a
//! `mock` capture backend so binaries compile on hosts without the camera
//! hardware.

mod types;
pub use types::{CaptureState, CapturedImage, RequesterId};

mod error;
pub use error::{CaptureError, Result};

mod traits;
pub use traits::CaptureDevice;

mod arbiter;
pub use arbiter::{CameraArbiter, ImageSink};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::MockCapture;
