//! leap-calib: sensor-to-camera calibration for the Leap bridge
//!
//! Carries the calibration handshake with the sensor host over the reliable
//! control channel, drives the camera arbiter while calibration imagery is
//! captured, and persists the resulting sensor-to-camera transform.

mod transform;
pub use transform::CalibrationTransform;

mod store;
pub use store::{CalibrationStore, StoreError};

mod error;
pub use error::{Error, Result};

pub mod protocol;
pub use protocol::{bgra_to_bgr, CameraIntrinsics, ControlMessage};

mod coordinator;
pub use coordinator::{
    CalibrationCoordinator, CalibrationMode, CoordinatorOutputs, SessionState,
};
