//! leap-stream: continuous hand/arm pose streaming
//!
//! Decodes pose frames arriving from the sensor host over the unreliable
//! frame channel and maps every vector in them into the camera's coordinate
//! space using the published calibration transform.

mod models;
pub use models::{ArmData, FingerData, FingerType, ForearmData, HandData, PoseFrame};

mod error;
pub use error::{Error, Result};

mod channel;
pub use channel::FrameChannel;

mod transformer;
pub use transformer::FrameTransformer;
