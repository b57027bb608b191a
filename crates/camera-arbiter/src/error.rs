use thiserror::Error;

pub type Result<T, E = CaptureError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device error: {0}")]
    Device(String),
}
