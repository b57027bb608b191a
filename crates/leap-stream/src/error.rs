use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("undecodable pose frame: {0}")]
    Decode(#[from] serde_json::Error),
}
