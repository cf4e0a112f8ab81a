use thiserror::Error;
use vsink_shared::ShmError;

use crate::video::scaler::ScaleError;

/// Frame sink errors.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The shared-memory segment could not be created, opened or mapped.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(#[from] ShmError),

    #[error("scale failed: {0}")]
    Scale(#[from] ScaleError),

    #[error("settings error: {0}")]
    Settings(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, SinkError>;
