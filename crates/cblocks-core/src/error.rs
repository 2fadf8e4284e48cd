//! Error taxonomy shared by every CBlocks crate.

use thiserror::Error;

/// Result type for CBlocks operations.
pub type Result<T> = std::result::Result<T, Error>;

/// CBlocks error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown object, instance, resource or mapping.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Schema, writeability or applicability violation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A topic string did not match the resource topic layout.
    #[error("Invalid topic format: {0}")]
    InvalidTopicFormat(String),

    /// Failure reported by the device on its error channel.
    #[error("Device error: {0}")]
    Device(String),

    /// No device response arrived within the write timeout.
    #[error("Timed out after {0} ms waiting for device response")]
    Timeout(u64),

    /// A write to the same client and resource is already in flight.
    #[error("Write already pending: {0}")]
    Busy(String),

    /// Underlying persistence failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Broker publish or subscribe failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// HTTP-equivalent status code used by the route layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::Validation(_) | Error::InvalidTopicFormat(_) => 400,
            Error::Busy(_) => 409,
            Error::Device(_) => 502,
            Error::Timeout(_) => 504,
            Error::Store(_) | Error::Transport(_) | Error::Serialization(_) => 500,
        }
    }

    /// Whether this is a validation failure, malformed topics included.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::InvalidTopicFormat(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
