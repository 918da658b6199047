//! SDK error types.

use cubeml_core::CubeError;
use thiserror::Error;

/// Errors raised while loading STAC:MLM items and fetching model assets.
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Cache error: {0}")]
    CacheError(String),
    #[error("Invalid STAC item: {0}")]
    InvalidItem(String),
    #[error("Unsupported framework: {0}")]
    UnsupportedFramework(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error(transparent)]
    Core(#[from] CubeError),
}

/// Result type for SDK operations.
pub type SdkResult<T> = Result<T, SdkError>;

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::SerializationError(err.to_string())
    }
}

impl From<SdkError> for CubeError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::Core(inner) => inner,
            SdkError::IoError(inner) => CubeError::Io(inner),
            SdkError::SerializationError(msg) => CubeError::Serialization(msg),
            other => CubeError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// Map a `ureq` failure to an [`SdkError`].
pub(crate) fn ureq_error(error: ureq::Error, operation: &str) -> SdkError {
    match error {
        ureq::Error::Status(status, _) => {
            SdkError::NetworkError(format!("{} failed with status {}", operation, status))
        }
        ureq::Error::Transport(transport) => match transport.kind() {
            ureq::ErrorKind::Dns => {
                SdkError::NetworkError(format!("Failed to {} (DNS resolution failed)", operation))
            }
            ureq::ErrorKind::ConnectionFailed => {
                SdkError::NetworkError(format!("Failed to {} (connection failed)", operation))
            }
            _ => SdkError::NetworkError(format!("Failed to {}: {}", operation, transport)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_round_trip() {
        let sdk: SdkError = CubeError::config("bad").into();
        assert!(matches!(CubeError::from(sdk), CubeError::Config(_)));
    }

    #[test]
    fn test_network_error_becomes_io() {
        let err = CubeError::from(SdkError::NetworkError("offline".to_string()));
        assert!(matches!(err, CubeError::Io(_)));
        assert!(err.to_string().contains("offline"));
    }
}
