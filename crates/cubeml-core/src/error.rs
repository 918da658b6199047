//! Unified error types for cubeml-core.
//!
//! Every failure raised while adapting a datacube to a model surfaces as a
//! [`CubeError`]. Validation errors are produced before any inference cost is
//! paid; nothing in the engine retries or recovers locally.
//!
//! # Error Hierarchy
//!
//! ```text
//! CubeError
//! ├── DimensionMissing(String)       -- model dimension has no cube counterpart
//! ├── DimensionMismatch { .. }       -- matched dimension is too small
//! ├── LabelDoesNotExist(String)      -- required band is absent
//! ├── Value(String)                  -- malformed band / scaling declaration
//! ├── ExpressionEvaluation(String)   -- custom expression could not be resolved
//! ├── Config(String)                 -- configuration / usage error
//! ├── NotImplemented(String)         -- declared but unsupported capability
//! ├── Backend(BackendError)          -- model runtime failure
//! ├── Io(std::io::Error)
//! └── Serialization(String)
//! ```

use crate::backend::BackendError;
use thiserror::Error;

/// The canonical error type for cubeml-core.
#[derive(Error, Debug)]
pub enum CubeError {
    /// One or more model dimensions could not be matched in the datacube
    #[error("Dimension missing: {0}")]
    DimensionMissing(String),

    /// A matched datacube dimension is smaller than the model requires
    #[error(
        "Dimension mismatch: the model input requires dimension '{dimension}' to have {required} values, \
         the datacube only has {actual}"
    )]
    DimensionMismatch {
        /// Model dimension name
        dimension: String,
        /// Size required by the model
        required: usize,
        /// Size found in the datacube
        actual: usize,
    },

    /// One or more required bands are not present in the datacube
    #[error("Label does not exist: {0}")]
    LabelDoesNotExist(String),

    /// Malformed value (derivable band declaration, scaling count, ...)
    #[error("Value error: {0}")]
    Value(String),

    /// A custom processing expression could not be resolved or evaluated
    #[error("Expression evaluation failed: {0}")]
    ExpressionEvaluation(String),

    /// Invalid configuration or usage
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capability that is declared by the metadata but not provided here
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Model backend failure
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for cubeml-core.
pub type CubeResult<T> = Result<T, CubeError>;

impl From<serde_json::Error> for CubeError {
    fn from(e: serde_json::Error) -> Self {
        CubeError::Serialization(e.to_string())
    }
}

impl From<ndarray::ShapeError> for CubeError {
    fn from(e: ndarray::ShapeError) -> Self {
        CubeError::Value(format!("array shape error: {}", e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Convenience constructors
// ─────────────────────────────────────────────────────────────────────────────

impl CubeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        CubeError::Config(msg.into())
    }

    /// Create a value error.
    pub fn value(msg: impl Into<String>) -> Self {
        CubeError::Value(msg.into())
    }

    /// Create a "not implemented" error.
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        CubeError::NotImplemented(msg.into())
    }

    /// Create an expression evaluation error.
    pub fn expression(msg: impl Into<String>) -> Self {
        CubeError::ExpressionEvaluation(msg.into())
    }

    /// Returns true for the errors raised by datacube validation.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            CubeError::DimensionMissing(_)
                | CubeError::DimensionMismatch { .. }
                | CubeError::LabelDoesNotExist(_)
                | CubeError::Value(_)
        )
    }
}
