//! Model backend - tensor-level runtime abstraction for model execution.
//!
//! The orchestrator never runs a network itself. It hands one batch-shaped
//! tensor at a time to a [`ModelBackend`] and receives one batch-shaped tensor
//! back; the backend owns the model handle and its device placement.
//!
//! One concrete backend exists per supported framework. The ONNX Runtime
//! backend is available behind the `onnx` feature.

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::OnnxBackend;

use ndarray::ArrayD;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Error type for model backend operations
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Failed to load model: {0}")]
    LoadFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Model framework identifier (`mlm:framework`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framework {
    /// ONNX graph-execution runtime
    Onnx,
    /// PyTorch trace-based runtime
    PyTorch,
}

impl Framework {
    /// Parse a framework identifier, ignoring case.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "onnx" => Some(Framework::Onnx),
            "pytorch" | "torch" => Some(Framework::PyTorch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Onnx => "ONNX",
            Framework::PyTorch => "PyTorch",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pluggable model runtime.
///
/// Implementations load a model artifact once and then map batch tensors to
/// batch tensors. The orchestrator owns its backend exclusively, so methods
/// take `&mut self` where the handle changes.
pub trait ModelBackend: Send {
    /// Framework this backend executes.
    fn framework(&self) -> Framework;

    /// Load the model at `model_path`.
    ///
    /// Idempotent: calling it while a model is already loaded is a no-op.
    fn create_model_object(&mut self, model_path: &Path) -> BackendResult<()>;

    /// Check if a model is currently loaded
    fn is_loaded(&self) -> bool;

    /// Run the model on one batch.
    ///
    /// The first axis of both input and output is the batch axis.
    fn execute_model(&mut self, batch: ArrayD<f32>) -> BackendResult<ArrayD<f32>>;

    /// Release the model handle and any device memory it holds.
    fn release(&mut self) {}
}

impl<B: ModelBackend + ?Sized> ModelBackend for Box<B> {
    fn framework(&self) -> Framework {
        (**self).framework()
    }

    fn create_model_object(&mut self, model_path: &Path) -> BackendResult<()> {
        (**self).create_model_object(model_path)
    }

    fn is_loaded(&self) -> bool {
        (**self).is_loaded()
    }

    fn execute_model(&mut self, batch: ArrayD<f32>) -> BackendResult<ArrayD<f32>> {
        (**self).execute_model(batch)
    }

    fn release(&mut self) {
        (**self).release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_parse() {
        assert_eq!(Framework::parse("ONNX"), Some(Framework::Onnx));
        assert_eq!(Framework::parse("onnx"), Some(Framework::Onnx));
        assert_eq!(Framework::parse("PyTorch"), Some(Framework::PyTorch));
        assert_eq!(Framework::parse("TensorFlow"), None);
    }

    #[test]
    fn test_framework_display() {
        assert_eq!(Framework::Onnx.to_string(), "ONNX");
    }
}
