//! cubeml core - adapts labeled N-dimensional datacubes to machine-learning
//! model input specifications and runs inference over them.
//!
//! ## Module Organization
//!
//! ### Data Types
//! - [`datacube`] - Labeled N-dimensional arrays (eager or lazy)
//! - [`metadata`] - STAC:MLM model metadata schema
//!
//! ### Adaptation
//! - [`dims`] - Dimension name resolution through synonym classes
//! - [`validation`] - Dimension, size and band checks
//! - [`preprocessing`] - Band selection, value scaling, dtype conversion
//! - [`tiling`] - Model-sized windows stacked along `batch`
//! - [`batching`] - Batch-size policy and partitioning
//!
//! ### Execution
//! - [`orchestrator`] - End-to-end inference over a datacube
//! - [`backend`] - Model runtime seam (ONNX behind the `onnx` feature)
//! - [`expression`] - Sandboxed custom pre- and post-processing functions
//! - [`assets`] - Model asset selection and local resolution
//!
//! ### Infrastructure
//! - [`config`] - Engine configuration (environment driven)
//! - [`error`] - Unified error type

// ============================================================================
// Data Types
// ============================================================================

/// Labeled N-dimensional datacubes
pub mod datacube;

/// STAC:MLM model metadata
pub mod metadata;

// ============================================================================
// Adaptation
// ============================================================================

/// Dimension synonym resolution
pub mod dims;

/// Datacube checks against a model input
pub mod validation;

/// Band selection, scaling and pre-processing expressions
pub mod preprocessing;

/// Tiling into model-sized windows
pub mod tiling;

/// Batch-size policy
pub mod batching;

// ============================================================================
// Execution
// ============================================================================

/// Inference orchestration
pub mod orchestrator;

/// Model runtime backends
pub mod backend;

/// Custom processing expressions
pub mod expression;

/// Model asset selection and resolution
pub mod assets;

// ============================================================================
// Infrastructure
// ============================================================================

/// Engine configuration
pub mod config;

/// Unified error types
pub mod error;

/// Mocks and fixtures for tests
#[doc(hidden)]
pub mod testing;

pub use assets::{AssetMap, LocalFileProvider, ModelAsset, ModelAssetProvider};
pub use backend::{BackendError, Framework, ModelBackend};
pub use config::EngineConfig;
pub use datacube::{CoordValue, Datacube};
pub use error::{CubeError, CubeResult};
pub use expression::{ExpressionRegistry, ExpressionSandbox};
pub use metadata::{MlmMetadata, ModelInput, ModelOutput};
pub use orchestrator::{CoordSelection, InferenceOrchestrator, PredictionLayout, TileReassembler};
