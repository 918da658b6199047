//! cubeml SDK - loading STAC:MLM models and running them over datacubes.
//!
//! This crate provides the outward-facing pieces around `cubeml-core`:
//! - STAC:MLM item loading from HTTP or local files
//! - A download cache for model assets
//! - `load_ml_model` / `ml_predict` entry points
//!
//! # Architecture
//!
//! ```text
//! load_ml_model(uri)  →  InferenceOrchestrator  →  ml_predict(cube, &mut model)
//!        │                      │
//!        └── ModelCache ────────┘ (resolves model assets on first run)
//! ```
//!
//! # Feature Flags
//!
//! - `onnx` - ONNX Runtime backend; without it no framework is supported by
//!   [`load_ml_model`] and callers supply their own backend through
//!   [`load_ml_model_with_backend`].

pub mod cache;
pub mod error;
pub mod stac;

pub use cache::ModelCache;
pub use error::{SdkError, SdkResult};
pub use stac::{
    load_ml_model, load_ml_model_with_backend, ml_predict, parse_mlm_item, read_item,
    supported_frameworks, MlmItem,
};

pub use cubeml_core::{Datacube, EngineConfig, InferenceOrchestrator};
