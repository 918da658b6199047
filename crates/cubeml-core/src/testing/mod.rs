//! Testing utilities for cubeml-core.
//!
//! This module provides mocks and fixtures for testing the orchestration
//! path without real model files or network access.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cubeml_core::testing::{fixtures, mocks};
//!
//! // A backend that reduces every sample to its mean
//! let backend = mocks::MockBackend::mean_per_sample();
//! let recorder = backend.recorder();
//!
//! // A 3-band 16x16 cube
//! let cube = fixtures::sentinel2_cube(&["B02", "B03", "B04"], 16, 16)?;
//! ```

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
