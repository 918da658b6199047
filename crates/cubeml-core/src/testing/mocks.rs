//! Mock implementations for testing.
//!
//! Provides a mock model backend that can be used for orchestration tests
//! without real model files.

use crate::backend::{BackendError, BackendResult, Framework, ModelBackend};
use ndarray::{ArrayD, IxDyn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

type Transform = Box<dyn Fn(ArrayD<f32>) -> BackendResult<ArrayD<f32>> + Send>;

/// What a [`MockBackend`] has been asked to do.
#[derive(Debug, Default, Clone)]
pub struct MockCalls {
    /// Paths passed to a `create_model_object` that actually loaded
    pub loaded_models: Vec<PathBuf>,
    /// Shape of every batch passed to `execute_model`, in call order
    pub batch_shapes: Vec<Vec<usize>>,
    /// Number of `release` calls that dropped a loaded model
    pub releases: usize,
}

/// Shared view of a [`MockBackend`]'s call log.
///
/// Stays valid after the backend has been moved into an orchestrator.
#[derive(Debug, Clone, Default)]
pub struct MockRecorder {
    calls: Arc<Mutex<MockCalls>>,
}

impl MockRecorder {
    fn lock(&self) -> MutexGuard<'_, MockCalls> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of the calls so far.
    pub fn calls(&self) -> MockCalls {
        self.lock().clone()
    }

    /// Get the number of times execute_model() was called.
    pub fn call_count(&self) -> usize {
        self.lock().batch_shapes.len()
    }

    /// Batch sizes (first axis) in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock()
            .batch_shapes
            .iter()
            .map(|shape| shape.first().copied().unwrap_or_default())
            .collect()
    }

    pub fn load_count(&self) -> usize {
        self.lock().loaded_models.len()
    }
}

/// A mock model backend with a configurable per-batch transform.
///
/// # Example
///
/// ```rust
/// use cubeml_core::backend::ModelBackend;
/// use cubeml_core::testing::MockBackend;
/// use ndarray::{ArrayD, IxDyn};
/// use std::path::Path;
///
/// let mut backend = MockBackend::identity();
/// let recorder = backend.recorder();
/// backend.create_model_object(Path::new("/fake/model.onnx")).unwrap();
/// backend.execute_model(ArrayD::zeros(IxDyn(&[2, 3]))).unwrap();
/// assert_eq!(recorder.batch_sizes(), vec![2]);
/// ```
pub struct MockBackend {
    framework: Framework,
    transform: Transform,
    simulate_error: Option<String>,
    loaded: bool,
    recorder: MockRecorder,
}

impl MockBackend {
    /// Return every batch unchanged.
    pub fn identity() -> Self {
        Self::with_transform(Ok)
    }

    /// Apply `transform` to every batch.
    pub fn with_transform<F>(transform: F) -> Self
    where
        F: Fn(ArrayD<f32>) -> BackendResult<ArrayD<f32>> + Send + 'static,
    {
        Self {
            framework: Framework::Onnx,
            transform: Box::new(transform),
            simulate_error: None,
            loaded: false,
            recorder: MockRecorder::default(),
        }
    }

    /// Reduce every sample to the mean of its values: `(batch, ...) -> (batch, 1)`.
    pub fn mean_per_sample() -> Self {
        Self::with_transform(|batch| {
            if batch.ndim() == 0 {
                return Err(BackendError::InvalidInput("batch has no batch axis".to_string()));
            }
            let means: Vec<f32> = batch
                .outer_iter()
                .map(|sample| sample.mean().unwrap_or_default())
                .collect();
            ArrayD::from_shape_vec(IxDyn(&[means.len(), 1]), means)
                .map_err(|e| BackendError::Runtime(e.to_string()))
        })
    }

    /// Configure the mock to simulate an error.
    pub fn with_error(mut self, error_message: impl Into<String>) -> Self {
        self.simulate_error = Some(error_message.into());
        self
    }

    pub fn with_framework(mut self, framework: Framework) -> Self {
        self.framework = framework;
        self
    }

    /// Handle for inspecting calls after the backend is moved.
    pub fn recorder(&self) -> MockRecorder {
        self.recorder.clone()
    }
}

impl ModelBackend for MockBackend {
    fn framework(&self) -> Framework {
        self.framework
    }

    fn create_model_object(&mut self, model_path: &Path) -> BackendResult<()> {
        if self.loaded {
            return Ok(());
        }
        if let Some(ref error) = self.simulate_error {
            return Err(BackendError::LoadFailed(error.clone()));
        }
        self.loaded = true;
        self.recorder.lock().loaded_models.push(model_path.to_path_buf());
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn execute_model(&mut self, batch: ArrayD<f32>) -> BackendResult<ArrayD<f32>> {
        if !self.loaded {
            return Err(BackendError::ModelNotLoaded);
        }
        self.recorder.lock().batch_shapes.push(batch.shape().to_vec());
        (self.transform)(batch)
    }

    fn release(&mut self) {
        if self.loaded {
            self.loaded = false;
            self.recorder.lock().releases += 1;
        }
    }
}
