//! ONNX Runtime model backend.
//!
//! Wraps an `ort` session around a single-input model. Each batch is fed to
//! the model's first input and the first output is returned. When GPU use is
//! enabled the CUDA execution provider is registered ahead of the CPU
//! fallback.
//!
//! # Example
//!
//! ```rust,no_run
//! use cubeml_core::backend::{ModelBackend, OnnxBackend};
//! use std::path::Path;
//!
//! let mut backend = OnnxBackend::new(false);
//! backend.create_model_object(Path::new("/path/to/model.onnx"))?;
//! # Ok::<(), cubeml_core::backend::BackendError>(())
//! ```

use super::{BackendError, BackendResult, Framework, ModelBackend};
use ndarray::ArrayD;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputs};
use ort::value::Value;
use std::borrow::Cow;
use std::path::Path;

struct LoadedSession {
    session: Session,
    input_name: String,
    output_name: String,
}

/// ONNX Runtime backend
pub struct OnnxBackend {
    use_gpu: bool,
    loaded: Option<LoadedSession>,
}

impl OnnxBackend {
    pub fn new(use_gpu: bool) -> Self {
        Self {
            use_gpu,
            loaded: None,
        }
    }

    fn configure_execution_provider(&self, builder: SessionBuilder) -> BackendResult<SessionBuilder> {
        if !self.use_gpu {
            return Ok(builder);
        }

        use ort::ep;
        log::debug!(target: "cubeml_core", "Configuring CUDA execution provider with CPU fallback");
        builder
            .with_execution_providers([ep::CUDA::default().build(), ep::CPU::default().build()])
            .map_err(|e| {
                BackendError::LoadFailed(format!("Failed to configure CUDA execution provider: {}", e))
            })
    }
}

impl Default for OnnxBackend {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ModelBackend for OnnxBackend {
    fn framework(&self) -> Framework {
        Framework::Onnx
    }

    fn create_model_object(&mut self, model_path: &Path) -> BackendResult<()> {
        if self.loaded.is_some() {
            return Ok(());
        }
        if !model_path.exists() {
            return Err(BackendError::LoadFailed(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        // Initialize ONNX Runtime environment (singleton, safe to call multiple times)
        let _ = ort::init().commit();

        let builder = Session::builder()
            .map_err(|e| BackendError::Runtime(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| BackendError::Runtime(format!("Failed to set optimization level: {}", e)))?;
        let builder = self.configure_execution_provider(builder)?;

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| BackendError::LoadFailed(format!("Failed to load ONNX model: {}", e)))?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| BackendError::LoadFailed("ONNX model declares no inputs".to_string()))?;
        let output_name = session
            .outputs()
            .first()
            .map(|output| output.name().to_string())
            .ok_or_else(|| BackendError::LoadFailed("ONNX model declares no outputs".to_string()))?;

        log::info!(
            "Created ONNX session (gpu: {}) for model: {}",
            self.use_gpu,
            model_path.display()
        );

        self.loaded = Some(LoadedSession {
            session,
            input_name,
            output_name,
        });
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn execute_model(&mut self, batch: ArrayD<f32>) -> BackendResult<ArrayD<f32>> {
        let loaded = self.loaded.as_mut().ok_or(BackendError::ModelNotLoaded)?;

        let value = Value::from_array(batch)
            .map_err(|e| BackendError::InvalidInput(format!("Failed to convert tensor: {}", e)))?;
        let inputs: Vec<(Cow<'_, str>, ort::session::SessionInputValue<'_>)> =
            vec![(Cow::Owned(loaded.input_name.clone()), value.into())];

        let outputs = loaded
            .session
            .run(SessionInputs::from(inputs))
            .map_err(|e| BackendError::InferenceFailed(format!("ONNX Runtime inference failed: {}", e)))?;

        let output = outputs[loaded.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| {
                BackendError::InferenceFailed(format!(
                    "Failed to extract output '{}' as f32: {}",
                    loaded.output_name, e
                ))
            })?;
        Ok(output.to_owned())
    }

    fn release(&mut self) {
        if self.loaded.take().is_some() {
            log::debug!(target: "cubeml_core", "Released ONNX session");
        }
    }
}
