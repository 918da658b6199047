//! Sandbox for custom pre- and post-processing expressions.
//!
//! Only the `python` format is executable. A python expression names a
//! callable in the [`ExpressionRegistry`]; before the registry is consulted,
//! the expression's top-level package is checked against the configured
//! allow-list. An empty allow-list permits every package.
//!
//! # Example
//!
//! ```rust
//! use cubeml_core::config::EngineConfig;
//! use cubeml_core::datacube::Datacube;
//! use cubeml_core::expression::{ExpressionRegistry, ExpressionSandbox};
//! use cubeml_core::metadata::ProcessingExpression;
//!
//! let mut registry = ExpressionRegistry::new();
//! registry.register_function("numpy", "negative", |cube: Datacube| cube.map_values(|v| -v));
//!
//! let sandbox = ExpressionSandbox::new(&EngineConfig::default()).with_registry(registry);
//! let cube = Datacube::from_shape_vec(["x"], &[2], vec![1.0, 2.0]).unwrap();
//! let out = sandbox
//!     .run_expression(cube, &ProcessingExpression::python("numpy:negative"))
//!     .unwrap();
//! assert_eq!(out.data().unwrap().sum(), -3.0);
//! ```

pub mod registry;
pub mod vit;

pub use registry::{ExpressionFn, ExpressionRegistry, ExpressionTarget, PythonReference};

use crate::config::EngineConfig;
use crate::datacube::Datacube;
use crate::error::{CubeError, CubeResult};
use crate::metadata::{ExpressionFormat, ProcessingExpression};

/// Gatekeeper and dispatcher for processing expressions.
#[derive(Debug, Clone)]
pub struct ExpressionSandbox {
    enabled: bool,
    allowed_packages: Vec<String>,
    registry: ExpressionRegistry,
}

impl ExpressionSandbox {
    /// Build a sandbox from the engine configuration, with the built-in modules.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            enabled: config.allow_processing_function,
            allowed_packages: config.allowed_processing_packages.clone(),
            registry: ExpressionRegistry::with_builtins(),
        }
    }

    pub fn with_registry(mut self, registry: ExpressionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry_mut(&mut self) -> &mut ExpressionRegistry {
        &mut self.registry
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check the top-level package of `module` against the allow-list.
    pub fn check_package_allowed(&self, module: &str) -> CubeResult<()> {
        if self.allowed_packages.is_empty() {
            return Ok(());
        }
        let package = module.split('.').next().unwrap_or(module);
        if self.allowed_packages.iter().any(|p| p == package) {
            return Ok(());
        }
        Err(CubeError::config(format!(
            "python package '{}' is not allowed as a custom processing function; allowed packages are [{}]",
            package,
            self.allowed_packages.join(", ")
        )))
    }

    /// Run `expression` with `cube` as its only argument.
    pub fn run_expression(&self, cube: Datacube, expression: &ProcessingExpression) -> CubeResult<Datacube> {
        if !self.enabled {
            return Err(CubeError::config(
                "custom pre- and post-processing expressions are disabled",
            ));
        }

        match ExpressionFormat::parse(&expression.format) {
            Some(ExpressionFormat::Python) => self.run_python(cube, &expression.expression),
            _ => Err(CubeError::not_implemented(format!(
                "execution of processing expressions of format '{}' is not available",
                expression.format
            ))),
        }
    }

    fn run_python(&self, cube: Datacube, expression: &str) -> CubeResult<Datacube> {
        let reference = PythonReference::parse(expression)?;
        self.check_package_allowed(&reference.module)?;
        let callable = self.registry.resolve(&reference)?;
        log::debug!(target: "cubeml_core", "Calling {}:{}", reference.module, reference.target);
        callable(cube)
    }
}
