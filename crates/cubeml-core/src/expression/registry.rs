//! Registry of callable processing expressions.
//!
//! Python-format expressions address a callable as `module.path:function` or
//! `module.path:Class.method`. Instead of importing code by name, every
//! callable that may be invoked is registered here up front under the same
//! addressing scheme.

use crate::datacube::Datacube;
use crate::error::{CubeError, CubeResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A registered processing callable, taking and returning a datacube.
pub type ExpressionFn = Arc<dyn Fn(Datacube) -> CubeResult<Datacube> + Send + Sync>;

/// The callable part of an expression after the `:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionTarget {
    Function(String),
    Method { class: String, method: String },
}

impl fmt::Display for ExpressionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionTarget::Function(name) => f.write_str(name),
            ExpressionTarget::Method { class, method } => write!(f, "{}.{}", class, method),
        }
    }
}

/// A parsed `module.path:target` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonReference {
    pub module: String,
    pub target: ExpressionTarget,
}

impl PythonReference {
    pub fn parse(expression: &str) -> CubeResult<Self> {
        let (module, target) = expression.split_once(':').ok_or_else(|| {
            CubeError::expression(format!(
                "python expression '{}' must have the form 'module.path:callable'",
                expression
            ))
        })?;
        if module.is_empty() || target.is_empty() || target.contains(':') {
            return Err(CubeError::expression(format!(
                "python expression '{}' must have the form 'module.path:callable'",
                expression
            )));
        }

        let parts: Vec<&str> = target.split('.').collect();
        let target = match parts.as_slice() {
            [function] => ExpressionTarget::Function(function.to_string()),
            [class, method] => ExpressionTarget::Method {
                class: class.to_string(),
                method: method.to_string(),
            },
            _ => {
                return Err(CubeError::not_implemented(format!(
                    "python target '{}' nests deeper than Class.method",
                    target
                )));
            }
        };
        Ok(Self {
            module: module.to_string(),
            target,
        })
    }

    /// The top-level package of the module path.
    pub fn package(&self) -> &str {
        self.module.split('.').next().unwrap_or(&self.module)
    }
}

#[derive(Default, Clone)]
struct ExpressionModule {
    functions: HashMap<String, ExpressionFn>,
    classes: HashMap<String, HashMap<String, ExpressionFn>>,
}

/// Module path -> registered functions and class methods.
#[derive(Default, Clone)]
pub struct ExpressionRegistry {
    modules: HashMap<String, ExpressionModule>,
}

impl fmt::Debug for ExpressionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<&String> = self.modules.keys().collect();
        modules.sort();
        f.debug_struct("ExpressionRegistry")
            .field("modules", &modules)
            .finish()
    }
}

impl ExpressionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in expression modules.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::vit::register(&mut registry);
        registry
    }

    pub fn register_function<F>(&mut self, module: &str, name: &str, f: F) -> &mut Self
    where
        F: Fn(Datacube) -> CubeResult<Datacube> + Send + Sync + 'static,
    {
        self.modules
            .entry(module.to_string())
            .or_default()
            .functions
            .insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn register_method<F>(&mut self, module: &str, class: &str, method: &str, f: F) -> &mut Self
    where
        F: Fn(Datacube) -> CubeResult<Datacube> + Send + Sync + 'static,
    {
        self.modules
            .entry(module.to_string())
            .or_default()
            .classes
            .entry(class.to_string())
            .or_default()
            .insert(method.to_string(), Arc::new(f));
        self
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    /// Look up the callable a reference points at.
    pub fn resolve(&self, reference: &PythonReference) -> CubeResult<ExpressionFn> {
        let module = self.modules.get(&reference.module).ok_or_else(|| {
            CubeError::expression(format!("no module named '{}'", reference.module))
        })?;

        let found = match &reference.target {
            ExpressionTarget::Function(name) => module.functions.get(name),
            ExpressionTarget::Method { class, method } => {
                let class_methods = module.classes.get(class).ok_or_else(|| {
                    CubeError::expression(format!(
                        "module '{}' has no attribute '{}'",
                        reference.module, class
                    ))
                })?;
                class_methods.get(method)
            }
        };
        found.cloned().ok_or_else(|| {
            CubeError::expression(format!(
                "module '{}' has no attribute '{}'",
                reference.module, reference.target
            ))
        })
    }
}
