//! Model output specification.

use super::{DataType, ProcessingExpression};
use serde::{Deserialize, Serialize};

/// Shape and layout of a model output tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultStructure {
    pub shape: Vec<i64>,
    pub dim_order: Vec<String>,
    #[serde(default)]
    pub data_type: DataType,
}

/// Model output specification (`mlm:output` entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub name: String,

    #[serde(default)]
    pub tasks: Vec<String>,

    pub result: ResultStructure,

    /// Class definitions for classification outputs
    #[serde(rename = "classification:classes", default)]
    pub classes: Vec<serde_json::Value>,

    /// Post-processing expression applied to each batch output
    #[serde(default)]
    pub post_processing_function: Option<ProcessingExpression>,
}

impl ModelOutput {
    pub fn new(name: impl Into<String>, dim_order: &[&str], shape: &[i64]) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            result: ResultStructure {
                shape: shape.to_vec(),
                dim_order: dim_order.iter().map(|s| s.to_string()).collect(),
                data_type: DataType::Float32,
            },
            classes: Vec::new(),
            post_processing_function: None,
        }
    }

    pub fn with_post_processing(mut self, expression: ProcessingExpression) -> Self {
        self.post_processing_function = Some(expression);
        self
    }
}
