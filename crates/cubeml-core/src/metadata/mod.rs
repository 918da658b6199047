//! Model metadata schema (STAC:MLM subset).
//!
//! These types are deserialized from the `properties` of a STAC item that
//! implements the Machine Learning Model extension. Only the fields the
//! engine reads are modelled; schema validation of the item itself is left
//! to the metadata provider.
//!
//! # Example
//!
//! ```rust
//! use cubeml_core::metadata::MlmMetadata;
//!
//! let json = serde_json::json!({
//!     "mlm:name": "resnet",
//!     "mlm:framework": "ONNX",
//!     "mlm:input": [{
//!         "name": "rgb",
//!         "bands": ["B04", "B03", "B02"],
//!         "input": {
//!             "shape": [-1, 3, 224, 224],
//!             "dim_order": ["batch", "band", "y", "x"],
//!             "data_type": "float32"
//!         }
//!     }],
//!     "mlm:output": []
//! });
//! let metadata: MlmMetadata = serde_json::from_value(json).unwrap();
//! assert_eq!(metadata.input[0].input.dim_order.len(), 4);
//! ```

mod dtype;
mod input;
mod output;

pub use dtype::DataType;
pub use input::{
    BandDescriptor, ExpressionFormat, InputStructure, ModelBand, ModelInput, ModelInputSpec,
    ProcessingExpression, ValueScaling, BATCH_DIM, WILDCARD_SIZE,
};
pub use output::{ModelOutput, ResultStructure};

use serde::{Deserialize, Deserializer, Serialize};

/// Model-level metadata read from the `mlm:*` item properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlmMetadata {
    /// Model name
    #[serde(rename = "mlm:name", default)]
    pub name: String,

    /// Model architecture (e.g. "ResNet", "ViT")
    #[serde(rename = "mlm:architecture", default)]
    pub architecture: Option<String>,

    /// Tasks the model performs
    #[serde(rename = "mlm:tasks", default, deserialize_with = "one_or_many")]
    pub tasks: Vec<String>,

    /// Framework identifier used to select a backend (e.g. "ONNX", "PyTorch")
    #[serde(rename = "mlm:framework", default)]
    pub framework: String,

    /// Framework version
    #[serde(rename = "mlm:framework_version", default)]
    pub framework_version: Option<String>,

    /// Suggested inference batch size
    #[serde(rename = "mlm:batch_size_suggestion", default)]
    pub batch_size_suggestion: Option<usize>,

    /// Accelerator the model was built for
    #[serde(rename = "mlm:accelerator", default)]
    pub accelerator: Option<String>,

    /// Input specifications
    #[serde(rename = "mlm:input", default)]
    pub input: Vec<ModelInput>,

    /// Output specifications
    #[serde(rename = "mlm:output", default)]
    pub output: Vec<ModelOutput>,
}

impl MlmMetadata {
    /// Parse metadata from a STAC item `properties` object.
    ///
    /// Every input's `shape` must have one entry per `dim_order` name.
    pub fn from_properties(properties: &serde_json::Value) -> crate::CubeResult<Self> {
        let metadata: Self = serde_json::from_value(properties.clone())?;
        for input in &metadata.input {
            input.input.check_consistent()?;
        }
        Ok(metadata)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}
