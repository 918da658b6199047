//! Model input specification.

use super::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the batch dimension in a model's `dim_order`.
pub const BATCH_DIM: &str = "batch";

/// Declared size meaning "any size" (conventionally only on `batch`).
pub const WILDCARD_SIZE: i64 = -1;

/// Shape and layout of a model input tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputStructure {
    /// Size per dimension, aligned with `dim_order`; `-1` is a wildcard
    pub shape: Vec<i64>,
    /// Ordered, unique dimension names
    pub dim_order: Vec<String>,
    /// Element type the model expects
    #[serde(default)]
    pub data_type: DataType,
}

impl InputStructure {
    pub fn new(dim_order: &[&str], shape: &[i64], data_type: DataType) -> Self {
        Self {
            shape: shape.to_vec(),
            dim_order: dim_order.iter().map(|s| s.to_string()).collect(),
            data_type,
        }
    }

    /// Check that `shape` has one entry per `dim_order` name.
    pub fn check_consistent(&self) -> crate::CubeResult<()> {
        if self.shape.len() != self.dim_order.len() {
            return Err(crate::CubeError::value(format!(
                "input structure declares {} dimension(s) [{}] but {} size(s) {:?}",
                self.dim_order.len(),
                self.dim_order.join(", "),
                self.shape.len(),
                self.shape
            )));
        }
        Ok(())
    }

    /// Position of the `batch` dimension, if the model declares one.
    pub fn batch_index(&self) -> Option<usize> {
        self.dim_order.iter().position(|d| d == BATCH_DIM)
    }
}

/// A structured band declaration.
///
/// A band carrying both `format` and `expression` is derivable: it may be
/// computed from other bands instead of being read from the datacube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBand {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl ModelBand {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: None,
            expression: None,
        }
    }

    pub fn derived(
        name: impl Into<String>,
        format: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            format: Some(format.into()),
            expression: Some(expression.into()),
        }
    }
}

/// A required band, either by bare name or as a structured declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BandDescriptor {
    Name(String),
    Band(ModelBand),
}

impl BandDescriptor {
    pub fn name(&self) -> &str {
        match self {
            BandDescriptor::Name(name) => name,
            BandDescriptor::Band(band) => &band.name,
        }
    }

    pub fn format(&self) -> Option<&str> {
        match self {
            BandDescriptor::Name(_) => None,
            BandDescriptor::Band(band) => band.format.as_deref(),
        }
    }

    pub fn expression(&self) -> Option<&str> {
        match self {
            BandDescriptor::Name(_) => None,
            BandDescriptor::Band(band) => band.expression.as_deref(),
        }
    }
}

impl From<&str> for BandDescriptor {
    fn from(name: &str) -> Self {
        BandDescriptor::Name(name.to_string())
    }
}

impl From<ModelBand> for BandDescriptor {
    fn from(band: ModelBand) -> Self {
        BandDescriptor::Band(band)
    }
}

/// Formats a processing expression may be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionFormat {
    Python,
    Uri,
    Docker,
    RioCalc,
    OpenEo,
    GdalCalc,
}

impl ExpressionFormat {
    pub fn parse(format: &str) -> Option<Self> {
        match format {
            "python" => Some(ExpressionFormat::Python),
            "uri" => Some(ExpressionFormat::Uri),
            "docker" => Some(ExpressionFormat::Docker),
            "rio-calc" => Some(ExpressionFormat::RioCalc),
            "openeo" => Some(ExpressionFormat::OpenEo),
            "gdal-calc" => Some(ExpressionFormat::GdalCalc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpressionFormat::Python => "python",
            ExpressionFormat::Uri => "uri",
            ExpressionFormat::Docker => "docker",
            ExpressionFormat::RioCalc => "rio-calc",
            ExpressionFormat::OpenEo => "openeo",
            ExpressionFormat::GdalCalc => "gdal-calc",
        }
    }
}

impl fmt::Display for ExpressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a pre- or post-processing expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingExpression {
    /// One of `python`, `uri`, `docker`, `rio-calc`, `openeo`, `gdal-calc`
    pub format: String,
    /// Format-specific expression, e.g. `package.module:function`
    pub expression: String,
}

impl ProcessingExpression {
    pub fn new(format: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            expression: expression.into(),
        }
    }

    pub fn python(expression: impl Into<String>) -> Self {
        Self::new("python", expression)
    }
}

/// Value scaling applied to input values before inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueScaling {
    /// `(x - minimum) / (maximum - minimum)`
    MinMax { minimum: f64, maximum: f64 },
    /// `(x - mean) / stddev`
    ZScore { mean: f64, stddev: f64 },
    /// Clamp to `[minimum, maximum]`
    Clip { minimum: f64, maximum: f64 },
    /// `max(x, minimum)`
    ClipMin { minimum: f64 },
    /// `min(x, maximum)`
    ClipMax { maximum: f64 },
    /// `x - value`
    Offset { value: f64 },
    /// `x / value`
    Scale { value: f64 },
    /// Scaling defined by a processing expression
    Processing { format: String, expression: String },
}

/// Model input specification (`mlm:input` entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInput {
    /// Input name
    pub name: String,

    /// Required bands, possibly empty
    #[serde(default)]
    pub bands: Vec<BandDescriptor>,

    /// Tensor layout
    pub input: InputStructure,

    /// Description of the input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Value scaling: absent, one shared entry, or one entry per band
    #[serde(default)]
    pub value_scaling: Option<Vec<ValueScaling>>,

    /// Resize method (informational)
    #[serde(default)]
    pub resize_type: Option<String>,

    /// Pre-processing expression run after scaling
    #[serde(default)]
    pub pre_processing_function: Option<ProcessingExpression>,
}

/// Alias matching the "model input spec" vocabulary.
pub type ModelInputSpec = ModelInput;

impl ModelInput {
    pub fn new(name: impl Into<String>, input: InputStructure) -> Self {
        Self {
            name: name.into(),
            bands: Vec::new(),
            input,
            description: None,
            value_scaling: None,
            resize_type: None,
            pre_processing_function: None,
        }
    }

    pub fn with_bands<I, B>(mut self, bands: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<BandDescriptor>,
    {
        self.bands = bands.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_value_scaling(mut self, scaling: Vec<ValueScaling>) -> Self {
        self.value_scaling = Some(scaling);
        self
    }

    pub fn with_pre_processing(mut self, expression: ProcessingExpression) -> Self {
        self.pre_processing_function = Some(expression);
        self
    }

    pub fn dim_order(&self) -> &[String] {
        &self.input.dim_order
    }

    pub fn shape(&self) -> &[i64] {
        &self.input.shape
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(BandDescriptor::name).collect()
    }
}
