//! STAC:MLM item loading.
//!
//! [`load_ml_model`] reads a STAC item (over HTTP or from disk), checks that
//! it is a Feature implementing the MLM extension with a supported
//! framework, and returns an [`InferenceOrchestrator`] wired to the matching
//! backend and a [`ModelCache`]. [`ml_predict`] runs it over a datacube.
//!
//! # Example
//!
//! ```rust,ignore
//! use cubeml_sdk::{load_ml_model, ml_predict};
//! use cubeml_core::EngineConfig;
//!
//! let config = EngineConfig::from_env()?;
//! let mut model = load_ml_model("https://example.com/items/resnet.json", None, 0, 0, &config)?;
//! let prediction = ml_predict(cube, &mut model)?;
//! ```

use crate::cache::ModelCache;
use crate::error::{ureq_error, SdkError, SdkResult};
use cubeml_core::assets::AssetMap;
use cubeml_core::backend::{Framework, ModelBackend};
use cubeml_core::{Datacube, EngineConfig, InferenceOrchestrator, MlmMetadata};
use log::{debug, info};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Schema URLs of every released MLM extension version match this.
pub const MLM_SCHEMA_PATTERN: &str = r"^https://stac-extensions\.github\.io/mlm/v(\d+\.){0,2}\d*/schema\.json$";

/// A STAC item implementing the MLM extension.
#[derive(Debug, Clone)]
pub struct MlmItem {
    pub id: String,
    pub metadata: MlmMetadata,
    pub assets: AssetMap,
}

#[derive(Deserialize)]
struct RawItem {
    #[serde(default)]
    id: String,
    #[serde(default)]
    stac_extensions: Vec<String>,
    #[serde(default)]
    properties: Value,
    #[serde(default)]
    assets: AssetMap,
}

#[cfg(feature = "onnx")]
const SUPPORTED_FRAMEWORKS: &[Framework] = &[Framework::Onnx];

#[cfg(not(feature = "onnx"))]
const SUPPORTED_FRAMEWORKS: &[Framework] = &[];

/// Frameworks with a runtime compiled into this build.
pub fn supported_frameworks() -> &'static [Framework] {
    SUPPORTED_FRAMEWORKS
}

/// Read the JSON document at `uri`: `http(s)://` URLs are fetched, anything
/// else is a local path.
pub fn read_item(uri: &str) -> SdkResult<Value> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        debug!("Fetching STAC item from {}", uri);
        let response = ureq::get(uri)
            .call()
            .map_err(|e| ureq_error(e, "fetch STAC item"))?;
        if response.status() != 200 {
            return Err(SdkError::NetworkError(format!(
                "fetching STAC item from {} returned status {}",
                uri,
                response.status()
            )));
        }
        return response.into_json().map_err(|_| {
            SdkError::InvalidItem(format!("{} does not point to a valid JSON document", uri))
        });
    }

    let path = Path::new(uri);
    if !path.exists() {
        return Err(SdkError::InvalidItem(format!(
            "could not locate a file for the URI provided: {}",
            uri
        )));
    }
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|_| SdkError::InvalidItem(format!("{} does not point to a valid JSON document", uri)))
}

/// Check that `item` is a STAC Feature implementing the MLM extension.
pub fn parse_mlm_item(item: Value) -> SdkResult<MlmItem> {
    match item.get("type").and_then(Value::as_str) {
        Some("Feature") => {}
        other => {
            return Err(SdkError::InvalidItem(format!(
                "expected a STAC item of type 'Feature', got {}",
                other.map_or_else(|| "no type".to_string(), |t| format!("'{}'", t))
            )))
        }
    }

    let raw: RawItem = serde_json::from_value(item)?;
    let pattern = Regex::new(MLM_SCHEMA_PATTERN).map_err(|e| SdkError::InvalidItem(e.to_string()))?;
    if !raw.stac_extensions.iter().any(|ext| pattern.is_match(ext)) {
        return Err(SdkError::InvalidItem(format!(
            "STAC item '{}' does not implement the STAC:MLM extension",
            raw.id
        )));
    }

    let metadata = MlmMetadata::from_properties(&raw.properties).map_err(|e| {
        SdkError::InvalidItem(format!("invalid mlm:* properties in item '{}': {}", raw.id, e))
    })?;
    Ok(MlmItem {
        id: raw.id,
        metadata,
        assets: raw.assets,
    })
}

fn check_indices(item: &MlmItem, input_index: usize, output_index: usize) -> SdkResult<()> {
    if input_index >= item.metadata.input.len() {
        return Err(SdkError::InvalidItem(format!(
            "input index {} exceeds the {} input specification(s) of item '{}'; indexes start at 0",
            input_index,
            item.metadata.input.len(),
            item.id
        )));
    }
    if output_index >= item.metadata.output.len() {
        return Err(SdkError::InvalidItem(format!(
            "output index {} exceeds the {} output specification(s) of item '{}'; indexes start at 0",
            output_index,
            item.metadata.output.len(),
            item.id
        )));
    }
    Ok(())
}

fn unsupported(framework: &str) -> SdkError {
    SdkError::UnsupportedFramework(format!(
        "the ML framework '{}' required by the STAC:MLM item is not supported; supported frameworks: [{}]",
        framework,
        supported_frameworks()
            .iter()
            .map(Framework::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    ))
}

fn backend_for(framework: Framework, config: &EngineConfig) -> SdkResult<Box<dyn ModelBackend>> {
    #[cfg(feature = "onnx")]
    {
        if framework == Framework::Onnx {
            return Ok(Box::new(cubeml_core::backend::OnnxBackend::new(config.use_gpu)));
        }
    }
    #[cfg(not(feature = "onnx"))]
    let _ = config;
    Err(unsupported(framework.as_str()))
}

fn orchestrator_for(
    item: MlmItem,
    model_asset: Option<&str>,
    input_index: usize,
    output_index: usize,
    config: &EngineConfig,
    backend: Box<dyn ModelBackend>,
) -> SdkResult<InferenceOrchestrator> {
    info!(
        "Loaded STAC:MLM item '{}' ({} model '{}')",
        item.id,
        backend.framework(),
        item.metadata.name
    );
    let mut orchestrator = InferenceOrchestrator::new(item.metadata, item.assets, backend, config)?
        .with_indices(input_index, output_index)?
        .with_provider(Arc::new(ModelCache::from_config(config)));
    if let Some(name) = model_asset {
        orchestrator = orchestrator.with_asset_name(name);
    }
    Ok(orchestrator)
}

/// Load a STAC:MLM item and prepare it for inference.
///
/// The model itself is not downloaded or loaded until the first run.
pub fn load_ml_model(
    uri: &str,
    model_asset: Option<&str>,
    input_index: usize,
    output_index: usize,
    config: &EngineConfig,
) -> SdkResult<InferenceOrchestrator> {
    config.validate()?;
    let item = parse_mlm_item(read_item(uri)?)?;
    let declared = item.metadata.framework.clone();
    let framework = Framework::parse(&declared)
        .filter(|f| supported_frameworks().contains(f))
        .ok_or_else(|| unsupported(&declared))?;
    check_indices(&item, input_index, output_index)?;
    let backend = backend_for(framework, config)?;
    orchestrator_for(item, model_asset, input_index, output_index, config, backend)
}

/// Like [`load_ml_model`], with a caller-supplied backend.
///
/// The item's `mlm:framework` must name the backend's framework.
pub fn load_ml_model_with_backend(
    uri: &str,
    model_asset: Option<&str>,
    input_index: usize,
    output_index: usize,
    config: &EngineConfig,
    backend: Box<dyn ModelBackend>,
) -> SdkResult<InferenceOrchestrator> {
    config.validate()?;
    let item = parse_mlm_item(read_item(uri)?)?;
    if Framework::parse(&item.metadata.framework) != Some(backend.framework()) {
        return Err(SdkError::UnsupportedFramework(format!(
            "the STAC:MLM item requires '{}' but the supplied backend runs {}",
            item.metadata.framework,
            backend.framework()
        )));
    }
    check_indices(&item, input_index, output_index)?;
    orchestrator_for(item, model_asset, input_index, output_index, config, backend)
}

/// Run a loaded model over a datacube.
pub fn ml_predict(cube: Datacube, model: &mut InferenceOrchestrator) -> SdkResult<Datacube> {
    Ok(model.run(cube)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubeml_core::testing::{mlm_item, mlm_properties, MLM_SCHEMA_URL};
    use serde_json::json;

    #[test]
    fn test_schema_pattern() {
        let pattern = Regex::new(MLM_SCHEMA_PATTERN).unwrap();
        assert!(pattern.is_match(MLM_SCHEMA_URL));
        assert!(pattern.is_match("https://stac-extensions.github.io/mlm/v1/schema.json"));
        assert!(pattern.is_match("https://stac-extensions.github.io/mlm/v1.0.0/schema.json"));
        assert!(!pattern.is_match("https://stac-extensions.github.io/mlm/v1.0.0.0/schema.json"));
        assert!(!pattern.is_match("https://stac-extensions.github.io/eo/v1.1.0/schema.json"));
        assert!(!pattern.is_match("http://stac-extensions.github.io/mlm/v1.4.0/schema.json"));
    }

    #[test]
    fn test_parse_mlm_item() {
        let item = mlm_item(mlm_properties("ONNX", &["B04"], 8), "model.onnx");
        let parsed = parse_mlm_item(item).unwrap();
        assert_eq!(parsed.id, "fixture-item");
        assert_eq!(parsed.metadata.framework, "ONNX");
        assert!(parsed.assets["model"].is_model());
    }

    #[test]
    fn test_rejects_non_features() {
        let mut item = mlm_item(mlm_properties("ONNX", &["B04"], 8), "model.onnx");
        item["type"] = json!("Collection");
        assert!(matches!(parse_mlm_item(item), Err(SdkError::InvalidItem(_))));
        assert!(matches!(parse_mlm_item(json!({})), Err(SdkError::InvalidItem(_))));
    }

    #[test]
    fn test_rejects_items_without_mlm() {
        let mut item = mlm_item(mlm_properties("ONNX", &["B04"], 8), "model.onnx");
        item["stac_extensions"] = json!(["https://stac-extensions.github.io/eo/v1.1.0/schema.json"]);
        let err = parse_mlm_item(item).unwrap_err();
        assert!(err.to_string().contains("STAC:MLM"));
    }

    #[test]
    fn test_unsupported_message_lists_frameworks() {
        let err = unsupported("TensorFlow");
        assert!(matches!(err, SdkError::UnsupportedFramework(_)));
        assert!(err.to_string().contains("TensorFlow"));
    }
}
