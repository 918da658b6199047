//! Model Loading Tests
//!
//! Loads STAC:MLM items from disk and runs them with a mocked backend:
//! - Item validation (type, extension, framework, indexes)
//! - Asset resolution through the model cache
//! - End-to-end prediction
//!
//! Run with: `cargo test -p cubeml-sdk --test load_model`

use cubeml_core::backend::Framework;
use cubeml_core::testing::{mlm_item, mlm_properties, sentinel2_cube, MockBackend};
use cubeml_sdk::{load_ml_model, load_ml_model_with_backend, ml_predict, EngineConfig, SdkError};
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    config: EngineConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::default().with_cache_dir(dir.path().join("cache"));
        Self { dir, config }
    }

    fn model_file(&self) -> PathBuf {
        let path = self.dir.path().join("model.onnx");
        std::fs::write(&path, b"weights").unwrap();
        path
    }

    fn write_item(&self, item: &Value) -> String {
        let path = self.dir.path().join("item.json");
        std::fs::write(&path, serde_json::to_string_pretty(item).unwrap()).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn onnx_item(&self) -> String {
        let model = self.model_file();
        self.write_item(&mlm_item(
            mlm_properties("ONNX", &["B04", "B02"], 4),
            &model.to_string_lossy(),
        ))
    }
}

#[test]
fn test_predict_with_supplied_backend() {
    let fx = Fixture::new();
    let uri = fx.onnx_item();
    let backend = MockBackend::mean_per_sample();
    let recorder = backend.recorder();

    let mut model = load_ml_model_with_backend(&uri, None, 0, 0, &fx.config, Box::new(backend)).unwrap();
    assert!(!model.is_loaded());

    let cube = sentinel2_cube(&["B02", "B03", "B04"], 8, 8).unwrap();
    let prediction = ml_predict(cube, &mut model).unwrap();

    assert_eq!(prediction.shape(), &[4, 1]);
    assert_eq!(recorder.load_count(), 1);
    assert_eq!(recorder.calls().loaded_models[0], fx.dir.path().join("model.onnx"));
}

#[test]
fn test_framework_must_match_backend() {
    let fx = Fixture::new();
    let uri = fx.onnx_item();
    let backend = MockBackend::identity().with_framework(Framework::PyTorch);

    let err = load_ml_model_with_backend(&uri, None, 0, 0, &fx.config, Box::new(backend)).unwrap_err();
    assert!(matches!(err, SdkError::UnsupportedFramework(_)));
}

#[test]
fn test_unknown_framework_is_unsupported() {
    let fx = Fixture::new();
    let model = fx.model_file();
    let uri = fx.write_item(&mlm_item(
        mlm_properties("TensorFlow", &["B04"], 4),
        &model.to_string_lossy(),
    ));

    let err = load_ml_model(&uri, None, 0, 0, &fx.config).unwrap_err();
    assert!(matches!(err, SdkError::UnsupportedFramework(ref m) if m.contains("TensorFlow")));
}

#[cfg(not(feature = "onnx"))]
#[test]
fn test_onnx_requires_feature() {
    let fx = Fixture::new();
    let uri = fx.onnx_item();
    let err = load_ml_model(&uri, None, 0, 0, &fx.config).unwrap_err();
    assert!(matches!(err, SdkError::UnsupportedFramework(_)));
}

#[test]
fn test_index_out_of_range() {
    let fx = Fixture::new();
    let uri = fx.onnx_item();

    let err = load_ml_model_with_backend(&uri, None, 1, 0, &fx.config, Box::new(MockBackend::identity()))
        .unwrap_err();
    assert!(matches!(err, SdkError::InvalidItem(ref m) if m.contains("input index 1")));

    let err = load_ml_model_with_backend(&uri, None, 0, 3, &fx.config, Box::new(MockBackend::identity()))
        .unwrap_err();
    assert!(matches!(err, SdkError::InvalidItem(ref m) if m.contains("output index 3")));
}

#[test]
fn test_missing_and_malformed_items() {
    let fx = Fixture::new();
    let missing = fx.dir.path().join("missing.json");
    let err = load_ml_model(&missing.to_string_lossy(), None, 0, 0, &fx.config).unwrap_err();
    assert!(matches!(err, SdkError::InvalidItem(_)));

    let garbage = fx.dir.path().join("garbage.json");
    std::fs::write(&garbage, "not json").unwrap();
    let err = load_ml_model(&garbage.to_string_lossy(), None, 0, 0, &fx.config).unwrap_err();
    assert!(matches!(err, SdkError::InvalidItem(_)));
}

#[test]
fn test_named_asset_selection() {
    let fx = Fixture::new();
    let model = fx.model_file();
    let mut item = mlm_item(mlm_properties("ONNX", &["B04"], 4), &model.to_string_lossy());
    item["assets"]["weights-v2"] = json!({
        "href": model.to_string_lossy(),
        "roles": ["mlm:model"]
    });
    let uri = fx.write_item(&item);
    let cube = sentinel2_cube(&["B04"], 4, 4).unwrap();

    // Two model assets and no name: ambiguous
    let mut model_any =
        load_ml_model_with_backend(&uri, None, 0, 0, &fx.config, Box::new(MockBackend::mean_per_sample()))
            .unwrap();
    let err = ml_predict(cube.clone(), &mut model_any).unwrap_err();
    assert!(err.to_string().contains("weights-v2"));

    let mut model_named = load_ml_model_with_backend(
        &uri,
        Some("weights-v2"),
        0,
        0,
        &fx.config,
        Box::new(MockBackend::mean_per_sample()),
    )
    .unwrap();
    assert_eq!(ml_predict(cube, &mut model_named).unwrap().shape(), &[1, 1]);
}
