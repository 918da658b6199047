//! Test fixtures for common inputs.
//!
//! Provides pre-built datacubes and STAC:MLM items that can be used across
//! tests without external files.

use crate::datacube::{coords, Datacube};
use crate::error::CubeResult;
use serde_json::{json, Value};

/// Schema URL of the STAC:MLM extension used by the fixtures.
pub const MLM_SCHEMA_URL: &str = "https://stac-extensions.github.io/mlm/v1.4.0/schema.json";

/// A `(bands, y, x)` cube with Sentinel-2 band labels.
///
/// Each value encodes its position as `band * 10000 + y * 100 + x`.
pub fn sentinel2_cube(bands: &[&str], height: usize, width: usize) -> CubeResult<Datacube> {
    Datacube::from_fn(["bands", "y", "x"], &[bands.len(), height, width], |idx| {
        (idx[0] * 10_000 + idx[1] * 100 + idx[2]) as f32
    })?
    .with_coords("bands", coords(bands.iter().copied()))
}

/// A `(time, bands, y, x)` cube with `times` labelled time steps.
pub fn time_series_cube(
    times: &[&str],
    bands: &[&str],
    height: usize,
    width: usize,
) -> CubeResult<Datacube> {
    Datacube::from_fn(
        ["time", "bands", "y", "x"],
        &[times.len(), bands.len(), height, width],
        |idx| (idx[0] * 1_000_000 + idx[1] * 10_000 + idx[2] * 100 + idx[3]) as f32,
    )
    .and_then(|c| c.with_coords("time", coords(times.iter().copied())))
    .and_then(|c| c.with_coords("bands", coords(bands.iter().copied())))
}

/// `mlm:*` properties of a `[batch, bands, y, x]` model.
pub fn mlm_properties(framework: &str, bands: &[&str], window: i64) -> Value {
    json!({
        "mlm:name": "fixture-model",
        "mlm:architecture": "CNN",
        "mlm:tasks": ["classification"],
        "mlm:framework": framework,
        "mlm:input": [{
            "name": "fixture-input",
            "bands": bands,
            "input": {
                "shape": [-1, bands.len(), window, window],
                "dim_order": ["batch", "bands", "y", "x"],
                "data_type": "float32"
            }
        }],
        "mlm:output": [{
            "name": "fixture-output",
            "tasks": ["classification"],
            "result": {
                "shape": [-1, 1],
                "dim_order": ["batch", "class"],
                "data_type": "float32"
            }
        }]
    })
}

/// A complete STAC item implementing the MLM extension.
pub fn mlm_item(properties: Value, model_href: &str) -> Value {
    json!({
        "type": "Feature",
        "stac_version": "1.0.0",
        "stac_extensions": [MLM_SCHEMA_URL],
        "id": "fixture-item",
        "geometry": null,
        "properties": properties,
        "assets": {
            "model": {
                "href": model_href,
                "type": "application/octet-stream; application=onnx",
                "roles": ["mlm:model"]
            }
        },
        "links": []
    })
}
