//! Model asset selection and local resolution.
//!
//! A STAC item may carry several assets; the ones whose roles include
//! `mlm:model` hold model artifacts. [`select_model_asset`] picks one of
//! them, and a [`ModelAssetProvider`] turns its `href` into a local file.
//!
//! Core only ships [`LocalFileProvider`]. The download cache lives in
//! `cubeml-sdk` and implements the same trait.

use crate::error::{CubeError, CubeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Asset role marking a model artifact.
pub const MODEL_ROLE: &str = "mlm:model";

/// A STAC asset entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAsset {
    pub href: String,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(rename = "mlm:artifact_type", default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}

impl ModelAsset {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            roles: vec![MODEL_ROLE.to_string()],
            title: None,
            media_type: None,
            artifact_type: None,
        }
    }

    pub fn is_model(&self) -> bool {
        self.roles.iter().any(|r| r == MODEL_ROLE)
    }
}

/// Asset key -> asset, as found under an item's `assets`.
pub type AssetMap = BTreeMap<String, ModelAsset>;

/// Pick the model asset to run.
///
/// - no `mlm:model` asset: error
/// - `name` given: that asset, which must carry the `mlm:model` role
/// - exactly one `mlm:model` asset: that one
/// - several and no `name`: error, the choice is ambiguous
pub fn select_model_asset<'a>(assets: &'a AssetMap, name: Option<&str>) -> CubeResult<(&'a str, &'a ModelAsset)> {
    let model_assets: Vec<(&String, &ModelAsset)> =
        assets.iter().filter(|(_, asset)| asset.is_model()).collect();

    if model_assets.is_empty() {
        return Err(CubeError::config(format!(
            "the STAC item has no asset with role {}",
            MODEL_ROLE
        )));
    }

    if let Some(name) = name {
        return model_assets
            .iter()
            .find(|(key, _)| key.as_str() == name)
            .map(|&(key, asset)| (key.as_str(), asset))
            .ok_or_else(|| {
                CubeError::config(format!(
                    "the STAC item has no asset named '{}' with role {}",
                    name, MODEL_ROLE
                ))
            });
    }

    match model_assets.as_slice() {
        &[(key, asset)] => Ok((key.as_str(), asset)),
        several => Err(CubeError::config(format!(
            "multiple assets with role {} found ({}); specify which one to use",
            MODEL_ROLE,
            several
                .iter()
                .map(|(key, _)| key.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Resolves a model asset URL to a local file path.
///
/// Implementations must be idempotent: resolving the same URL twice returns
/// the same path without fetching it again.
pub trait ModelAssetProvider: Send + Sync {
    fn resolve_local_path(&self, url: &str) -> CubeResult<PathBuf>;

    /// Provider name for logging/debugging.
    fn name(&self) -> &'static str;
}

/// Resolves `file://` URLs and plain filesystem paths.
#[derive(Debug, Clone, Default)]
pub struct LocalFileProvider;

impl ModelAssetProvider for LocalFileProvider {
    fn resolve_local_path(&self, url: &str) -> CubeResult<PathBuf> {
        if url.contains("://") && !url.starts_with("file://") {
            return Err(CubeError::config(format!(
                "'{}' is not a local path; a downloading asset provider is required",
                url
            )));
        }
        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        if !path.exists() {
            return Err(CubeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("model file not found: {}", path.display()),
            )));
        }
        Ok(path)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
