//! Engine configuration.
//!
//! All options the engine recognizes live in [`EngineConfig`], which is
//! passed explicitly to the orchestrator. [`EngineConfig::from_env`] reads the
//! `CUBEML_*` environment variables once; the resulting value is read-only
//! for the lifetime of the orchestrator that owns it.

use crate::error::{CubeError, CubeResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_CACHE_DIR: &str = "CUBEML_CACHE_DIR";
pub const ENV_MODEL_CACHE_DIR: &str = "CUBEML_MODEL_CACHE_DIR";
pub const ENV_DATACUBE_CACHE_DIR: &str = "CUBEML_DATACUBE_CACHE_DIR";
pub const ENV_USE_GPU: &str = "CUBEML_USE_GPU";
pub const ENV_ALLOW_PROCESSING_FUNCTION: &str = "CUBEML_ALLOW_PROCESSING_FUNCTION";
pub const ENV_ALLOWED_PROCESSING_PACKAGES: &str = "CUBEML_ALLOWED_PROCESSING_PACKAGES";
pub const ENV_S3_ENDPOINT: &str = "CUBEML_S3_MODEL_REPO_ENDPOINT";
pub const ENV_S3_ACCESS_KEY_ID: &str = "CUBEML_S3_MODEL_REPO_ACCESS_KEY_ID";
pub const ENV_S3_SECRET_ACCESS_KEY: &str = "CUBEML_S3_MODEL_REPO_SECRET_ACCESS_KEY";

/// Packages allowed for custom processing expressions when nothing is configured.
pub const DEFAULT_ALLOWED_PACKAGES: &str = "numpy;torch;ml_datacube_bridge";

/// Access credentials for an S3-compatible model repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Configuration for the adaptation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root cache directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Directory holding downloaded model artifacts.
    #[serde(default = "default_model_cache_dir")]
    pub model_cache_dir: PathBuf,

    /// Directory for materialized datacubes.
    #[serde(default = "default_datacube_cache_dir")]
    pub datacube_cache_dir: PathBuf,

    /// Prefer an accelerator when the backend supports one.
    #[serde(default = "default_true")]
    pub use_gpu: bool,

    /// Whether custom pre-/post-processing expressions may run at all.
    ///
    /// Running them amounts to executing code named by the model metadata.
    #[serde(default = "default_true")]
    pub allow_processing_function: bool,

    /// Top-level packages custom expressions may come from.
    ///
    /// An empty list allows every package.
    #[serde(default = "default_allowed_packages")]
    pub allowed_processing_packages: Vec<String>,

    /// Endpoint of an S3-compatible model repository.
    #[serde(default)]
    pub s3_endpoint: Option<String>,

    /// Credentials for the S3 model repository.
    #[serde(default)]
    pub s3_credentials: Option<S3Credentials>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_model_cache_dir() -> PathBuf {
    default_cache_dir().join("model_cache")
}

fn default_datacube_cache_dir() -> PathBuf {
    default_cache_dir().join("datacubes")
}

fn default_true() -> bool {
    true
}

fn default_allowed_packages() -> Vec<String> {
    parse_package_list(DEFAULT_ALLOWED_PACKAGES)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            model_cache_dir: default_model_cache_dir(),
            datacube_cache_dir: default_datacube_cache_dir(),
            use_gpu: true,
            allow_processing_function: true,
            allowed_processing_packages: default_allowed_packages(),
            s3_endpoint: None,
            s3_credentials: None,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> CubeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> CubeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache_dir = lookup(ENV_CACHE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_dir);
        let model_cache_dir = lookup(ENV_MODEL_CACHE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| cache_dir.join("model_cache"));
        let datacube_cache_dir = lookup(ENV_DATACUBE_CACHE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| cache_dir.join("datacubes"));

        let use_gpu = parse_bool(ENV_USE_GPU, lookup(ENV_USE_GPU), true)?;
        let allow_processing_function = parse_bool(
            ENV_ALLOW_PROCESSING_FUNCTION,
            lookup(ENV_ALLOW_PROCESSING_FUNCTION),
            true,
        )?;
        let allowed_processing_packages = parse_package_list(
            &lookup(ENV_ALLOWED_PROCESSING_PACKAGES)
                .unwrap_or_else(|| DEFAULT_ALLOWED_PACKAGES.to_string()),
        );

        let s3_credentials = match (
            lookup(ENV_S3_ACCESS_KEY_ID),
            lookup(ENV_S3_SECRET_ACCESS_KEY),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Some(S3Credentials {
                access_key_id,
                secret_access_key,
            }),
            (None, None) => None,
            _ => {
                return Err(CubeError::config(format!(
                    "Either {} or {} is not set. Set both, or neither of the two.",
                    ENV_S3_ACCESS_KEY_ID, ENV_S3_SECRET_ACCESS_KEY
                )))
            }
        };

        let config = Self {
            cache_dir,
            model_cache_dir,
            datacube_cache_dir,
            use_gpu,
            allow_processing_function,
            allowed_processing_packages,
            s3_endpoint: lookup(ENV_S3_ENDPOINT),
            s3_credentials,
        };
        log::debug!(target: "cubeml_core", "Loaded engine configuration: {:?}", config.redacted());
        Ok(config)
    }

    /// Check invariants of a programmatically built configuration.
    pub fn validate(&self) -> CubeResult<()> {
        if let Some(creds) = &self.s3_credentials {
            if creds.access_key_id.is_empty() != creds.secret_access_key.is_empty() {
                return Err(CubeError::config(
                    "S3 credentials require both an access key id and a secret access key",
                ));
            }
        }
        Ok(())
    }

    /// Set the root cache directory; model and datacube caches follow it.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self.model_cache_dir = self.cache_dir.join("model_cache");
        self.datacube_cache_dir = self.cache_dir.join("datacubes");
        self
    }

    /// Set the model cache directory.
    pub fn with_model_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_cache_dir = dir.into();
        self
    }

    /// Enable or disable accelerator use.
    pub fn with_gpu(mut self, use_gpu: bool) -> Self {
        self.use_gpu = use_gpu;
        self
    }

    /// Enable or disable custom processing expressions.
    pub fn with_processing_functions(mut self, allow: bool) -> Self {
        self.allow_processing_function = allow;
        self
    }

    /// Replace the allow-list of expression packages.
    pub fn with_allowed_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_processing_packages = packages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_s3_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.s3_endpoint = Some(endpoint.into());
        self
    }

    /// Set S3 repository credentials.
    pub fn with_s3_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.s3_credentials = Some(S3Credentials {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        });
        self
    }

    fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(creds) = copy.s3_credentials.as_mut() {
            creds.secret_access_key = "***".to_string();
        }
        copy
    }
}

fn parse_bool(name: &str, value: Option<String>, default: bool) -> CubeResult<bool> {
    match value {
        None => Ok(default),
        Some(v) => match v.to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(CubeError::config(format!(
                "{} only allows values \"True\" and \"False\". Currently set to \"{}\".",
                name, v
            ))),
        },
    }
}

fn parse_package_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
