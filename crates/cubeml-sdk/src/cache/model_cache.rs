//! Download cache for model assets.
//!
//! # Example
//!
//! ```rust,no_run
//! use cubeml_sdk::cache::ModelCache;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = ModelCache::new("./cache/model_cache");
//! let path = cache.fetch("https://example.com/models/resnet.onnx")?;
//! println!("Model cached at {}", path.display());
//! # Ok(())
//! # }
//! ```

use crate::error::{ureq_error, SdkError, SdkResult};
use cubeml_core::assets::{LocalFileProvider, ModelAssetProvider};
use cubeml_core::{CubeResult, EngineConfig};
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection timeout in milliseconds.
const CONNECT_TIMEOUT_MS: u64 = 5000;

/// Download timeout for large model files.
const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Longest sanitized URL prefix kept in a cache directory name.
const MAX_DIR_PREFIX: usize = 80;

/// Number of hex digits of the URL digest appended to directory names.
const DIGEST_LEN: usize = 12;

fn sanitize(value: &str, keep_dots: bool) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || (keep_dots && c == '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Cache directory name for a model URL.
///
/// A readable, sanitized prefix of the URL followed by a short SHA-256
/// digest of the full URL, so distinct URLs never share a directory.
pub fn url_to_dir_name(url: &str) -> String {
    let mut prefix = sanitize(url, false);
    prefix.truncate(MAX_DIR_PREFIX);
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    format!("{}-{}", prefix, &digest[..DIGEST_LEN])
}

/// File name for a model URL: its sanitized last path segment.
pub fn url_to_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    let name = sanitize(segment, true);
    if name.is_empty() || name.chars().all(|c| c == '.') {
        "model".to_string()
    } else {
        name
    }
}

/// Downloads model assets once and serves them from disk afterwards.
///
/// Local paths and `file://` URLs are returned in place, without copying.
#[derive(Debug)]
pub struct ModelCache {
    cache_dir: PathBuf,
    s3_endpoint: Option<String>,
    s3_signed: bool,
    agent: ureq::Agent,
}

impl ModelCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(CONNECT_TIMEOUT_MS))
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build();
        Self {
            cache_dir: cache_dir.into(),
            s3_endpoint: None,
            s3_signed: false,
            agent,
        }
    }

    /// Cache rooted at `model_cache_dir`, with the configured S3 endpoint.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut cache = Self::new(&config.model_cache_dir);
        cache.s3_endpoint = config.s3_endpoint.clone();
        cache.s3_signed = config.s3_credentials.is_some();
        cache
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where `url` is (or would be) cached.
    pub fn cache_path(&self, url: &str) -> PathBuf {
        self.cache_dir
            .join(url_to_dir_name(url))
            .join(url_to_file_name(url))
    }

    pub fn is_cached(&self, url: &str) -> bool {
        self.cache_path(url).exists()
    }

    /// Local path of the model at `url`, downloading it if needed.
    pub fn fetch(&self, url: &str) -> SdkResult<PathBuf> {
        if !is_remote(url) {
            return Ok(LocalFileProvider.resolve_local_path(url)?);
        }

        let cache_path = self.cache_path(url);
        if cache_path.exists() {
            info!("Cache hit for '{}' at {}", url, cache_path.display());
            return Ok(cache_path);
        }

        let download_url = self.download_url(url)?;
        info!("Cache miss for '{}', downloading to {}", url, cache_path.display());
        if let Some(parent) = cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.download(&download_url, &cache_path)?;
        info!("Download complete for '{}', cached at {}", url, cache_path.display());
        Ok(cache_path)
    }

    /// HTTP URL to fetch `url` from.
    ///
    /// `s3://bucket/key` maps to `{endpoint}/bucket/key` (path-style).
    fn download_url(&self, url: &str) -> SdkResult<String> {
        let Some(location) = url.strip_prefix("s3://") else {
            return Ok(url.to_string());
        };
        let endpoint = self.s3_endpoint.as_deref().ok_or_else(|| {
            SdkError::CacheError(format!(
                "cannot download '{}': no S3 model repository endpoint is configured",
                url
            ))
        })?;
        if self.s3_signed {
            return Err(SdkError::CacheError(format!(
                "cannot download '{}': signed S3 requests are not supported",
                url
            )));
        }
        Ok(format!("{}/{}", endpoint.trim_end_matches('/'), location))
    }

    /// Stream `url` into `dest` through a `.part` file.
    fn download(&self, url: &str, dest: &Path) -> SdkResult<()> {
        let partial = dest.with_extension(match dest.extension() {
            Some(ext) => format!("{}.part", ext.to_string_lossy()),
            None => "part".to_string(),
        });

        let result = self.try_download(url, &partial);
        if result.is_err() {
            std::fs::remove_file(&partial).ok();
        }
        result?;
        std::fs::rename(&partial, dest)?;
        Ok(())
    }

    fn try_download(&self, url: &str, partial: &Path) -> SdkResult<()> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| ureq_error(e, "download model"))?;
        if response.status() != 200 {
            return Err(SdkError::NetworkError(format!(
                "download model returned status {}",
                response.status()
            )));
        }

        let mut file = File::create(partial)?;
        let mut reader = response.into_reader();
        let mut buffer = [0u8; 8192];
        let mut downloaded: u64 = 0;
        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| SdkError::NetworkError(format!("Read error: {}", e)))?;
            if bytes_read == 0 {
                break;
            }
            file.write_all(&buffer[..bytes_read])?;
            downloaded += bytes_read as u64;
        }
        file.flush()?;
        debug!("Downloaded {} bytes from {}", downloaded, url);
        Ok(())
    }

    /// Remove every cached model.
    pub fn clear(&self) -> SdkResult<()> {
        if self.cache_dir.exists() {
            std::fs::remove_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }
}

fn is_remote(url: &str) -> bool {
    url.contains("://") && !url.starts_with("file://")
}

impl ModelAssetProvider for ModelCache {
    fn resolve_local_path(&self, url: &str) -> CubeResult<PathBuf> {
        Ok(self.fetch(url)?)
    }

    fn name(&self) -> &'static str {
        "model-cache"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use tempfile::TempDir;

    /// Serve `body` once on a local port and return the URL prefix.
    fn serve_once(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap_or(0) > 2 {
                    line.clear();
                }
                let header = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                stream.write_all(header.as_bytes()).ok();
                stream.write_all(body).ok();
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_dir_and_file_names() {
        let url = "https://example.com/models/resnet.onnx?download=1";
        let dir = url_to_dir_name(url);
        assert!(dir.starts_with("https___example_com_models_resnet_onnx"));
        assert_eq!(dir.len(), dir.rfind('-').unwrap() + 1 + DIGEST_LEN);
        assert_ne!(dir, url_to_dir_name("https://example.com/models/resnet.onnx"));

        assert_eq!(url_to_file_name(url), "resnet.onnx");
        assert_eq!(url_to_file_name("https://example.com/"), "example.com");
        assert_eq!(url_to_file_name("https://example.com/a%20b.pt"), "a_20b.pt");
    }

    #[test]
    fn test_cache_hit_skips_download() {
        let dir = TempDir::new().unwrap();
        let cache = ModelCache::new(dir.path());
        // Unroutable: any download attempt would fail
        let url = "http://127.0.0.1:1/model.onnx";
        let path = cache.cache_path(url);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"cached").unwrap();

        assert!(cache.is_cached(url));
        assert_eq!(cache.fetch(url).unwrap(), path);
    }

    #[test]
    fn test_download_then_hit() {
        let dir = TempDir::new().unwrap();
        let cache = ModelCache::new(dir.path());
        let url = format!("{}/weights/model.onnx", serve_once("200 OK", b"onnx-bytes"));

        let path = cache.fetch(&url).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"onnx-bytes");
        assert_eq!(path.file_name().unwrap(), "model.onnx");
        assert!(!path.with_extension("onnx.part").exists());

        // The server is gone; a second fetch must come from disk
        assert_eq!(cache.fetch(&url).unwrap(), path);
    }

    #[test]
    fn test_failed_download_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let cache = ModelCache::new(dir.path());
        let url = format!("{}/model.onnx", serve_once("404 Not Found", b""));

        assert!(matches!(cache.fetch(&url), Err(SdkError::NetworkError(_))));
        assert!(!cache.is_cached(&url));
        let parent = cache.cache_path(&url).parent().unwrap().to_path_buf();
        assert_eq!(std::fs::read_dir(parent).unwrap().count(), 0);
    }

    #[test]
    fn test_local_paths_are_not_copied() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("local.onnx");
        std::fs::write(&file, b"onnx").unwrap();
        let cache = ModelCache::new(dir.path().join("cache"));

        assert_eq!(cache.fetch(file.to_str().unwrap()).unwrap(), file);
        assert!(!cache.cache_dir().exists());
    }

    #[test]
    fn test_s3_urls() {
        let dir = TempDir::new().unwrap();
        let plain = ModelCache::new(dir.path());
        assert!(matches!(
            plain.download_url("s3://bucket/model.onnx"),
            Err(SdkError::CacheError(_))
        ));

        let config = EngineConfig::default()
            .with_model_cache_dir(dir.path())
            .with_s3_endpoint("https://s3.example.com/");
        let cache = ModelCache::from_config(&config);
        assert_eq!(
            cache.download_url("s3://bucket/models/model.onnx").unwrap(),
            "https://s3.example.com/bucket/models/model.onnx"
        );

        let signed = ModelCache::from_config(&config.with_s3_credentials("id", "secret"));
        assert!(signed.download_url("s3://bucket/model.onnx").is_err());
    }
}
