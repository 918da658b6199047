//! Model artifact caching.
//!
//! Downloaded model files live under the configured model cache directory,
//! one sub-directory per source URL:
//!
//! ```text
//! {model_cache_dir}/
//!   https_example_com_models_resnet_onnx-3f2a9c01b7de/
//!     resnet.onnx
//! ```

mod model_cache;

pub use model_cache::{url_to_dir_name, url_to_file_name, ModelCache};
