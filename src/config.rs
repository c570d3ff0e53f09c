//! Server configuration
//!
//! Defaults are overridden by an optional JSON file, which is in turn
//! overridden by command line flags and environment variables (see `main.rs`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::inference::EngineConfig;
use crate::preprocess::DEFAULT_MAX_IMAGE_DIMENSION;
use crate::utils::error::{Result, ServeError};

/// Default maximum upload size (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Server configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Path of the model manifest (JSON)
    pub model_path: PathBuf,
    /// Maximum accepted size of the uploaded image in bytes
    pub max_upload_bytes: usize,
    /// Directory where accepted uploads are archived; disabled when unset
    pub upload_dir: Option<PathBuf>,
    /// Inference worker threads
    pub workers: usize,
    /// Requests that may wait for an inference worker
    pub queue_capacity: usize,
    /// Per-request deadline in milliseconds
    pub request_timeout_ms: u64,
    /// Predictions per response, 0 for all labels
    pub top_k: usize,
    /// Route of the prediction endpoint
    pub predict_path: String,
    /// Multipart field carrying the image
    pub field_name: String,
    /// Largest accepted decoded width or height
    pub max_image_dimension: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            model_path: PathBuf::from("model/model.json"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            upload_dir: None,
            workers: 1,
            queue_capacity: 64,
            request_timeout_ms: 30_000,
            top_k: 5,
            predict_path: "/predict".to_string(),
            field_name: "file".to_string(),
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ServeError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        serde_json::from_str(&json)
            .map_err(|e| ServeError::Config(format!("Invalid config file {:?}: {}", path, e)))
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> { Err(ServeError::Config(msg.to_string())) };

        if self.max_upload_bytes == 0 {
            return invalid("max_upload_bytes must be greater than 0");
        }
        if self.workers == 0 {
            return invalid("workers must be at least 1");
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be at least 1");
        }
        if self.request_timeout_ms == 0 {
            return invalid("request_timeout_ms must be greater than 0");
        }
        if self.max_image_dimension == 0 {
            return invalid("max_image_dimension must be greater than 0");
        }
        if !self.predict_path.starts_with('/') || self.predict_path.len() < 2 {
            return invalid("predict_path must start with '/' and name a route");
        }
        if matches!(self.predict_path.as_str(), "/health" | "/model") {
            return invalid("predict_path collides with a built-in route");
        }
        if self.field_name.trim().is_empty() {
            return invalid("field_name must not be empty");
        }
        self.bind_addr().map(|_| ())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                ServeError::Config(format!(
                    "Invalid bind address {}:{}: {}",
                    self.host, self.port, e
                ))
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            top_k: self.top_k,
        }
    }

    /// Log the effective configuration
    pub fn log_summary(&self) {
        tracing::info!("Configuration:");
        tracing::info!("  Listen:        {}:{}", self.host, self.port);
        tracing::info!("  Model:         {:?}", self.model_path);
        tracing::info!("  Predict route: {} (field '{}')", self.predict_path, self.field_name);
        tracing::info!("  Max upload:    {} bytes", self.max_upload_bytes);
        tracing::info!("  Upload dir:    {:?}", self.upload_dir);
        tracing::info!(
            "  Workers:       {} (queue {}, timeout {:?}, top_k {})",
            self.workers,
            self.queue_capacity,
            self.request_timeout(),
            self.top_k
        );
    }
}
