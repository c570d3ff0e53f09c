//! Application state for the inference server
//!
//! Built once at startup from the configuration and the loaded model, then
//! shared read-only by every request.

use std::sync::Arc;
use std::time::Instant;

use super::upload::UploadHandler;
use crate::config::ServerConfig;
use crate::inference::InferenceEngine;
use crate::model::{ModelManifest, ModelStore, ResizePolicy};
use crate::preprocess::Preprocessor;
use crate::storage::UploadArchive;
use crate::utils::error::{Result, ServeError};

/// Shared application state
#[derive(Debug)]
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Manifest of the loaded model
    pub manifest: Arc<ModelManifest>,
    pub engine: Arc<InferenceEngine>,
    pub uploads: UploadHandler,
    /// Server start time
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire the request pipeline around an already loaded model
    pub fn new(config: ServerConfig, store: ModelStore) -> Result<Self> {
        config.validate()?;

        let manifest = Arc::clone(store.manifest());
        let pre = &manifest.preprocessing;
        if pre.policy == ResizePolicy::CenterCrop && config.max_image_dimension < pre.resize {
            return Err(ServeError::Config(format!(
                "max_image_dimension {} is smaller than the model's resize edge {}",
                config.max_image_dimension, pre.resize
            )));
        }

        let engine = Arc::new(InferenceEngine::start(&store, config.engine_config())?);
        let preprocessor =
            Preprocessor::new(&manifest).with_max_dimension(config.max_image_dimension);

        let mut uploads = UploadHandler::new(
            preprocessor,
            Arc::clone(&engine),
            config.max_upload_bytes,
            config.field_name.clone(),
        );
        if let Some(dir) = &config.upload_dir {
            uploads = uploads.with_archive(UploadArchive::new(dir));
        }

        Ok(Self {
            config,
            manifest,
            engine,
            uploads,
            started_at: Instant::now(),
        })
    }

    /// Load the configured model and build the state
    pub fn initialize(config: ServerConfig) -> Result<SharedState> {
        let store = ModelStore::load(&config.model_path)?;
        Ok(Arc::new(Self::new(config, store)?))
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
