//! Writing model artifacts
//!
//! Produces the manifest + weights pair that [`ModelStore`](super::ModelStore)
//! loads. Used by the `init-model` tool to smoke-test a deployment before a
//! trained model is available, and by the tests.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::CompactRecorder;

use super::cnn::{OutputHead, PlantClassifierConfig};
use super::manifest::{ModelManifest, PreprocessingConfig, MANIFEST_FORMAT_VERSION};
use crate::backend::{default_device, InferenceBackend};
use crate::utils::error::{Result, ServeError};

/// File name of the manifest inside an artifact directory
pub const MANIFEST_FILE: &str = "model.json";
/// Stem of the weights file; the recorder appends `.mpk`
pub const WEIGHTS_STEM: &str = "weights";

/// Builder for a freshly initialized model artifact
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    name: String,
    architecture: PlantClassifierConfig,
    labels: Vec<String>,
    preprocessing: PreprocessingConfig,
    head: OutputHead,
}

impl ModelArtifact {
    pub fn new(
        name: impl Into<String>,
        architecture: PlantClassifierConfig,
        labels: Vec<String>,
        preprocessing: PreprocessingConfig,
    ) -> Self {
        Self {
            name: name.into(),
            architecture,
            labels,
            preprocessing,
            head: OutputHead::Softmax,
        }
    }

    pub fn with_head(mut self, head: OutputHead) -> Self {
        self.head = head;
        self
    }

    /// Manifest describing this artifact
    pub fn manifest(&self) -> ModelManifest {
        ModelManifest {
            format_version: MANIFEST_FORMAT_VERSION,
            name: self.name.clone(),
            weights: PathBuf::from(WEIGHTS_STEM).with_extension("mpk"),
            architecture: self.architecture.clone(),
            head: self.head,
            labels: self.labels.clone(),
            preprocessing: self.preprocessing.clone(),
        }
    }

    /// Initialize weights and write manifest + weights into `dir`.
    ///
    /// Returns the path of the manifest, which is what the server is configured with.
    pub fn create(&self, dir: &Path) -> Result<PathBuf> {
        let manifest = self.manifest();
        manifest.validate()?;

        std::fs::create_dir_all(dir)?;

        let device = default_device();
        let model = self.architecture.init::<InferenceBackend>(&device);
        model
            .save_file(dir.join(WEIGHTS_STEM), &CompactRecorder::new())
            .map_err(|e| {
                ServeError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to write weights: {:?}", e),
                ))
            })?;

        let manifest_path = dir.join(MANIFEST_FILE);
        manifest.save(&manifest_path)?;

        tracing::info!(
            "Wrote model artifact '{}' ({} labels) to {:?}",
            self.name,
            self.labels.len(),
            dir
        );

        Ok(manifest_path)
    }
}
