//! Model Store
//!
//! Loads the model artifact exactly once at startup and hands out read-only
//! handles for forward passes. Nothing here can reload or mutate the weights
//! after [`ModelStore::load`] returns.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::{Tensor, TensorData};

use super::cnn::{OutputHead, PlantClassifier};
use super::manifest::ModelManifest;
use crate::backend::{default_device, InferenceBackend, InferenceDevice};
use crate::utils::error::{Result, ServeError};

/// The loaded model artifact
pub struct ModelStore {
    path: PathBuf,
    manifest: Arc<ModelManifest>,
    handle: ModelHandle,
}

impl std::fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStore")
            .field("path", &self.path)
            .field("name", &self.manifest.name)
            .field("input_shape", &self.manifest.input_shape())
            .finish()
    }
}

impl ModelStore {
    /// Load the artifact described by the manifest at `manifest_path`
    ///
    /// Fails with [`ServeError::Startup`] when the manifest or weights are
    /// missing, corrupt, or do not agree with each other.
    pub fn load(manifest_path: impl AsRef<Path>) -> Result<Self> {
        let path = manifest_path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(ServeError::Startup(format!(
                "Model manifest not found at {:?}",
                path
            )));
        }

        let start = Instant::now();
        let manifest = ModelManifest::load(&path)?;
        let weights = manifest.weights_path(&path);
        if !weights.is_file() {
            return Err(ServeError::Startup(format!(
                "Model weights not found at {:?}",
                weights
            )));
        }

        let device = default_device();
        let model = load_weights(&manifest, &weights, &device)?;

        let store = Self {
            handle: ModelHandle {
                model,
                device,
                head: manifest.head,
                input_shape: manifest.input_shape(),
            },
            manifest: Arc::new(manifest),
            path,
        };
        store.verify()?;

        tracing::info!(
            "Loaded model '{}' ({} classes, input {:?}) in {:.1} ms",
            store.manifest.name,
            store.manifest.labels.len(),
            store.manifest.input_shape(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(store)
    }

    /// Path of the manifest this store was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &Arc<ModelManifest> {
        &self.manifest
    }

    /// A read-only handle for running forward passes.
    ///
    /// Handles are clones of the loaded module; their parameter tensors share
    /// the same weight storage.
    pub fn handle(&self) -> ModelHandle {
        self.handle.clone()
    }

    /// Run a forward pass on a zero tensor to prove weights and architecture agree
    fn verify(&self) -> Result<()> {
        let [c, h, w] = self.manifest.input_shape();
        let scores = self.handle.run(vec![0.0; c * h * w]).map_err(|e| {
            ServeError::Startup(format!("Model failed its warm-up forward pass: {}", e))
        })?;

        if scores.len() != self.manifest.labels.len() {
            return Err(ServeError::Startup(format!(
                "Model produced {} scores for {} labels",
                scores.len(),
                self.manifest.labels.len()
            )));
        }

        Ok(())
    }
}

fn load_weights(
    manifest: &ModelManifest,
    weights: &Path,
    device: &InferenceDevice,
) -> Result<PlantClassifier<InferenceBackend>> {
    let recorder = CompactRecorder::new();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        manifest
            .architecture
            .init::<InferenceBackend>(device)
            .load_file(weights.to_path_buf(), &recorder, device)
    }));

    match outcome {
        Ok(Ok(model)) => Ok(model),
        Ok(Err(e)) => Err(ServeError::Startup(format!(
            "Failed to load weights {:?}: {:?}",
            weights, e
        ))),
        Err(payload) => Err(ServeError::Startup(format!(
            "Weights {:?} are incompatible with the declared architecture: {}",
            weights,
            panic_message(payload.as_ref())
        ))),
    }
}

/// Read-only access to the loaded network
#[derive(Clone, Debug)]
pub struct ModelHandle {
    model: PlantClassifier<InferenceBackend>,
    device: InferenceDevice,
    head: OutputHead,
    input_shape: [usize; 3],
}

impl ModelHandle {
    pub fn input_shape(&self) -> [usize; 3] {
        self.input_shape
    }

    /// Forward a single CHW image and return one score per class.
    ///
    /// `data` must hold exactly `channels * height * width` values; callers
    /// check the shape first. Panics raised by the numeric runtime are caught
    /// and reported as [`ServeError::Inference`].
    pub fn run(&self, data: Vec<f32>) -> Result<Vec<f32>> {
        let [c, h, w] = self.input_shape;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let input = Tensor::<InferenceBackend, 4>::from_data(
                TensorData::new(data, [1, c, h, w]),
                &self.device,
            );
            self.model
                .forward_scores(input, self.head)
                .into_data()
                .to_vec::<f32>()
        }));

        let scores = match outcome {
            Ok(Ok(scores)) => scores,
            Ok(Err(e)) => {
                return Err(ServeError::Inference(format!(
                    "Failed to read model output: {:?}",
                    e
                )))
            }
            Err(payload) => {
                return Err(ServeError::Inference(format!(
                    "Forward pass panicked: {}",
                    panic_message(payload.as_ref())
                )))
            }
        };

        if scores.iter().any(|s| !s.is_finite()) {
            return Err(ServeError::Inference(
                "Model produced non-finite scores".to_string(),
            ));
        }

        Ok(scores)
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
