//! Model module: CNN architecture, artifact manifest and the model store
//!
//! This module provides:
//! - The PlantClassifier CNN built with Burn
//! - The JSON manifest describing a model artifact
//! - One-time loading of the artifact at startup
//! - Writing fresh artifacts for smoke tests

pub mod artifact;
pub mod cnn;
pub mod manifest;
pub mod store;

pub use artifact::ModelArtifact;
pub use cnn::{OutputHead, PlantClassifier, PlantClassifierConfig};
pub use manifest::{Interpolation, ModelManifest, PreprocessingConfig, ResizePolicy};
pub use store::{ModelHandle, ModelStore};
