//! Model artifact manifest
//!
//! The manifest is the JSON half of a model artifact. It describes the network
//! architecture, the label vocabulary, the preprocessing constants the model was
//! trained with and the weights file to load.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::cnn::{OutputHead, PlantClassifierConfig};
use crate::utils::error::{Result, ResultExt, ServeError};

/// Manifest format understood by this build
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Extension written by the compact (named MessagePack) recorder
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resampling filter used when resizing uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    /// Bilinear
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl Interpolation {
    pub fn filter_type(&self) -> FilterType {
        match self {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Triangle => FilterType::Triangle,
            Interpolation::CatmullRom => FilterType::CatmullRom,
            Interpolation::Gaussian => FilterType::Gaussian,
            Interpolation::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// How an upload is brought to the square model input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizePolicy {
    /// Scale the shorter side to `resize`, keep the aspect ratio, take the center square
    #[default]
    CenterCrop,
    /// Scale both sides straight to `input_size`, ignoring the aspect ratio
    Stretch,
}

/// Preprocessing constants the model was trained with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    #[serde(default)]
    pub policy: ResizePolicy,
    /// Shorter image side after the aspect-preserving resize (center crop only)
    pub resize: u32,
    #[serde(default)]
    pub interpolation: Interpolation,
    /// Per-channel mean applied after scaling pixels to [0, 1]
    pub mean: Vec<f32>,
    /// Per-channel standard deviation
    pub std: Vec<f32>,
}

impl PreprocessingConfig {
    /// ImageNet-style preprocessing: resize to `resize`, ImageNet RGB statistics
    pub fn imagenet(resize: u32) -> Self {
        Self {
            policy: ResizePolicy::CenterCrop,
            resize,
            interpolation: Interpolation::Triangle,
            mean: IMAGENET_MEAN.to_vec(),
            std: IMAGENET_STD.to_vec(),
        }
    }

    /// Plain resize to the input size, as used by torchvision `Resize((n, n))`
    pub fn stretch(mean: Vec<f32>, std: Vec<f32>) -> Self {
        Self {
            policy: ResizePolicy::Stretch,
            resize: 0,
            interpolation: Interpolation::Triangle,
            mean,
            std,
        }
    }
}

/// Description of a model artifact on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub format_version: u32,
    /// Human-readable model name reported by the API
    pub name: String,
    /// Weights file, relative to the manifest directory
    pub weights: PathBuf,
    pub architecture: PlantClassifierConfig,
    #[serde(default)]
    pub head: OutputHead,
    /// Label for each output index
    pub labels: Vec<String>,
    pub preprocessing: PreprocessingConfig,
}

impl ModelManifest {
    /// Read and validate a manifest from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model manifest {:?}", path))?;
        let manifest: ModelManifest = serde_json::from_str(&json)
            .with_context(|| format!("Corrupt model manifest {:?}", path))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Save the manifest as pretty-printed JSON
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    /// Model input shape as [channels, height, width]
    pub fn input_shape(&self) -> [usize; 3] {
        let size = self.architecture.input_size;
        [self.architecture.in_channels, size, size]
    }

    /// Absolute path of the weights file for a manifest stored at `manifest_path`
    pub fn weights_path(&self, manifest_path: &Path) -> PathBuf {
        if self.weights.is_absolute() {
            return self.weights.clone();
        }
        manifest_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&self.weights)
    }

    /// Check the manifest for internal consistency
    pub fn validate(&self) -> Result<()> {
        let incompatible = |msg: String| -> Result<()> { Err(ServeError::Startup(msg)) };

        if self.format_version != MANIFEST_FORMAT_VERSION {
            return incompatible(format!(
                "Unsupported manifest format version {} (expected {})",
                self.format_version, MANIFEST_FORMAT_VERSION
            ));
        }

        if self.weights.extension().and_then(|e| e.to_str()) != Some(WEIGHTS_EXTENSION) {
            return incompatible(format!(
                "Weights file {:?} must be a .{} record",
                self.weights, WEIGHTS_EXTENSION
            ));
        }

        let arch = &self.architecture;
        if arch.num_classes == 0 || self.labels.is_empty() {
            return incompatible("Model must have at least one class".to_string());
        }
        if self.labels.len() != arch.num_classes {
            return incompatible(format!(
                "Manifest lists {} labels but the model has {} classes",
                self.labels.len(),
                arch.num_classes
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.labels.iter().find(|l| !seen.insert(l.as_str())) {
            return incompatible(format!("Duplicate label '{}'", dup));
        }

        if arch.in_channels != 1 && arch.in_channels != 3 {
            return incompatible(format!(
                "in_channels must be 1 or 3, got {}",
                arch.in_channels
            ));
        }
        if arch.depth == 0 || arch.base_filters == 0 || arch.hidden_units == 0 {
            return incompatible(
                "depth, base_filters and hidden_units must be positive".to_string(),
            );
        }
        if arch.input_size == 0 || arch.input_size >> arch.depth == 0 {
            return incompatible(format!(
                "input_size {} is too small for {} pooling blocks",
                arch.input_size, arch.depth
            ));
        }

        let pre = &self.preprocessing;
        if pre.policy == ResizePolicy::CenterCrop && (pre.resize as usize) < arch.input_size {
            return incompatible(format!(
                "Resize edge {} is smaller than the input size {}",
                pre.resize, arch.input_size
            ));
        }
        if pre.mean.len() != arch.in_channels || pre.std.len() != arch.in_channels {
            return incompatible(format!(
                "Normalization constants must have {} entries",
                arch.in_channels
            ));
        }
        if pre.std.iter().any(|s| !(*s > 0.0) || !s.is_finite())
            || pre.mean.iter().any(|m| !m.is_finite())
        {
            return incompatible("Normalization constants must be finite with std > 0".to_string());
        }

        Ok(())
    }
}
