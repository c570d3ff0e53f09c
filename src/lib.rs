//! # PlantVillage Inference Server
//!
//! HTTP service that classifies leaf images with a CNN trained on PlantVillage.
//! A client uploads one JPEG or PNG image and receives a ranked list of
//! `(label, score)` predictions.
//!
//! ## Modules
//!
//! - `model`: CNN architecture, artifact manifest and the one-time model store
//! - `preprocess`: decoding, resize/crop and normalization of uploads
//! - `inference`: bounded worker pool running forward passes
//! - `server`: axum router, upload handling and error mapping
//! - `storage`: optional archive of accepted uploads
//! - `config`: server configuration
//! - `utils`: logging and the error type
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plantvillage_serve::{server, ServerConfig};
//!
//! let mut config = ServerConfig::default();
//! config.model_path = "model/model.json".into();
//! server::run(config).await?;
//! ```

pub mod backend;
pub mod config;
pub mod inference;
pub mod model;
pub mod preprocess;
pub mod server;
pub mod storage;
pub mod utils;

pub use config::ServerConfig;
pub use inference::{EngineConfig, InferenceEngine, Prediction, PredictionResult};
pub use model::{ModelArtifact, ModelManifest, ModelStore, PlantClassifierConfig};
pub use preprocess::{ImageTensor, Preprocessor, UploadFormat};
pub use server::{build_router, AppState, SharedState};
pub use storage::UploadArchive;
pub use utils::error::{Result, ServeError};
