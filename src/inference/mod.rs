//! Inference module
//!
//! This module provides:
//! - Ranked prediction results with deterministic tie-breaking
//! - A bounded worker pool that runs forward passes off the async runtime

pub mod engine;
pub mod prediction;

pub use engine::{EngineConfig, EngineStats, InferenceEngine};
pub use prediction::{Prediction, PredictionResult};
