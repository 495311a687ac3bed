//! Vehicle Health Classification
//!
//! Maps a reading and its derived features to one of four ordinal health
//! states. Two strategies sit behind [`HealthClassifier`]:
//!
//! - [`RuleEngine`]: deterministic weighted scoring with hard CRITICAL
//!   thresholds. Used when no model is available and as the training labeler.
//! - [`TrainedModelClassifier`]: a tree ensemble (JSON export) or ONNX
//!   model fed the same scaled feature vector it was trained on.
//!
//! [`load_classifier`] picks one at startup and falls back to the rule
//! engine when model artifacts cannot be loaded.

mod classifier;
mod engine;
mod features;
mod forest;
mod health;
mod metadata;
mod onnx;
mod rules;

pub use classifier::{load_classifier, HealthClassifier};
pub use engine::TrainedModelClassifier;
pub use features::FeatureKey;
pub use forest::{DecisionTree, ProbabilityModel, TreeEnsemble};
pub use health::{Classification, ClassifierKind, HealthState};
pub use metadata::{ModelFormat, ModelMetadata, StandardScaler, METADATA_FILE};
pub use onnx::OnnxModel;
pub use rules::{RuleEngine, RuleEngineConfig, RuleEvaluation};

use thiserror::Error;

/// Errors while loading or running a trained model
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Invalid model metadata: {0}")]
    InvalidMetadata(String),
    #[error("Unknown feature in model metadata: {0}")]
    UnknownFeature(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: usize, actual: usize },
}

impl From<std::io::Error> for InferenceError {
    fn from(err: std::io::Error) -> Self {
        InferenceError::ModelLoadError(err.to_string())
    }
}

impl From<serde_json::Error> for InferenceError {
    fn from(err: serde_json::Error) -> Self {
        InferenceError::InvalidMetadata(err.to_string())
    }
}
