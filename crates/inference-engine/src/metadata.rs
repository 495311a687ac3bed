//! Trained model metadata and input scaling

use crate::InferenceError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// File name of the metadata document inside a model directory
pub const METADATA_FILE: &str = "model_metadata.json";

/// Serialized model format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    /// Tree ensemble exported as JSON node arrays
    ForestJson,
    /// ONNX graph with a probability output
    Onnx,
}

/// Mean/scale pairs of a standard scaler fitted on the training split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// `(x - mean) / scale`, with a zero scale treated as 1
    pub fn transform(&self, input: &[f64]) -> Result<Vec<f64>, InferenceError> {
        if input.len() != self.mean.len() {
            return Err(InferenceError::InvalidInputShape {
                expected: self.mean.len(),
                actual: input.len(),
            });
        }
        Ok(input
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| {
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect())
    }
}

/// Description of a trained model as written by the training job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_type: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Input feature names, in training order
    pub features: Vec<String>,
    /// Health ordinal of each model output column
    pub classes: Vec<u8>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    pub scaler: StandardScaler,
    pub format: ModelFormat,
    /// Model file, relative to the metadata file
    pub model_file: String,
}

impl ModelMetadata {
    /// Read `model_metadata.json` from a model directory
    pub fn load(dir: &Path) -> Result<Self, InferenceError> {
        let raw = std::fs::read_to_string(dir.join(METADATA_FILE))?;
        let metadata: ModelMetadata = serde_json::from_str(&raw)?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Structural checks that do not need the model file
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.features.is_empty() {
            return Err(InferenceError::InvalidMetadata("empty feature list".to_string()));
        }
        if self.scaler.mean.len() != self.features.len()
            || self.scaler.scale.len() != self.features.len()
        {
            return Err(InferenceError::InvalidMetadata(format!(
                "scaler has {} means and {} scales for {} features",
                self.scaler.mean.len(),
                self.scaler.scale.len(),
                self.features.len()
            )));
        }
        if self.classes.is_empty() || self.classes.iter().any(|c| *c > 3) {
            return Err(InferenceError::InvalidMetadata(format!(
                "classes must be health ordinals 0-3, got {:?}",
                self.classes
            )));
        }
        let unique: HashSet<u8> = self.classes.iter().copied().collect();
        if unique.len() != self.classes.len() {
            return Err(InferenceError::InvalidMetadata("duplicate class".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ModelMetadata {
        ModelMetadata {
            model_type: "RandomForestClassifier".to_string(),
            version: None,
            features: vec!["rpm".to_string(), "coolant_temp".to_string()],
            classes: vec![0, 1, 2, 3],
            accuracy: Some(0.97),
            scaler: StandardScaler {
                mean: vec![1500.0, 90.0],
                scale: vec![500.0, 0.0],
            },
            format: ModelFormat::ForestJson,
            model_file: "forest.json".to_string(),
        }
    }

    #[test]
    fn test_scaler_transform() {
        let m = metadata();
        let scaled = m.scaler.transform(&[2000.0, 95.0]).unwrap();
        assert!((scaled[0] - 1.0).abs() < 1e-12);
        // zero scale passes the centred value through
        assert!((scaled[1] - 5.0).abs() < 1e-12);
        assert!(m.scaler.transform(&[1.0]).is_err());
    }

    #[test]
    fn test_validation() {
        assert!(metadata().validate().is_ok());

        let mut m = metadata();
        m.scaler.mean.pop();
        assert!(m.validate().is_err());

        let mut m = metadata();
        m.classes = vec![0, 4];
        assert!(m.validate().is_err());

        let mut m = metadata();
        m.classes = vec![1, 1];
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_format_names() {
        let json = serde_json::to_string(&ModelFormat::ForestJson).unwrap();
        assert_eq!(json, "\"forest_json\"");
    }
}
