//! Trained-model health classification

use crate::classifier::HealthClassifier;
use crate::features::FeatureKey;
use crate::forest::{ProbabilityModel, TreeEnsemble};
use crate::health::{Classification, ClassifierKind, HealthState};
use crate::metadata::{ModelFormat, ModelMetadata};
use crate::onnx::OnnxModel;
use crate::rules::{RuleEngine, RuleEvaluation, MAX_STRESS_SCORE};
use crate::InferenceError;
use feature_engine::DerivedFeatures;
use obd_protocol::Reading;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Classifier backed by a trained model.
///
/// Hard rule thresholds still force CRITICAL and are never downgraded by
/// the model. If inference fails, the reading is classified by the rule
/// engine and the degradation is logged once per session.
pub struct TrainedModelClassifier {
    metadata: ModelMetadata,
    keys: Vec<FeatureKey>,
    model: Box<dyn ProbabilityModel>,
    rules: RuleEngine,
    degraded: AtomicBool,
}

impl TrainedModelClassifier {
    /// Load `model_metadata.json` and the model file it names from `dir`
    pub fn load(dir: &Path, rules: RuleEngine) -> Result<Self, InferenceError> {
        let metadata = ModelMetadata::load(dir)?;
        let keys = metadata
            .features
            .iter()
            .map(|name| FeatureKey::from_name(name))
            .collect::<Result<Vec<_>, _>>()?;

        let model_path = dir.join(&metadata.model_file);
        let model: Box<dyn ProbabilityModel> = match metadata.format {
            ModelFormat::ForestJson => {
                let ensemble = TreeEnsemble::load(&model_path, keys.len())?;
                if ensemble.n_classes != metadata.classes.len() {
                    return Err(InferenceError::InvalidMetadata(format!(
                        "model has {} classes, metadata lists {}",
                        ensemble.n_classes,
                        metadata.classes.len()
                    )));
                }
                Box::new(ensemble)
            }
            ModelFormat::Onnx => Box::new(OnnxModel::load(&model_path, keys.len())?),
        };

        info!(
            "Loaded {} model {} ({} features, accuracy {})",
            metadata.model_type,
            metadata.version.as_deref().unwrap_or("unversioned"),
            keys.len(),
            metadata
                .accuracy
                .map(|a| format!("{:.3}", a))
                .unwrap_or_else(|| "unknown".to_string())
        );

        Ok(Self::from_parts(metadata, keys, model, rules))
    }

    /// Assemble from an already-loaded model
    pub fn from_parts(
        metadata: ModelMetadata,
        keys: Vec<FeatureKey>,
        model: Box<dyn ProbabilityModel>,
        rules: RuleEngine,
    ) -> Self {
        Self {
            metadata,
            keys,
            model,
            rules,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Feature vector in training column order, before scaling
    pub fn feature_vector(&self, reading: &Reading, features: &DerivedFeatures, stress: f64) -> Vec<f64> {
        self.keys
            .iter()
            .map(|key| key.extract(reading, features, stress))
            .collect()
    }

    fn predict(
        &self,
        reading: &Reading,
        features: &DerivedFeatures,
        evaluation: &RuleEvaluation,
    ) -> Result<[f64; 4], InferenceError> {
        let raw = self.feature_vector(reading, features, evaluation.stress_score());
        let scaled = self.metadata.scaler.transform(&raw)?;
        let output = self.model.predict_proba(&scaled)?;
        if output.len() != self.metadata.classes.len() {
            return Err(InferenceError::InvalidInputShape {
                expected: self.metadata.classes.len(),
                actual: output.len(),
            });
        }
        let mut probabilities = [0.0; 4];
        for (class, p) in self.metadata.classes.iter().zip(output) {
            if !p.is_finite() {
                return Err(InferenceError::InferenceFailed(format!(
                    "non-finite probability for class {}",
                    class
                )));
            }
            probabilities[*class as usize] = p;
        }
        Ok(probabilities)
    }
}

impl HealthClassifier for TrainedModelClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::TrainedModel
    }

    fn classify(&self, reading: &Reading, features: &DerivedFeatures) -> Classification {
        let evaluation = self.rules.evaluate(reading);
        if evaluation.critical.is_some() {
            return self.rules.classification(evaluation);
        }

        let probabilities = match self.predict(reading, features, &evaluation) {
            Ok(p) => p,
            Err(e) => {
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    warn!("Model inference failed ({}), using rule engine for this session", e);
                }
                return self.rules.classification(evaluation);
            }
        };

        let (best, confidence) = probabilities
            .iter()
            .enumerate()
            .fold((0usize, f64::MIN), |acc, (i, p)| if *p > acc.1 { (i, *p) } else { acc });
        let state = HealthState::from_ordinal(best as u8).unwrap_or(HealthState::Normal);
        let expected_severity: f64 = probabilities
            .iter()
            .enumerate()
            .map(|(i, p)| p * i as f64)
            .sum();
        let stress_score = (expected_severity * MAX_STRESS_SCORE / 3.0).clamp(0.0, MAX_STRESS_SCORE);

        debug!("Model: {} ({:.1}% confident)", state, confidence * 100.0);
        Classification {
            state,
            stress_score,
            confidence: confidence * 100.0,
            probabilities: Some(probabilities),
            top_factors: evaluation.factors,
            source: ClassifierKind::TrainedModel,
        }
    }

    fn begin_session(&self) {
        self.degraded.store(false, Ordering::Relaxed);
    }
}
