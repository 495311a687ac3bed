//! Classifier interface and startup selection

use crate::engine::TrainedModelClassifier;
use crate::health::{Classification, ClassifierKind};
use crate::rules::RuleEngine;
use feature_engine::DerivedFeatures;
use obd_protocol::Reading;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Produces a health classification for every reading.
///
/// `classify` is infallible: implementations degrade internally rather
/// than fail the pipeline.
pub trait HealthClassifier: Send + Sync {
    fn kind(&self) -> ClassifierKind;

    fn classify(&self, reading: &Reading, features: &DerivedFeatures) -> Classification;

    /// Called when a new collection session starts
    fn begin_session(&self) {}
}

/// Pick the classifier for this process.
///
/// With a model directory, the trained model is loaded; any load failure
/// is logged and the rule engine is used instead.
pub fn load_classifier(model_dir: Option<&Path>, rules: RuleEngine) -> Arc<dyn HealthClassifier> {
    let Some(dir) = model_dir else {
        info!("No model directory configured, classifying with the rule engine");
        return Arc::new(rules);
    };

    match TrainedModelClassifier::load(dir, rules.clone()) {
        Ok(model) => {
            info!("Trained health model loaded from {}", dir.display());
            Arc::new(model)
        }
        Err(e) => {
            warn!(
                "Trained model unavailable ({}), falling back to the rule engine",
                e
            );
            Arc::new(rules)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_model_dir_uses_rules() {
        let classifier = load_classifier(None, RuleEngine::default());
        assert_eq!(classifier.kind(), ClassifierKind::RuleEngine);
    }

    #[test]
    fn test_missing_model_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = load_classifier(Some(dir.path()), RuleEngine::default());
        assert_eq!(classifier.kind(), ClassifierKind::RuleEngine);
    }
}
