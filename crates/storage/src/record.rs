//! Flat per-reading record
//!
//! This is the produced contract consumed by the API layer and the training
//! exporter. It serializes flat: reading fields and derived features sit at
//! the top level next to the classification and quality columns. Renaming a
//! field requires bumping [`RECORD_SCHEMA_VERSION`].

use crate::training::is_training_eligible;
use data_validator::QualityScore;
use feature_engine::DerivedFeatures;
use inference_engine::{Classification, ClassifierKind, HealthState};
use obd_protocol::Reading;
use serde::{Deserialize, Serialize};

pub const RECORD_SCHEMA_VERSION: u32 = 1;

/// One classified reading, ready for storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub schema_version: u32,
    pub vehicle_id: String,
    #[serde(flatten)]
    pub reading: Reading,
    #[serde(flatten)]
    pub features: DerivedFeatures,
    /// Health ordinal, 0-3
    pub health_status: u8,
    /// Health name, e.g. `WARNING`
    pub health_state: HealthState,
    pub stress_score: f64,
    /// 0-100
    pub confidence: f64,
    #[serde(default)]
    pub probabilities: Option<[f64; 4]>,
    #[serde(default)]
    pub top_factors: Vec<String>,
    pub classifier: ClassifierKind,
    /// 0-100
    pub quality_score: f64,
    /// Below the acceptance threshold; kept for diagnostics only
    pub low_quality: bool,
    pub training_eligible: bool,
}

impl TelemetryRecord {
    pub fn new(
        vehicle_id: impl Into<String>,
        reading: Reading,
        features: DerivedFeatures,
        classification: Classification,
        quality: &QualityScore,
    ) -> Self {
        let training_eligible = is_training_eligible(&reading, quality.accepted);
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            vehicle_id: vehicle_id.into(),
            reading,
            features,
            health_status: classification.state.ordinal(),
            health_state: classification.state,
            stress_score: classification.stress_score,
            confidence: classification.confidence,
            probabilities: classification.probabilities,
            top_factors: classification.top_factors,
            classifier: classification.source,
            quality_score: quality.score,
            low_quality: !quality.accepted,
            training_eligible,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.reading.session_id
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use data_validator::QualityScorer;
    use feature_engine::FeatureEngineer;
    use inference_engine::{HealthClassifier, RuleEngine};
    use std::time::Duration;

    pub(crate) fn sample_record(vehicle_id: &str, coolant: f64) -> TelemetryRecord {
        let mut reading = Reading::new("sess", Utc::now());
        reading.rpm = Some(1028.0);
        reading.speed = Some(0.0);
        reading.coolant_temp = Some(coolant);
        reading.engine_load = Some(50.6);
        reading.throttle_pos = Some(18.8);
        reading.control_module_voltage = Some(14.1);
        reading.dtc_count = Some(0);
        reading.mil_on = Some(false);

        let engineer = FeatureEngineer::default();
        let features = engineer.compute(&reading, &engineer.new_state());
        let classification = RuleEngine::default().classify(&reading, &features);
        let quality = QualityScorer::default().score(&reading, 7, 7, Duration::from_millis(900));
        TelemetryRecord::new(vehicle_id, reading, features, classification, &quality)
    }

    #[test]
    fn test_record_is_flat() {
        let record = sample_record("veh-1", 96.0);
        let json = serde_json::to_value(&record).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj["schema_version"], 1);
        assert_eq!(obj["rpm"], 1028.0);
        assert_eq!(obj["session_id"], "sess");
        assert!(obj.contains_key("load_rpm_ratio"));
        assert_eq!(obj["temp_gradient"], serde_json::Value::Null);
        assert_eq!(obj["health_status"], 0);
        assert_eq!(obj["health_state"], "NORMAL");
        assert_eq!(obj["classifier"], "rule_engine");
        assert!(obj["quality_score"].as_f64().unwrap() > 30.0);
    }

    #[test]
    fn test_record_reads_back() {
        let record = sample_record("veh-1", 115.0);
        let json = serde_json::to_string(&record).unwrap();
        let back: TelemetryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.health_state, HealthState::Critical);
        assert_eq!(back.health_status, 3);
        assert_eq!(back.reading.coolant_temp, Some(115.0));
    }
}
