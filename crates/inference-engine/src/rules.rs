//! Rule-Based Health Scoring
//!
//! Hard thresholds short-circuit to CRITICAL. Otherwise independent factors
//! add integer points to a stress score, and the total picks the state.
//! A missing field never adds points.

use crate::classifier::HealthClassifier;
use crate::health::{Classification, ClassifierKind, HealthState};
use feature_engine::DerivedFeatures;
use obd_protocol::Reading;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Stress score reported for a hard-threshold CRITICAL
pub const MAX_STRESS_SCORE: f64 = 15.0;

/// Nominal narrowband O2 sensor voltage
const O2_BASELINE_V: f64 = 0.45;

/// Rule engine thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEngineConfig {
    /// Coolant above this is CRITICAL (°C)
    pub critical_coolant_temp: f64,
    /// Control module voltage below this is CRITICAL (V)
    pub critical_low_voltage: f64,
    /// More stored DTCs than this is CRITICAL
    pub critical_dtc_count: u32,
    /// Catalyst above this is CRITICAL (°C)
    pub critical_catalyst_temp: f64,
    /// Engine load above this is CRITICAL (%)
    pub critical_engine_load: f64,
    /// Minimum score for WARNING
    pub warning_score: u32,
    /// Minimum score for ADVISORY
    pub advisory_score: u32,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            critical_coolant_temp: 110.0,
            critical_low_voltage: 11.0,
            critical_dtc_count: 10,
            critical_catalyst_temp: 900.0,
            critical_engine_load: 95.0,
            warning_score: 6,
            advisory_score: 3,
        }
    }
}

/// Outcome of applying the rules to one reading
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluation {
    /// First hard threshold that fired, if any
    pub critical: Option<String>,
    /// Weighted factor sum (0 when a hard threshold fired)
    pub score: u32,
    /// Contributing factors, in evaluation order
    pub factors: Vec<String>,
}

impl RuleEvaluation {
    /// Factor sum, or the maximum when a hard threshold fired
    pub fn stress_score(&self) -> f64 {
        if self.critical.is_some() {
            MAX_STRESS_SCORE
        } else {
            self.score as f64
        }
    }
}

/// Deterministic multi-factor classifier
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    config: RuleEngineConfig,
}

impl RuleEngine {
    pub fn new(config: RuleEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuleEngineConfig {
        &self.config
    }

    fn hard_threshold(&self, reading: &Reading) -> Option<String> {
        let cfg = &self.config;
        if let Some(t) = reading.coolant_temp.filter(|t| *t > cfg.critical_coolant_temp) {
            return Some(format!("coolant_temp {:.1}°C > {}", t, cfg.critical_coolant_temp));
        }
        if let Some(v) = reading
            .control_module_voltage
            .filter(|v| *v < cfg.critical_low_voltage)
        {
            return Some(format!("control_module_voltage {:.2}V < {}", v, cfg.critical_low_voltage));
        }
        if let Some(n) = reading.dtc_count.filter(|n| *n > cfg.critical_dtc_count) {
            return Some(format!("dtc_count {} > {}", n, cfg.critical_dtc_count));
        }
        if let Some(t) = reading
            .catalyst_temp_b1s1
            .filter(|t| *t > cfg.critical_catalyst_temp)
        {
            return Some(format!("catalyst_temp {:.0}°C > {}", t, cfg.critical_catalyst_temp));
        }
        if let Some(l) = reading.engine_load.filter(|l| *l > cfg.critical_engine_load) {
            return Some(format!("engine_load {:.1}% > {}", l, cfg.critical_engine_load));
        }
        None
    }

    /// Apply the rules without choosing a state
    pub fn evaluate(&self, reading: &Reading) -> RuleEvaluation {
        if let Some(reason) = self.hard_threshold(reading) {
            return RuleEvaluation {
                factors: vec![format!("{} (critical)", reason)],
                critical: Some(reason),
                score: 0,
            };
        }

        let mut score = 0u32;
        let mut factors = Vec::new();
        let mut add = |points: u32, factor: String| {
            score += points;
            factors.push(format!("{} (+{})", factor, points));
        };

        if let Some(load) = reading.engine_load {
            if load > 85.0 {
                add(3, format!("engine_load {:.1}% > 85", load));
            } else if load > 70.0 {
                add(2, format!("engine_load {:.1}% > 70", load));
            } else if load > 50.0 {
                add(1, format!("engine_load {:.1}% > 50", load));
            }
        }

        if let Some(rpm) = reading.rpm {
            let light_load = reading.engine_load.map(|l| l < 30.0).unwrap_or(false);
            if rpm > 3500.0 && light_load {
                add(2, format!("rpm {:.0} > 3500 at light load", rpm));
            } else if rpm > 4500.0 {
                add(2, format!("rpm {:.0} > 4500", rpm));
            }
        }

        if let Some(temp) = reading.coolant_temp {
            if temp > 105.0 {
                add(3, format!("coolant_temp {:.1}°C > 105", temp));
            } else if temp > 100.0 {
                add(2, format!("coolant_temp {:.1}°C > 100", temp));
            } else if temp > 95.0 {
                add(1, format!("coolant_temp {:.1}°C > 95", temp));
            }
        }

        if let Some(volts) = reading.control_module_voltage {
            if volts < 12.0 {
                add(2, format!("voltage {:.2}V < 12 (undercharge)", volts));
            } else if volts < 13.0 {
                add(1, format!("voltage {:.2}V < 13", volts));
            } else if volts > 15.0 {
                add(2, format!("voltage {:.2}V > 15 (overcharge)", volts));
            }
        }

        // worst bank wins
        let worst = |a: Option<f64>, b: Option<f64>| a.unwrap_or(0.0).abs().max(b.unwrap_or(0.0).abs());
        let short = worst(reading.short_fuel_trim_1, reading.short_fuel_trim_2);
        let long = worst(reading.long_fuel_trim_1, reading.long_fuel_trim_2);
        if short > 20.0 || long > 15.0 {
            add(2, format!("fuel trims short {:.1}% long {:.1}%", short, long));
        } else if short > 10.0 || long > 8.0 {
            add(1, format!("fuel trims short {:.1}% long {:.1}%", short, long));
        }

        if let Some(o2) = reading.o2_b1s1 {
            if (o2 - O2_BASELINE_V).abs() > 0.3 {
                add(1, format!("o2_b1s1 {:.3}V off baseline", o2));
            }
        }

        if let Some(dtc) = reading.dtc_count {
            if dtc >= 3 {
                add(2, format!("{} stored DTCs", dtc));
            } else if dtc >= 1 {
                add(1, format!("{} stored DTC", dtc));
            }
        }

        if reading.mil_on == Some(true) {
            add(2, "MIL on".to_string());
        }
        if let Some(km) = reading.distance_w_mil.filter(|km| *km > 50.0) {
            add(1, format!("{:.0} km driven with MIL", km));
        }

        RuleEvaluation {
            critical: None,
            score,
            factors,
        }
    }

    /// State for a weighted score
    pub fn state_for_score(&self, score: u32) -> HealthState {
        if score >= self.config.warning_score {
            HealthState::Warning
        } else if score >= self.config.advisory_score {
            HealthState::Advisory
        } else {
            HealthState::Normal
        }
    }

    /// Turn an evaluation into a classification
    pub fn classification(&self, evaluation: RuleEvaluation) -> Classification {
        let state = if evaluation.critical.is_some() {
            HealthState::Critical
        } else {
            self.state_for_score(evaluation.score)
        };
        debug!(
            "Rule engine: {} (score {}, {} factors)",
            state,
            evaluation.stress_score(),
            evaluation.factors.len()
        );
        Classification {
            state,
            stress_score: evaluation.stress_score(),
            // rules are deterministic
            confidence: 100.0,
            probabilities: None,
            top_factors: evaluation.factors,
            source: ClassifierKind::RuleEngine,
        }
    }
}

impl HealthClassifier for RuleEngine {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::RuleEngine
    }

    fn classify(&self, reading: &Reading, _features: &DerivedFeatures) -> Classification {
        self.classification(self.evaluate(reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use feature_engine::FeatureEngineer;
    use proptest::prelude::*;

    fn nominal() -> Reading {
        let mut r = Reading::new("rules", Utc::now());
        r.rpm = Some(900.0);
        r.speed = Some(40.0);
        r.coolant_temp = Some(88.0);
        r.engine_load = Some(30.0);
        r.throttle_pos = Some(15.0);
        r.control_module_voltage = Some(14.1);
        r.dtc_count = Some(0);
        r.mil_on = Some(false);
        r
    }

    fn classify(r: &Reading) -> Classification {
        let engineer = FeatureEngineer::default();
        let features = engineer.compute(r, &engineer.new_state());
        RuleEngine::default().classify(r, &features)
    }

    #[test]
    fn test_idle_scenario_is_normal() {
        let mut r = nominal();
        r.rpm = Some(1028.0);
        r.speed = Some(0.0);
        r.coolant_temp = Some(96.0);
        r.engine_load = Some(50.6);
        r.throttle_pos = Some(18.8);

        let c = classify(&r);
        // load > 50 and coolant > 95, one point each
        assert_eq!(c.stress_score, 2.0);
        assert_eq!(c.state, HealthState::Normal);
        assert_eq!(c.top_factors.len(), 2);
        assert_eq!(c.source, ClassifierKind::RuleEngine);
    }

    #[test]
    fn test_overheating_is_critical() {
        let mut r = nominal();
        r.coolant_temp = Some(115.0);
        let c = classify(&r);
        assert_eq!(c.state, HealthState::Critical);
        assert_eq!(c.stress_score, MAX_STRESS_SCORE);
        assert_eq!(c.confidence, 100.0);
        assert!(c.top_factors[0].contains("coolant_temp"));
    }

    #[test]
    fn test_each_hard_threshold() {
        let cases: Vec<Box<dyn Fn(&mut Reading)>> = vec![
            Box::new(|r| r.control_module_voltage = Some(10.5)),
            Box::new(|r| r.dtc_count = Some(11)),
            Box::new(|r| r.catalyst_temp_b1s1 = Some(950.0)),
            Box::new(|r| r.engine_load = Some(96.0)),
        ];
        for set in cases {
            let mut r = nominal();
            set(&mut r);
            assert_eq!(classify(&r).state, HealthState::Critical);
        }
    }

    #[test]
    fn test_missing_voltage_is_not_critical() {
        let mut r = nominal();
        r.control_module_voltage = None;
        assert_eq!(classify(&r).state, HealthState::Normal);
    }

    #[test]
    fn test_advisory_band() {
        let mut r = nominal();
        r.coolant_temp = Some(103.0); // +2
        r.dtc_count = Some(1); // +1
        let c = classify(&r);
        assert_eq!(c.stress_score, 3.0);
        assert_eq!(c.state, HealthState::Advisory);
    }

    #[test]
    fn test_warning_band() {
        let mut r = nominal();
        r.mil_on = Some(true); // +2
        r.dtc_count = Some(4); // +2
        r.control_module_voltage = Some(11.8); // +2
        r.distance_w_mil = Some(120.0); // +1
        let c = classify(&r);
        assert_eq!(c.stress_score, 7.0);
        assert_eq!(c.state, HealthState::Warning);
    }

    #[test]
    fn test_rpm_load_mismatch() {
        let engine = RuleEngine::default();
        let mut r = nominal();
        r.rpm = Some(3800.0);
        r.engine_load = Some(20.0);
        assert_eq!(engine.evaluate(&r).score, 2);

        r.engine_load = Some(40.0);
        assert_eq!(engine.evaluate(&r).score, 0);

        r.rpm = Some(4700.0);
        assert_eq!(engine.evaluate(&r).score, 2);
    }

    #[test]
    fn test_fuel_trim_and_o2() {
        let engine = RuleEngine::default();
        let mut r = nominal();
        r.short_fuel_trim_1 = Some(-22.0);
        assert_eq!(engine.evaluate(&r).score, 2);

        r.short_fuel_trim_1 = Some(3.0);
        r.long_fuel_trim_2 = Some(9.0);
        assert_eq!(engine.evaluate(&r).score, 1);

        r.long_fuel_trim_2 = None;
        r.o2_b1s1 = Some(0.9);
        assert_eq!(engine.evaluate(&r).score, 1);
    }

    #[test]
    fn test_empty_reading_is_normal() {
        let r = Reading::new("empty", Utc::now());
        let c = classify(&r);
        assert_eq!(c.state, HealthState::Normal);
        assert_eq!(c.stress_score, 0.0);
    }

    /// Readings that stay below every hard threshold
    fn arb_reading() -> impl Strategy<Value = Reading> {
        (
            (
                proptest::option::of(0.0f64..8000.0),
                proptest::option::of(-40.0f64..110.0),
                proptest::option::of(0.0f64..95.0),
                proptest::option::of(11.0f64..20.0),
                proptest::option::of(0u32..=10),
                proptest::option::of(any::<bool>()),
            ),
            (
                proptest::option::of(-50.0f64..50.0),
                proptest::option::of(-50.0f64..50.0),
                proptest::option::of(0.0f64..1.2),
                proptest::option::of(0.0f64..900.0),
                proptest::option::of(0.0f64..500.0),
            ),
        )
            .prop_map(|((rpm, coolant, load, volts, dtc, mil), (stft, ltft, o2, cat, dist))| {
                let mut r = Reading::new("prop", Utc::now());
                r.rpm = rpm;
                r.coolant_temp = coolant;
                r.engine_load = load;
                r.control_module_voltage = volts;
                r.dtc_count = dtc;
                r.mil_on = mil;
                r.short_fuel_trim_1 = stft;
                r.long_fuel_trim_1 = ltft;
                r.o2_b1s1 = o2;
                r.catalyst_temp_b1s1 = cat;
                r.distance_w_mil = dist;
                r
            })
    }

    proptest! {
        #[test]
        fn prop_hot_coolant_is_always_critical(mut reading in arb_reading(), temp in 110.001f64..215.0) {
            reading.coolant_temp = Some(temp);
            prop_assert_eq!(classify(&reading).state, HealthState::Critical);
        }

        #[test]
        fn prop_higher_score_never_less_severe(a in arb_reading(), b in arb_reading()) {
            let engine = RuleEngine::default();
            let (ea, eb) = (engine.evaluate(&a), engine.evaluate(&b));
            prop_assert!(ea.critical.is_none() && eb.critical.is_none());
            prop_assume!(ea.score > eb.score);
            let (ca, cb) = (engine.classification(ea), engine.classification(eb));
            prop_assert!(ca.state >= cb.state);
        }

        #[test]
        fn prop_any_reading_classifies(reading in arb_reading()) {
            let c = classify(&reading);
            prop_assert!(c.state < HealthState::Critical);
            prop_assert!(c.stress_score >= 0.0);
            prop_assert_eq!(c.confidence, 100.0);
        }
    }
}
