//! Derived Feature Computation

use crate::config::FeatureConfig;
use crate::state::SessionFeatureState;
use crate::statistics::StatisticalFeatures;
use obd_protocol::Reading;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Samples needed before the temperature and load trends are reported
const TREND_WINDOW: usize = 5;
/// Samples needed before RPM stability is reported
const STABILITY_WINDOW: usize = 10;
/// RPM variance that maps to zero stability
const RPM_VARIANCE_SCALE: f64 = 1_000_000.0;

/// Features computed from a reading, never sampled.
///
/// Ratios default to 0 when their divisor is missing or zero. Values whose
/// zero would be misleading (`temp_gradient`, `fuel_efficiency` and the
/// window measures) are `None` instead. Flags are false when their input
/// is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeatures {
    /// engine_load / rpm * 1000
    pub load_rpm_ratio: f64,
    /// Coolant change in °C per minute since the previous sample
    pub temp_gradient: Option<f64>,
    /// Consumption proxy in L/100km
    pub fuel_efficiency: Option<f64>,
    pub high_rpm: bool,
    pub low_speed: bool,
    pub high_throttle: bool,
    /// Control module voltage inside the healthy band
    pub voltage_health: bool,
    /// rpm / engine_load
    pub rpm_load_ratio: f64,
    /// engine_load / coolant_temp
    pub temp_efficiency: f64,
    /// speed / throttle_pos
    pub speed_throttle_ratio: f64,
    /// 0.3 * high_rpm + 0.3 * high_throttle + 0.4 * thermal stress
    pub stress_indicator: f64,
    /// 1 / (1 + |temperature drift per sample|) over the recent window
    pub temp_stability: Option<f64>,
    /// 1 - rpm variance / 1e6 over the recent window, floored at 0
    pub rpm_stability: Option<f64>,
    /// Engine load drift per sample over the recent window
    pub load_trend: Option<f64>,
}

/// Computes [`DerivedFeatures`] for readings of one session
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer {
    config: FeatureConfig,
}

fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> f64 {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0.0 => n / d,
        _ => 0.0,
    }
}

fn recent(window: &ring_buffer::RingBuffer<f64>, count: usize) -> Option<StatisticalFeatures> {
    if window.len() < count {
        return None;
    }
    let mut values = window.read_last(count);
    values.reverse();
    Some(StatisticalFeatures::compute(&values))
}

impl FeatureEngineer {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Compute derived features. Does not touch `state`.
    pub fn compute(&self, reading: &Reading, state: &SessionFeatureState) -> DerivedFeatures {
        let cfg = &self.config;

        let load_rpm_ratio = match (reading.engine_load, reading.rpm) {
            (Some(load), Some(rpm)) if rpm > 0.0 => load / rpm * 1000.0,
            _ => 0.0,
        };

        let temp_gradient = match (reading.coolant_temp, state.previous_temp()) {
            (Some(current), Some(previous)) => {
                let elapsed_ms = (reading.timestamp - previous.at).num_milliseconds();
                let elapsed_minutes = elapsed_ms as f64 / 60_000.0;
                (elapsed_minutes > 0.0).then(|| (current - previous.celsius) / elapsed_minutes)
            }
            _ => None,
        };

        let fuel_efficiency = match (reading.maf, reading.speed) {
            (Some(maf), Some(speed)) if speed > 0.0 => {
                let litres_per_second = maf / 1000.0 / cfg.fuel_density;
                Some(litres_per_second / speed * 3600.0 * 100.0)
            }
            _ => None,
        };

        let above = |value: Option<f64>, threshold: f64| value.map(|v| v > threshold).unwrap_or(false);
        let high_rpm = above(reading.rpm, cfg.high_rpm_threshold);
        let high_throttle = above(reading.throttle_pos, cfg.high_throttle_threshold);
        let thermal_stress = above(reading.coolant_temp, cfg.thermal_stress_temp);
        let low_speed = reading
            .speed
            .map(|s| s < cfg.low_speed_threshold)
            .unwrap_or(false);
        let voltage_health = reading
            .control_module_voltage
            .map(|v| (cfg.voltage_min..=cfg.voltage_max).contains(&v))
            .unwrap_or(false);

        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let stress_indicator =
            0.3 * flag(high_rpm) + 0.3 * flag(high_throttle) + 0.4 * flag(thermal_stress);

        let temp_stability =
            recent(state.temp_history(), TREND_WINDOW).map(|s| 1.0 / (1.0 + s.trend.abs()));
        let rpm_stability = recent(state.rpm_history(), STABILITY_WINDOW)
            .map(|s| (1.0 - s.variance / RPM_VARIANCE_SCALE).max(0.0));
        let load_trend = recent(state.load_history(), TREND_WINDOW).map(|s| s.trend);

        let features = DerivedFeatures {
            load_rpm_ratio,
            temp_gradient,
            fuel_efficiency,
            high_rpm,
            low_speed,
            high_throttle,
            voltage_health,
            rpm_load_ratio: ratio(reading.rpm, reading.engine_load),
            temp_efficiency: ratio(reading.engine_load, reading.coolant_temp),
            speed_throttle_ratio: ratio(reading.speed, reading.throttle_pos),
            stress_indicator,
            temp_stability,
            rpm_stability,
            load_trend,
        };
        trace!("Derived features: {:?}", features);
        features
    }

    /// Compute features, then fold the reading into `state`
    pub fn process(&self, reading: &Reading, state: &mut SessionFeatureState) -> DerivedFeatures {
        let features = self.compute(reading, state);
        state.observe(reading);
        features
    }

    /// Fresh state sized for this engineer's windows
    pub fn new_state(&self) -> SessionFeatureState {
        SessionFeatureState::new(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TemperatureSample;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn base_reading() -> Reading {
        let mut r = Reading::new("test", Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        r.rpm = Some(1028.0);
        r.speed = Some(0.0);
        r.coolant_temp = Some(96.0);
        r.engine_load = Some(50.6);
        r.throttle_pos = Some(18.8);
        r.control_module_voltage = Some(14.1);
        r
    }

    #[test]
    fn test_load_rpm_ratio() {
        let engineer = FeatureEngineer::default();
        let f = engineer.compute(&base_reading(), &engineer.new_state());
        assert!((f.load_rpm_ratio - 50.6 / 1028.0 * 1000.0).abs() < 1e-9);

        let mut r = base_reading();
        r.rpm = Some(0.0);
        assert_eq!(engineer.compute(&r, &engineer.new_state()).load_rpm_ratio, 0.0);
    }

    #[test]
    fn test_gradient_null_on_first_reading() {
        let engineer = FeatureEngineer::default();
        let mut state = engineer.new_state();
        let first = engineer.process(&base_reading(), &mut state);
        assert_eq!(first.temp_gradient, None);
    }

    #[test]
    fn test_gradient_five_degrees_per_minute() {
        let engineer = FeatureEngineer::default();
        let mut state = engineer.new_state();

        let first = base_reading();
        engineer.process(&first, &mut state);

        let mut second = base_reading();
        second.timestamp = first.timestamp + Duration::minutes(1);
        second.coolant_temp = Some(101.0);
        let f = engineer.process(&second, &mut state);
        assert!((f.temp_gradient.unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_gradient_null_without_elapsed_time() {
        let engineer = FeatureEngineer::default();
        let r = base_reading();
        let state = engineer.new_state().with_previous_temp(TemperatureSample {
            celsius: 90.0,
            at: r.timestamp,
        });
        assert_eq!(engineer.compute(&r, &state).temp_gradient, None);
    }

    #[test]
    fn test_fuel_efficiency() {
        let engineer = FeatureEngineer::default();
        let mut r = base_reading();
        // stationary: no estimate rather than zero consumption
        r.maf = Some(5.0);
        assert_eq!(engineer.compute(&r, &engineer.new_state()).fuel_efficiency, None);

        r.speed = Some(60.0);
        let expected = 5.0 / 1000.0 / 0.75 / 60.0 * 3600.0 * 100.0;
        let f = engineer.compute(&r, &engineer.new_state());
        assert!((f.fuel_efficiency.unwrap() - expected).abs() < 1e-9);

        r.maf = None;
        assert_eq!(engineer.compute(&r, &engineer.new_state()).fuel_efficiency, None);
    }

    #[test]
    fn test_stress_flags() {
        let engineer = FeatureEngineer::default();
        let f = engineer.compute(&base_reading(), &engineer.new_state());
        assert!(!f.high_rpm);
        assert!(f.low_speed);
        assert!(!f.high_throttle);
        assert!(f.voltage_health);
        // coolant 96 counts as thermal stress
        assert!((f.stress_indicator - 0.4).abs() < 1e-9);

        let mut r = base_reading();
        r.rpm = Some(3200.0);
        r.throttle_pos = Some(75.0);
        r.control_module_voltage = Some(15.0);
        let f = engineer.compute(&r, &engineer.new_state());
        assert!(f.high_rpm && f.high_throttle && !f.voltage_health);
        assert!((f.stress_indicator - 1.0).abs() < 1e-9);

        let strict = FeatureEngineer::new(FeatureConfig::with_high_rpm_threshold(4000.0));
        assert!(!strict.compute(&r, &strict.new_state()).high_rpm);
    }

    #[test]
    fn test_window_features_need_history() {
        let engineer = FeatureEngineer::default();
        let mut state = engineer.new_state();
        let mut last = None;
        for i in 0..10 {
            let mut r = base_reading();
            r.timestamp = r.timestamp + Duration::seconds(i);
            r.rpm = Some(1000.0 + i as f64 * 10.0);
            last = Some(engineer.process(&r, &mut state));
            if i < 4 {
                assert_eq!(last.as_ref().unwrap().temp_stability, None);
            }
        }
        let f = last.unwrap();
        // stability reflects the nine readings observed before the tenth
        assert_eq!(f.rpm_stability, None);
        assert_eq!(f.temp_stability, Some(1.0));
        assert_eq!(f.load_trend, Some(0.0));

        let f = engineer.compute(&base_reading(), &state);
        let stability = f.rpm_stability.unwrap();
        assert!(stability > 0.99 && stability <= 1.0);
    }

    #[test]
    fn test_empty_reading_degrades_to_defaults() {
        let engineer = FeatureEngineer::default();
        let r = Reading::new("empty", Utc::now());
        let f = engineer.compute(&r, &engineer.new_state());
        assert_eq!(f.load_rpm_ratio, 0.0);
        assert_eq!(f.temp_gradient, None);
        assert_eq!(f.fuel_efficiency, None);
        assert!(!f.high_rpm && !f.low_speed && !f.high_throttle && !f.voltage_health);
        assert_eq!(f.stress_indicator, 0.0);
    }

    fn arb_reading() -> impl Strategy<Value = Reading> {
        (
            proptest::option::of(0.0f64..8000.0),
            proptest::option::of(0.0f64..250.0),
            proptest::option::of(-40.0f64..215.0),
            proptest::option::of(0.0f64..100.0),
            proptest::option::of(0.0f64..100.0),
            proptest::option::of(0.0f64..18.0),
            proptest::option::of(0.0f64..300.0),
            0i64..600,
        )
            .prop_map(|(rpm, speed, coolant, load, throttle, volts, maf, offset)| {
                let mut r = Reading::new(
                    "prop",
                    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(offset),
                );
                r.rpm = rpm;
                r.speed = speed;
                r.coolant_temp = coolant;
                r.engine_load = load;
                r.throttle_pos = throttle;
                r.control_module_voltage = volts;
                r.maf = maf;
                r
            })
    }

    proptest! {
        #[test]
        fn prop_compute_is_idempotent(first in arb_reading(), second in arb_reading()) {
            let engineer = FeatureEngineer::default();
            let mut state = engineer.new_state();
            state.observe(&first);
            let a = engineer.compute(&second, &state);
            let b = engineer.compute(&second, &state);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_missing_fields_never_panic(reading in arb_reading()) {
            let engineer = FeatureEngineer::default();
            let f = engineer.compute(&reading, &engineer.new_state());
            prop_assert!(f.load_rpm_ratio.is_finite());
            prop_assert!(f.fuel_efficiency.map(f64::is_finite).unwrap_or(true));
            prop_assert!((0.0..=1.0).contains(&f.stress_indicator));
        }
    }
}
