//! Model input feature names

use crate::InferenceError;
use feature_engine::DerivedFeatures;
use obd_protocol::{Pid, Reading};

/// One column of a trained model's input vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKey {
    /// Raw sensor value
    Sensor(Pid),
    DtcCount,
    MilStatus,
    /// Rule engine factor sum
    EngineStressScore,
    LoadRpmRatio,
    TempGradient,
    FuelEfficiency,
    RpmLoadRatio,
    TempEfficiency,
    SpeedThrottleRatio,
    HighRpm,
    LowSpeed,
    HighThrottle,
    VoltageHealth,
    StressIndicator,
    TempStability,
    RpmStability,
    LoadTrend,
}

impl FeatureKey {
    /// Resolve a column name as written in the model metadata
    pub fn from_name(name: &str) -> Result<Self, InferenceError> {
        let key = match name {
            "dtc_count" => FeatureKey::DtcCount,
            "mil_status" | "mil_on" => FeatureKey::MilStatus,
            "engine_stress_score" => FeatureKey::EngineStressScore,
            "load_rpm_ratio" => FeatureKey::LoadRpmRatio,
            "temp_gradient" => FeatureKey::TempGradient,
            "fuel_efficiency" => FeatureKey::FuelEfficiency,
            "rpm_load_ratio" => FeatureKey::RpmLoadRatio,
            "temp_efficiency" => FeatureKey::TempEfficiency,
            "speed_throttle_ratio" => FeatureKey::SpeedThrottleRatio,
            "high_rpm" => FeatureKey::HighRpm,
            "low_speed" => FeatureKey::LowSpeed,
            "high_throttle" => FeatureKey::HighThrottle,
            "voltage_health" => FeatureKey::VoltageHealth,
            "stress_indicator" => FeatureKey::StressIndicator,
            "temp_stability" => FeatureKey::TempStability,
            "rpm_stability" => FeatureKey::RpmStability,
            "load_trend" => FeatureKey::LoadTrend,
            "vehicle_speed" => FeatureKey::Sensor(Pid::Speed),
            "engine_runtime" => FeatureKey::Sensor(Pid::RunTime),
            "distance_with_mil" => FeatureKey::Sensor(Pid::DistanceWithMil),
            other => {
                let pid = Pid::ALL
                    .into_iter()
                    .filter(|p| !matches!(p, Pid::MonitorStatus | Pid::FuelSystemStatus))
                    .find(|p| p.name() == other)
                    .ok_or_else(|| InferenceError::UnknownFeature(other.to_string()))?;
                FeatureKey::Sensor(pid)
            }
        };
        Ok(key)
    }

    /// Column value; anything missing becomes 0
    pub fn extract(&self, reading: &Reading, features: &DerivedFeatures, stress_score: f64) -> f64 {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            FeatureKey::Sensor(pid) => reading.value(*pid).unwrap_or(0.0),
            FeatureKey::DtcCount => reading.dtc_count.map(f64::from).unwrap_or(0.0),
            FeatureKey::MilStatus => flag(reading.mil_on.unwrap_or(false)),
            FeatureKey::EngineStressScore => stress_score,
            FeatureKey::LoadRpmRatio => features.load_rpm_ratio,
            FeatureKey::TempGradient => features.temp_gradient.unwrap_or(0.0),
            FeatureKey::FuelEfficiency => features.fuel_efficiency.unwrap_or(0.0),
            FeatureKey::RpmLoadRatio => features.rpm_load_ratio,
            FeatureKey::TempEfficiency => features.temp_efficiency,
            FeatureKey::SpeedThrottleRatio => features.speed_throttle_ratio,
            FeatureKey::HighRpm => flag(features.high_rpm),
            FeatureKey::LowSpeed => flag(features.low_speed),
            FeatureKey::HighThrottle => flag(features.high_throttle),
            FeatureKey::VoltageHealth => flag(features.voltage_health),
            FeatureKey::StressIndicator => features.stress_indicator,
            FeatureKey::TempStability => features.temp_stability.unwrap_or(0.0),
            FeatureKey::RpmStability => features.rpm_stability.unwrap_or(0.0),
            FeatureKey::LoadTrend => features.load_trend.unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use feature_engine::FeatureEngineer;

    #[test]
    fn test_names_and_aliases() {
        assert_eq!(FeatureKey::from_name("rpm").unwrap(), FeatureKey::Sensor(Pid::Rpm));
        assert_eq!(
            FeatureKey::from_name("vehicle_speed").unwrap(),
            FeatureKey::Sensor(Pid::Speed)
        );
        assert_eq!(
            FeatureKey::from_name("throttle_pos").unwrap(),
            FeatureKey::Sensor(Pid::ThrottlePosition)
        );
        assert_eq!(
            FeatureKey::from_name("engine_stress_score").unwrap(),
            FeatureKey::EngineStressScore
        );
        assert!(matches!(
            FeatureKey::from_name("tyre_pressure"),
            Err(InferenceError::UnknownFeature(_))
        ));
        // the status PID is exposed through dtc_count/mil_status only
        assert!(FeatureKey::from_name("status").is_err());
    }

    #[test]
    fn test_missing_values_extract_as_zero() {
        let engineer = FeatureEngineer::default();
        let mut reading = Reading::new("s", Utc::now());
        reading.rpm = Some(900.0);
        reading.mil_on = Some(true);
        let features = engineer.compute(&reading, &engineer.new_state());

        let value = |name: &str| {
            FeatureKey::from_name(name)
                .unwrap()
                .extract(&reading, &features, 4.0)
        };
        assert_eq!(value("rpm"), 900.0);
        assert_eq!(value("coolant_temp"), 0.0);
        assert_eq!(value("temp_gradient"), 0.0);
        assert_eq!(value("mil_status"), 1.0);
        assert_eq!(value("engine_stress_score"), 4.0);
    }
}
