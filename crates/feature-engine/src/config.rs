//! Feature engine configuration

use serde::{Deserialize, Serialize};

/// Thresholds and constants for derived features
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// RPM above which `high_rpm` is set (3000 matches the training features)
    pub high_rpm_threshold: f64,
    /// Speed (km/h) below which `low_speed` is set
    pub low_speed_threshold: f64,
    /// Throttle (%) above which `high_throttle` is set
    pub high_throttle_threshold: f64,
    /// Healthy control module voltage band (V), inclusive
    pub voltage_min: f64,
    pub voltage_max: f64,
    /// Fuel density used by the consumption proxy (kg/L)
    pub fuel_density: f64,
    /// Coolant temperature (°C) counted as thermal stress
    pub thermal_stress_temp: f64,
    /// Length of the rolling history windows
    pub history_capacity: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            high_rpm_threshold: 3000.0,
            low_speed_threshold: 20.0,
            high_throttle_threshold: 70.0,
            voltage_min: 12.5,
            voltage_max: 14.5,
            fuel_density: 0.75,
            thermal_stress_temp: 95.0,
            history_capacity: 20,
        }
    }
}

impl FeatureConfig {
    /// Same thresholds with a different high-RPM cut-off
    pub fn with_high_rpm_threshold(threshold: f64) -> Self {
        Self {
            high_rpm_threshold: threshold,
            ..Default::default()
        }
    }
}
