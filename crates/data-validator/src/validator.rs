//! Data Validator for Range Checking

use crate::error::ValidationError;
use obd_protocol::{Pid, Reading};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// RPM valid range
    pub rpm_range: (f64, f64),
    /// Coolant temp valid range (°C)
    pub coolant_range: (f64, f64),
    /// Speed valid range (km/h)
    pub speed_range: (f64, f64),
    /// Engine load valid range (%)
    pub load_range: (f64, f64),
    /// MAF valid range (g/s)
    pub maf_range: (f64, f64),
    /// Control module voltage valid range (V)
    pub voltage_range: (f64, f64),
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            rpm_range: (0.0, 10_000.0),
            coolant_range: (-40.0, 215.0),
            speed_range: (0.0, 300.0),
            load_range: (0.0, 100.0),
            maf_range: (0.0, 655.35),
            voltage_range: (0.0, 30.0),
        }
    }
}

impl ValidationConfig {
    /// Accepted range for a PID: configured for the key signals, encoding
    /// limits for everything else
    pub fn range_for(&self, pid: Pid) -> (f64, f64) {
        match pid {
            Pid::Rpm => self.rpm_range,
            Pid::CoolantTemp => self.coolant_range,
            Pid::Speed => self.speed_range,
            Pid::EngineLoad => self.load_range,
            Pid::Maf => self.maf_range,
            Pid::ControlModuleVoltage => self.voltage_range,
            Pid::IntakeTemp | Pid::AmbientAirTemp => (-40.0, 215.0),
            Pid::ThrottlePosition | Pid::FuelLevel | Pid::CommandedEgr => (0.0, 100.0),
            Pid::ShortFuelTrim1 | Pid::LongFuelTrim1 | Pid::ShortFuelTrim2 | Pid::LongFuelTrim2 => {
                (-100.0, 99.3)
            }
            Pid::TimingAdvance => (-64.0, 63.5),
            Pid::O2B1S1 | Pid::O2B1S2 => (0.0, 1.275),
            Pid::CatalystTempB1S1 => (-40.0, 6513.5),
            Pid::FuelPressure => (0.0, 765.0),
            Pid::IntakeManifoldPressure | Pid::BarometricPressure => (0.0, 255.0),
            Pid::FuelRailPressure => (0.0, 655_350.0),
            Pid::AbsoluteLoad => (0.0, 25_700.0),
            Pid::RunTime | Pid::DistanceWithMil => (0.0, 65_535.0),
            Pid::MonitorStatus => (0.0, 127.0),
            Pid::FuelSystemStatus => (0.0, f64::MAX),
        }
    }
}

/// Result of validation
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether all values are valid
    pub valid: bool,
    /// List of validation errors
    pub errors: Vec<ValidationError>,
    /// Number of fields validated
    pub fields_checked: usize,
}

impl ValidationResult {
    /// Number of fields that were nulled
    pub fn rejected(&self) -> usize {
        self.errors.len()
    }
}

/// Data validator for OBD-II readings
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a single value against a range
    pub fn validate_range(
        &self,
        field: &'static str,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite(field));
        }
        if value < range.0 || value > range.1 {
            Err(ValidationError::OutOfRange {
                field,
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    /// Validate one PID value
    pub fn validate(&self, pid: Pid, value: f64) -> Result<(), ValidationError> {
        self.validate_range(pid.name(), value, self.config.range_for(pid))
    }

    /// Null every field of `reading` that fails its range check
    pub fn sanitize(&self, reading: &mut Reading) -> ValidationResult {
        let mut errors = Vec::new();
        let mut fields_checked = 0;

        for pid in Pid::ALL {
            if pid == Pid::MonitorStatus {
                if let Some(count) = reading.dtc_count {
                    fields_checked += 1;
                    if count > 127 {
                        errors.push(ValidationError::DtcCountOverflow(count));
                        reading.clear(pid);
                    }
                }
                continue;
            }
            let Some(value) = reading.value(pid) else {
                continue;
            };
            fields_checked += 1;
            if let Err(err) = self.validate(pid, value) {
                debug!("Dropping implausible value: {}", err);
                errors.push(err);
                reading.clear(pid);
            }
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            fields_checked,
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}
