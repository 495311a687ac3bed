//! One sampled instant of vehicle state

use crate::pid::{Pid, PidResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Reading produced by one poll cycle.
///
/// Every sensor field is optional: the adapter or vehicle may not support
/// a PID, or the query may have failed this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Acquisition time (UTC)
    pub timestamp: DateTime<Utc>,
    /// Collection run this reading belongs to
    pub session_id: String,

    /// Engine RPM
    pub rpm: Option<f64>,
    /// Vehicle speed (km/h)
    pub speed: Option<f64>,
    /// Coolant temperature (°C)
    pub coolant_temp: Option<f64>,
    /// Calculated engine load (%)
    pub engine_load: Option<f64>,
    /// Absolute load value (%)
    pub absolute_load: Option<f64>,
    /// Intake air temperature (°C)
    pub intake_temp: Option<f64>,
    /// Timing advance (° before TDC)
    pub timing_advance: Option<f64>,
    /// Seconds since engine start
    pub run_time: Option<f64>,
    /// Fuel tank level (%)
    pub fuel_level: Option<f64>,
    /// Fuel pressure (kPa)
    pub fuel_pressure: Option<f64>,
    /// Fuel rail gauge pressure (kPa)
    pub fuel_rail_pressure: Option<f64>,
    /// Commanded EGR (%)
    pub commanded_egr: Option<f64>,
    /// Throttle position (%)
    pub throttle_pos: Option<f64>,
    pub short_fuel_trim_1: Option<f64>,
    pub long_fuel_trim_1: Option<f64>,
    pub short_fuel_trim_2: Option<f64>,
    pub long_fuel_trim_2: Option<f64>,
    /// Mass air flow (g/s)
    pub maf: Option<f64>,
    /// Intake manifold absolute pressure (kPa)
    pub intake_pressure: Option<f64>,
    /// Barometric pressure (kPa)
    pub barometric_pressure: Option<f64>,
    /// O2 sensor voltage bank 1 sensor 1 (V)
    pub o2_b1s1: Option<f64>,
    /// O2 sensor voltage bank 1 sensor 2 (V)
    pub o2_b1s2: Option<f64>,
    /// Catalyst temperature bank 1 sensor 1 (°C)
    pub catalyst_temp_b1s1: Option<f64>,
    /// Ambient air temperature (°C)
    pub ambient_air_temp: Option<f64>,
    /// Control module voltage (V)
    pub control_module_voltage: Option<f64>,
    /// Distance traveled with MIL on (km)
    pub distance_w_mil: Option<f64>,

    /// Stored diagnostic trouble codes
    pub dtc_count: Option<u32>,
    /// Malfunction indicator lamp
    pub mil_on: Option<bool>,
    /// Fuel system loop state as text
    pub fuel_system_status: Option<String>,
}

impl Reading {
    /// Create an empty reading
    pub fn new(session_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            session_id: session_id.into(),
            rpm: None,
            speed: None,
            coolant_temp: None,
            engine_load: None,
            absolute_load: None,
            intake_temp: None,
            timing_advance: None,
            run_time: None,
            fuel_level: None,
            fuel_pressure: None,
            fuel_rail_pressure: None,
            commanded_egr: None,
            throttle_pos: None,
            short_fuel_trim_1: None,
            long_fuel_trim_1: None,
            short_fuel_trim_2: None,
            long_fuel_trim_2: None,
            maf: None,
            intake_pressure: None,
            barometric_pressure: None,
            o2_b1s1: None,
            o2_b1s2: None,
            catalyst_temp_b1s1: None,
            ambient_air_temp: None,
            control_module_voltage: None,
            distance_w_mil: None,
            dtc_count: None,
            mil_on: None,
            fuel_system_status: None,
        }
    }

    fn numeric_slot(&mut self, pid: Pid) -> Option<&mut Option<f64>> {
        let slot = match pid {
            Pid::EngineLoad => &mut self.engine_load,
            Pid::CoolantTemp => &mut self.coolant_temp,
            Pid::ShortFuelTrim1 => &mut self.short_fuel_trim_1,
            Pid::LongFuelTrim1 => &mut self.long_fuel_trim_1,
            Pid::ShortFuelTrim2 => &mut self.short_fuel_trim_2,
            Pid::LongFuelTrim2 => &mut self.long_fuel_trim_2,
            Pid::FuelPressure => &mut self.fuel_pressure,
            Pid::IntakeManifoldPressure => &mut self.intake_pressure,
            Pid::Rpm => &mut self.rpm,
            Pid::Speed => &mut self.speed,
            Pid::TimingAdvance => &mut self.timing_advance,
            Pid::IntakeTemp => &mut self.intake_temp,
            Pid::Maf => &mut self.maf,
            Pid::ThrottlePosition => &mut self.throttle_pos,
            Pid::O2B1S1 => &mut self.o2_b1s1,
            Pid::O2B1S2 => &mut self.o2_b1s2,
            Pid::RunTime => &mut self.run_time,
            Pid::DistanceWithMil => &mut self.distance_w_mil,
            Pid::FuelRailPressure => &mut self.fuel_rail_pressure,
            Pid::CommandedEgr => &mut self.commanded_egr,
            Pid::FuelLevel => &mut self.fuel_level,
            Pid::BarometricPressure => &mut self.barometric_pressure,
            Pid::CatalystTempB1S1 => &mut self.catalyst_temp_b1s1,
            Pid::ControlModuleVoltage => &mut self.control_module_voltage,
            Pid::AbsoluteLoad => &mut self.absolute_load,
            Pid::AmbientAirTemp => &mut self.ambient_air_temp,
            Pid::MonitorStatus | Pid::FuelSystemStatus => return None,
        };
        Some(slot)
    }

    /// Numeric value recorded for a PID, if any
    pub fn value(&self, pid: Pid) -> Option<f64> {
        match pid {
            Pid::MonitorStatus => self.dtc_count.map(f64::from),
            Pid::FuelSystemStatus => None,
            Pid::EngineLoad => self.engine_load,
            Pid::CoolantTemp => self.coolant_temp,
            Pid::ShortFuelTrim1 => self.short_fuel_trim_1,
            Pid::LongFuelTrim1 => self.long_fuel_trim_1,
            Pid::ShortFuelTrim2 => self.short_fuel_trim_2,
            Pid::LongFuelTrim2 => self.long_fuel_trim_2,
            Pid::FuelPressure => self.fuel_pressure,
            Pid::IntakeManifoldPressure => self.intake_pressure,
            Pid::Rpm => self.rpm,
            Pid::Speed => self.speed,
            Pid::TimingAdvance => self.timing_advance,
            Pid::IntakeTemp => self.intake_temp,
            Pid::Maf => self.maf,
            Pid::ThrottlePosition => self.throttle_pos,
            Pid::O2B1S1 => self.o2_b1s1,
            Pid::O2B1S2 => self.o2_b1s2,
            Pid::RunTime => self.run_time,
            Pid::DistanceWithMil => self.distance_w_mil,
            Pid::FuelRailPressure => self.fuel_rail_pressure,
            Pid::CommandedEgr => self.commanded_egr,
            Pid::FuelLevel => self.fuel_level,
            Pid::BarometricPressure => self.barometric_pressure,
            Pid::CatalystTempB1S1 => self.catalyst_temp_b1s1,
            Pid::ControlModuleVoltage => self.control_module_voltage,
            Pid::AbsoluteLoad => self.absolute_load,
            Pid::AmbientAirTemp => self.ambient_air_temp,
        }
    }

    /// Update the field(s) a PID response maps to
    pub fn apply(&mut self, response: &PidResponse) {
        let Some(pid) = Pid::from_code(response.pid) else {
            return;
        };
        match pid {
            Pid::MonitorStatus => {
                self.dtc_count = Some(response.value as u32);
                self.mil_on = response.mil_on();
            }
            Pid::FuelSystemStatus => {
                self.fuel_system_status = response
                    .fuel_system_status()
                    .map(|s| s.label().to_string());
            }
            other => {
                if let Some(slot) = self.numeric_slot(other) {
                    *slot = Some(response.value);
                }
            }
        }
    }

    /// Null out the field(s) a PID maps to
    pub fn clear(&mut self, pid: Pid) {
        match pid {
            Pid::MonitorStatus => {
                self.dtc_count = None;
                self.mil_on = None;
            }
            Pid::FuelSystemStatus => self.fuel_system_status = None,
            other => {
                if let Some(slot) = self.numeric_slot(other) {
                    *slot = None;
                }
            }
        }
    }

    /// Whether the PID's field carries a value
    pub fn has(&self, pid: Pid) -> bool {
        match pid {
            Pid::MonitorStatus => self.dtc_count.is_some(),
            Pid::FuelSystemStatus => self.fuel_system_status.is_some(),
            other => self.value(other).is_some(),
        }
    }

    /// Number of PIDs with a recorded value
    pub fn present_count(&self) -> usize {
        Pid::ALL.iter().filter(|pid| self.has(**pid)).count()
    }
}
