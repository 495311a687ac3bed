//! OBD-II PID Definitions and Response Parsing
//!
//! Defines the Mode 01 Parameter IDs (PIDs) the collector polls and their
//! SAE J1979 decoding formulas.

use serde::{Deserialize, Serialize};

/// Standard OBD-II PIDs for Mode 01 (current data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Monitor status since DTCs cleared: MIL flag and DTC count (0x01)
    MonitorStatus = 0x01,
    /// Fuel system status (0x03)
    FuelSystemStatus = 0x03,
    /// Calculated engine load (0x04)
    EngineLoad = 0x04,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Short-term fuel trim bank 1 (0x06)
    ShortFuelTrim1 = 0x06,
    /// Long-term fuel trim bank 1 (0x07)
    LongFuelTrim1 = 0x07,
    /// Short-term fuel trim bank 2 (0x08)
    ShortFuelTrim2 = 0x08,
    /// Long-term fuel trim bank 2 (0x09)
    LongFuelTrim2 = 0x09,
    /// Fuel pressure, gauge (0x0A)
    FuelPressure = 0x0A,
    /// Intake manifold absolute pressure (0x0B)
    IntakeManifoldPressure = 0x0B,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Timing advance (0x0E)
    TimingAdvance = 0x0E,
    /// Intake air temperature (0x0F)
    IntakeTemp = 0x0F,
    /// Mass air flow rate (0x10)
    Maf = 0x10,
    /// Throttle position (0x11)
    ThrottlePosition = 0x11,
    /// Oxygen sensor voltage bank 1, sensor 1 (0x14)
    O2B1S1 = 0x14,
    /// Oxygen sensor voltage bank 1, sensor 2 (0x15)
    O2B1S2 = 0x15,
    /// Run time since engine start (0x1F)
    RunTime = 0x1F,
    /// Distance traveled with MIL on (0x21)
    DistanceWithMil = 0x21,
    /// Fuel rail gauge pressure (0x23)
    FuelRailPressure = 0x23,
    /// Commanded EGR (0x2C)
    CommandedEgr = 0x2C,
    /// Fuel tank level input (0x2F)
    FuelLevel = 0x2F,
    /// Absolute barometric pressure (0x33)
    BarometricPressure = 0x33,
    /// Catalyst temperature bank 1, sensor 1 (0x3C)
    CatalystTempB1S1 = 0x3C,
    /// Control module voltage (0x42)
    ControlModuleVoltage = 0x42,
    /// Absolute load value (0x43)
    AbsoluteLoad = 0x43,
    /// Ambient air temperature (0x46)
    AmbientAirTemp = 0x46,
}

impl Pid {
    /// Every PID the collector knows how to poll, in ascending code order
    pub const ALL: [Pid; 28] = [
        Pid::MonitorStatus,
        Pid::FuelSystemStatus,
        Pid::EngineLoad,
        Pid::CoolantTemp,
        Pid::ShortFuelTrim1,
        Pid::LongFuelTrim1,
        Pid::ShortFuelTrim2,
        Pid::LongFuelTrim2,
        Pid::FuelPressure,
        Pid::IntakeManifoldPressure,
        Pid::Rpm,
        Pid::Speed,
        Pid::TimingAdvance,
        Pid::IntakeTemp,
        Pid::Maf,
        Pid::ThrottlePosition,
        Pid::O2B1S1,
        Pid::O2B1S2,
        Pid::RunTime,
        Pid::DistanceWithMil,
        Pid::FuelRailPressure,
        Pid::CommandedEgr,
        Pid::FuelLevel,
        Pid::BarometricPressure,
        Pid::CatalystTempB1S1,
        Pid::ControlModuleVoltage,
        Pid::AbsoluteLoad,
        Pid::AmbientAirTemp,
    ];

    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Look up a PID by its code
    pub fn from_code(code: u8) -> Option<Pid> {
        Self::ALL.iter().copied().find(|p| p.as_hex() == code)
    }

    /// ELM327 request string, e.g. `010C`
    pub fn command(&self) -> String {
        format!("{:02X}{:02X}", crate::mode::CURRENT_DATA, self.as_hex())
    }

    /// Get the number of response bytes for this PID
    pub fn response_bytes(&self) -> usize {
        match self {
            Pid::MonitorStatus => 4,
            Pid::FuelSystemStatus
            | Pid::Rpm
            | Pid::Maf
            | Pid::O2B1S1
            | Pid::O2B1S2
            | Pid::RunTime
            | Pid::DistanceWithMil
            | Pid::FuelRailPressure
            | Pid::CatalystTempB1S1
            | Pid::ControlModuleVoltage
            | Pid::AbsoluteLoad => 2,
            _ => 1,
        }
    }

    /// Short field name used in logs and stored records
    pub fn name(&self) -> &'static str {
        match self {
            Pid::MonitorStatus => "status",
            Pid::FuelSystemStatus => "fuel_status",
            Pid::EngineLoad => "engine_load",
            Pid::CoolantTemp => "coolant_temp",
            Pid::ShortFuelTrim1 => "short_fuel_trim_1",
            Pid::LongFuelTrim1 => "long_fuel_trim_1",
            Pid::ShortFuelTrim2 => "short_fuel_trim_2",
            Pid::LongFuelTrim2 => "long_fuel_trim_2",
            Pid::FuelPressure => "fuel_pressure",
            Pid::IntakeManifoldPressure => "intake_pressure",
            Pid::Rpm => "rpm",
            Pid::Speed => "speed",
            Pid::TimingAdvance => "timing_advance",
            Pid::IntakeTemp => "intake_temp",
            Pid::Maf => "maf",
            Pid::ThrottlePosition => "throttle_pos",
            Pid::O2B1S1 => "o2_b1s1",
            Pid::O2B1S2 => "o2_b1s2",
            Pid::RunTime => "run_time",
            Pid::DistanceWithMil => "distance_w_mil",
            Pid::FuelRailPressure => "fuel_rail_pressure",
            Pid::CommandedEgr => "commanded_egr",
            Pid::FuelLevel => "fuel_level",
            Pid::BarometricPressure => "barometric_pressure",
            Pid::CatalystTempB1S1 => "catalyst_temp_b1s1",
            Pid::ControlModuleVoltage => "control_module_voltage",
            Pid::AbsoluteLoad => "absolute_load",
            Pid::AmbientAirTemp => "ambient_air_temp",
        }
    }
}

/// Fuel system loop state reported by PID 0x03
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuelSystemStatus {
    OpenLoopCold,
    ClosedLoop,
    OpenLoopLoad,
    OpenLoopFailure,
    ClosedLoopFault,
}

impl FuelSystemStatus {
    /// Decode the first status byte; undefined bit patterns yield `None`
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::OpenLoopCold),
            0x02 => Some(Self::ClosedLoop),
            0x04 => Some(Self::OpenLoopLoad),
            0x08 => Some(Self::OpenLoopFailure),
            0x10 => Some(Self::ClosedLoopFault),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenLoopCold => "Open loop (insufficient engine temperature)",
            Self::ClosedLoop => "Closed loop",
            Self::OpenLoopLoad => "Open loop (engine load or fuel cut)",
            Self::OpenLoopFailure => "Open loop (system failure)",
            Self::ClosedLoopFault => "Closed loop (feedback fault)",
        }
    }
}

/// Response from a PID query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidResponse {
    /// The PID that was queried
    pub pid: u8,
    /// Timestamp when the response was received (Unix ms)
    pub timestamp_ms: u64,
    /// Decoded value
    pub value: f64,
    /// Raw bytes from the response
    pub raw_bytes: Vec<u8>,
}

impl PidResponse {
    /// Create a new PID response by decoding raw bytes
    pub fn decode(pid: u8, raw_bytes: Vec<u8>, timestamp_ms: u64) -> Self {
        let value = Self::decode_value(pid, &raw_bytes);
        Self {
            pid,
            timestamp_ms,
            value,
            raw_bytes,
        }
    }

    /// Whether the payload carries enough bytes for the PID's formula
    pub fn is_complete(&self) -> bool {
        Pid::from_code(self.pid)
            .map(|p| self.raw_bytes.len() >= p.response_bytes())
            .unwrap_or(false)
    }

    /// Decode the raw bytes to a value based on the PID formula
    fn decode_value(pid: u8, bytes: &[u8]) -> f64 {
        let a = bytes.first().copied().unwrap_or(0) as f64;
        let b = bytes.get(1).copied().unwrap_or(0) as f64;
        let ab = a * 256.0 + b;
        match pid {
            // DTC count: A & 0x7F (MIL is bit 7, read from raw bytes)
            0x01 => (bytes.first().copied().unwrap_or(0) & 0x7F) as f64,
            // Fuel system status bitfield: A
            0x03 => a,
            // Percentages: A * 100 / 255
            0x04 | 0x11 | 0x2C | 0x2F => a * 100.0 / 255.0,
            // Temperatures: A - 40 (°C)
            0x05 | 0x0F | 0x46 => a - 40.0,
            // Fuel trims: (A - 128) * 100 / 128 (%)
            0x06..=0x09 => (a - 128.0) * 100.0 / 128.0,
            // Fuel pressure: 3 * A (kPa)
            0x0A => a * 3.0,
            // Single byte pressures and speed
            0x0B | 0x0D | 0x33 => a,
            // RPM: ((A*256)+B)/4
            0x0C => ab / 4.0,
            // Timing advance: A/2 - 64 (degrees before TDC)
            0x0E => a / 2.0 - 64.0,
            // MAF: ((A*256)+B) / 100 (g/s)
            0x10 => ab / 100.0,
            // O2 Voltage: A / 200 (V)
            0x14 | 0x15 => a / 200.0,
            // Run time (s) and distance with MIL (km)
            0x1F | 0x21 => ab,
            // Fuel rail gauge pressure: 10 * ((A*256)+B) (kPa)
            0x23 => ab * 10.0,
            // Catalyst temperature: ((A*256)+B)/10 - 40 (°C)
            0x3C => ab / 10.0 - 40.0,
            // Control module voltage: ((A*256)+B)/1000 (V)
            0x42 => ab / 1000.0,
            // Absolute load: ((A*256)+B) * 100 / 255 (%)
            0x43 => ab * 100.0 / 255.0,
            _ => 0.0,
        }
    }

    /// MIL lamp state, only meaningful for PID 0x01
    pub fn mil_on(&self) -> Option<bool> {
        if self.pid != Pid::MonitorStatus.as_hex() {
            return None;
        }
        self.raw_bytes.first().map(|a| a & 0x80 != 0)
    }

    /// Fuel system status text, only meaningful for PID 0x03
    pub fn fuel_system_status(&self) -> Option<FuelSystemStatus> {
        if self.pid != Pid::FuelSystemStatus.as_hex() {
            return None;
        }
        self.raw_bytes.first().and_then(|a| FuelSystemStatus::from_byte(*a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpm_decode() {
        // 1A 2B => ((0x1A * 256) + 0x2B) / 4 = (26*256 + 43) / 4 = 6699/4 = 1674.75
        let response = PidResponse::decode(0x0C, vec![0x1A, 0x2B], 0);
        assert!((response.value - 1674.75).abs() < 0.01);
    }

    #[test]
    fn test_coolant_temp_decode() {
        // 0x73 = 115, so temp = 115 - 40 = 75°C
        let response = PidResponse::decode(0x05, vec![0x73], 0);
        assert!((response.value - 75.0).abs() < 0.01);
    }

    #[test]
    fn test_fuel_trim_bank2_decode() {
        // 0x90 = 144, so trim = (144-128)*100/128 = 12.5%
        let response = PidResponse::decode(0x08, vec![0x90], 0);
        assert!((response.value - 12.5).abs() < 0.01);
    }

    #[test]
    fn test_voltage_decode() {
        // 0x3A 0x98 = 15000 mV
        let response = PidResponse::decode(0x42, vec![0x3A, 0x98], 0);
        assert!((response.value - 15.0).abs() < 0.001);
    }

    #[test]
    fn test_catalyst_temp_decode() {
        // 0x1F 0x40 = 8000 => 800 - 40 = 760°C
        let response = PidResponse::decode(0x3C, vec![0x1F, 0x40], 0);
        assert!((response.value - 760.0).abs() < 0.01);
    }

    #[test]
    fn test_monitor_status_decode() {
        // MIL on, 3 codes stored
        let response = PidResponse::decode(0x01, vec![0x83, 0x07, 0x65, 0x00], 0);
        assert_eq!(response.value, 3.0);
        assert_eq!(response.mil_on(), Some(true));

        let response = PidResponse::decode(0x01, vec![0x00, 0x07, 0x65, 0x00], 0);
        assert_eq!(response.value, 0.0);
        assert_eq!(response.mil_on(), Some(false));
    }

    #[test]
    fn test_fuel_system_status_decode() {
        let response = PidResponse::decode(0x03, vec![0x02, 0x00], 0);
        assert_eq!(response.fuel_system_status(), Some(FuelSystemStatus::ClosedLoop));

        let response = PidResponse::decode(0x03, vec![0x03, 0x00], 0);
        assert_eq!(response.fuel_system_status(), None);
    }

    #[test]
    fn test_pid_lookup_and_command() {
        assert_eq!(Pid::from_code(0x0C), Some(Pid::Rpm));
        assert_eq!(Pid::from_code(0x02), None);
        assert_eq!(Pid::Rpm.command(), "010C");
        assert_eq!(Pid::AmbientAirTemp.command(), "0146");
    }

    #[test]
    fn test_pid_table_is_sorted_and_unique() {
        for pair in Pid::ALL.windows(2) {
            assert!(pair[0].as_hex() < pair[1].as_hex());
        }
    }
}
