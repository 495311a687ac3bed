//! Simulated adapter for running without hardware

use crate::error::ObdError;
use crate::pid::{Pid, PidResponse};
use crate::protocol::ObdProtocol;
use crate::transport::{Connector, ObdTransport};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use tracing::info;

/// Deterministic stand-in for an ELM327 on a running engine
pub struct SimulatedAdapter {
    port: String,
    protocol_name: String,
    supported: BTreeSet<u8>,
    vin: Option<String>,
    tick: u64,
    connected: bool,
}

impl SimulatedAdapter {
    pub fn new(port: &str, supported: BTreeSet<u8>, vin: Option<String>) -> Self {
        Self {
            port: port.to_string(),
            protocol_name: ObdProtocol::Iso15765_4Can11bit500.name().to_string(),
            supported,
            vin,
            tick: 0,
            connected: true,
        }
    }

    /// Every PID this crate knows
    pub fn full_support() -> BTreeSet<u8> {
        Pid::ALL.iter().map(|p| p.as_hex()).collect()
    }

    /// Raw bytes for a PID, wandering around a warm idle
    fn raw_bytes(&self, pid: Pid) -> Vec<u8> {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        pid.as_hex().hash(&mut hasher);
        let hash = hasher.finish();

        let two = |v: u32| vec![(v >> 8) as u8, (v & 0xFF) as u8];
        match pid {
            // no MIL, no stored codes
            Pid::MonitorStatus => vec![0x00, 0x07, 0x65, 0x00],
            Pid::FuelSystemStatus => vec![0x02, 0x00],
            // RPM: 750-3250
            Pid::Rpm => two((750 + (hash % 2500) as u32) * 4),
            // Speed: 0-100 km/h
            Pid::Speed => vec![(hash % 100) as u8],
            // Coolant: 85-99°C
            Pid::CoolantTemp => vec![(125 + (hash % 15)) as u8],
            // Load: 20-60%
            Pid::EngineLoad | Pid::ThrottlePosition | Pid::AbsoluteLoad => {
                let byte = (51 + (hash % 102)) as u8;
                if pid == Pid::AbsoluteLoad {
                    vec![0, byte]
                } else {
                    vec![byte]
                }
            }
            // Fuel trims: -5% to +5%
            Pid::ShortFuelTrim1 | Pid::LongFuelTrim1 | Pid::ShortFuelTrim2 | Pid::LongFuelTrim2 => {
                vec![(122 + (hash % 13)) as u8]
            }
            Pid::FuelPressure => vec![(100 + (hash % 10)) as u8],
            Pid::IntakeManifoldPressure => vec![(30 + (hash % 40)) as u8],
            Pid::TimingAdvance => vec![(140 + (hash % 20)) as u8],
            Pid::IntakeTemp | Pid::AmbientAirTemp => vec![(60 + (hash % 10)) as u8],
            // MAF: 3-30 g/s
            Pid::Maf => two(300 + (hash % 2700) as u32),
            // O2: 0.1-0.9V
            Pid::O2B1S1 | Pid::O2B1S2 => vec![(20 + (hash % 160)) as u8, 0xFF],
            Pid::RunTime => two(self.tick as u32 % 60_000),
            Pid::DistanceWithMil => vec![0, 0],
            Pid::FuelRailPressure => two(300 + (hash % 200) as u32),
            Pid::CommandedEgr => vec![(hash % 30) as u8],
            Pid::FuelLevel => vec![180],
            Pid::BarometricPressure => vec![101],
            // Catalyst: 400-600°C
            Pid::CatalystTempB1S1 => two(4400 + (hash % 2000) as u32),
            // Voltage: 13.8-14.4V
            Pid::ControlModuleVoltage => two(13_800 + (hash % 600) as u32),
        }
    }
}

#[async_trait]
impl ObdTransport for SimulatedAdapter {
    fn port(&self) -> &str {
        &self.port
    }

    fn protocol_name(&self) -> &str {
        &self.protocol_name
    }

    async fn supported_pids(&mut self) -> Result<BTreeSet<u8>, ObdError> {
        Ok(self.supported.clone())
    }

    async fn query(&mut self, pid: Pid) -> Result<Option<PidResponse>, ObdError> {
        if !self.connected {
            return Err(ObdError::AdapterNotResponding);
        }
        if !self.supported.contains(&pid.as_hex()) {
            return Ok(None);
        }
        self.tick += 1;
        let response = PidResponse::decode(pid.as_hex(), self.raw_bytes(pid), self.tick);
        Ok(Some(response))
    }

    async fn read_vin(&mut self) -> Result<Option<String>, ObdError> {
        Ok(self.vin.clone())
    }

    async fn close(&mut self) {
        self.connected = false;
    }
}

/// Connector that hands out [`SimulatedAdapter`]s on any port
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    supported: BTreeSet<u8>,
    vin: Option<String>,
}

impl SimulatedConnector {
    pub fn new(supported: BTreeSet<u8>, vin: Option<String>) -> Self {
        Self { supported, vin }
    }
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self::new(SimulatedAdapter::full_support(), None)
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn connect(&self, port: &str) -> Result<Box<dyn ObdTransport>, ObdError> {
        info!("Creating simulated OBD adapter on {}", port);
        Ok(Box::new(SimulatedAdapter::new(
            port,
            self.supported.clone(),
            self.vin.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Reading;
    use chrono::Utc;

    #[tokio::test]
    async fn test_simulated_reading_is_plausible() {
        let connector = SimulatedConnector::default();
        let mut adapter = connector.connect("sim0").await.unwrap();
        assert_eq!(adapter.port(), "sim0");

        let mut reading = Reading::new("s", Utc::now());
        for pid in Pid::ALL {
            if let Some(response) = adapter.query(pid).await.unwrap() {
                assert!(response.is_complete(), "short payload for {:?}", pid);
                reading.apply(&response);
            }
        }
        assert_eq!(reading.present_count(), Pid::ALL.len());
        let rpm = reading.rpm.unwrap();
        assert!((750.0..=3250.0).contains(&rpm));
        let volts = reading.control_module_voltage.unwrap();
        assert!((13.8..=14.4).contains(&volts));
        assert_eq!(reading.mil_on, Some(false));
    }

    #[tokio::test]
    async fn test_unsupported_pid_is_null() {
        let supported: BTreeSet<u8> = [0x0C, 0x0D].into_iter().collect();
        let mut adapter = SimulatedAdapter::new("sim0", supported, None);
        assert!(adapter.query(Pid::Rpm).await.unwrap().is_some());
        assert!(adapter.query(Pid::CoolantTemp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_adapter_errors() {
        let mut adapter = SimulatedAdapter::new("sim0", SimulatedAdapter::full_support(), None);
        adapter.close().await;
        assert!(adapter.query(Pid::Rpm).await.is_err());
    }
}
