//! Transport seams between the collector and an adapter

use crate::client::ObdClient;
use crate::error::ObdError;
use crate::pid::{Pid, PidResponse};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// An open link to one adapter.
///
/// Only one task owns a transport at a time; none of these methods are
/// called concurrently.
#[async_trait]
pub trait ObdTransport: Send {
    /// Device path this transport was opened on
    fn port(&self) -> &str;

    /// Protocol name negotiated during the handshake
    fn protocol_name(&self) -> &str;

    /// PID codes the vehicle reports as supported
    async fn supported_pids(&mut self) -> Result<BTreeSet<u8>, ObdError>;

    /// Query one PID. `Ok(None)` means the vehicle returned no data.
    async fn query(&mut self, pid: Pid) -> Result<Option<PidResponse>, ObdError>;

    /// Vehicle identification number, if the ECU reports one
    async fn read_vin(&mut self) -> Result<Option<String>, ObdError>;

    /// Release the underlying device
    async fn close(&mut self);
}

/// Opens transports on candidate ports
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, port: &str) -> Result<Box<dyn ObdTransport>, ObdError>;
}

/// Connector for ELM327 adapters on serial or rfcomm devices
#[derive(Debug, Clone)]
pub struct SerialConnector {
    baud_rate: u32,
    query_timeout: Duration,
}

impl SerialConnector {
    pub fn new(baud_rate: u32, query_timeout: Duration) -> Self {
        Self {
            baud_rate,
            query_timeout,
        }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self, port: &str) -> Result<Box<dyn ObdTransport>, ObdError> {
        if !Path::new(port).exists() {
            return Err(ObdError::DeviceNotFound(port.to_string()));
        }
        let mut client = ObdClient::open(port, self.baud_rate, self.query_timeout)?;
        client.initialize().await?;
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_device_is_reported() {
        let connector = SerialConnector::new(38400, Duration::from_millis(100));
        let err = connector
            .connect("/dev/definitely-not-an-obd-adapter")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ObdError::DeviceNotFound(_)));
    }
}
