//! OBD-II Client for ELM327 Adapters
//!
//! Provides async serial communication with OBD-II adapters.

use crate::elm327::{clean_response, parse_pid_payload, parse_supported_bitmap, parse_vin};
use crate::error::ObdError;
use crate::pid::{Pid, PidResponse};
use crate::protocol::ObdProtocol;
use crate::transport::ObdTransport;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

/// Bases of the Mode 01 support bitmaps walked during discovery
const SUPPORT_BITMAP_BASES: [u8; 3] = [0x00, 0x20, 0x40];

/// Vehicles reporting fewer PIDs than this usually have a flaky link
const MIN_EXPECTED_PIDS: usize = 5;

/// ATZ resets the adapter and needs longer than a normal query
const RESET_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for a late reply after a timed out command
const STALE_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// OBD-II client for communicating with ELM327-compatible adapters
pub struct ObdClient {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "/dev/rfcomm0")
    device: String,
    stream: SerialStream,
    /// Per-command timeout
    timeout: Duration,
    /// Negotiated protocol name
    protocol_name: String,
    connected: bool,
    /// A command timed out and its reply may still be in flight
    stale_input: bool,
}

impl ObdClient {
    /// Open the serial device. No bytes are exchanged until [`initialize`](Self::initialize).
    pub fn open(device: &str, baud_rate: u32, timeout: Duration) -> Result<Self, ObdError> {
        info!("Opening OBD adapter on {} at {} baud", device, baud_rate);
        let stream = tokio_serial::new(device, baud_rate)
            .timeout(timeout)
            .open_native_async()?;

        Ok(Self {
            device: device.to_string(),
            stream,
            timeout,
            protocol_name: ObdProtocol::Auto.name().to_string(),
            connected: false,
            stale_input: false,
        })
    }

    /// Run the ELM327 handshake and verify the vehicle answers
    pub async fn initialize(&mut self) -> Result<(), ObdError> {
        info!("Initializing OBD adapter on {}", self.device);

        self.send_with_timeout("ATZ", RESET_TIMEOUT).await?;
        for cmd in ["ATE0", "ATL0", "ATH0", ObdProtocol::Auto.to_elm_command()] {
            let answer = self.send(cmd).await?;
            if !answer.contains("OK") {
                return Err(ObdError::HandshakeFailed {
                    port: self.device.clone(),
                    reason: format!("{} answered {:?}", cmd, answer),
                });
            }
        }

        // 0100 forces protocol search; a vehicle that never answers fails here
        let probe = self.send("0100").await?;
        parse_pid_payload(&probe, 0x00)?.ok_or_else(|| ObdError::HandshakeFailed {
            port: self.device.clone(),
            reason: "vehicle did not answer 0100".to_string(),
        })?;

        let description = self.send("ATDP").await?;
        self.protocol_name = match ObdProtocol::from_description(&description) {
            Some(protocol) => protocol.name().to_string(),
            None => description.trim_start_matches("AUTO,").trim().to_string(),
        };

        self.connected = true;
        info!(
            "OBD adapter initialized on {} using {}",
            self.device, self.protocol_name
        );
        Ok(())
    }

    async fn send(&mut self, cmd: &str) -> Result<String, ObdError> {
        self.send_with_timeout(cmd, self.timeout).await
    }

    /// Write a command and read until the `>` prompt
    async fn send_with_timeout(&mut self, cmd: &str, limit: Duration) -> Result<String, ObdError> {
        if self.stale_input {
            self.discard_stale_input().await;
        }

        debug!("-> {}", cmd);
        let exchange = async {
            self.stream.write_all(format!("{}\r", cmd).as_bytes()).await?;
            self.stream.flush().await?;
            read_until_prompt(&mut self.stream).await
        };

        let raw = match tokio::time::timeout(limit, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                self.stale_input = true;
                return Err(ObdError::Timeout(limit.as_millis() as u64));
            }
        };
        let text = clean_response(&raw);
        debug!("<- {}", text);
        Ok(text)
    }

    /// Drop the late reply of a timed out command so the next command
    /// reads its own answer
    async fn discard_stale_input(&mut self) {
        let discarded = drain_until_prompt(&mut self.stream, STALE_DRAIN_TIMEOUT).await;
        if let Err(e) = self.stream.clear(ClearBuffer::Input) {
            debug!("Could not clear input buffer on {}: {}", self.device, e);
        }
        debug!("Discarded {} stale bytes on {}", discarded, self.device);
        self.stale_input = false;
    }
}

/// Read until the `>` prompt and return everything read
async fn read_until_prompt<R>(reader: &mut R) -> Result<String, ObdError>
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::with_capacity(64);
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            return Err(ObdError::AdapterNotResponding);
        }
        collected.push(byte[0]);
        if byte[0] == b'>' {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&collected).into_owned())
}

/// Discard input up to and including the next `>` prompt, giving up after
/// `limit`. Returns the number of bytes dropped.
async fn drain_until_prompt<R>(reader: &mut R, limit: Duration) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut discarded = 0;
    let drain = async {
        let mut byte = [0u8; 1];
        while let Ok(1) = reader.read(&mut byte).await {
            discarded += 1;
            if byte[0] == b'>' {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(limit, drain).await;
    discarded
}

#[async_trait]
impl ObdTransport for ObdClient {
    fn port(&self) -> &str {
        &self.device
    }

    fn protocol_name(&self) -> &str {
        &self.protocol_name
    }

    async fn supported_pids(&mut self) -> Result<BTreeSet<u8>, ObdError> {
        let mut supported = BTreeSet::new();
        for base in SUPPORT_BITMAP_BASES {
            let answer = self.send(&format!("01{:02X}", base)).await?;
            let Some(payload) = parse_pid_payload(&answer, base)? else {
                break;
            };
            let pids = parse_supported_bitmap(base, &payload);
            let next_block = base.wrapping_add(0x20);
            let continues = pids.contains(&next_block);
            supported.extend(pids.into_iter().filter(|p| p % 0x20 != 0));
            if !continues {
                break;
            }
        }

        if supported.len() < MIN_EXPECTED_PIDS {
            warn!(
                "Only {} PIDs supported on {}; connection may be unstable",
                supported.len(),
                self.device
            );
        }
        Ok(supported)
    }

    async fn query(&mut self, pid: Pid) -> Result<Option<PidResponse>, ObdError> {
        if !self.connected {
            return Err(ObdError::AdapterNotResponding);
        }

        let answer = self.send(&pid.command()).await?;
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Ok(parse_pid_payload(&answer, pid.as_hex())?
            .map(|bytes| PidResponse::decode(pid.as_hex(), bytes, timestamp_ms))
            .filter(|response| response.is_complete()))
    }

    async fn read_vin(&mut self) -> Result<Option<String>, ObdError> {
        let answer = self.send("0902").await?;
        Ok(parse_vin(&answer))
    }

    async fn close(&mut self) {
        if self.connected {
            info!("Disconnecting OBD client on {}", self.device);
            // best effort: put the adapter back to defaults
            let _ = self.send("ATPC").await;
            self.connected = false;
        }
    }
}
