//! Per-cycle PID polling

use crate::identity::known_pids;
use chrono::Utc;
use obd_protocol::{ObdError, ObdTransport, Pid, Reading};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Consecutive failures after which a PID is reported as flaky
const FLAKY_PID_FAILURES: u32 = 3;

/// A polled PID and its failure streak
#[derive(Debug, Clone)]
pub struct PolledPid {
    pub pid: Pid,
    /// Consecutive failed queries
    pub failures: u32,
}

/// Outcome of one poll cycle
#[derive(Debug)]
pub struct CycleRead {
    pub reading: Reading,
    /// Queries issued
    pub attempted: usize,
    /// Queries that returned a value
    pub succeeded: usize,
    /// Link-level error that cut the cycle short
    pub link_error: Option<ObdError>,
    pub duration: Duration,
}

impl CycleRead {
    /// No value came back at all
    pub fn is_failure(&self) -> bool {
        self.link_error.is_some() || self.succeeded == 0
    }
}

/// Reads every supported PID once per cycle
pub struct PidPoller {
    pids: Vec<PolledPid>,
    query_timeout: Duration,
}

impl PidPoller {
    /// Poll the supported PIDs; with nothing discovered, poll the whole catalogue
    pub fn new(supported: &BTreeSet<u8>, query_timeout: Duration) -> Self {
        let mut pids = known_pids(supported);
        if pids.is_empty() {
            warn!("No known PIDs reported as supported, polling the full catalogue");
            pids = Pid::ALL.to_vec();
        }
        debug!("Polling {} PIDs per cycle", pids.len());
        Self {
            pids: pids
                .into_iter()
                .map(|pid| PolledPid { pid, failures: 0 })
                .collect(),
            query_timeout,
        }
    }

    pub fn pid_count(&self) -> usize {
        self.pids.len()
    }

    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.pids.iter().map(|p| p.pid)
    }

    /// Query every PID once. Individual failures leave their field null;
    /// a link-level failure ends the cycle early.
    pub async fn poll(&mut self, transport: &mut dyn ObdTransport, session_id: &str) -> CycleRead {
        let started = Instant::now();
        let mut reading = Reading::new(session_id, Utc::now());
        let mut attempted = 0;
        let mut succeeded = 0;
        let mut link_error = None;

        for polled in &mut self.pids {
            attempted += 1;
            let outcome = tokio::time::timeout(self.query_timeout, transport.query(polled.pid)).await;
            let failure = match outcome {
                Ok(Ok(Some(response))) => {
                    reading.apply(&response);
                    succeeded += 1;
                    polled.failures = 0;
                    continue;
                }
                Ok(Ok(None)) => "no data".to_string(),
                Ok(Err(e)) if e.is_link_failure() => {
                    warn!("Link failure while reading {}: {}", polled.pid.name(), e);
                    link_error = Some(e);
                    break;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {:?}", self.query_timeout),
            };

            polled.failures += 1;
            if polled.failures == FLAKY_PID_FAILURES {
                warn!(
                    "PID {:02X} ({}) failed {} times in a row: {}",
                    polled.pid.as_hex(),
                    polled.pid.name(),
                    polled.failures,
                    failure
                );
            } else {
                debug!("PID {:02X} query failed: {}", polled.pid.as_hex(), failure);
            }
        }

        CycleRead {
            reading,
            attempted,
            succeeded,
            link_error,
            duration: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use obd_protocol::{PidResponse, SimulatedAdapter};

    #[tokio::test]
    async fn test_full_cycle_on_simulator() {
        let supported = SimulatedAdapter::full_support();
        let mut adapter = SimulatedAdapter::new("sim0", supported.clone(), None);
        let mut poller = PidPoller::new(&supported, Duration::from_secs(2));
        assert_eq!(poller.pid_count(), Pid::ALL.len());

        let cycle = poller.poll(&mut adapter, "s1").await;
        assert_eq!(cycle.attempted, Pid::ALL.len());
        assert_eq!(cycle.succeeded, Pid::ALL.len());
        assert!(!cycle.is_failure());
        assert_eq!(cycle.reading.session_id, "s1");
        assert!(cycle.reading.rpm.is_some());
    }

    #[tokio::test]
    async fn test_only_supported_pids_are_polled() {
        let supported: BTreeSet<u8> = [0x05, 0x0C].into_iter().collect();
        let mut adapter = SimulatedAdapter::new("sim0", supported.clone(), None);
        let mut poller = PidPoller::new(&supported, Duration::from_secs(2));
        let cycle = poller.poll(&mut adapter, "s1").await;
        assert_eq!(cycle.attempted, 2);
        assert_eq!(cycle.reading.present_count(), 2);
    }

    /// Answers RPM, stalls on coolant and reports no data for the rest
    struct Stalling;

    #[async_trait]
    impl ObdTransport for Stalling {
        fn port(&self) -> &str {
            "stall"
        }
        fn protocol_name(&self) -> &str {
            "test"
        }
        async fn supported_pids(&mut self) -> Result<BTreeSet<u8>, ObdError> {
            Ok(BTreeSet::new())
        }
        async fn query(&mut self, pid: Pid) -> Result<Option<PidResponse>, ObdError> {
            match pid {
                Pid::Rpm => Ok(Some(PidResponse::decode(0x0C, vec![0x0F, 0xA0], 0))),
                Pid::CoolantTemp => std::future::pending().await,
                Pid::Speed => Err(ObdError::VehicleNotConnected),
                _ => Ok(None),
            }
        }
        async fn read_vin(&mut self) -> Result<Option<String>, ObdError> {
            Ok(None)
        }
        async fn close(&mut self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failures_and_link_loss() {
        let supported: BTreeSet<u8> = [0x05, 0x0C].into_iter().collect();
        let mut poller = PidPoller::new(&supported, Duration::from_millis(500));
        let cycle = poller.poll(&mut Stalling, "s").await;
        assert_eq!(cycle.attempted, 2);
        assert_eq!(cycle.succeeded, 1);
        assert_eq!(cycle.reading.rpm, Some(1000.0));
        assert_eq!(cycle.reading.coolant_temp, None);
        assert!(!cycle.is_failure());

        let supported: BTreeSet<u8> = [0x0C, 0x0D, 0x11].into_iter().collect();
        let mut poller = PidPoller::new(&supported, Duration::from_millis(500));
        let cycle = poller.poll(&mut Stalling, "s").await;
        // speed (0x0D) cuts the cycle before throttle
        assert_eq!(cycle.attempted, 2);
        assert!(cycle.link_error.is_some());
        assert!(cycle.is_failure());
    }
}
