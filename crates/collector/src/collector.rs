//! Collection loop state machine

use crate::backoff::Backoff;
use crate::error::CollectorError;
use crate::flush::RecordBuffer;
use crate::identity::{new_session_id, resolve_profile, VehicleIdentity};
use crate::poller::{CycleRead, PidPoller};
use crate::session::{SessionEnd, SessionReport, SessionStats};
use crate::settings::CollectorConfig;
use crate::status;
use alerting::{AlertConfig, AlertManager, MaintenanceOutlook};
use chrono::Utc;
use data_validator::{QualityScorer, Validator};
use feature_engine::{FeatureEngineer, SessionFeatureState};
use inference_engine::HealthClassifier;
use obd_protocol::{Connector, ObdTransport};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{Storage, TelemetryRecord, VehicleProfile};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Disconnected,
    Connecting,
    Identifying,
    Collecting,
    ErrorBackoff,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for CollectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectorState::Disconnected => "DISCONNECTED",
            CollectorState::Connecting => "CONNECTING",
            CollectorState::Identifying => "IDENTIFYING",
            CollectorState::Collecting => "COLLECTING",
            CollectorState::ErrorBackoff => "ERROR_BACKOFF",
            CollectorState::ShuttingDown => "SHUTTING_DOWN",
            CollectorState::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Everything owned by one collection session
struct Session {
    transport: Box<dyn ObdTransport>,
    poller: PidPoller,
    vehicle_id: String,
    session_id: String,
    features: SessionFeatureState,
    buffer: RecordBuffer,
    stats: SessionStats,
    started: Instant,
}

enum Recovery {
    Reconnected,
    Exhausted,
    Stopped,
}

/// Runs one collection session against an adapter.
///
/// The collector is the only owner of the transport and the reading
/// buffer. Other tasks observe it through [`Collector::subscribe`] and stop
/// it through the watch channel handed to [`Collector::run`].
pub struct Collector {
    config: CollectorConfig,
    connector: Arc<dyn Connector>,
    storage: Arc<dyn Storage>,
    classifier: Arc<dyn HealthClassifier>,
    validator: Validator,
    engineer: FeatureEngineer,
    scorer: QualityScorer,
    alerts: AlertManager,
    state_tx: watch::Sender<CollectorState>,
}

impl Collector {
    pub fn new(
        config: CollectorConfig,
        connector: Arc<dyn Connector>,
        storage: Arc<dyn Storage>,
        classifier: Arc<dyn HealthClassifier>,
    ) -> Result<Self, CollectorError> {
        config.validate()?;
        info!(
            "Creating collector: {} candidate port(s), {:?} interval, batch {}, {} classifier",
            config.ports.len(),
            config.poll_interval(),
            config.batch_size,
            classifier.kind().as_str()
        );
        let (state_tx, _) = watch::channel(CollectorState::Disconnected);
        Ok(Self {
            engineer: FeatureEngineer::new(config.feature_config()),
            scorer: QualityScorer::new(config.quality_config()),
            validator: Validator::default(),
            alerts: AlertManager::new(AlertConfig::default()),
            config,
            connector,
            storage,
            classifier,
            state_tx,
        })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<CollectorState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> CollectorState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: CollectorState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Collector state {} -> {}", previous, state);
        }
    }

    /// Run until `stop` turns true or the link is lost for good.
    ///
    /// Returns `Ok(None)` when stopped before a session was established.
    pub async fn run(
        mut self,
        mut stop: watch::Receiver<bool>,
    ) -> Result<Option<SessionReport>, CollectorError> {
        self.set_state(CollectorState::Connecting);
        let mut transport = match self.connect(&mut stop).await {
            Ok(Some(transport)) => transport,
            Ok(None) => {
                info!("Stop requested before an adapter was found");
                self.set_state(CollectorState::Stopped);
                return Ok(None);
            }
            Err(e) => {
                error!("{}", e);
                self.set_state(CollectorState::Disconnected);
                return Err(e);
            }
        };

        self.set_state(CollectorState::Identifying);
        let (profile, supported) = match self.identify(transport.as_mut()).await {
            Ok(identified) => identified,
            Err(e) => {
                error!("{}", e);
                transport.close().await;
                self.set_state(CollectorState::Disconnected);
                return Err(e);
            }
        };

        let session_id = new_session_id(&self.config.session_prefix, Utc::now());
        self.classifier.begin_session();
        info!(
            "Session {} started for {} ({})",
            session_id, profile.display_name, profile.id
        );

        let mut session = Session {
            transport,
            poller: PidPoller::new(&supported, self.config.query_timeout()),
            vehicle_id: profile.id,
            session_id,
            features: self.engineer.new_state(),
            buffer: RecordBuffer::new(self.config.buffer_capacity, self.config.max_flush_attempts),
            stats: SessionStats::default(),
            started: Instant::now(),
        };

        self.set_state(CollectorState::Collecting);
        let end = self.collect(&mut session, &mut stop).await;

        match end {
            SessionEnd::Stopped => self.set_state(CollectorState::ShuttingDown),
            SessionEnd::LinkLost => error!(
                "Adapter link lost after {} reconnect attempt(s), saving buffered readings",
                self.config.max_reconnect_attempts
            ),
        }
        self.flush(&mut session).await;
        if !session.buffer.is_empty() {
            warn!(
                "{} record(s) could not be stored before teardown",
                session.buffer.len()
            );
            session.stats.dropped += session.buffer.len() as u64;
            status::flushed(0, session.buffer.len(), 0);
        }
        session.transport.close().await;
        self.set_state(match end {
            SessionEnd::Stopped => CollectorState::Stopped,
            SessionEnd::LinkLost => CollectorState::Disconnected,
        });

        let report = SessionReport {
            session_id: session.session_id,
            vehicle_id: session.vehicle_id,
            duration: session.started.elapsed(),
            stats: session.stats,
            end,
        };
        info!("{}", report);
        Ok(Some(report))
    }

    /// Try every candidate port, for up to `connect_rounds` rounds
    async fn connect(
        &self,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Option<Box<dyn ObdTransport>>, CollectorError> {
        let rounds = self.config.connect_rounds;
        let mut backoff = Backoff::new(self.config.connect_delay(), self.config.max_connect_delay());
        for round in 1..=rounds {
            if stop_requested(stop) {
                return Ok(None);
            }
            debug!("Connection round {}/{}", round, rounds);
            if let Some(transport) = self.try_ports().await {
                return Ok(Some(transport));
            }
            if round < rounds {
                let delay = backoff.next_delay();
                warn!(
                    "No adapter found (round {}/{}), retrying in {:.1}s",
                    round,
                    rounds,
                    delay.as_secs_f64()
                );
                if !sleep_or_stop(delay, stop).await {
                    return Ok(None);
                }
            }
        }
        Err(CollectorError::ConnectExhausted {
            ports: self.config.ports.len(),
            rounds,
        })
    }

    async fn try_ports(&self) -> Option<Box<dyn ObdTransport>> {
        for port in &self.config.ports {
            match self.connector.connect(port).await {
                Ok(transport) => {
                    info!("Connected on {} using {}", port, transport.protocol_name());
                    return Some(transport);
                }
                Err(e) => debug!("No adapter on {}: {}", port, e),
            }
        }
        None
    }

    async fn identify(
        &self,
        transport: &mut dyn ObdTransport,
    ) -> Result<(VehicleProfile, BTreeSet<u8>), CollectorError> {
        let supported = match transport.supported_pids().await {
            Ok(supported) => supported,
            Err(e) if e.is_link_failure() => return Err(e.into()),
            Err(e) => {
                warn!("Supported PID discovery failed: {}", e);
                BTreeSet::new()
            }
        };
        debug!("{} supported PIDs", supported.len());

        let vin = match transport.read_vin().await {
            Ok(vin) => vin,
            Err(e) => {
                warn!("VIN read failed: {}", e);
                None
            }
        };

        let identity = VehicleIdentity::new(vin.as_deref(), &supported, transport.protocol_name());
        let profile = resolve_profile(self.storage.as_ref(), &identity)
            .await
            .map_err(CollectorError::Identity)?;
        if let Err(e) = self.storage.record_session(&profile.id).await {
            warn!("Failed to count session for {}: {}", profile.id, e);
        }
        Ok((profile, supported))
    }

    /// Poll until stopped or the link cannot be recovered
    async fn collect(&mut self, session: &mut Session, stop: &mut watch::Receiver<bool>) -> SessionEnd {
        let interval = self.config.poll_interval();
        let mut consecutive_errors = 0u32;

        loop {
            if stop_requested(stop) {
                return SessionEnd::Stopped;
            }
            let started = Instant::now();
            session.stats.cycles += 1;

            let cycle = session
                .poller
                .poll(session.transport.as_mut(), &session.session_id)
                .await;

            if cycle.is_failure() {
                consecutive_errors += 1;
                session.stats.read_errors += 1;
                status::read_error();
                warn!(
                    "Read cycle failed ({}/{}): {}",
                    consecutive_errors,
                    self.config.max_consecutive_errors,
                    cycle
                        .link_error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "no data".to_string())
                );
                if consecutive_errors >= self.config.max_consecutive_errors {
                    match self.recover(session, stop).await {
                        Recovery::Reconnected => {
                            consecutive_errors = 0;
                            continue;
                        }
                        Recovery::Exhausted => return SessionEnd::LinkLost,
                        Recovery::Stopped => return SessionEnd::Stopped,
                    }
                }
            } else {
                consecutive_errors = 0;
                self.record(session, cycle, started).await;
            }

            let wait = interval.saturating_sub(started.elapsed());
            if !sleep_or_stop(wait, stop).await {
                return SessionEnd::Stopped;
            }
        }
    }

    /// Validate, enrich, classify and buffer one reading
    async fn record(&mut self, session: &mut Session, cycle: CycleRead, started: Instant) {
        let CycleRead {
            mut reading,
            attempted,
            succeeded,
            duration,
            ..
        } = cycle;

        let validation = self.validator.sanitize(&mut reading);
        if !validation.valid {
            debug!("Nulled {} out-of-range value(s)", validation.rejected());
        }

        let features = self.engineer.process(&reading, &mut session.features);
        let classification = self.classifier.classify(&reading, &features);
        if let Some(alert) = self.alerts.observe(&classification) {
            let outlook = MaintenanceOutlook::assess(&reading, &classification);
            warn!(
                "Vehicle health {} (was {}), stress {:.1}: {} | risk {:?}, maintenance in {} days: {}",
                alert.state,
                alert.previous.map(|s| s.name()).unwrap_or("n/a"),
                alert.stress_score,
                alert.factors.join(", "),
                outlook.failure_risk,
                outlook.days_until_maintenance,
                outlook.recommended_actions.join("; ")
            );
        }

        let quality = self.scorer.score(&reading, attempted, succeeded, duration);
        let stats = &mut session.stats;
        stats.readings += 1;
        if quality.accepted {
            stats.accepted += 1;
        } else {
            stats.low_quality += 1;
        }
        stats.last_state = Some(classification.state);

        let record = TelemetryRecord::new(
            session.vehicle_id.as_str(),
            reading,
            features,
            classification,
            &quality,
        );
        let depth = (session.buffer.len() + 1).min(session.buffer.capacity());
        status::report_cycle(stats.cycles, &record, depth, started.elapsed());

        if session.buffer.push(record) {
            stats.dropped += 1;
            status::evicted();
        }
        if session.buffer.len() >= self.config.batch_size {
            self.flush(session).await;
        }
    }

    async fn flush(&self, session: &mut Session) {
        if session.buffer.is_empty() {
            return;
        }
        let report = session
            .buffer
            .flush(self.storage.as_ref(), &session.vehicle_id, &session.session_id)
            .await;
        session.stats.stored += report.stored as u64;
        session.stats.dropped += report.dropped as u64;
        status::flushed(report.stored, report.dropped, session.buffer.len());
    }

    /// Drop the link and try to get it back, keeping the session
    async fn recover(&self, session: &mut Session, stop: &mut watch::Receiver<bool>) -> Recovery {
        self.set_state(CollectorState::ErrorBackoff);
        session.transport.close().await;

        let attempts = self.config.max_reconnect_attempts;
        let mut backoff = Backoff::new(self.config.connect_delay(), self.config.max_connect_delay());
        while backoff.attempts() < attempts {
            let delay = backoff.next_delay();
            warn!(
                "Reconnecting in {:.1}s (attempt {}/{})",
                delay.as_secs_f64(),
                backoff.attempts(),
                attempts
            );
            if !sleep_or_stop(delay, stop).await {
                return Recovery::Stopped;
            }
            if let Some(transport) = self.try_ports().await {
                session.transport = transport;
                session.stats.reconnects += 1;
                status::reconnected();
                info!("Reconnected, resuming session {}", session.session_id);
                self.set_state(CollectorState::Collecting);
                return Recovery::Reconnected;
            }
        }
        Recovery::Exhausted
    }
}

/// True when a stop was requested or nobody can request one anymore
fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

/// Sleep for `delay` unless a stop arrives first. Returns `false` on stop.
async fn sleep_or_stop(delay: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if stop_requested(stop) {
        return false;
    }
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(CollectorState::ErrorBackoff.to_string(), "ERROR_BACKOFF");
        assert_eq!(CollectorState::ShuttingDown.to_string(), "SHUTTING_DOWN");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_stop() {
        let (tx, mut rx) = watch::channel(false);
        assert!(sleep_or_stop(Duration::from_secs(1), &mut rx).await);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            tx.send(true).ok();
            tx
        });
        let started = tokio::time::Instant::now();
        assert!(!sleep_or_stop(Duration::from_secs(60), &mut rx).await);
        assert!(started.elapsed() < Duration::from_secs(1));
        let _tx = stopper.await.unwrap();
        assert!(stop_requested(&rx));
    }

    #[tokio::test]
    async fn test_dropped_sender_stops() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        assert!(stop_requested(&rx));
        assert!(!sleep_or_stop(Duration::from_secs(60), &mut rx).await);
    }
}
