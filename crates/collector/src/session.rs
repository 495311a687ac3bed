//! Session statistics and the teardown report

use crate::error::CollectorError;
use inference_engine::HealthState;
use std::fmt;
use std::time::Duration;

/// Counters for one collection session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    /// Poll cycles started
    pub cycles: u64,
    /// Cycles that produced a reading
    pub readings: u64,
    /// Readings at or above the quality threshold
    pub accepted: u64,
    pub low_quality: u64,
    pub stored: u64,
    pub dropped: u64,
    /// Failed cycles
    pub read_errors: u64,
    pub reconnects: u32,
    pub last_state: Option<HealthState>,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Stop was requested
    Stopped,
    /// Reconnect attempts ran out
    LinkLost,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    pub vehicle_id: String,
    pub duration: Duration,
    pub stats: SessionStats,
    pub end: SessionEnd,
}

impl SessionReport {
    /// Turn a lost link into the operator-facing error
    pub fn into_result(self, reconnect_attempts: u32) -> Result<SessionReport, CollectorError> {
        match self.end {
            SessionEnd::Stopped => Ok(self),
            SessionEnd::LinkLost => Err(CollectorError::ReconnectExhausted {
                session_id: self.session_id,
                attempts: reconnect_attempts,
            }),
        }
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        write!(
            f,
            "session {} ({}) ran {:.1}s: {} cycles, {} readings ({} accepted, {} low quality), \
             {} stored, {} dropped, {} errors, {} reconnects, last state {}",
            self.session_id,
            match self.end {
                SessionEnd::Stopped => "stopped",
                SessionEnd::LinkLost => "link lost",
            },
            self.duration.as_secs_f64(),
            s.cycles,
            s.readings,
            s.accepted,
            s.low_quality,
            s.stored,
            s.dropped,
            s.read_errors,
            s.reconnects,
            s.last_state.map(|h| h.name()).unwrap_or("n/a"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(end: SessionEnd) -> SessionReport {
        SessionReport {
            session_id: "obd_20260101_120000_abcdef12".to_string(),
            vehicle_id: "v1".to_string(),
            duration: Duration::from_secs(12),
            stats: SessionStats {
                cycles: 12,
                readings: 11,
                accepted: 10,
                low_quality: 1,
                stored: 10,
                read_errors: 1,
                last_state: Some(HealthState::Advisory),
                ..Default::default()
            },
            end,
        }
    }

    #[test]
    fn test_display() {
        let line = report(SessionEnd::Stopped).to_string();
        assert!(line.contains("12 cycles"));
        assert!(line.contains("10 stored"));
        assert!(line.contains("last state ADVISORY"));
    }

    #[test]
    fn test_link_lost_is_an_error() {
        assert!(report(SessionEnd::Stopped).into_result(3).is_ok());
        let err = report(SessionEnd::LinkLost).into_result(3).unwrap_err();
        assert!(matches!(err, CollectorError::ReconnectExhausted { attempts: 3, .. }));
    }
}
