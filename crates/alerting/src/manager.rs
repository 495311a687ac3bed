//! Alert Manager Implementation

use inference_engine::{Classification, HealthState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Lowest state that raises an alert
    pub min_state: HealthState,
    /// Minimum classification confidence (0-100)
    pub min_confidence: f64,
    /// Cooldown between alerts for the same state (seconds)
    pub cooldown_seconds: u64,
    /// Maximum alerts per hour before throttling
    pub max_alerts_per_hour: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            min_state: HealthState::Warning,
            min_confidence: 60.0,
            cooldown_seconds: 1800, // 30 minutes
            max_alerts_per_hour: 10,
        }
    }
}

/// State of one alert kind
#[derive(Debug, Clone)]
pub struct AlertState {
    /// Last time this alert was fired
    pub last_fired: Instant,
    /// Number of times fired
    pub fire_count: usize,
    /// Whether alert is acknowledged
    pub acknowledged: bool,
}

/// An alert raised for a health transition
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub state: HealthState,
    pub previous: Option<HealthState>,
    pub stress_score: f64,
    pub confidence: f64,
    pub factors: Vec<String>,
}

/// Turns the classification stream into deduplicated alerts
pub struct AlertManager {
    config: AlertConfig,
    states: HashMap<HealthState, AlertState>,
    /// State of the previous classification
    last_state: Option<HealthState>,
    hourly_count: usize,
    hour_start: Instant,
}

impl AlertManager {
    pub fn new(config: AlertConfig) -> Self {
        info!("Creating alert manager with config: {:?}", config);
        Self {
            config,
            states: HashMap::new(),
            last_state: None,
            hourly_count: 0,
            hour_start: Instant::now(),
        }
    }

    /// Feed one classification; returns an alert when one should be raised
    pub fn observe(&mut self, classification: &Classification) -> Option<Alert> {
        let previous = self.last_state.replace(classification.state);
        let state = classification.state;

        if state < self.config.min_state || previous == Some(state) {
            return None;
        }
        if !self.should_fire(state, classification.confidence) {
            return None;
        }
        self.record_fire(state);
        let alert = Alert {
            state,
            previous,
            stress_score: classification.stress_score,
            confidence: classification.confidence,
            factors: classification.top_factors.clone(),
        };
        debug!(
            "Alert raised: {} (was {}), stress {:.1}: {}",
            state,
            previous.map(|p| p.name()).unwrap_or("unknown"),
            alert.stress_score,
            alert.factors.join(", ")
        );
        Some(alert)
    }

    /// Check confidence, hourly throttle and per-state cooldown
    pub fn should_fire(&mut self, state: HealthState, confidence: f64) -> bool {
        if confidence < self.config.min_confidence {
            debug!(
                "Alert suppressed: confidence {} < threshold {}",
                confidence, self.config.min_confidence
            );
            return false;
        }

        // Reset hourly counter if needed
        if self.hour_start.elapsed() > Duration::from_secs(3600) {
            self.hourly_count = 0;
            self.hour_start = Instant::now();
        }

        if self.hourly_count >= self.config.max_alerts_per_hour {
            warn!("Alert throttled: max alerts per hour reached");
            return false;
        }

        if let Some(entry) = self.states.get(&state) {
            let cooldown = Duration::from_secs(self.config.cooldown_seconds);
            if entry.last_fired.elapsed() < cooldown {
                debug!("{} alert suppressed: in cooldown period", state);
                return false;
            }
        }

        true
    }

    fn record_fire(&mut self, state: HealthState) {
        self.hourly_count += 1;
        let entry = self.states.entry(state).or_insert(AlertState {
            last_fired: Instant::now(),
            fire_count: 0,
            acknowledged: false,
        });
        entry.last_fired = Instant::now();
        entry.fire_count += 1;
        entry.acknowledged = false;
    }

    pub fn acknowledge(&mut self, state: HealthState) -> bool {
        if let Some(entry) = self.states.get_mut(&state) {
            entry.acknowledged = true;
            info!("Alert acknowledged: {}", state);
            true
        } else {
            false
        }
    }

    /// Unacknowledged alert kinds
    pub fn pending(&self) -> Vec<(HealthState, &AlertState)> {
        self.states
            .iter()
            .filter(|(_, entry)| !entry.acknowledged)
            .map(|(k, v)| (*k, v))
            .collect()
    }

    pub fn hourly_count(&self) -> usize {
        self.hourly_count
    }

    /// Forget history, e.g. when a new session starts
    pub fn clear(&mut self) {
        self.states.clear();
        self.last_state = None;
        self.hourly_count = 0;
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}
