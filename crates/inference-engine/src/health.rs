//! Health states and classification results

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordinal vehicle health, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    Normal = 0,
    Advisory = 1,
    Warning = 2,
    Critical = 3,
}

impl HealthState {
    pub const ALL: [HealthState; 4] = [
        HealthState::Normal,
        HealthState::Advisory,
        HealthState::Warning,
        HealthState::Critical,
    ];

    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            HealthState::Normal => "NORMAL",
            HealthState::Advisory => "ADVISORY",
            HealthState::Warning => "WARNING",
            HealthState::Critical => "CRITICAL",
        }
    }

    /// Nominal health score shown to drivers (0-100, higher is healthier)
    pub fn health_score(&self) -> u8 {
        match self {
            HealthState::Normal => 95,
            HealthState::Advisory => 70,
            HealthState::Warning => 45,
            HealthState::Critical => 20,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which strategy produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    RuleEngine,
    TrainedModel,
}

impl ClassifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierKind::RuleEngine => "rule_engine",
            ClassifierKind::TrainedModel => "trained_model",
        }
    }
}

/// Result of classifying one reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub state: HealthState,
    /// Rule engine: integer factor sum (15 on a hard threshold).
    /// Trained model: expected severity scaled onto 0-15.
    pub stress_score: f64,
    /// 0-100
    pub confidence: f64,
    /// Per-class probabilities, indexed by ordinal (trained model only)
    pub probabilities: Option<[f64; 4]>,
    /// Human-readable factors that drove the result
    pub top_factors: Vec<String>,
    pub source: ClassifierKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_follows_severity() {
        assert!(HealthState::Normal < HealthState::Advisory);
        assert!(HealthState::Advisory < HealthState::Warning);
        assert!(HealthState::Warning < HealthState::Critical);
    }

    #[test]
    fn test_ordinal_round_trip() {
        for state in HealthState::ALL {
            assert_eq!(HealthState::from_ordinal(state.ordinal()), Some(state));
        }
        assert_eq!(HealthState::from_ordinal(4), None);
        assert_eq!(HealthState::Warning.to_string(), "WARNING");
    }
}
