//! Maintenance outlook for a classified reading

use inference_engine::{Classification, HealthState};
use obd_protocol::Reading;
use serde::{Deserialize, Serialize};

pub const MAX_RECOMMENDATIONS: usize = 3;

/// Coarse failure risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureRisk {
    Low,
    Medium,
    High,
    Critical,
}

/// What a driver should do about the current reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceOutlook {
    pub health_score: u8,
    pub failure_risk: FailureRisk,
    pub days_until_maintenance: u32,
    pub recommended_actions: Vec<String>,
}

impl MaintenanceOutlook {
    pub fn assess(reading: &Reading, classification: &Classification) -> Self {
        let state = classification.state;
        let stress = classification.stress_score;

        let failure_risk = if state == HealthState::Critical {
            FailureRisk::Critical
        } else if stress >= 6.0 {
            FailureRisk::High
        } else if stress >= 3.0 {
            FailureRisk::Medium
        } else {
            FailureRisk::Low
        };

        let days_until_maintenance = if state == HealthState::Critical {
            0
        } else if stress >= 6.0 {
            7
        } else if state == HealthState::Advisory {
            14
        } else {
            30
        };

        let mut actions = Vec::new();
        if reading.coolant_temp.map(|t| t > 100.0).unwrap_or(false) {
            actions.push("Check coolant level".to_string());
        }
        if reading.control_module_voltage.map(|v| v < 12.5).unwrap_or(false) {
            actions.push("Check battery".to_string());
        }
        if let Some(dtc) = reading.dtc_count.filter(|n| *n > 0) {
            actions.push(format!("Scan {} error code(s)", dtc));
        }
        if actions.is_empty() {
            let action = if state == HealthState::Normal {
                "Continue normal operation"
            } else {
                "Schedule maintenance"
            };
            actions.push(action.to_string());
        }
        actions.truncate(MAX_RECOMMENDATIONS);

        Self {
            health_score: state.health_score(),
            failure_risk,
            days_until_maintenance,
            recommended_actions: actions,
        }
    }
}
