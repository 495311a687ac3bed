//! Alerting System
//!
//! Raises alerts when a vehicle's classified health moves into WARNING or
//! CRITICAL, with per-state cooldown and an hourly cap, and derives the
//! maintenance outlook shown next to each classification.

mod manager;
mod outlook;

pub use manager::{Alert, AlertConfig, AlertManager, AlertState};
pub use outlook::{FailureRisk, MaintenanceOutlook, MAX_RECOMMENDATIONS};
