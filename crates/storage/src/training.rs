//! Training-set admission

use obd_protocol::{Pid, Reading};

/// Fields a training row cannot do without
pub const CRITICAL_FIELDS: [Pid; 6] = [
    Pid::Rpm,
    Pid::Speed,
    Pid::CoolantTemp,
    Pid::EngineLoad,
    Pid::ThrottlePosition,
    Pid::ControlModuleVoltage,
];

/// Most critical fields a training row may be missing
pub const MAX_MISSING_CRITICAL: usize = 2;

/// A reading goes to training when its quality was accepted and it is
/// missing at most two critical fields.
pub fn is_training_eligible(reading: &Reading, quality_accepted: bool) -> bool {
    if !quality_accepted {
        return false;
    }
    let missing = CRITICAL_FIELDS
        .iter()
        .filter(|pid| !reading.has(**pid))
        .count();
    missing <= MAX_MISSING_CRITICAL
}
