//! Per-cycle status line and metrics

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use storage::TelemetryRecord;
use tracing::info;

fn show(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "--".to_string())
}

/// One-line summary of a cycle
pub(crate) fn status_line(cycle: u64, record: &TelemetryRecord, buffered: usize) -> String {
    let reading = &record.reading;
    format!(
        "#{} rpm={} speed={} coolant={} load={} | {} stress={:.1} conf={:.0}% | q={:.0}{} | buf={}",
        cycle,
        show(reading.rpm, 0),
        show(reading.speed, 0),
        show(reading.coolant_temp, 1),
        show(reading.engine_load, 1),
        record.health_state,
        record.stress_score,
        record.confidence,
        record.quality_score,
        if record.low_quality { " (low)" } else { "" },
        buffered,
    )
}

pub(crate) fn report_cycle(cycle: u64, record: &TelemetryRecord, buffered: usize, elapsed: Duration) {
    info!(target: "status", "{}", status_line(cycle, record, buffered));
    counter!("collector_cycles_total").increment(1);
    gauge!("collector_buffer_depth").set(buffered as f64);
    histogram!("collector_cycle_seconds").record(elapsed.as_secs_f64());
    histogram!("collector_quality_score").record(record.quality_score);
}

pub(crate) fn read_error() {
    counter!("collector_cycles_total").increment(1);
    counter!("collector_read_errors_total").increment(1);
}

pub(crate) fn flushed(stored: usize, dropped: usize, buffered: usize) {
    counter!("collector_records_stored_total").increment(stored as u64);
    counter!("collector_records_dropped_total").increment(dropped as u64);
    gauge!("collector_buffer_depth").set(buffered as f64);
}

pub(crate) fn evicted() {
    counter!("collector_records_dropped_total").increment(1);
}

pub(crate) fn reconnected() {
    counter!("collector_reconnects_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use data_validator::QualityScore;
    use feature_engine::FeatureEngineer;
    use inference_engine::{Classification, ClassifierKind, HealthState};
    use obd_protocol::Reading;

    #[test]
    fn test_status_line_marks_missing_and_low_quality() {
        let mut reading = Reading::new("s", Utc::now());
        reading.rpm = Some(812.4);
        reading.coolant_temp = Some(91.34);
        let classification = Classification {
            state: HealthState::Advisory,
            stress_score: 4.0,
            confidence: 100.0,
            probabilities: None,
            top_factors: vec![],
            source: ClassifierKind::RuleEngine,
        };
        let quality = QualityScore {
            score: 22.0,
            success_ratio: 0.2,
            timing_factor: 1.0,
            completeness: 0.1,
            accepted: false,
        };
        let engineer = FeatureEngineer::default();
        let features = engineer.compute(&reading, &engineer.new_state());
        let record = TelemetryRecord::new("v1", reading, features, classification, &quality);
        assert_eq!(
            status_line(7, &record, 3),
            "#7 rpm=812 speed=-- coolant=91.3 load=-- | ADVISORY stress=4.0 conf=100% | q=22 (low) | buf=3"
        );
    }
}
