//! Reading Quality Scoring
//!
//! `quality = 0.6 * success_ratio + 0.2 * timing_factor + 0.2 * completeness`
//! on a 0..1 scale, reported as 0..100.

use obd_protocol::{Pid, Reading};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Quality scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum quality (0..1) for a reading to be training-eligible
    pub acceptance_threshold: f64,
    /// Read durations up to this many seconds get full timing credit
    pub expected_read_secs: f64,
    /// Number of parameters a fully supported vehicle could report
    pub total_parameters: usize,
    pub success_weight: f64,
    pub timing_weight: f64,
    pub completeness_weight: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.3,
            expected_read_secs: 2.0,
            total_parameters: Pid::ALL.len(),
            success_weight: 0.6,
            timing_weight: 0.2,
            completeness_weight: 0.2,
        }
    }
}

impl QualityConfig {
    /// Default weights with a different acceptance threshold
    pub fn with_threshold(acceptance_threshold: f64) -> Self {
        Self {
            acceptance_threshold,
            ..Default::default()
        }
    }
}

/// Quality of one reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// Overall score, 0..100
    pub score: f64,
    pub success_ratio: f64,
    pub timing_factor: f64,
    pub completeness: f64,
    /// Score met the acceptance threshold
    pub accepted: bool,
}

/// Scores readings against a [`QualityConfig`]
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Score a reading.
    ///
    /// `succeeded` is capped by the fields still present on the reading, so
    /// values nulled by validation count as failures.
    pub fn score(
        &self,
        reading: &Reading,
        attempted: usize,
        succeeded: usize,
        read_duration: Duration,
    ) -> QualityScore {
        let succeeded = succeeded.min(reading.present_count()).min(attempted);
        self.score_counts(attempted, succeeded, read_duration)
    }

    /// Score from raw counters
    pub fn score_counts(
        &self,
        attempted: usize,
        succeeded: usize,
        read_duration: Duration,
    ) -> QualityScore {
        let cfg = &self.config;

        let success_ratio = if attempted > 0 {
            succeeded as f64 / attempted as f64
        } else {
            0.0
        };

        let secs = read_duration.as_secs_f64().max(0.1);
        let timing_factor = (cfg.expected_read_secs / secs).min(1.0);

        let completeness = if cfg.total_parameters > 0 {
            (succeeded as f64 / cfg.total_parameters as f64).min(1.0)
        } else {
            0.0
        };

        let quality = cfg.success_weight * success_ratio
            + cfg.timing_weight * timing_factor
            + cfg.completeness_weight * completeness;
        let quality = quality.clamp(0.0, 1.0);

        QualityScore {
            score: quality * 100.0,
            success_ratio,
            timing_factor,
            completeness,
            accepted: quality >= cfg.acceptance_threshold,
        }
    }
}
