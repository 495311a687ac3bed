//! Session-scoped feature state

use crate::config::FeatureConfig;
use chrono::{DateTime, Utc};
use obd_protocol::Reading;
use ring_buffer::RingBuffer;

/// Coolant temperature and when it was sampled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureSample {
    pub celsius: f64,
    pub at: DateTime<Utc>,
}

/// State carried between readings of one collection run.
///
/// A fresh state is created for every session; nothing here survives a
/// loop restart.
#[derive(Debug, Clone)]
pub struct SessionFeatureState {
    previous_temp: Option<TemperatureSample>,
    temp_history: RingBuffer<f64>,
    rpm_history: RingBuffer<f64>,
    load_history: RingBuffer<f64>,
}

impl SessionFeatureState {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            previous_temp: None,
            temp_history: RingBuffer::new(config.history_capacity),
            rpm_history: RingBuffer::new(config.history_capacity),
            load_history: RingBuffer::new(config.history_capacity),
        }
    }

    /// Last coolant sample seen this session
    pub fn previous_temp(&self) -> Option<TemperatureSample> {
        self.previous_temp
    }

    /// Seed the previous coolant sample directly
    pub fn with_previous_temp(mut self, sample: TemperatureSample) -> Self {
        self.previous_temp = Some(sample);
        self
    }

    pub fn temp_history(&self) -> &RingBuffer<f64> {
        &self.temp_history
    }

    pub fn rpm_history(&self) -> &RingBuffer<f64> {
        &self.rpm_history
    }

    pub fn load_history(&self) -> &RingBuffer<f64> {
        &self.load_history
    }

    /// Fold a reading into the state once its features have been computed
    pub fn observe(&mut self, reading: &Reading) {
        if let Some(celsius) = reading.coolant_temp {
            self.previous_temp = Some(TemperatureSample {
                celsius,
                at: reading.timestamp,
            });
            self.temp_history.push(celsius);
        }
        if let Some(rpm) = reading.rpm {
            self.rpm_history.push(rpm);
        }
        if let Some(load) = reading.engine_load {
            self.load_history.push(load);
        }
    }
}

impl Default for SessionFeatureState {
    fn default() -> Self {
        Self::new(&FeatureConfig::default())
    }
}
