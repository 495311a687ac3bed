//! Collector configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file, then `OBD_COLLECTOR__*` environment variables
//! (e.g. `OBD_COLLECTOR__BATCH_SIZE=20`, `OBD_COLLECTOR__STORAGE__URL=...`,
//! `OBD_COLLECTOR__PORTS=/dev/ttyUSB0,/dev/rfcomm0`).

use crate::error::CollectorError;
use config::{Config, Environment, File};
use data_validator::QualityConfig;
use feature_engine::FeatureConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use storage::RestConfig;
use tracing::info;

const ENV_PREFIX: &str = "OBD_COLLECTOR";

/// Where classified records go
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local store, lost on exit
    #[default]
    Memory,
    /// PostgREST-style HTTP backend
    Rest(RestConfig),
}

/// Collection loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Adapter device paths, tried in order
    pub ports: Vec<String>,
    pub baud_rate: u32,
    /// Per-query timeout (ms)
    pub query_timeout_ms: u64,
    /// Target poll cycle period (seconds)
    pub poll_interval_secs: f64,
    /// Buffered records that trigger a flush
    pub batch_size: usize,
    /// Bound on buffered records; the oldest are dropped beyond it
    pub buffer_capacity: usize,
    /// Quality (0..1) below which readings are flagged low-quality
    pub quality_threshold: f64,
    /// Consecutive failed cycles before reconnecting
    pub max_consecutive_errors: u32,
    /// Full passes over `ports` when first connecting
    pub connect_rounds: u32,
    /// Delay before the second connect round (seconds); grows ×1.5
    pub connect_delay_secs: f64,
    pub max_connect_delay_secs: f64,
    /// Reconnect passes before the session is abandoned
    pub max_reconnect_attempts: u32,
    /// Flush attempts per record before it is dropped
    pub max_flush_attempts: u32,
    /// Time allowed for a graceful stop (seconds)
    pub shutdown_grace_secs: f64,
    pub high_rpm_threshold: f64,
    /// Prefix of generated session ids
    pub session_prefix: String,
    /// Directory holding `model_metadata.json`; rule engine when unset
    pub model_dir: Option<PathBuf>,
    pub storage: StorageBackend,
    /// Prometheus exporter listen address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            ports: vec![
                "/dev/rfcomm0".to_string(),
                "/dev/ttyUSB0".to_string(),
                "/dev/ttyUSB1".to_string(),
                "/dev/ttyACM0".to_string(),
                "/dev/ttyACM1".to_string(),
            ],
            baud_rate: 38_400,
            query_timeout_ms: 2_000,
            poll_interval_secs: 1.0,
            batch_size: 10,
            buffer_capacity: 100,
            quality_threshold: 0.3,
            max_consecutive_errors: 5,
            connect_rounds: 3,
            connect_delay_secs: 5.0,
            max_connect_delay_secs: 30.0,
            max_reconnect_attempts: 3,
            max_flush_attempts: 3,
            shutdown_grace_secs: 5.0,
            high_rpm_threshold: 3000.0,
            session_prefix: "obd".to_string(),
            model_dir: None,
            storage: StorageBackend::Memory,
            metrics_addr: None,
        }
    }
}

impl CollectorConfig {
    /// Defaults, then `path` (if any), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, CollectorError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("ports")
                    .try_parsing(true),
            )
            .build()?;

        let config: CollectorConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CollectorError> {
        let invalid = |msg: String| Err(CollectorError::Config(msg));
        if self.ports.is_empty() {
            return invalid("no adapter ports configured".to_string());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".to_string());
        }
        if self.buffer_capacity == 0 {
            return invalid("buffer_capacity must be at least 1".to_string());
        }
        if self.buffer_capacity < self.batch_size {
            return invalid(format!(
                "buffer_capacity {} is smaller than batch_size {}",
                self.buffer_capacity, self.batch_size
            ));
        }
        if !(self.poll_interval_secs > 0.0 && self.poll_interval_secs.is_finite()) {
            return invalid(format!("poll_interval_secs must be positive, got {}", self.poll_interval_secs));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return invalid(format!("quality_threshold must be in [0, 1], got {}", self.quality_threshold));
        }
        let secs = [
            ("connect_delay_secs", self.connect_delay_secs),
            ("max_connect_delay_secs", self.max_connect_delay_secs),
            ("shutdown_grace_secs", self.shutdown_grace_secs),
        ];
        for (name, value) in secs {
            if !(value >= 0.0 && value.is_finite()) {
                return invalid(format!("{} must be non-negative, got {}", name, value));
            }
        }
        if self.connect_rounds == 0 {
            return invalid("connect_rounds must be at least 1".to_string());
        }
        if self.max_flush_attempts == 0 {
            return invalid("max_flush_attempts must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_secs_f64(self.connect_delay_secs)
    }

    pub fn max_connect_delay(&self) -> Duration {
        Duration::from_secs_f64(self.max_connect_delay_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs_f64(self.shutdown_grace_secs)
    }

    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig::with_high_rpm_threshold(self.high_rpm_threshold)
    }

    pub fn quality_config(&self) -> QualityConfig {
        QualityConfig::with_threshold(self.quality_threshold)
    }
}
