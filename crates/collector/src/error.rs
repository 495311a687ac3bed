//! Collector errors

use obd_protocol::ObdError;
use std::time::Duration;
use storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("No adapter answered on {ports} port(s) after {rounds} round(s)")]
    ConnectExhausted { ports: usize, rounds: u32 },

    #[error("Link to the adapter lost in session {session_id} after {attempts} reconnect attempt(s)")]
    ReconnectExhausted { session_id: String, attempts: u32 },

    #[error("Vehicle identity resolution failed: {0}")]
    Identity(#[source] StorageError),

    #[error("Adapter error: {0}")]
    Obd(#[from] ObdError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Collector did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Collector task failed: {0}")]
    TaskFailed(String),
}

impl From<config::ConfigError> for CollectorError {
    fn from(err: config::ConfigError) -> Self {
        CollectorError::Config(err.to_string())
    }
}
