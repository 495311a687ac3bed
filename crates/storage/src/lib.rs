//! Storage Layer
//!
//! The collector talks to persistence only through the [`Storage`] trait.
//! Two backends are provided: [`MemoryRepository`] for simulation and tests,
//! and [`RestStorage`] for a PostgREST-style HTTP backend.

mod profile;
mod record;
mod repository;
mod rest;
mod training;

pub use profile::{NewVehicleProfile, VehicleProfile};
pub use record::{TelemetryRecord, RECORD_SCHEMA_VERSION};
pub use repository::{MemoryRepository, Storage};
pub use rest::{RestConfig, RestStorage};
pub use training::{is_training_eligible, CRITICAL_FIELDS, MAX_MISSING_CRITICAL};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::RequestFailed(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}
