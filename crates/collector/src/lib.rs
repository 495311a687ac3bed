//! OBD-II Telemetry Collector
//!
//! Runs the collection loop: connect to an adapter, resolve the vehicle,
//! then poll, classify, score and batch readings into storage until told
//! to stop or the link is lost for good.
//!
//! ```text
//! DISCONNECTED -> CONNECTING -> IDENTIFYING -> COLLECTING <-> ERROR_BACKOFF
//!                                                  |
//!                                            SHUTTING_DOWN -> STOPPED
//! ```

mod backoff;
mod collector;
mod error;
mod flush;
mod handle;
mod identity;
mod poller;
mod session;
mod settings;
mod status;

pub use backoff::Backoff;
pub use collector::{Collector, CollectorState};
pub use error::CollectorError;
pub use flush::{FlushReport, PendingRecord, RecordBuffer};
pub use handle::CollectorHandle;
pub use identity::{
    decode_vin, ecu_signature, is_valid_vin, manufacturer, new_session_id, resolve_profile,
    VehicleIdentity, VinInfo,
};
pub use poller::{CycleRead, PidPoller, PolledPid};
pub use session::{SessionEnd, SessionReport, SessionStats};
pub use settings::{CollectorConfig, StorageBackend};

use std::sync::Arc;
use storage::{MemoryRepository, RestStorage, Storage};

/// Build the storage backend named in the configuration
pub fn storage_from_config(config: &CollectorConfig) -> Result<Arc<dyn Storage>, CollectorError> {
    match &config.storage {
        StorageBackend::Memory => Ok(Arc::new(MemoryRepository::new())),
        StorageBackend::Rest(rest) => Ok(Arc::new(RestStorage::new(rest)?)),
    }
}
