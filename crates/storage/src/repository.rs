//! Storage trait and in-memory repository

use crate::profile::{NewVehicleProfile, VehicleProfile};
use crate::record::TelemetryRecord;
use crate::StorageError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Persistence collaborator of the collection loop.
///
/// Every call is a fallible remote operation with no latency guarantee.
/// Counter updates (`record_session`, `add_records`) are atomic on the
/// backend side.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Profile whose VIN or ECU signature equals `identifier`
    async fn find_vehicle(&self, identifier: &str) -> Result<Option<VehicleProfile>, StorageError>;

    async fn create_vehicle(&self, profile: NewVehicleProfile) -> Result<VehicleProfile, StorageError>;

    /// Re-key an existing profile onto a newly learned VIN
    async fn promote_identifier(
        &self,
        vehicle_id: &str,
        update: &NewVehicleProfile,
    ) -> Result<VehicleProfile, StorageError>;

    /// Count a new session and touch `last_used`
    async fn record_session(&self, vehicle_id: &str) -> Result<(), StorageError>;

    /// Add to `total_records` and touch `last_used`
    async fn add_records(&self, vehicle_id: &str, count: u64) -> Result<(), StorageError>;

    /// Store a batch. All or nothing: returns the number stored.
    async fn insert_batch(
        &self,
        vehicle_id: &str,
        session_id: &str,
        records: &[TelemetryRecord],
    ) -> Result<usize, StorageError>;

    /// Replace the vehicle's "current reading" pointer
    async fn upsert_latest(&self, vehicle_id: &str, record: &TelemetryRecord) -> Result<(), StorageError>;

    /// Most recent first
    async fn get_recent(&self, vehicle_id: &str, limit: usize) -> Result<Vec<TelemetryRecord>, StorageError>;

    async fn find_or_create_vehicle(
        &self,
        identifier: &str,
        profile: NewVehicleProfile,
    ) -> Result<VehicleProfile, StorageError> {
        match self.find_vehicle(identifier).await? {
            Some(existing) => Ok(existing),
            None => self.create_vehicle(profile).await,
        }
    }
}

/// Process-local storage used for simulation and tests
pub struct MemoryRepository {
    vehicles: Mutex<Vec<VehicleProfile>>,
    /// Per-vehicle records, oldest first
    records: Mutex<HashMap<String, VecDeque<TelemetryRecord>>>,
    latest: Mutex<HashMap<String, TelemetryRecord>>,
    /// Per-vehicle retention
    max_records: usize,
}

fn locked<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex.lock().map_err(|e| StorageError::Lock(e.to_string()))
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::with_retention(100_000)
    }

    pub fn with_retention(max_records: usize) -> Self {
        info!("Creating in-memory repository (retention {} records per vehicle)", max_records);
        Self {
            vehicles: Mutex::new(Vec::new()),
            records: Mutex::new(HashMap::new()),
            latest: Mutex::new(HashMap::new()),
            max_records: max_records.max(1),
        }
    }

    /// Stored record count for a vehicle
    pub fn record_count(&self, vehicle_id: &str) -> usize {
        self.records
            .lock()
            .map(|r| r.get(vehicle_id).map(VecDeque::len).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn vehicle(&self, vehicle_id: &str) -> Option<VehicleProfile> {
        self.vehicles
            .lock()
            .ok()?
            .iter()
            .find(|v| v.id == vehicle_id)
            .cloned()
    }

    pub fn latest(&self, vehicle_id: &str) -> Option<TelemetryRecord> {
        self.latest.lock().ok()?.get(vehicle_id).cloned()
    }

    fn update_vehicle<F>(&self, vehicle_id: &str, update: F) -> Result<VehicleProfile, StorageError>
    where
        F: FnOnce(&mut VehicleProfile),
    {
        let mut vehicles = locked(&self.vehicles)?;
        let vehicle = vehicles
            .iter_mut()
            .find(|v| v.id == vehicle_id)
            .ok_or_else(|| StorageError::NotFound(vehicle_id.to_string()))?;
        update(vehicle);
        Ok(vehicle.clone())
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryRepository {
    async fn find_vehicle(&self, identifier: &str) -> Result<Option<VehicleProfile>, StorageError> {
        let vehicles = locked(&self.vehicles)?;
        // a VIN match beats a signature match
        let found = vehicles
            .iter()
            .find(|v| v.car_identifier == identifier)
            .or_else(|| vehicles.iter().find(|v| v.matches(identifier)))
            .cloned();
        Ok(found)
    }

    async fn create_vehicle(&self, profile: NewVehicleProfile) -> Result<VehicleProfile, StorageError> {
        let created = VehicleProfile::create(Uuid::new_v4().to_string(), profile, Utc::now());
        locked(&self.vehicles)?.push(created.clone());
        info!("Created vehicle profile {} ({})", created.id, created.display_name);
        Ok(created)
    }

    async fn promote_identifier(
        &self,
        vehicle_id: &str,
        update: &NewVehicleProfile,
    ) -> Result<VehicleProfile, StorageError> {
        self.update_vehicle(vehicle_id, |v| v.promote(update))
    }

    async fn record_session(&self, vehicle_id: &str) -> Result<(), StorageError> {
        self.update_vehicle(vehicle_id, |v| {
            v.total_sessions += 1;
            v.last_used = Utc::now();
        })
        .map(|_| ())
    }

    async fn add_records(&self, vehicle_id: &str, count: u64) -> Result<(), StorageError> {
        self.update_vehicle(vehicle_id, |v| {
            v.total_records += count;
            v.last_used = Utc::now();
        })
        .map(|_| ())
    }

    async fn insert_batch(
        &self,
        vehicle_id: &str,
        session_id: &str,
        records: &[TelemetryRecord],
    ) -> Result<usize, StorageError> {
        let mut all = locked(&self.records)?;
        let log = all.entry(vehicle_id.to_string()).or_default();
        for record in records {
            // Enforce retention
            while log.len() >= self.max_records {
                log.pop_front();
            }
            log.push_back(record.clone());
        }
        debug!(
            "Stored {} records for vehicle {} session {}",
            records.len(),
            vehicle_id,
            session_id
        );
        Ok(records.len())
    }

    async fn upsert_latest(&self, vehicle_id: &str, record: &TelemetryRecord) -> Result<(), StorageError> {
        locked(&self.latest)?.insert(vehicle_id.to_string(), record.clone());
        Ok(())
    }

    async fn get_recent(&self, vehicle_id: &str, limit: usize) -> Result<Vec<TelemetryRecord>, StorageError> {
        let all = locked(&self.records)?;
        Ok(all
            .get(vehicle_id)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample_record;

    fn new_profile(identifier: &str) -> NewVehicleProfile {
        NewVehicleProfile {
            car_identifier: identifier.to_string(),
            ecu_signature: Some(identifier.to_string()),
            display_name: format!("Vehicle {}", &identifier[..8]),
            make: None,
            model: None,
            year: None,
            fuel_type: "Gasoline".to_string(),
        }
    }

    #[tokio::test]
    async fn test_find_or_create_is_stable() {
        let repo = MemoryRepository::new();
        let sig = "0123456789abcdef0123456789abcdef";
        let first = repo.find_or_create_vehicle(sig, new_profile(sig)).await.unwrap();
        let second = repo.find_or_create_vehicle(sig, new_profile(sig)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(repo.vehicle_count(), 1);
    }

    #[tokio::test]
    async fn test_promoted_profile_is_found_by_signature() {
        let repo = MemoryRepository::new();
        let sig = "0123456789abcdef0123456789abcdef";
        let created = repo.create_vehicle(new_profile(sig)).await.unwrap();

        let mut update = new_profile(sig);
        update.car_identifier = "1HGCM82633A004352".to_string();
        update.make = Some("Honda".to_string());
        update.display_name = "Honda-2003".to_string();
        let promoted = repo.promote_identifier(&created.id, &update).await.unwrap();
        assert_eq!(promoted.car_identifier, "1HGCM82633A004352");

        let by_vin = repo.find_vehicle("1HGCM82633A004352").await.unwrap().unwrap();
        let by_sig = repo.find_vehicle(sig).await.unwrap().unwrap();
        assert_eq!(by_vin.id, created.id);
        assert_eq!(by_sig.id, created.id);
        assert_eq!(by_sig.make.as_deref(), Some("Honda"));
    }

    #[tokio::test]
    async fn test_counters() {
        let repo = MemoryRepository::new();
        let sig = "0123456789abcdef0123456789abcdef";
        let v = repo.create_vehicle(new_profile(sig)).await.unwrap();
        repo.record_session(&v.id).await.unwrap();
        repo.add_records(&v.id, 10).await.unwrap();
        repo.add_records(&v.id, 5).await.unwrap();
        let v = repo.vehicle(&v.id).unwrap();
        assert_eq!(v.total_sessions, 1);
        assert_eq!(v.total_records, 15);

        assert!(matches!(
            repo.record_session("missing").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let repo = MemoryRepository::new();
        let batch: Vec<_> = [90.0, 91.0, 92.0]
            .iter()
            .map(|t| sample_record("veh", *t))
            .collect();
        assert_eq!(repo.insert_batch("veh", "sess", &batch).await.unwrap(), 3);

        let recent = repo.get_recent("veh", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].reading.coolant_temp, Some(92.0));
        assert_eq!(recent[1].reading.coolant_temp, Some(91.0));
        assert!(repo.get_recent("other", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retention_limit() {
        let repo = MemoryRepository::with_retention(5);
        let batch: Vec<_> = (0..10).map(|i| sample_record("veh", 80.0 + i as f64)).collect();
        repo.insert_batch("veh", "sess", &batch).await.unwrap();
        assert_eq!(repo.record_count("veh"), 5);
        let recent = repo.get_recent("veh", 1).await.unwrap();
        assert_eq!(recent[0].reading.coolant_temp, Some(89.0));
    }

    #[tokio::test]
    async fn test_upsert_latest_replaces() {
        let repo = MemoryRepository::new();
        repo.upsert_latest("veh", &sample_record("veh", 90.0)).await.unwrap();
        repo.upsert_latest("veh", &sample_record("veh", 95.0)).await.unwrap();
        assert_eq!(repo.latest("veh").unwrap().reading.coolant_temp, Some(95.0));
    }
}
