//! Bounded reading buffer and batch flush

use ring_buffer::RingBuffer;
use std::slice;
use storage::{Storage, TelemetryRecord};
use tracing::{debug, info, warn};

/// A buffered record and how many flushes it has already failed
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub record: TelemetryRecord,
    pub attempts: u32,
}

/// Outcome of one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records accepted by storage
    pub stored: usize,
    /// Records that failed and were put back in the buffer
    pub requeued: usize,
    /// Records given up on, including any evicted by requeueing
    pub dropped: usize,
}

/// Readings waiting for storage, in acquisition order.
///
/// The buffer is bounded: pushing into a full buffer evicts the oldest
/// record, which counts as dropped.
pub struct RecordBuffer {
    pending: RingBuffer<PendingRecord>,
    max_attempts: u32,
    dropped: u64,
}

impl RecordBuffer {
    pub fn new(capacity: usize, max_attempts: u32) -> Self {
        Self {
            pending: RingBuffer::new(capacity),
            max_attempts: max_attempts.max(1),
            dropped: 0,
        }
    }

    /// Append a record. Returns `true` if the oldest record was evicted.
    pub fn push(&mut self, record: TelemetryRecord) -> bool {
        self.requeue(PendingRecord { record, attempts: 0 })
    }

    fn requeue(&mut self, pending: PendingRecord) -> bool {
        match self.pending.push(pending) {
            Some(evicted) => {
                self.dropped += 1;
                warn!(
                    "Reading buffer full, dropped record from {}",
                    evicted.record.reading.timestamp
                );
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.pending.capacity()
    }

    /// Records lost over the buffer's lifetime
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Write everything buffered to storage.
    ///
    /// The batch is inserted whole and retried once whole. If both fail,
    /// records are inserted one at a time so a single bad record cannot
    /// block the rest; failures go back into the buffer until they have
    /// used up their attempts.
    pub async fn flush(
        &mut self,
        storage: &dyn Storage,
        vehicle_id: &str,
        session_id: &str,
    ) -> FlushReport {
        let mut report = FlushReport::default();
        let batch = self.pending.drain();
        if batch.is_empty() {
            return report;
        }

        let records: Vec<TelemetryRecord> = batch.iter().map(|p| p.record.clone()).collect();
        let mut last_stored = None;

        match insert_with_retry(storage, vehicle_id, session_id, &records).await {
            Some(stored) => {
                report.stored = stored;
                last_stored = records.last();
            }
            None => {
                for (pending, record) in batch.into_iter().zip(&records) {
                    match storage
                        .insert_batch(vehicle_id, session_id, slice::from_ref(record))
                        .await
                    {
                        Ok(n) => {
                            report.stored += n;
                            last_stored = Some(record);
                        }
                        Err(e) => {
                            let attempts = pending.attempts + 1;
                            if attempts >= self.max_attempts {
                                warn!(
                                    "Dropping record from {} after {} failed flushes: {}",
                                    record.reading.timestamp, attempts, e
                                );
                                self.dropped += 1;
                                report.dropped += 1;
                            } else {
                                debug!("Record insert failed, requeueing: {}", e);
                                report.requeued += 1;
                                if self.requeue(PendingRecord { attempts, ..pending }) {
                                    report.dropped += 1;
                                }
                            }
                        }
                    }
                }
            }
        }

        if let Some(last) = last_stored {
            if let Err(e) = storage.add_records(vehicle_id, report.stored as u64).await {
                warn!("Failed to update record count for {}: {}", vehicle_id, e);
            }
            if let Err(e) = storage.upsert_latest(vehicle_id, last).await {
                warn!("Failed to update latest reading for {}: {}", vehicle_id, e);
            }
        }

        if report.requeued > 0 || report.dropped > 0 {
            warn!(
                "Partial flush: {} stored, {} requeued, {} dropped",
                report.stored, report.requeued, report.dropped
            );
        } else {
            debug!("Flushed {} records", report.stored);
        }
        report
    }
}

async fn insert_with_retry(
    storage: &dyn Storage,
    vehicle_id: &str,
    session_id: &str,
    records: &[TelemetryRecord],
) -> Option<usize> {
    match storage.insert_batch(vehicle_id, session_id, records).await {
        Ok(n) => return Some(n),
        Err(e) => warn!("Batch insert of {} records failed, retrying: {}", records.len(), e),
    }
    match storage.insert_batch(vehicle_id, session_id, records).await {
        Ok(n) => Some(n),
        Err(e) => {
            info!("Batch retry failed, falling back to per-record inserts: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use data_validator::QualityScorer;
    use feature_engine::FeatureEngineer;
    use inference_engine::{HealthClassifier, RuleEngine};
    use obd_protocol::Reading;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use storage::{MemoryRepository, NewVehicleProfile, StorageError, VehicleProfile};

    fn record(coolant: f64, offset_secs: i64) -> TelemetryRecord {
        let mut reading = Reading::new("s1", Utc::now() + ChronoDuration::seconds(offset_secs));
        reading.rpm = Some(900.0);
        reading.coolant_temp = Some(coolant);
        let engineer = FeatureEngineer::default();
        let features = engineer.compute(&reading, &engineer.new_state());
        let classification = RuleEngine::default().classify(&reading, &features);
        let quality = QualityScorer::default().score(&reading, 2, 2, Duration::from_secs(1));
        TelemetryRecord::new("v1", reading, features, classification, &quality)
    }

    /// Rejects any batch holding a record hotter than `poison_above`,
    /// and the first `fail_first` calls outright
    struct Picky {
        inner: MemoryRepository,
        poison_above: f64,
        fail_first: usize,
        calls: AtomicUsize,
    }

    impl Picky {
        fn new(poison_above: f64, fail_first: usize) -> Self {
            Self {
                inner: MemoryRepository::new(),
                poison_above,
                fail_first,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Storage for Picky {
        async fn find_vehicle(&self, id: &str) -> Result<Option<VehicleProfile>, StorageError> {
            self.inner.find_vehicle(id).await
        }
        async fn create_vehicle(&self, p: NewVehicleProfile) -> Result<VehicleProfile, StorageError> {
            self.inner.create_vehicle(p).await
        }
        async fn promote_identifier(
            &self,
            id: &str,
            update: &NewVehicleProfile,
        ) -> Result<VehicleProfile, StorageError> {
            self.inner.promote_identifier(id, update).await
        }
        async fn record_session(&self, id: &str) -> Result<(), StorageError> {
            self.inner.record_session(id).await
        }
        async fn add_records(&self, id: &str, count: u64) -> Result<(), StorageError> {
            self.inner.add_records(id, count).await
        }
        async fn insert_batch(
            &self,
            vehicle_id: &str,
            session_id: &str,
            records: &[TelemetryRecord],
        ) -> Result<usize, StorageError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(StorageError::RequestFailed("unavailable".into()));
            }
            if records
                .iter()
                .any(|r| r.reading.coolant_temp.unwrap_or_default() > self.poison_above)
            {
                return Err(StorageError::UnexpectedResponse {
                    status: 400,
                    body: "bad row".into(),
                });
            }
            self.inner.insert_batch(vehicle_id, session_id, records).await
        }
        async fn upsert_latest(&self, id: &str, r: &TelemetryRecord) -> Result<(), StorageError> {
            self.inner.upsert_latest(id, r).await
        }
        async fn get_recent(&self, id: &str, limit: usize) -> Result<Vec<TelemetryRecord>, StorageError> {
            self.inner.get_recent(id, limit).await
        }
    }

    #[tokio::test]
    async fn test_flush_empties_buffer() {
        let storage = MemoryRepository::new();
        let mut buffer = RecordBuffer::new(10, 3);
        for i in 0..4 {
            buffer.push(record(90.0 + i as f64, i));
        }
        let report = buffer.flush(&storage, "v1", "s1").await;
        assert_eq!(report, FlushReport { stored: 4, requeued: 0, dropped: 0 });
        assert!(buffer.is_empty());
        assert_eq!(storage.record_count("v1"), 4);
        let latest = storage.latest("v1").unwrap();
        let recent = storage.get_recent("v1", 1).await.unwrap();
        assert_eq!(latest, recent[0]);
    }

    #[tokio::test]
    async fn test_overflow_evicts_oldest() {
        let mut buffer = RecordBuffer::new(3, 3);
        assert!(!buffer.push(record(80.0, 0)));
        assert!(!buffer.push(record(81.0, 1)));
        assert!(!buffer.push(record(82.0, 2)));
        assert!(buffer.push(record(83.0, 3)));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.dropped(), 1);

        let storage = MemoryRepository::new();
        buffer.flush(&storage, "v1", "s1").await;
        let recent = storage.get_recent("v1", 10).await.unwrap();
        let temps: Vec<f64> = recent.iter().filter_map(|r| r.reading.coolant_temp).collect();
        assert_eq!(temps, vec![83.0, 82.0, 81.0]);
    }

    #[tokio::test]
    async fn test_whole_batch_retry_succeeds() {
        let storage = Picky::new(f64::MAX, 1);
        let mut buffer = RecordBuffer::new(10, 3);
        buffer.push(record(90.0, 0));
        buffer.push(record(91.0, 1));
        let report = buffer.flush(&storage, "v1", "s1").await;
        assert_eq!(report.stored, 2);
        // one failure, one retry
        assert_eq!(storage.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_poison_record_is_isolated_then_dropped() {
        let storage = Picky::new(150.0, 0);
        let mut buffer = RecordBuffer::new(10, 2);
        buffer.push(record(90.0, 0));
        buffer.push(record(200.0, 1));
        buffer.push(record(92.0, 2));

        let first = buffer.flush(&storage, "v1", "s1").await;
        assert_eq!(first, FlushReport { stored: 2, requeued: 1, dropped: 0 });
        assert_eq!(buffer.len(), 1);
        assert_eq!(storage.inner.record_count("v1"), 2);

        let second = buffer.flush(&storage, "v1", "s1").await;
        assert_eq!(second, FlushReport { stored: 0, requeued: 0, dropped: 1 });
        assert!(buffer.is_empty());
        assert_eq!(buffer.dropped(), 1);
    }

    #[tokio::test]
    async fn test_empty_flush_touches_nothing() {
        let storage = Picky::new(f64::MAX, 0);
        let mut buffer = RecordBuffer::new(10, 3);
        assert_eq!(buffer.flush(&storage, "v1", "s1").await, FlushReport::default());
        assert_eq!(storage.calls.load(Ordering::SeqCst), 0);
    }
}
