//! PostgREST-style HTTP backend
//!
//! Tables: `vehicle_profiles`, `sensor_data` (history) and
//! `sensor_data_realtime` (one row per vehicle). Counter updates go through
//! the `record_vehicle_activity` RPC so the read-modify-write happens on the
//! server.

use crate::profile::{NewVehicleProfile, VehicleProfile};
use crate::record::TelemetryRecord;
use crate::repository::Storage;
use crate::StorageError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// REST backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// Base URL, e.g. `https://project.example.co/rest/v1`
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

pub struct RestStorage {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestStorage {
    pub fn new(config: &RestConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        info!("REST storage at {}", config.url);
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StorageError> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::UnexpectedResponse {
            status: status.as_u16(),
            body,
        })
    }

    async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Vec<T>, StorageError> {
        let response = self.send(request).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn single<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, StorageError> {
        self.rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound(what.to_string()))
    }

    async fn record_activity(&self, vehicle_id: &str, sessions: u64, records: u64) -> Result<(), StorageError> {
        let body = json!({
            "p_vehicle_id": vehicle_id,
            "p_sessions": sessions,
            "p_records": records,
            "p_last_used": Utc::now(),
        });
        self.send(self.client.post(self.url("rpc/record_vehicle_activity")).json(&body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for RestStorage {
    async fn find_vehicle(&self, identifier: &str) -> Result<Option<VehicleProfile>, StorageError> {
        let filter = format!(
            "(car_identifier.eq.{id},ecu_signature.eq.{id})",
            id = identifier
        );
        let request = self
            .client
            .get(self.url("vehicle_profiles"))
            .query(&[("or", filter.as_str()), ("limit", "2")]);
        let mut rows: Vec<VehicleProfile> = self.rows(request).await?;
        // a VIN match beats a signature match
        rows.sort_by_key(|v| v.car_identifier != identifier);
        Ok(rows.into_iter().next())
    }

    async fn create_vehicle(&self, profile: NewVehicleProfile) -> Result<VehicleProfile, StorageError> {
        let request = self
            .client
            .post(self.url("vehicle_profiles"))
            .header("Prefer", "return=representation")
            .json(&profile);
        let created: VehicleProfile = self.single(request, &profile.car_identifier).await?;
        info!("Created vehicle profile {} ({})", created.id, created.display_name);
        Ok(created)
    }

    async fn promote_identifier(
        &self,
        vehicle_id: &str,
        update: &NewVehicleProfile,
    ) -> Result<VehicleProfile, StorageError> {
        let id_filter = format!("eq.{}", vehicle_id);
        let mut body = serde_json::to_value(update)?;
        if let Some(fields) = body.as_object_mut() {
            // never erase details the backend already has
            fields.retain(|_, v| !v.is_null());
        }
        let request = self
            .client
            .patch(self.url("vehicle_profiles"))
            .query(&[("id", id_filter.as_str())])
            .header("Prefer", "return=representation")
            .json(&body);
        self.single(request, vehicle_id).await
    }

    async fn record_session(&self, vehicle_id: &str) -> Result<(), StorageError> {
        self.record_activity(vehicle_id, 1, 0).await
    }

    async fn add_records(&self, vehicle_id: &str, count: u64) -> Result<(), StorageError> {
        self.record_activity(vehicle_id, 0, count).await
    }

    async fn insert_batch(
        &self,
        vehicle_id: &str,
        session_id: &str,
        records: &[TelemetryRecord],
    ) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }
        let request = self
            .client
            .post(self.url("sensor_data"))
            .header("Prefer", "return=minimal")
            .json(records);
        self.send(request).await?;
        debug!(
            "Inserted {} rows for vehicle {} session {}",
            records.len(),
            vehicle_id,
            session_id
        );
        Ok(records.len())
    }

    async fn upsert_latest(&self, vehicle_id: &str, record: &TelemetryRecord) -> Result<(), StorageError> {
        let request = self
            .client
            .post(self.url("sensor_data_realtime"))
            .query(&[("on_conflict", "vehicle_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(record);
        self.send(request).await?;
        debug!("Updated latest reading for vehicle {}", vehicle_id);
        Ok(())
    }

    async fn get_recent(&self, vehicle_id: &str, limit: usize) -> Result<Vec<TelemetryRecord>, StorageError> {
        let vehicle_filter = format!("eq.{}", vehicle_id);
        let limit = limit.to_string();
        let request = self.client.get(self.url("sensor_data")).query(&[
            ("vehicle_id", vehicle_filter.as_str()),
            ("order", "timestamp.desc"),
            ("limit", limit.as_str()),
        ]);
        self.rows(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample_record;

    fn storage() -> RestStorage {
        RestStorage::new(&RestConfig {
            url: "http://127.0.0.1:9/rest/v1/".to_string(),
            api_key: "key".to_string(),
            timeout_secs: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_url_joining() {
        assert_eq!(storage().url("sensor_data"), "http://127.0.0.1:9/rest/v1/sensor_data");
    }

    #[test]
    fn test_rows_carry_vehicle_and_session() {
        let json = serde_json::to_value([sample_record("veh", 90.0)]).unwrap();
        assert_eq!(json[0]["vehicle_id"], "veh");
        assert_eq!(json[0]["session_id"], "sess");
        assert_eq!(json[0]["coolant_temp"], 90.0);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_an_error() {
        let result = storage().find_vehicle("abc").await;
        assert!(matches!(result, Err(StorageError::RequestFailed(_))));
    }
}
