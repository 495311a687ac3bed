//! Vehicle profiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistent identity record of one vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleProfile {
    pub id: String,
    /// VIN when known, otherwise the ECU signature
    pub car_identifier: String,
    /// Signature of the supported-command set and protocol
    #[serde(default)]
    pub ecu_signature: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub year: Option<u16>,
    pub fuel_type: String,
    #[serde(default)]
    pub total_sessions: u64,
    #[serde(default)]
    pub total_records: u64,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

/// Attributes supplied when creating or promoting a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVehicleProfile {
    pub car_identifier: String,
    pub ecu_signature: Option<String>,
    pub display_name: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<u16>,
    pub fuel_type: String,
}

impl VehicleProfile {
    /// A fresh profile with zeroed counters
    pub fn create(id: String, new: NewVehicleProfile, now: DateTime<Utc>) -> Self {
        Self {
            id,
            car_identifier: new.car_identifier,
            ecu_signature: new.ecu_signature,
            display_name: new.display_name,
            make: new.make,
            model: new.model,
            year: new.year,
            fuel_type: new.fuel_type,
            total_sessions: 0,
            total_records: 0,
            created_at: now,
            last_used: now,
        }
    }

    /// Whether `identifier` names this vehicle by VIN or by signature
    pub fn matches(&self, identifier: &str) -> bool {
        self.car_identifier == identifier || self.ecu_signature.as_deref() == Some(identifier)
    }

    /// Re-key onto a VIN and take over any decoded details
    pub fn promote(&mut self, update: &NewVehicleProfile) {
        self.car_identifier = update.car_identifier.clone();
        if self.ecu_signature.is_none() {
            self.ecu_signature = update.ecu_signature.clone();
        }
        self.display_name = update.display_name.clone();
        self.make = update.make.clone().or(self.make.take());
        self.model = update.model.clone().or(self.model.take());
        self.year = update.year.or(self.year);
    }
}
