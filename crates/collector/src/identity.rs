//! Vehicle identity resolution
//!
//! A vehicle is keyed by its VIN when the ECU reports one, otherwise by a
//! signature hash of its supported-command set and protocol. A VIN seen for
//! a vehicle previously known only by signature re-keys that profile rather
//! than creating a second one.

use chrono::{DateTime, Datelike, Utc};
use obd_protocol::Pid;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use storage::{NewVehicleProfile, Storage, StorageError, VehicleProfile};
use tracing::{info, warn};
use uuid::Uuid;

const SIGNATURE_HEX_LEN: usize = 32;
const DEFAULT_FUEL_TYPE: &str = "Gasoline";

/// World manufacturer identifiers (first three VIN characters)
const WMI_CODES: &[(&str, &str)] = &[
    ("1G1", "Chevrolet"),
    ("1GC", "Chevrolet"),
    ("1G6", "Cadillac"),
    ("1GT", "GMC"),
    ("1FA", "Ford"),
    ("1FB", "Ford"),
    ("1FC", "Ford"),
    ("1FD", "Ford"),
    ("1FT", "Ford"),
    ("1HG", "Honda"),
    ("1HF", "Honda"),
    ("1HC", "Honda"),
    ("1N4", "Nissan"),
    ("1N6", "Nissan"),
    ("2T1", "Toyota"),
    ("2T2", "Toyota"),
    ("2T3", "Toyota"),
    ("3VW", "Volkswagen"),
    ("3VV", "Volkswagen"),
    ("4F2", "Mazda"),
    ("4F4", "Mazda"),
    ("5Y2", "Hyundai"),
    ("5YJ", "Tesla"),
    ("WBA", "BMW"),
    ("WBS", "BMW"),
    ("WBX", "BMW"),
    ("WDB", "Mercedes-Benz"),
    ("WDC", "Mercedes-Benz"),
    ("WDD", "Mercedes-Benz"),
    ("WVW", "Volkswagen"),
    ("WV1", "Volkswagen"),
    ("WV2", "Volkswagen"),
    ("WP0", "Porsche"),
    ("WP1", "Porsche"),
    ("WAU", "Audi"),
    ("WA1", "Audi"),
    ("JHM", "Honda"),
    ("JH4", "Acura"),
    ("JH6", "Acura"),
    ("JT2", "Toyota"),
    ("JT3", "Toyota"),
    ("JTD", "Toyota"),
    ("JTE", "Toyota"),
    ("KM8", "Hyundai"),
    ("KMH", "Hyundai"),
    ("KNA", "Kia"),
    ("KND", "Kia"),
    ("ZFF", "Ferrari"),
    ("ZAM", "Maserati"),
    ("ZAR", "Alfa Romeo"),
];

/// Model-year codes in cycle order; the cycle repeats every 30 years from 1980
const YEAR_CODES: &str = "ABCDEFGHJKLMNPRSTVWXY123456789";

/// 17 characters from `A-H J-N P R-Z 0-9`
pub fn is_valid_vin(vin: &str) -> bool {
    vin.len() == 17
        && vin
            .chars()
            .all(|c| c.is_ascii_digit() || (c.is_ascii_uppercase() && !matches!(c, 'I' | 'O' | 'Q')))
}

pub fn manufacturer(vin: &str) -> Option<&'static str> {
    let wmi = vin.get(..3)?;
    WMI_CODES
        .iter()
        .find(|(code, _)| *code == wmi)
        .map(|(_, make)| *make)
}

/// Details recoverable from a VIN alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VinInfo {
    pub vin: String,
    pub make: Option<&'static str>,
    pub year: Option<u16>,
}

/// Decode make and model year. The year code repeats every 30 years; the
/// newest candidate no later than next year's models wins.
pub fn decode_vin(vin: &str, current_year: i32) -> Option<VinInfo> {
    let vin = vin.trim().to_ascii_uppercase();
    if !is_valid_vin(&vin) {
        return None;
    }
    let year = vin.chars().nth(9).and_then(|code| {
        let index = YEAR_CODES.find(code)? as i32;
        let (older, newer) = (1980 + index, 2010 + index);
        let year = if newer <= current_year + 1 { newer } else { older };
        u16::try_from(year).ok()
    });
    Some(VinInfo {
        make: manufacturer(&vin),
        year,
        vin,
    })
}

/// Stable fingerprint of a vehicle's supported-command set and protocol.
///
/// Codes are sorted before hashing, so discovery order never matters.
pub fn ecu_signature<'a>(supported: impl IntoIterator<Item = &'a u8>, protocol: &str) -> String {
    let codes: BTreeSet<u8> = supported.into_iter().copied().collect();
    let commands: Vec<String> = codes.iter().map(|code| format!("01{:02X}", code)).collect();
    let material = format!("CMDS:{}|PROTO:{}", commands.join(":"), protocol);
    let digest = Sha256::digest(material.as_bytes());
    let mut signature = hex::encode(digest);
    signature.truncate(SIGNATURE_HEX_LEN);
    signature
}

/// `<prefix>_<YYYYmmdd_HHMMSS>_<8 hex>`
pub fn new_session_id(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, now.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Everything known about the connected vehicle before storage is consulted
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleIdentity {
    pub signature: String,
    pub vin: Option<VinInfo>,
    pub protocol: String,
}

impl VehicleIdentity {
    pub fn new(vin: Option<&str>, supported: &BTreeSet<u8>, protocol: &str) -> Self {
        let current_year = Utc::now().year();
        let vin = vin.and_then(|raw| {
            let decoded = decode_vin(raw, current_year);
            if decoded.is_none() {
                warn!("Ignoring malformed VIN {:?}", raw);
            }
            decoded
        });
        Self {
            signature: ecu_signature(supported, protocol),
            vin,
            protocol: protocol.to_string(),
        }
    }

    /// VIN when known, otherwise the signature
    pub fn car_identifier(&self) -> &str {
        self.vin.as_ref().map(|v| v.vin.as_str()).unwrap_or(&self.signature)
    }

    pub fn display_name(&self) -> String {
        match &self.vin {
            Some(VinInfo {
                make: Some(make),
                year: Some(year),
                ..
            }) => format!("{}-{}", make, year),
            _ => format!("Vehicle {}", &self.signature[..8]),
        }
    }

    pub fn new_profile(&self) -> NewVehicleProfile {
        NewVehicleProfile {
            car_identifier: self.car_identifier().to_string(),
            ecu_signature: Some(self.signature.clone()),
            display_name: self.display_name(),
            make: self.vin.as_ref().and_then(|v| v.make).map(str::to_string),
            model: None,
            year: self.vin.as_ref().and_then(|v| v.year),
            fuel_type: DEFAULT_FUEL_TYPE.to_string(),
        }
    }
}

/// Find or create the profile for `identity`, merging a signature-keyed
/// profile into its VIN when the VIN is seen for the first time.
pub async fn resolve_profile(
    storage: &dyn Storage,
    identity: &VehicleIdentity,
) -> Result<VehicleProfile, StorageError> {
    let profile = identity.new_profile();

    if let Some(vin) = &identity.vin {
        if let Some(existing) = storage.find_vehicle(&vin.vin).await? {
            if existing.car_identifier == vin.vin {
                info!("Recognized vehicle {} by VIN", existing.display_name);
                return Ok(existing);
            }
        }
        // only a profile still keyed by signature has no VIN to conflict with
        if let Some(known) = storage.find_vehicle(&identity.signature).await? {
            if known.car_identifier == identity.signature {
                info!(
                    "VIN {} learned for vehicle {}, re-keying profile",
                    vin.vin, known.display_name
                );
                return storage.promote_identifier(&known.id, &profile).await;
            }
        }
        info!("New vehicle {} by VIN", profile.display_name);
        return storage.create_vehicle(profile).await;
    }

    let resolved = storage
        .find_or_create_vehicle(&identity.signature, profile)
        .await?;
    info!("Vehicle {} (signature {})", resolved.display_name, identity.signature);
    Ok(resolved)
}

/// PIDs this crate knows how to decode, in catalogue order
pub(crate) fn known_pids(supported: &BTreeSet<u8>) -> Vec<Pid> {
    Pid::ALL
        .into_iter()
        .filter(|pid| supported.contains(&pid.as_hex()))
        .collect()
}
