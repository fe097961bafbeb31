//! # Drone Dispatch Fleet - Domain Model
//!
//! Entities, value objects and loading rules for the medication dispatch
//! fleet. These types are shared by the persistence layer and the dispatch
//! service and are serialized as camelCase JSON records at rest.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Heaviest load any drone model can carry, in grams.
pub const MAX_WEIGHT_LIMIT_GRAMS: f64 = 500.0;

/// Minimum battery percentage required to start loading a drone.
pub const MIN_LOADING_BATTERY: f64 = 25.0;

/// Maximum length of a drone serial number.
pub const MAX_SERIAL_NUMBER_LEN: usize = 100;

// =============================================================================
// ENUMS
// =============================================================================

/// Drone weight classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DroneModel {
    Lightweight,
    Middleweight,
    Cruiserweight,
    Heavyweight,
}

impl DroneModel {
    pub const ALL: [Self; 4] = [
        Self::Lightweight,
        Self::Middleweight,
        Self::Cruiserweight,
        Self::Heavyweight,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lightweight => "Lightweight",
            Self::Middleweight => "Middleweight",
            Self::Cruiserweight => "Cruiserweight",
            Self::Heavyweight => "Heavyweight",
        }
    }

    /// Carrying capacity in grams. Always derived from the model, never
    /// taken from client input.
    #[must_use]
    pub fn weight_limit(&self) -> f64 {
        match self {
            Self::Lightweight => MAX_WEIGHT_LIMIT_GRAMS / 4.0,
            Self::Middleweight => MAX_WEIGHT_LIMIT_GRAMS / 3.0,
            Self::Cruiserweight => MAX_WEIGHT_LIMIT_GRAMS / 2.0,
            Self::Heavyweight => MAX_WEIGHT_LIMIT_GRAMS,
        }
    }
}

impl fmt::Display for DroneModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DroneModel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "drone model",
                value: s.to_string(),
            })
    }
}

/// Drone operational state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DroneState {
    Idle,
    Loading,
    Loaded,
    Delivering,
    Delivered,
    Returning,
}

impl DroneState {
    pub const ALL: [Self; 6] = [
        Self::Idle,
        Self::Loading,
        Self::Loaded,
        Self::Delivering,
        Self::Delivered,
        Self::Returning,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Loading => "LOADING",
            Self::Loaded => "LOADED",
            Self::Delivering => "DELIVERING",
            Self::Delivered => "DELIVERED",
            Self::Returning => "RETURNING",
        }
    }
}

impl fmt::Display for DroneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DroneState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "drone state",
                value: s.to_string(),
            })
    }
}

// =============================================================================
// ENTITY TYPES
// =============================================================================

/// Drone entity, keyed by serial number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drone {
    pub serial_number: String,
    pub model: DroneModel,
    /// Grams; derived from `model`
    pub weight_limit: f64,
    /// Percentage, 0-100
    pub battery_capacity: f64,
    pub state: DroneState,
}

impl Drone {
    /// Build a drone with its weight limit derived from the model.
    pub fn new(
        serial_number: impl Into<String>,
        model: DroneModel,
        battery_capacity: f64,
        state: DroneState,
    ) -> Self {
        Self {
            serial_number: serial_number.into(),
            model,
            weight_limit: model.weight_limit(),
            battery_capacity,
            state,
        }
    }

    /// Check the loading preconditions in order: enough battery, then idle.
    ///
    /// # Errors
    ///
    /// `BatteryTooLow` below [`MIN_LOADING_BATTERY`], `DroneBusy` for any
    /// state other than `IDLE`.
    pub fn ensure_loadable(&self) -> Result<(), DomainError> {
        // NaN battery never qualifies
        if !(self.battery_capacity >= MIN_LOADING_BATTERY) {
            return Err(DomainError::BatteryTooLow {
                serial_number: self.serial_number.clone(),
                battery_capacity: self.battery_capacity,
            });
        }
        if self.state != DroneState::Idle {
            return Err(DomainError::DroneBusy {
                serial_number: self.serial_number.clone(),
                state: self.state,
            });
        }
        Ok(())
    }
}

/// Registration input. Carries no weight limit: it is always recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneRegistration {
    pub serial_number: String,
    pub model: DroneModel,
    pub battery_capacity: f64,
    pub state: DroneState,
}

impl DroneRegistration {
    /// Validate field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_serial_number(&self.serial_number)?;
        if !(0.0..=100.0).contains(&self.battery_capacity) {
            return Err(DomainError::InvalidBatteryCapacity(self.battery_capacity));
        }
        Ok(())
    }

    #[must_use]
    pub fn into_drone(self) -> Drone {
        Drone::new(
            self.serial_number,
            self.model,
            self.battery_capacity,
            self.state,
        )
    }
}

/// Check a serial number is non-empty and at most [`MAX_SERIAL_NUMBER_LEN`] characters.
///
/// # Errors
///
/// `InvalidSerialNumber` when either bound is violated.
pub fn validate_serial_number(serial_number: &str) -> Result<(), DomainError> {
    let len = serial_number.chars().count();
    if len == 0 || len > MAX_SERIAL_NUMBER_LEN {
        return Err(DomainError::InvalidSerialNumber(serial_number.to_string()));
    }
    Ok(())
}

/// Medication catalog item, keyed by code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    /// Letters, digits, `-` and `_`
    pub name: String,
    /// Grams
    pub weight: f64,
    /// Upper case letters, digits and `_`
    pub code: String,
    /// Base64 encoded picture
    pub image: String,
}

impl Medication {
    /// Validate catalog field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), DomainError> {
        if !is_medication_name(&self.name) {
            return Err(DomainError::InvalidMedicationName(self.name.clone()));
        }
        if !is_medication_code(&self.code) {
            return Err(DomainError::InvalidMedicationCode(self.code.clone()));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(DomainError::InvalidMedicationWeight(self.weight));
        }
        if general_purpose::STANDARD.decode(&self.image).is_err() {
            return Err(DomainError::InvalidMedicationImage(self.code.clone()));
        }
        Ok(())
    }
}

#[must_use]
pub fn is_medication_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[must_use]
pub fn is_medication_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Registered operator account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique; doubles as the DID
    pub username: String,
    pub name: String,
    /// Hex encoded SHA-256 checksum of the password
    pub passphrase: String,
}

impl User {
    /// Compare a clear-text password against the stored checksum.
    #[must_use]
    pub fn verify_passphrase(&self, password: &str) -> bool {
        passphrase_checksum(password) == self.passphrase.to_ascii_lowercase()
    }
}

/// Lowercase hex SHA-256 of a password.
#[must_use]
pub fn passphrase_checksum(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Persisted flag guarding one-time fixture population
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationMarker {
    pub is_populated: bool,
}

/// Medication codes currently loaded onto one drone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadedMedications(pub Vec<String>);

impl LoadedMedications {
    #[must_use]
    pub fn codes(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn into_codes(self) -> Vec<String> {
        self.0
    }
}

// =============================================================================
// LOAD PLANNING
// =============================================================================

/// Remove repeated codes, keeping the first occurrence of each.
pub fn dedup_codes<S: AsRef<str>>(codes: &[S]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(codes.len());
    codes
        .iter()
        .map(AsRef::as_ref)
        .filter(|code| seen.insert(*code))
        .map(str::to_string)
        .collect()
}

/// A validated manifest ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPlan {
    pub codes: Vec<String>,
    /// Grams
    pub total_weight: f64,
}

impl LoadPlan {
    /// Dedup `codes`, resolve each through `weight_of` and check the total
    /// against `weight_limit`.
    ///
    /// # Errors
    ///
    /// `UnknownMedicationCode` for the first code `weight_of` cannot
    /// resolve, `WeightExceeded` when the total is above the limit.
    pub fn build<S: AsRef<str>>(
        codes: &[S],
        weight_limit: f64,
        weight_of: impl Fn(&str) -> Option<f64>,
    ) -> Result<Self, DomainError> {
        let codes = dedup_codes(codes);
        let mut total_weight = 0.0;
        for code in &codes {
            let weight =
                weight_of(code).ok_or_else(|| DomainError::UnknownMedicationCode(code.clone()))?;
            total_weight += weight;
        }

        if total_weight > weight_limit {
            return Err(DomainError::WeightExceeded {
                total: total_weight,
                limit: weight_limit,
            });
        }

        Ok(Self {
            codes,
            total_weight,
        })
    }

    #[must_use]
    pub fn manifest(&self) -> LoadedMedications {
        LoadedMedications(self.codes.clone())
    }
}

// =============================================================================
// AUDIT TYPES
// =============================================================================

/// Battery reading for one drone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneBatteryLevel {
    pub serial_number: String,
    pub battery_capacity: f64,
}

impl From<&Drone> for DroneBatteryLevel {
    fn from(drone: &Drone) -> Self {
        Self {
            serial_number: drone.serial_number.clone(),
            battery_capacity: drone.battery_capacity,
        }
    }
}

/// Periodic fleet battery snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryAuditEvent {
    pub created: DateTime<Utc>,
    pub uuid: Uuid,
    pub drones_battery_levels: Vec<DroneBatteryLevel>,
}

impl BatteryAuditEvent {
    pub fn new(drones: &[Drone]) -> Self {
        Self {
            created: Utc::now(),
            uuid: Uuid::new_v4(),
            drones_battery_levels: drones.iter().map(DroneBatteryLevel::from).collect(),
        }
    }

    /// Readings under the loading threshold.
    pub fn low_battery(&self) -> impl Iterator<Item = &DroneBatteryLevel> {
        self.drones_battery_levels
            .iter()
            .filter(|level| level.battery_capacity < MIN_LOADING_BATTERY)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Domain-level errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("invalid serial number '{0}': must have between 1 and 100 characters")]
    InvalidSerialNumber(String),

    #[error("invalid battery capacity {0}: must be between 0 and 100")]
    InvalidBatteryCapacity(f64),

    #[error("invalid medication name '{0}': allowed only letters, numbers, '-' and '_'")]
    InvalidMedicationName(String),

    #[error("invalid medication code '{0}': allowed only upper case letters, numbers and '_'")]
    InvalidMedicationCode(String),

    #[error("invalid medication weight {0}")]
    InvalidMedicationWeight(f64),

    #[error("medication '{0}' has an image that is not valid base64")]
    InvalidMedicationImage(String),

    #[error("unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("drone '{serial_number}' battery at {battery_capacity}% is below 25%")]
    BatteryTooLow {
        serial_number: String,
        battery_capacity: f64,
    },

    #[error("drone '{serial_number}' is busy ({state})")]
    DroneBusy {
        serial_number: String,
        state: DroneState,
    },

    #[error("medication item '{0}' does not exist")]
    UnknownMedicationCode(String),

    #[error("maximum load weight exceeded: {total}g over a {limit}g limit")]
    WeightExceeded { total: f64, limit: f64 },
}

impl DomainError {
    /// Stable machine-readable kind
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidSerialNumber(_)
            | Self::InvalidBatteryCapacity(_)
            | Self::InvalidMedicationName(_)
            | Self::InvalidMedicationCode(_)
            | Self::InvalidMedicationWeight(_)
            | Self::InvalidMedicationImage(_)
            | Self::UnknownVariant { .. } => "INVALID_INPUT",
            Self::BatteryTooLow { .. } => "BATTERY_TOO_LOW",
            Self::DroneBusy { .. } => "DRONE_BUSY",
            Self::UnknownMedicationCode(_) => "UNKNOWN_MEDICATION_CODE",
            Self::WeightExceeded { .. } => "WEIGHT_EXCEEDED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::Fake;

    fn idle_drone(battery: f64) -> Drone {
        Drone::new("D1", DroneModel::Cruiserweight, battery, DroneState::Idle)
    }

    #[test]
    fn test_weight_limit_per_model() {
        assert_eq!(DroneModel::Lightweight.weight_limit(), 125.0);
        assert_eq!(DroneModel::Middleweight.weight_limit(), 500.0 / 3.0);
        assert_eq!(DroneModel::Cruiserweight.weight_limit(), 250.0);
        assert_eq!(DroneModel::Heavyweight.weight_limit(), 500.0);
    }

    #[test]
    fn test_registration_derives_limit_from_model() {
        for model in DroneModel::ALL {
            let battery: f64 = (0.0..=100.0).fake();
            let reg = DroneRegistration {
                serial_number: "SN-1".into(),
                model,
                battery_capacity: battery,
                state: DroneState::Idle,
            };
            assert!(reg.validate().is_ok());
            let drone = reg.into_drone();
            assert_eq!(drone.weight_limit, model.weight_limit());
            assert_eq!(drone.battery_capacity, battery);
        }
    }

    #[test]
    fn test_registration_ignores_client_weight_limit() {
        let reg: DroneRegistration = serde_json::from_str(
            r#"{"serialNumber":"X","model":"Lightweight","weightLimit":9999,"batteryCapacity":60,"state":"IDLE"}"#,
        )
        .unwrap();
        assert_eq!(reg.into_drone().weight_limit, 125.0);
    }

    #[test]
    fn test_registration_rejects_bad_fields() {
        let mut reg = DroneRegistration {
            serial_number: String::new(),
            model: DroneModel::Lightweight,
            battery_capacity: 50.0,
            state: DroneState::Idle,
        };
        assert!(matches!(reg.validate(), Err(DomainError::InvalidSerialNumber(_))));

        reg.serial_number = "x".repeat(101);
        assert!(matches!(reg.validate(), Err(DomainError::InvalidSerialNumber(_))));

        reg.serial_number = "x".repeat(100);
        assert!(reg.validate().is_ok());

        reg.battery_capacity = 100.1;
        assert!(matches!(reg.validate(), Err(DomainError::InvalidBatteryCapacity(_))));
    }

    #[test]
    fn test_battery_boundary_is_inclusive() {
        assert!(idle_drone(25.0).ensure_loadable().is_ok());
        let err = idle_drone(24.9).ensure_loadable().unwrap_err();
        assert_eq!(err.code(), "BATTERY_TOO_LOW");
        assert!(idle_drone(f64::NAN).ensure_loadable().is_err());
    }

    #[test]
    fn test_battery_checked_before_state() {
        let mut drone = idle_drone(10.0);
        drone.state = DroneState::Loaded;
        assert!(matches!(
            drone.ensure_loadable(),
            Err(DomainError::BatteryTooLow { .. })
        ));

        drone.battery_capacity = 90.0;
        assert!(matches!(
            drone.ensure_loadable(),
            Err(DomainError::DroneBusy { state: DroneState::Loaded, .. })
        ));
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let codes = ["B", "A", "B", "C", "A"];
        assert_eq!(dedup_codes(&codes), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_load_plan() {
        let weight_of = |code: &str| match code {
            "A" | "B" | "C" => Some(100.0),
            _ => None,
        };

        let plan = LoadPlan::build(&["A", "B", "A"], 250.0, weight_of).unwrap();
        assert_eq!(plan.codes, vec!["A", "B"]);
        assert_eq!(plan.total_weight, 200.0);

        let err = LoadPlan::build(&["A", "B", "C"], 250.0, weight_of).unwrap_err();
        assert_eq!(
            err,
            DomainError::WeightExceeded {
                total: 300.0,
                limit: 250.0
            }
        );

        let err = LoadPlan::build(&["A", "ZZ"], 250.0, weight_of).unwrap_err();
        assert_eq!(err, DomainError::UnknownMedicationCode("ZZ".into()));
    }

    #[test]
    fn test_exact_limit_is_accepted() {
        let plan = LoadPlan::build(&["A", "B"], 200.0, |_| Some(100.0)).unwrap();
        assert_eq!(plan.total_weight, 200.0);
    }

    #[test]
    fn test_medication_validation() {
        let med = Medication {
            name: "Para-cetamol_500".into(),
            weight: 34.0,
            code: "PCM_500".into(),
            image: "ZmFrZV9pbWFnZQ==".into(),
        };
        assert!(med.validate().is_ok());

        let bad_name = Medication { name: "Para cetamol".into(), ..med.clone() };
        assert!(matches!(bad_name.validate(), Err(DomainError::InvalidMedicationName(_))));

        let bad_code = Medication { code: "pcm".into(), ..med.clone() };
        assert!(matches!(bad_code.validate(), Err(DomainError::InvalidMedicationCode(_))));

        let bad_image = Medication { image: "not base64!".into(), ..med };
        assert!(matches!(bad_image.validate(), Err(DomainError::InvalidMedicationImage(_))));
    }

    #[test]
    fn test_passphrase_checksum() {
        let user = User {
            username: "richard.sargon@meinermail.com".into(),
            name: "Richard Sargon".into(),
            passphrase: "0b14d501a594442a01c6859541bcb3e8164d183d32937b851835442f69d5c94e".into(),
        };
        assert!(user.verify_passphrase("password1"));
        assert!(!user.verify_passphrase("password2"));
    }

    #[test]
    fn test_json_shape() {
        let drone = Drone::new("SN", DroneModel::Heavyweight, 80.0, DroneState::Idle);
        let json = serde_json::to_string(&drone).unwrap();
        assert!(json.contains("\"serialNumber\":\"SN\""));
        assert!(json.contains("\"weightLimit\":500.0"));
        assert!(json.contains("\"model\":\"Heavyweight\""));
        assert!(json.contains("\"state\":\"IDLE\""));

        let marker = serde_json::to_string(&PopulationMarker { is_populated: true }).unwrap();
        assert_eq!(marker, r#"{"isPopulated":true}"#);

        let manifest = serde_json::to_string(&LoadedMedications(vec!["A".into()])).unwrap();
        assert_eq!(manifest, r#"["A"]"#);
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("idle".parse::<DroneState>().unwrap(), DroneState::Idle);
        assert_eq!("HEAVYWEIGHT".parse::<DroneModel>().unwrap(), DroneModel::Heavyweight);
        assert!("flying".parse::<DroneState>().is_err());
    }

    #[test]
    fn test_audit_event_low_battery() {
        let drones = vec![idle_drone(80.0), idle_drone(12.9)];
        let event = BatteryAuditEvent::new(&drones);
        assert_eq!(event.drones_battery_levels.len(), 2);
        assert_eq!(event.low_battery().count(), 1);
    }
}
