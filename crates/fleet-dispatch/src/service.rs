//! # Fleet Service
//!
//! Business rules layered over the fleet repository: weight-limit
//! derivation on registration, the ordered load preconditions, manifest
//! replacement and the one-time fixture population guard.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use fleet_domain::{
    Drone, DroneRegistration, DroneState, Medication, User, dedup_codes, validate_serial_number,
};
use fleet_persistence::{Fixtures, FleetRepository};

use crate::error::{DispatchError, DispatchResult};

// =============================================================================
// TYPES
// =============================================================================

/// Drone listing filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DroneFilter {
    #[default]
    All,
    State(DroneState),
    /// Substring matched against the stored JSON record
    Raw(String),
}

impl DroneFilter {
    fn pattern(&self) -> String {
        match self {
            Self::All => String::new(),
            Self::State(state) => format!(r#""state":"{state}""#),
            Self::Raw(raw) => raw.clone(),
        }
    }
}

impl From<Option<DroneState>> for DroneFilter {
    fn from(state: Option<DroneState>) -> Self {
        state.map_or(Self::All, Self::State)
    }
}

/// Accepted load
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOutcome {
    pub serial_number: String,
    /// Manifest as written, duplicates removed
    pub codes: Vec<String>,
    /// Grams
    pub total_weight: f64,
}

// =============================================================================
// SERVICE
// =============================================================================

/// Dispatch rule engine
#[derive(Clone)]
pub struct FleetService {
    repo: Arc<dyn FleetRepository>,
    fixture_seed: u64,
}

impl fmt::Debug for FleetService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FleetService")
            .field("fixture_seed", &self.fixture_seed)
            .finish_non_exhaustive()
    }
}

impl FleetService {
    pub fn new(repo: Arc<dyn FleetRepository>, fixture_seed: u64) -> Self {
        Self { repo, fixture_seed }
    }

    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.repo.is_populated()
    }

    /// Write the fixtures once.
    ///
    /// # Errors
    ///
    /// `AlreadyPopulated` on every call after the first success.
    pub fn populate_db(&self) -> DispatchResult<()> {
        self.repo
            .populate_db(&Fixtures::generate(self.fixture_seed))
            .map_err(DispatchError::from)
    }

    /// # Errors
    ///
    /// `InvalidInput` for a malformed serial, `NotFound` if unknown.
    pub fn get_drone(&self, serial_number: &str) -> DispatchResult<Drone> {
        validate_serial_number(serial_number)?;
        Ok(self.repo.get_drone(serial_number)?)
    }

    /// Drones by descending battery capacity.
    ///
    /// # Errors
    ///
    /// Store faults only.
    pub fn list_drones(&self, filter: &DroneFilter) -> DispatchResult<Vec<Drone>> {
        Ok(self.repo.get_drones(&filter.pattern())?)
    }

    /// # Errors
    ///
    /// `InvalidInput` for a malformed serial, or a store fault.
    pub fn drone_exists(&self, serial_number: &str) -> DispatchResult<bool> {
        validate_serial_number(serial_number)?;
        match self.repo.exist_drone(serial_number) {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Validate and upsert a drone. The weight limit always comes from the model.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when a field is out of range.
    #[instrument(skip_all, fields(serial_number = %registration.serial_number))]
    pub fn register_drone(&self, registration: DroneRegistration) -> DispatchResult<Drone> {
        registration.validate()?;
        let drone = registration.into_drone();
        self.repo.register_drone(&drone)?;
        info!(
            model = %drone.model,
            weight_limit = drone.weight_limit,
            "Drone registered"
        );
        Ok(drone)
    }

    /// Codes loaded onto a drone; an absent manifest reads as empty.
    ///
    /// # Errors
    ///
    /// `NotFound` if the drone does not exist.
    pub fn list_loaded_medications(&self, serial_number: &str) -> DispatchResult<Vec<String>> {
        validate_serial_number(serial_number)?;
        self.repo.exist_drone(serial_number)?;
        match self.repo.check_loaded_medications(serial_number) {
            Ok(codes) => Ok(codes),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Replace the manifest of a drone. Checks, first failure wins: the drone
    /// exists, battery at least 25%, state `IDLE`, every code is in the
    /// catalog, total weight within the limit. An empty code list clears the
    /// manifest.
    ///
    /// # Errors
    ///
    /// `NotFound`, `BatteryTooLow`, `DroneBusy`, `UnknownMedicationCode`,
    /// `WeightExceeded`, or `Conflict` when the drone changed while loading.
    #[instrument(skip(self, codes), fields(requested = codes.len()))]
    pub fn load_medications<S: AsRef<str>>(
        &self,
        serial_number: &str,
        codes: &[S],
    ) -> DispatchResult<LoadOutcome> {
        validate_serial_number(serial_number)?;
        let codes = dedup_codes(codes);

        let result = self
            .repo
            .get_drone(serial_number)
            .map_err(DispatchError::from)
            .and_then(|drone| {
                drone.ensure_loadable()?;
                Ok(self.repo.load_medication_items(&drone, &codes)?)
            });

        match result {
            Ok(total_weight) => {
                debug!(?codes, total_weight, "Load accepted");
                Ok(LoadOutcome {
                    serial_number: serial_number.to_string(),
                    codes,
                    total_weight,
                })
            }
            Err(err) => {
                info!(code = err.error_code(), error = %err, "Load rejected");
                Err(err)
            }
        }
    }

    /// Catalog by descending weight.
    ///
    /// # Errors
    ///
    /// Store faults only.
    pub fn list_medications(&self) -> DispatchResult<Vec<Medication>> {
        Ok(self.repo.get_medications()?)
    }

    /// # Errors
    ///
    /// `NotFound` if no user has this username.
    pub fn get_user(&self, username: &str) -> DispatchResult<User> {
        let field = format!(
            r#""username":{}"#,
            serde_json::to_string(username).map_err(|e| DispatchError::InvalidInput(e.to_string()))?
        );
        Ok(self.repo.get_user(&field, true)?)
    }

    /// # Errors
    ///
    /// Store faults only.
    pub fn list_users(&self) -> DispatchResult<Vec<User>> {
        Ok(self.repo.get_users()?)
    }

    /// Check credentials for the authentication collaborator.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for an unknown user or a wrong password.
    pub fn authenticate(&self, username: &str, password: &str) -> DispatchResult<User> {
        let user = match self.get_user(username) {
            Ok(user) => user,
            Err(DispatchError::NotFound { .. }) => {
                return Err(DispatchError::Unauthorized("invalid credentials".to_string()));
            }
            Err(err) => return Err(err),
        };

        if user.verify_passphrase(password) {
            Ok(user)
        } else {
            Err(DispatchError::Unauthorized("invalid credentials".to_string()))
        }
    }
}
