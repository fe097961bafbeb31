//! redb repository implementation.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use fleet_domain::{
    Drone, LoadPlan, LoadedMedications, Medication, PopulationMarker, User, dedup_codes,
};

use super::keys;
use super::traits::FleetRepository;
use crate::error::{PersistenceError, Result};
use crate::seed::Fixtures;
use crate::store::{IndexSpec, KeyPattern, Store, WriteTx};

// =============================================================================
// SCHEMA
// =============================================================================

/// Secondary indices of the fleet data set, declared once per store.
#[must_use]
pub fn fleet_schema() -> Vec<IndexSpec> {
    vec![
        IndexSpec::json(keys::DRONE_BATTERY_INDEX, "drone:*", "batteryCapacity"),
        IndexSpec::json(keys::MEDICATION_WEIGHT_INDEX, "med:*", "weight"),
        IndexSpec::json(keys::USERS_INDEX, "*", "username").with_pattern(KeyPattern::Numeric),
        IndexSpec::string(keys::LOADED_MEDICATIONS_INDEX, "loaded_medications:*"),
        IndexSpec::string(keys::CONFIG_INDEX, keys::CONFIG),
    ]
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| PersistenceError::malformed(key, &e))
}

fn require<T: DeserializeOwned>(raw: Option<String>, entity_type: &str, key: &str) -> Result<T> {
    let raw = raw.ok_or_else(|| PersistenceError::not_found(entity_type, key))?;
    decode(key, &raw)
}

fn put<T: Serialize>(tx: &mut WriteTx, key: &str, value: &T) -> Result<()> {
    tx.set(key, &serde_json::to_string(value)?)?;
    Ok(())
}

// =============================================================================
// REDB REPOSITORY
// =============================================================================

/// Fleet repository over the embedded store.
#[derive(Clone)]
pub struct RedbFleetRepository {
    store: Store,
}

impl RedbFleetRepository {
    /// Open (or create) the store file at `path` with the fleet schema.
    ///
    /// # Errors
    ///
    /// `Open` when the file cannot be created or locked.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Store::open(path, &fleet_schema())?))
    }

    /// # Errors
    ///
    /// Returns an error if the in-memory backend cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Store::in_memory(&fleet_schema())?))
    }

    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }
}

impl FleetRepository for RedbFleetRepository {
    fn is_populated(&self) -> bool {
        match self.store.view(|tx| tx.try_get(keys::CONFIG)) {
            Ok(None) => false,
            Ok(Some(raw)) => match decode::<PopulationMarker>(keys::CONFIG, &raw) {
                Ok(marker) => marker.is_populated,
                Err(e) => {
                    warn!(error = %e, "Malformed population marker");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "Could not read population marker");
                false
            }
        }
    }

    #[instrument(skip_all, fields(store = %self.store.location()))]
    fn populate_db(&self, fixtures: &Fixtures) -> Result<()> {
        self.store.update(|tx| {
            if let Some(raw) = tx.try_get(keys::CONFIG)? {
                if decode::<PopulationMarker>(keys::CONFIG, &raw)?.is_populated {
                    return Err(PersistenceError::AlreadyPopulated);
                }
            }

            for (position, user) in fixtures.users.iter().enumerate() {
                put(tx, &keys::user(position), user)?;
            }
            info!(count = fixtures.users.len(), "Users staged");

            for drone in &fixtures.drones {
                put(tx, &keys::drone(&drone.serial_number), drone)?;
            }
            info!(count = fixtures.drones.len(), "Drones staged");

            for medication in &fixtures.medications {
                put(tx, &keys::medication(&medication.code), medication)?;
            }
            info!(count = fixtures.medications.len(), "Medications staged");

            put(tx, keys::CONFIG, &PopulationMarker { is_populated: true })
        })?;

        info!("Database populated");
        Ok(())
    }

    fn get_user(&self, field: &str, filter: bool) -> Result<User> {
        self.store.view(|tx| {
            if !filter {
                // only the legacy numeric keys hold users
                if !KeyPattern::Numeric.matches(field) {
                    return Err(PersistenceError::not_found("user", field));
                }
                return require(tx.try_get(field)?, "user", field);
            }
            tx.ascend(keys::USERS_INDEX)?
                .into_iter()
                .find(|(_, raw)| raw.contains(field))
                .map_or_else(
                    || Err(PersistenceError::not_found("user", field)),
                    |(key, raw)| decode(&key, &raw),
                )
        })
    }

    fn get_users(&self) -> Result<Vec<User>> {
        self.store.view(|tx| {
            tx.ascend(keys::USERS_INDEX)?
                .iter()
                .map(|(key, raw)| decode(key, raw))
                .collect()
        })
    }

    fn get_drone(&self, serial_number: &str) -> Result<Drone> {
        let key = keys::drone(serial_number);
        self.store
            .view(|tx| require(tx.try_get(&key)?, "drone", &key))
    }

    fn get_drones(&self, filter: &str) -> Result<Vec<Drone>> {
        self.store.view(|tx| {
            tx.descend(keys::DRONE_BATTERY_INDEX)?
                .iter()
                .filter(|(_, raw)| filter.is_empty() || raw.contains(filter))
                .map(|(key, raw)| decode(key, raw))
                .collect()
        })
    }

    fn register_drone(&self, drone: &Drone) -> Result<()> {
        let key = keys::drone(&drone.serial_number);
        let replaced = self.store.update(|tx| {
            let previous = tx.set(&key, &serde_json::to_string(drone)?)?;
            Ok(previous.is_some())
        })?;
        info!(key = %key, replaced, "Drone registered");
        Ok(())
    }

    fn check_loaded_medications(&self, serial_number: &str) -> Result<Vec<String>> {
        let key = keys::loaded_medications(serial_number);
        let manifest: LoadedMedications = self
            .store
            .view(|tx| require(tx.try_get(&key)?, "loaded medications", &key))?;
        Ok(manifest.into_codes())
    }

    #[instrument(skip(self, drone), fields(serial_number = %drone.serial_number))]
    fn load_medication_items(&self, drone: &Drone, codes: &[String]) -> Result<f64> {
        let drone_key = keys::drone(&drone.serial_number);

        let plan = self.store.update(|tx| {
            let stored: Drone = require(tx.try_get(&drone_key)?, "drone", &drone_key)?;
            if stored != *drone {
                return Err(PersistenceError::WriteConflict(format!(
                    "drone '{}' changed since it was validated",
                    drone.serial_number
                )));
            }

            let mut weights = HashMap::new();
            for code in dedup_codes(codes) {
                let key = keys::medication(&code);
                if let Some(raw) = tx.try_get(&key)? {
                    let medication: Medication = decode(&key, &raw)?;
                    weights.insert(code, medication.weight);
                }
            }

            let plan = LoadPlan::build(codes, stored.weight_limit, |code| {
                weights.get(code).copied()
            })?;
            put(
                tx,
                &keys::loaded_medications(&drone.serial_number),
                &plan.manifest(),
            )?;
            Ok(plan)
        })?;

        debug!(
            codes = ?plan.codes,
            total_weight = plan.total_weight,
            "Manifest replaced"
        );
        Ok(plan.total_weight)
    }

    fn exist_drone(&self, serial_number: &str) -> Result<()> {
        let key = keys::drone(serial_number);
        if self.store.view(|tx| tx.exists(&key))? {
            Ok(())
        } else {
            Err(PersistenceError::not_found("drone", key))
        }
    }

    fn get_medications(&self) -> Result<Vec<Medication>> {
        self.store.view(|tx| {
            tx.descend(keys::MEDICATION_WEIGHT_INDEX)?
                .iter()
                .map(|(key, raw)| decode(key, raw))
                .collect()
        })
    }
}
