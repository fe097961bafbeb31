//! In-memory repository with the same contract and ordering as the redb one.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use tracing::debug;

use fleet_domain::{Drone, LoadPlan, Medication, User};

use super::keys;
use super::traits::FleetRepository;
use crate::error::{PersistenceError, Result};
use crate::seed::Fixtures;

#[derive(Debug, Default)]
struct FleetState {
    populated: bool,
    users: BTreeMap<String, User>,
    drones: BTreeMap<String, Drone>,
    medications: BTreeMap<String, Medication>,
    manifests: HashMap<String, Vec<String>>,
}

/// Volatile fleet repository
#[derive(Debug, Default)]
pub struct InMemoryFleetRepository {
    state: RwLock<FleetState>,
}

impl InMemoryFleetRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a catalog item.
    pub fn put_medication(&self, medication: Medication) {
        self.state
            .write()
            .medications
            .insert(medication.code.clone(), medication);
    }
}

impl FleetRepository for InMemoryFleetRepository {
    fn is_populated(&self) -> bool {
        self.state.read().populated
    }

    fn populate_db(&self, fixtures: &Fixtures) -> Result<()> {
        let mut state = self.state.write();
        if state.populated {
            return Err(PersistenceError::AlreadyPopulated);
        }

        for (position, user) in fixtures.users.iter().enumerate() {
            state.users.insert(keys::user(position), user.clone());
        }
        for drone in &fixtures.drones {
            state.drones.insert(drone.serial_number.clone(), drone.clone());
        }
        for medication in &fixtures.medications {
            state
                .medications
                .insert(medication.code.clone(), medication.clone());
        }
        state.populated = true;
        Ok(())
    }

    fn get_user(&self, field: &str, filter: bool) -> Result<User> {
        let state = self.state.read();
        let found = if filter {
            state
                .users
                .values()
                .find(|user| serde_json::to_string(user).is_ok_and(|raw| raw.contains(field)))
        } else {
            state.users.get(field)
        };
        found
            .cloned()
            .ok_or_else(|| PersistenceError::not_found("user", field))
    }

    fn get_users(&self) -> Result<Vec<User>> {
        Ok(self.state.read().users.values().cloned().collect())
    }

    fn get_drone(&self, serial_number: &str) -> Result<Drone> {
        self.state
            .read()
            .drones
            .get(serial_number)
            .cloned()
            .ok_or_else(|| PersistenceError::not_found("drone", keys::drone(serial_number)))
    }

    fn get_drones(&self, filter: &str) -> Result<Vec<Drone>> {
        let mut drones = Vec::new();
        for drone in self.state.read().drones.values() {
            if filter.is_empty() || serde_json::to_string(drone)?.contains(filter) {
                drones.push(drone.clone());
            }
        }
        // stable: ties keep serial order
        drones.sort_by(|a, b| b.battery_capacity.total_cmp(&a.battery_capacity));
        Ok(drones)
    }

    fn register_drone(&self, drone: &Drone) -> Result<()> {
        self.state
            .write()
            .drones
            .insert(drone.serial_number.clone(), drone.clone());
        Ok(())
    }

    fn check_loaded_medications(&self, serial_number: &str) -> Result<Vec<String>> {
        self.state
            .read()
            .manifests
            .get(serial_number)
            .cloned()
            .ok_or_else(|| {
                PersistenceError::not_found(
                    "loaded medications",
                    keys::loaded_medications(serial_number),
                )
            })
    }

    fn load_medication_items(&self, drone: &Drone, codes: &[String]) -> Result<f64> {
        let mut state = self.state.write();
        let stored = state
            .drones
            .get(&drone.serial_number)
            .ok_or_else(|| PersistenceError::not_found("drone", keys::drone(&drone.serial_number)))?;
        if stored != drone {
            return Err(PersistenceError::WriteConflict(format!(
                "drone '{}' changed since it was validated",
                drone.serial_number
            )));
        }

        let plan = LoadPlan::build(codes, stored.weight_limit, |code| {
            state.medications.get(code).map(|m| m.weight)
        })?;
        debug!(serial_number = %drone.serial_number, codes = ?plan.codes, "Manifest replaced");
        state
            .manifests
            .insert(drone.serial_number.clone(), plan.codes);
        Ok(plan.total_weight)
    }

    fn exist_drone(&self, serial_number: &str) -> Result<()> {
        self.get_drone(serial_number).map(|_| ())
    }

    fn get_medications(&self) -> Result<Vec<Medication>> {
        let mut medications: Vec<_> = self.state.read().medications.values().cloned().collect();
        medications.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        Ok(medications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_domain::{DroneModel, DroneState};

    #[test]
    fn test_matches_redb_ordering_rules() {
        let repo = InMemoryFleetRepository::new();
        repo.populate_db(&Fixtures::generate(42)).unwrap();

        let drones = repo.get_drones("").unwrap();
        assert!(
            drones
                .windows(2)
                .all(|w| w[0].battery_capacity >= w[1].battery_capacity)
        );
        let tail: Vec<_> = drones.iter().rev().take(4).map(|d| d.battery_capacity).collect();
        assert_eq!(tail, vec![12.9, 25.0, 25.0, 35.6]);

        let weights: Vec<_> = repo.get_medications().unwrap().iter().map(|m| m.weight).collect();
        assert_eq!(weights[0], 700.0);
        assert_eq!(weights[6], 34.0);
    }

    #[test]
    fn test_user_lookup() {
        let repo = InMemoryFleetRepository::new();
        repo.populate_db(&Fixtures::generate(42)).unwrap();
        assert_eq!(repo.get_user("1", false).unwrap().name, "Tom Carter");
        assert_eq!(
            repo.get_user("richard.sargon", true).unwrap().name,
            "Richard Sargon"
        );
        assert!(repo.get_user("9", false).unwrap_err().is_not_found());
    }

    #[test]
    fn test_stale_snapshot_conflicts() {
        let repo = InMemoryFleetRepository::new();
        let snapshot = Drone::new("D", DroneModel::Lightweight, 50.0, DroneState::Idle);
        repo.register_drone(&snapshot).unwrap();
        repo.register_drone(&Drone::new("D", DroneModel::Lightweight, 20.0, DroneState::Idle))
            .unwrap();

        let err = repo.load_medication_items(&snapshot, &[]).unwrap_err();
        assert!(matches!(err, PersistenceError::WriteConflict(_)));
    }
}
