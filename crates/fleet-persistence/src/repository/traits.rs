//! # Repository Traits
//!
//! Narrow capability interface over the fleet data set. The redb store is
//! the production backend; the in-memory implementation backs service tests.

use fleet_domain::{Drone, Medication, User};

use crate::error::Result;
use crate::seed::Fixtures;

// =============================================================================
// FLEET REPOSITORY
// =============================================================================

/// Repository for drones, the medication catalog, manifests and users.
///
/// Every call runs in its own store transaction and releases it before
/// returning, on success and failure alike.
pub trait FleetRepository: Send + Sync {
    /// Whether the fixture marker is set. Store failures read as `false`.
    fn is_populated(&self) -> bool;

    /// Write `fixtures` and set the marker, all or nothing.
    ///
    /// # Errors
    ///
    /// `AlreadyPopulated` when the marker is already set.
    fn populate_db(&self, fixtures: &Fixtures) -> Result<()>;

    /// Find a user. Without `filter`, `field` is the record key; with
    /// `filter`, the first user whose JSON record contains `field` wins.
    ///
    /// # Errors
    ///
    /// `NotFound` when nothing matches.
    fn get_user(&self, field: &str, filter: bool) -> Result<User>;

    /// All users in key order.
    fn get_users(&self) -> Result<Vec<User>>;

    /// # Errors
    ///
    /// `NotFound` if no drone has this serial number.
    fn get_drone(&self, serial_number: &str) -> Result<Drone>;

    /// Drones by descending battery capacity, ties by serial number.
    /// A non-empty `filter` keeps records whose JSON contains it.
    fn get_drones(&self, filter: &str) -> Result<Vec<Drone>>;

    /// Insert or fully replace the drone record.
    fn register_drone(&self, drone: &Drone) -> Result<()>;

    /// # Errors
    ///
    /// `NotFound` when the drone has no manifest.
    fn check_loaded_medications(&self, serial_number: &str) -> Result<Vec<String>>;

    /// Replace the manifest of `drone` with the deduplicated `codes` and
    /// return the accepted weight in grams.
    ///
    /// `drone` is the snapshot the caller validated; the write is refused
    /// when the stored record no longer matches it.
    ///
    /// # Errors
    ///
    /// `NotFound` if the drone is gone, `WriteConflict` if it changed,
    /// `Rejected` with `UnknownMedicationCode` or `WeightExceeded`. The
    /// previous manifest is left untouched on any error.
    fn load_medication_items(&self, drone: &Drone, codes: &[String]) -> Result<f64>;

    /// # Errors
    ///
    /// `NotFound` if no drone has this serial number.
    fn exist_drone(&self, serial_number: &str) -> Result<()>;

    /// Catalog by descending weight, ties by code.
    fn get_medications(&self) -> Result<Vec<Medication>>;
}
