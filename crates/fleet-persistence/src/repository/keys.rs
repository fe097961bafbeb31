//! Key scheme and index names of the fleet data set.

/// Singleton population marker
pub const CONFIG: &str = "config";

pub const DRONE_PREFIX: &str = "drone:";
pub const MEDICATION_PREFIX: &str = "med:";
pub const LOADED_MEDICATIONS_PREFIX: &str = "loaded_medications:";

/// Drones by battery capacity
pub const DRONE_BATTERY_INDEX: &str = "drone_battery";
/// Medications by weight
pub const MEDICATION_WEIGHT_INDEX: &str = "medication_weight";
/// Legacy numeric user records by username
pub const USERS_INDEX: &str = "users";
pub const LOADED_MEDICATIONS_INDEX: &str = "loaded_medications";
pub const CONFIG_INDEX: &str = "config";

#[must_use]
pub fn drone(serial_number: &str) -> String {
    format!("{DRONE_PREFIX}{serial_number}")
}

#[must_use]
pub fn medication(code: &str) -> String {
    format!("{MEDICATION_PREFIX}{code}")
}

#[must_use]
pub fn loaded_medications(serial_number: &str) -> String {
    format!("{LOADED_MEDICATIONS_PREFIX}{serial_number}")
}

/// Users are stored under their position in the fixture list: `0`, `1`, ...
#[must_use]
pub fn user(position: usize) -> String {
    position.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(drone("SN1"), "drone:SN1");
        assert_eq!(medication("AB12"), "med:AB12");
        assert_eq!(loaded_medications("SN1"), "loaded_medications:SN1");
        assert_eq!(user(1), "1");
    }
}
