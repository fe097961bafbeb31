//! # Fixtures
//!
//! Deterministic seed data written by `populate_db`: two operator accounts,
//! ten drones covering every state and model, and a seven item catalog.

use std::collections::HashSet;

use base64::{Engine as _, engine::general_purpose};
use fake::Fake;
use fake::faker::company::en::CompanyName;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use fleet_domain::{Drone, DroneModel, DroneState, Medication, User};

/// Serial prefix shared by the seeded drones; the last two digits vary.
pub const SERIAL_PREFIX: &str = "123e4567-e89b-12d3-a456-4266141740";

const CODE_LEN: usize = 10;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const NAME_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

const MEDICATION_WEIGHTS: [f64; 7] = [700.0, 210.0, 34.0, 115.0, 490.0, 226.0, 397.0];

const DRONES: [(DroneModel, f64, DroneState); 10] = [
    (DroneModel::Cruiserweight, 45.0, DroneState::Idle),
    (DroneModel::Middleweight, 56.4, DroneState::Delivered),
    (DroneModel::Heavyweight, 99.2, DroneState::Loading),
    (DroneModel::Middleweight, 35.6, DroneState::Returning),
    (DroneModel::Heavyweight, 52.9, DroneState::Delivering),
    (DroneModel::Lightweight, 12.9, DroneState::Idle),
    (DroneModel::Cruiserweight, 91.3, DroneState::Loaded),
    (DroneModel::Heavyweight, 73.6, DroneState::Loaded),
    (DroneModel::Lightweight, 25.0, DroneState::Idle),
    (DroneModel::Lightweight, 25.0, DroneState::Idle),
];

/// Data set written on first start
#[derive(Debug, Clone, PartialEq)]
pub struct Fixtures {
    pub users: Vec<User>,
    pub drones: Vec<Drone>,
    pub medications: Vec<Medication>,
}

impl Fixtures {
    /// Build the fixtures; the same `seed` always yields the same catalog.
    #[must_use]
    pub fn generate(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            users: users(),
            drones: drones(),
            medications: medications(&mut rng),
        }
    }
}

fn users() -> Vec<User> {
    vec![
        User {
            username: "richard.sargon@meinermail.com".to_string(),
            name: "Richard Sargon".to_string(),
            // password1
            passphrase: "0b14d501a594442a01c6859541bcb3e8164d183d32937b851835442f69d5c94e"
                .to_string(),
        },
        User {
            username: "tom.carter@meinermail.com".to_string(),
            name: "Tom Carter".to_string(),
            // password2
            passphrase: "6cf615d5bcaac778352a8f1f3360d23f02f34ec182e259897fd6ce485d7870d4"
                .to_string(),
        },
    ]
}

fn drones() -> Vec<Drone> {
    DRONES
        .iter()
        .enumerate()
        .map(|(i, &(model, battery, state))| {
            Drone::new(format!("{SERIAL_PREFIX}{:02}", i + 1), model, battery, state)
        })
        .collect()
}

fn medications(rng: &mut StdRng) -> Vec<Medication> {
    let image = general_purpose::STANDARD.encode("fake_image");
    let mut codes = HashSet::new();

    MEDICATION_WEIGHTS
        .iter()
        .enumerate()
        .map(|(i, &weight)| {
            let name = if i == 0 {
                random_string(rng, NAME_CHARSET, 12)
            } else {
                normalize_name(&CompanyName().fake_with_rng::<String, _>(rng))
            };

            let code = loop {
                let candidate = random_string(rng, CODE_CHARSET, CODE_LEN);
                if codes.insert(candidate.clone()) {
                    break candidate;
                }
            };

            Medication {
                name,
                weight,
                code,
                image: image.clone(),
            }
        })
        .collect()
}

fn random_string(rng: &mut StdRng, charset: &[u8], len: usize) -> String {
    (0..len)
        .filter_map(|_| charset.choose(rng).map(|&b| char::from(b)))
        .collect()
}

/// Keep `[A-Za-z0-9_-]`, turning whitespace into `_`.
fn normalize_name(raw: &str) -> String {
    let name: String = raw
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();

    if name.is_empty() {
        "Medication".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_fixtures() {
        assert_eq!(Fixtures::generate(42), Fixtures::generate(42));
    }

    #[test]
    fn test_fixtures_are_valid() {
        let fixtures = Fixtures::generate(9);

        assert_eq!(fixtures.users.len(), 2);
        assert!(fixtures.users[0].verify_passphrase("password1"));
        assert!(fixtures.users[1].verify_passphrase("password2"));

        assert_eq!(fixtures.drones.len(), 10);
        assert_eq!(
            fixtures.drones[0].serial_number,
            "123e4567-e89b-12d3-a456-426614174001"
        );
        assert_eq!(
            fixtures.drones[9].serial_number,
            "123e4567-e89b-12d3-a456-426614174010"
        );
        for drone in &fixtures.drones {
            assert_eq!(drone.weight_limit, drone.model.weight_limit());
        }

        let codes: HashSet<_> = fixtures.medications.iter().map(|m| &m.code).collect();
        assert_eq!(codes.len(), 7);
        for med in &fixtures.medications {
            assert!(med.validate().is_ok(), "{med:?}");
            assert_eq!(med.code.len(), CODE_LEN);
            assert_eq!(med.image, "ZmFrZV9pbWFnZQ==");
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Acme & Sons, Inc."), "Acme__Sons_Inc");
        assert_eq!(normalize_name("!!!"), "Medication");
    }
}
