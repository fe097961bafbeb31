//! # Dispatch Error Types
//!
//! Error taxonomy surfaced to callers of the dispatch service. Each variant
//! carries a stable machine-readable code next to its human-readable detail.

use serde::Serialize;
use thiserror::Error;

use fleet_domain::{DomainError, DroneState};
use fleet_persistence::PersistenceError;

/// Service-level errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound { entity_type: String, id: String },

    #[error("The database has already been populated")]
    AlreadyPopulated,

    #[error("Drone '{serial_number}' battery at {battery_capacity}% is below 25%")]
    BatteryTooLow {
        serial_number: String,
        battery_capacity: f64,
    },

    #[error("Drone '{serial_number}' is busy ({state})")]
    DroneBusy {
        serial_number: String,
        state: DroneState,
    },

    #[error("Medication item '{0}' does not exist")]
    UnknownMedicationCode(String),

    #[error("Maximum load weight exceeded: {total}g over a {limit}g limit")]
    WeightExceeded { total: f64, limit: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(PersistenceError),
}

impl DispatchError {
    pub fn not_found(entity_type: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            id: id.into(),
        }
    }

    /// Get error code for callers
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyPopulated => "ALREADY_POPULATED",
            Self::BatteryTooLow { .. } => "BATTERY_TOO_LOW",
            Self::DroneBusy { .. } => "DRONE_BUSY",
            Self::UnknownMedicationCode(_) => "UNKNOWN_MEDICATION_CODE",
            Self::WeightExceeded { .. } => "WEIGHT_EXCEEDED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Conflict(_) => "CONFLICT",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Business-rule rejection, as opposed to a missing entity or a store fault.
    #[must_use]
    pub const fn is_precondition_failure(&self) -> bool {
        matches!(
            self,
            Self::BatteryTooLow { .. }
                | Self::DroneBusy { .. }
                | Self::UnknownMedicationCode(_)
                | Self::WeightExceeded { .. }
        )
    }

    #[must_use]
    pub fn problem(&self) -> Problem {
        Problem {
            code: self.error_code(),
            detail: self.to_string(),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::BatteryTooLow {
                serial_number,
                battery_capacity,
            } => Self::BatteryTooLow {
                serial_number,
                battery_capacity,
            },
            DomainError::DroneBusy {
                serial_number,
                state,
            } => Self::DroneBusy {
                serial_number,
                state,
            },
            DomainError::UnknownMedicationCode(code) => Self::UnknownMedicationCode(code),
            DomainError::WeightExceeded { total, limit } => Self::WeightExceeded { total, limit },
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

impl From<PersistenceError> for DispatchError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound { entity_type, key } => Self::NotFound {
                entity_type,
                id: key,
            },
            PersistenceError::AlreadyPopulated => Self::AlreadyPopulated,
            PersistenceError::Rejected(domain) => domain.into(),
            PersistenceError::WriteConflict(detail) => Self::Conflict(detail),
            other => Self::Store(other),
        }
    }
}

/// Serializable error summary: stable code plus detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem {
    pub code: &'static str,
    pub detail: String,
}

/// Result type alias for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_faults_are_not_not_found() {
        let missing = DispatchError::from(PersistenceError::not_found("drone", "drone:X"));
        assert_eq!(missing.error_code(), "NOT_FOUND");

        let broken = DispatchError::from(PersistenceError::Deserialization {
            key: "drone:X".into(),
            reason: "EOF".into(),
        });
        assert_eq!(broken.error_code(), "STORE_ERROR");
        assert!(!broken.is_precondition_failure());

        let unregistered =
            DispatchError::from(PersistenceError::InvalidQuery("unknown index 'x'".into()));
        assert!(matches!(unregistered, DispatchError::Store(_)));
        assert_eq!(unregistered.error_code(), "STORE_ERROR");
    }

    #[test]
    fn test_rejections_map_to_precondition_failures() {
        let err = DispatchError::from(PersistenceError::Rejected(DomainError::WeightExceeded {
            total: 300.0,
            limit: 250.0,
        }));
        assert_eq!(err.error_code(), "WEIGHT_EXCEEDED");
        assert!(err.is_precondition_failure());

        let err = DispatchError::from(DomainError::InvalidSerialNumber(String::new()));
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    #[test]
    fn test_problem_json() {
        let problem = DispatchError::UnknownMedicationCode("ZZ".into()).problem();
        let json = serde_json::to_string(&problem).unwrap();
        assert_eq!(
            json,
            r#"{"code":"UNKNOWN_MEDICATION_CODE","detail":"Medication item 'ZZ' does not exist"}"#
        );
    }
}
