//! Persistence layer error types

use fleet_domain::DomainError;
use thiserror::Error;

/// Persistence layer errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to open store at {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed record under key {key}: {reason}")]
    Deserialization { key: String, reason: String },

    #[error("Entity not found: {entity_type} with key {key}")]
    NotFound { entity_type: String, key: String },

    #[error("The database has already been populated")]
    AlreadyPopulated,

    #[error("Invalid query parameters: {0}")]
    InvalidQuery(String),

    #[error("Write conflict: {0}")]
    WriteConflict(String),

    #[error(transparent)]
    Rejected(#[from] DomainError),
}

impl PersistenceError {
    pub fn not_found(entity_type: &str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            key: key.into(),
        }
    }

    pub fn malformed(key: &str, err: &serde_json::Error) -> Self {
        Self::Deserialization {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Stable machine-readable kind
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Open { .. } => "STORE_OPEN_ERROR",
            Self::Storage(_) => "STORE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Deserialization { .. } => "DESERIALIZATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyPopulated => "ALREADY_POPULATED",
            Self::InvalidQuery(_) => "INVALID_QUERY",
            Self::WriteConflict(_) => "WRITE_CONFLICT",
            Self::Rejected(err) => err.code(),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<redb::Error> for PersistenceError {
    fn from(err: redb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::TransactionError> for PersistenceError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::TableError> for PersistenceError {
    fn from(err: redb::TableError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::StorageError> for PersistenceError {
    fn from(err: redb::StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::CommitError> for PersistenceError {
    fn from(err: redb::CommitError) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_for_missing_and_broken() {
        let missing = PersistenceError::not_found("drone", "drone:X");
        let broken = PersistenceError::Deserialization {
            key: "drone:X".into(),
            reason: "EOF".into(),
        };
        assert!(missing.is_not_found());
        assert!(!broken.is_not_found());
        assert_ne!(missing.error_code(), broken.error_code());
    }

    #[test]
    fn test_rejections_keep_domain_code() {
        let err = PersistenceError::from(DomainError::UnknownMedicationCode("X".into()));
        assert_eq!(err.error_code(), "UNKNOWN_MEDICATION_CODE");
        assert_eq!(err.to_string(), "medication item 'X' does not exist");
    }
}
