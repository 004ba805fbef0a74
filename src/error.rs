//! Error types for facility-triage

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Facility not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Inconsistent write for {facility_id}: expected status '{expected}' after {attempts} attempts")]
    InconsistentWrite {
        facility_id: String,
        expected: String,
        attempts: u32,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Whether the error came from the store itself and may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Database(_))
    }
}
