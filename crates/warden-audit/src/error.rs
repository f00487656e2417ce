//! Error types for the audit crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Debug, Error)]
pub enum AuditError {
    /// Underlying database failure.
    #[error("journal database error: {0}")]
    Database(#[from] sled::Error),

    /// Record could not be (de)serialized.
    #[error("journal serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data violated the journal's key/value invariants.
    #[error("journal corrupt: {0}")]
    Corrupt(String),
}
