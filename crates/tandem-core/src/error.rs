//! Error types for Tandem Core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid document ID: {0}")]
    InvalidDocumentId(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid state vector: {0}")]
    InvalidState(String),

    /// The engine refused an update payload (corrupt or undecodable).
    #[error("Invalid update: {0}")]
    Validation(String),

    #[error("Transaction unavailable: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for Tandem Core operations
pub type Result<T> = std::result::Result<T, Error>;
