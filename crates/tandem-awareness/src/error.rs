//! Awareness error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwarenessError {
    #[error("Presence reaper already started")]
    AlreadyStarted,

    #[error("Presence reaper not started")]
    NotStarted,

    #[error("Malformed awareness update: {0}")]
    Protocol(#[from] tandem_protocol::ProtocolError),

    #[error(transparent)]
    Core(#[from] tandem_core::Error),

    /// A state string that is not valid JSON
    #[error("Invalid awareness state JSON: {0}")]
    Json(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, AwarenessError>;
