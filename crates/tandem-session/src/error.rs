//! Session error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] tandem_protocol::ProtocolError),

    #[error("Awareness error: {0}")]
    Awareness(#[from] tandem_awareness::AwarenessError),

    #[error("Session closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SessionError>;
