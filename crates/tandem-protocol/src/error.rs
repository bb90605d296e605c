//! Protocol error types

use thiserror::Error;

/// Protocol-specific errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The stream ended while more bytes were required
    #[error("Unexpected end of message at byte {position}")]
    UnexpectedEof { position: usize },

    #[error("Variable-length integer does not fit in 64 bits")]
    VarintOverflow,

    #[error("Declared length {declared} exceeds the {remaining} remaining bytes")]
    LengthExceedsInput { declared: u64, remaining: usize },

    #[error("Empty message")]
    EmptyMessage,

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("Unknown sync message type: {0}")]
    UnknownSyncType(u8),

    #[error("Invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Document engine error: {0}")]
    Engine(#[from] tandem_core::Error),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
