//! Tandem wire protocol
//!
//! Binary framing shared by document sync and awareness:
//!
//! ```text
//! [kind: u8]([sync_type: u8]) varUint(len) payload
//! ```
//!
//! Integers are varuints (little-endian base-128). A stream may carry several
//! messages back to back.

pub mod error;
pub mod message;
pub mod sync;
pub mod varint;

pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    create_awareness_message, create_update_message, frame_awareness, frame_sync,
    message_type, unwrap_outer, Message, MessageType, SyncMessage, SyncMessageType,
};
pub use sync::{create_sync_message, handle_sync_message, EMPTY_UPDATE};
pub use varint::{
    decode_all_messages, decode_length_prefixed, decode_uint, encode_length_prefixed,
    encode_uint, read_message, write_message, Decoder, Encoder,
};
