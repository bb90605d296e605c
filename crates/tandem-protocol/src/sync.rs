//! Document sync handshake
//!
//! The initiator greets with STEP1 carrying its state vector. The responder
//! answers with STEP2 carrying everything the initiator is missing. Afterwards
//! both sides exchange UPDATE messages as local edits happen.

use tandem_core::{DocumentEngine, ReadHandle, WriteHandle};
use tracing::{debug, trace};

use crate::error::ProtocolResult;
use crate::message::{frame_sync, SyncMessage, SyncMessageType};
use crate::varint::Decoder;

/// Encoded update that carries no changes
pub const EMPTY_UPDATE: [u8; 2] = [0x00, 0x00];

/// STEP1 greeting carrying the engine's current state vector
pub fn create_sync_message<E: DocumentEngine>(engine: &E) -> ProtocolResult<Vec<u8>> {
    let state = engine.read()?.state_vector();
    Ok(frame_sync(SyncMessageType::Step1, &state))
}

/// Handle a SYNC message whose outer tag was already stripped, so the first
/// byte is the sync sub-kind.
///
/// Returns the framed STEP2 reply for a STEP1, otherwise `None`.
pub fn handle_sync_message<E: DocumentEngine>(
    message: &[u8],
    engine: &E,
) -> ProtocolResult<Option<Vec<u8>>> {
    let mut decoder = Decoder::new(message);
    let sync = SyncMessage::decode_from(&mut decoder)?;
    handle(&sync, engine)
}

/// Same as [`handle_sync_message`] for an already decoded message
pub fn handle<E: DocumentEngine>(
    message: &SyncMessage,
    engine: &E,
) -> ProtocolResult<Option<Vec<u8>>> {
    match message {
        SyncMessage::Step1(state) => {
            let update = engine.read()?.diff(state)?;
            debug!(client_id = engine.client_id(), len = update.len(), "Answering sync step 1");
            Ok(Some(frame_sync(SyncMessageType::Step2, &update)))
        }
        SyncMessage::Step2(update) | SyncMessage::Update(update) => {
            apply(engine, update)?;
            Ok(None)
        }
    }
}

/// Apply `update` unless it is the empty sentinel. Returns whether the engine
/// was called.
pub fn apply<E: DocumentEngine>(engine: &E, update: &[u8]) -> ProtocolResult<bool> {
    if is_empty_update(update) {
        trace!("Skipping empty update");
        return Ok(false);
    }
    engine.write()?.apply_update(update)?;
    Ok(true)
}

pub fn is_empty_update(update: &[u8]) -> bool {
    update == EMPTY_UPDATE
}
