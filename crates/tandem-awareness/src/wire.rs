//! Awareness update wire format
//!
//! ```text
//! varUint(count) { varUint(client_id) varUint(clock) varString(state_json) }*
//! ```
//!
//! A missing state travels as the JSON text `null`. An empty string is read
//! as `null` too.

use tandem_core::{ClientId, Value};
use tandem_protocol::{read_message, Decoder, Encoder, ProtocolResult};

use crate::error::{AwarenessError, Result};

/// One client's record in an awareness update
#[derive(Debug, Clone, PartialEq)]
pub struct AwarenessEntry {
    pub client_id: ClientId,
    pub clock: u64,
    /// `None` when the client is offline
    pub state: Option<Value>,
}

/// Decode a whole awareness update
///
/// Either every entry decodes or an error is returned.
pub fn decode_update(update: &[u8]) -> Result<Vec<AwarenessEntry>> {
    let mut decoder = Decoder::new(update);
    let count = decoder.read_var_uint()?;

    // Each entry takes at least three bytes
    let mut entries = Vec::with_capacity((count as usize).min(decoder.remaining() / 3));
    for _ in 0..count {
        let client_id = decoder.read_var_uint()?;
        let clock = decoder.read_var_uint()?;
        let state = parse_state(decoder.read_var_string()?)?;
        entries.push(AwarenessEntry {
            client_id,
            clock,
            state,
        });
    }
    Ok(entries)
}

/// Encode entries in the given order
pub fn encode_update<'a, I>(entries: I) -> Result<Vec<u8>>
where
    I: ExactSizeIterator<Item = (ClientId, u64, Option<&'a Value>)>,
{
    let mut encoder = Encoder::new();
    encoder.write_var_uint(entries.len() as u64);
    for (client_id, clock, state) in entries {
        encoder.write_var_uint(client_id);
        encoder.write_var_uint(clock);
        match state {
            Some(value) => encoder.write_var_string(&value.to_json()?),
            None => encoder.write_var_string("null"),
        }
    }
    Ok(encoder.into_vec())
}

/// Whether an AWARENESS message announces a single client going offline.
///
/// `message` is the message without its leading kind byte, so it starts with
/// the payload length.
pub fn is_awareness_disconnect_message(message: &[u8]) -> ProtocolResult<bool> {
    let payload = read_message(message)?;
    let mut decoder = Decoder::new(payload);
    if decoder.read_var_uint()? != 1 {
        return Ok(false);
    }
    decoder.read_var_uint()?;
    decoder.read_var_uint()?;
    let state = decoder.read_var_string()?;
    Ok(matches!(Value::from_json(state), Ok(Value::Null)))
}

fn parse_state(text: &str) -> Result<Option<Value>> {
    if text.is_empty() {
        return Ok(None);
    }
    match Value::from_json(text) {
        Ok(Value::Null) => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(AwarenessError::Json(e.to_string())),
    }
}
