//! Message framing
//!
//! ```text
//! SYNC      = 0x00 • sync_type • varUint(len) • payload
//! AWARENESS = 0x01 • varUint(len) • payload
//!
//! sync_type:
//!   0 = Step1  (state vector)
//!   1 = Step2  (update answering a Step1)
//!   2 = Update (incremental update)
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use crate::varint::{write_var_uint, Decoder};

/// Top-level message kind (first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Sync = 0,
    Awareness = 1,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(MessageType::Sync),
            1 => Ok(MessageType::Awareness),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

/// Sync sub-kind (second byte of a SYNC message)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SyncMessageType {
    Step1 = 0,
    Step2 = 1,
    Update = 2,
}

impl TryFrom<u8> for SyncMessageType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(SyncMessageType::Step1),
            1 => Ok(SyncMessageType::Step2),
            2 => Ok(SyncMessageType::Update),
            other => Err(ProtocolError::UnknownSyncType(other)),
        }
    }
}

/// Frame a sync payload
pub fn frame_sync(kind: SyncMessageType, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 7);
    buf.push(MessageType::Sync as u8);
    buf.push(kind as u8);
    write_var_uint(&mut buf, payload.len() as u64);
    buf.extend_from_slice(payload);
    buf
}

/// Frame an awareness payload
pub fn frame_awareness(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 6);
    buf.push(MessageType::Awareness as u8);
    write_var_uint(&mut buf, payload.len() as u64);
    buf.extend_from_slice(payload);
    buf
}

/// Frame a local document update for broadcast
pub fn create_update_message(update: &[u8]) -> Vec<u8> {
    frame_sync(SyncMessageType::Update, update)
}

/// Frame an encoded awareness update
pub fn create_awareness_message(payload: &[u8]) -> Vec<u8> {
    frame_awareness(payload)
}

/// Kind of a framed message, read from its first byte
pub fn message_type(message: &[u8]) -> ProtocolResult<MessageType> {
    let first = *message.first().ok_or(ProtocolError::EmptyMessage)?;
    MessageType::try_from(first)
}

/// Strip the one-byte top-level kind tag
pub fn unwrap_outer(message: &[u8]) -> ProtocolResult<&[u8]> {
    match message.split_first() {
        Some((_, rest)) => Ok(rest),
        None => Err(ProtocolError::EmptyMessage),
    }
}

/// A decoded wire message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Sync(SyncMessage),
    /// Encoded awareness update
    Awareness(Vec<u8>),
}

impl Message {
    /// Decode exactly one message from the front of `data`, ignoring any
    /// trailing bytes
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        let mut decoder = Decoder::new(data);
        Self::decode_from(&mut decoder)
    }

    /// Decode every message of a multi-message stream
    pub fn decode_all(data: &[u8]) -> ProtocolResult<Vec<Self>> {
        let mut decoder = Decoder::new(data);
        let mut messages = Vec::new();
        while !decoder.is_empty() {
            messages.push(Self::decode_from(&mut decoder)?);
        }
        Ok(messages)
    }

    pub fn decode_from(decoder: &mut Decoder<'_>) -> ProtocolResult<Self> {
        let tag = decoder.read_u8()?;
        match MessageType::try_from(tag)? {
            MessageType::Sync => Ok(Message::Sync(SyncMessage::decode_from(decoder)?)),
            MessageType::Awareness => Ok(Message::Awareness(decoder.read_buf()?.to_vec())),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Sync(sync) => sync.encode(),
            Message::Awareness(payload) => frame_awareness(payload),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Sync(_) => MessageType::Sync,
            Message::Awareness(_) => MessageType::Awareness,
        }
    }
}

/// A decoded SYNC message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Sender's state vector
    Step1(Vec<u8>),
    /// Update answering a Step1
    Step2(Vec<u8>),
    /// Incremental update
    Update(Vec<u8>),
}

impl SyncMessage {
    /// Decode from a decoder positioned on the sync sub-kind byte
    pub fn decode_from(decoder: &mut Decoder<'_>) -> ProtocolResult<Self> {
        let kind = SyncMessageType::try_from(decoder.read_u8()?)?;
        let payload = decoder.read_buf()?.to_vec();
        Ok(match kind {
            SyncMessageType::Step1 => SyncMessage::Step1(payload),
            SyncMessageType::Step2 => SyncMessage::Step2(payload),
            SyncMessageType::Update => SyncMessage::Update(payload),
        })
    }

    pub fn kind(&self) -> SyncMessageType {
        match self {
            SyncMessage::Step1(_) => SyncMessageType::Step1,
            SyncMessage::Step2(_) => SyncMessageType::Step2,
            SyncMessage::Update(_) => SyncMessageType::Update,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            SyncMessage::Step1(p) | SyncMessage::Step2(p) | SyncMessage::Update(p) => p,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        frame_sync(self.kind(), self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sync_layout() {
        let framed = frame_sync(SyncMessageType::Step2, b"abc");
        assert_eq!(framed, vec![0x00, 0x01, 0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn test_frame_awareness_layout() {
        let framed = frame_awareness(b"xy");
        assert_eq!(framed, vec![0x01, 0x02, b'x', b'y']);
    }

    #[test]
    fn test_frame_large_payload_length() {
        let payload = vec![7u8; 200];
        let framed = frame_awareness(&payload);
        assert_eq!(&framed[..3], &[0x01, 0xc8, 0x01]);
        assert_eq!(framed.len(), 203);
    }

    #[test]
    fn test_unwrap_outer() {
        let framed = frame_sync(SyncMessageType::Update, b"u");
        assert_eq!(unwrap_outer(&framed).unwrap(), &[0x02, 0x01, b'u']);
        assert!(matches!(unwrap_outer(&[]), Err(ProtocolError::EmptyMessage)));
    }

    #[test]
    fn test_message_type() {
        assert_eq!(message_type(&[0x00, 0x00]).unwrap(), MessageType::Sync);
        assert_eq!(message_type(&[0x01]).unwrap(), MessageType::Awareness);
        assert!(matches!(
            message_type(&[0x07]),
            Err(ProtocolError::UnknownMessageType(7))
        ));
    }

    #[test]
    fn test_decode_sync_message() {
        let framed = frame_sync(SyncMessageType::Step1, &[0x00]);
        let decoded = Message::decode(&framed).unwrap();
        assert_eq!(decoded, Message::Sync(SyncMessage::Step1(vec![0x00])));
        assert_eq!(decoded.encode(), framed);
    }

    #[test]
    fn test_decode_unknown_sync_type() {
        let framed = [0x00, 0x09, 0x00];
        assert!(matches!(
            Message::decode(&framed),
            Err(ProtocolError::UnknownSyncType(9))
        ));
    }

    #[test]
    fn test_decode_all_stream() {
        let mut stream = frame_sync(SyncMessageType::Update, b"one");
        stream.extend(frame_awareness(b"two"));
        stream.extend(frame_sync(SyncMessageType::Step2, &[0, 0]));

        let messages = Message::decode_all(&stream).unwrap();
        assert_eq!(
            messages,
            vec![
                Message::Sync(SyncMessage::Update(b"one".to_vec())),
                Message::Awareness(b"two".to_vec()),
                Message::Sync(SyncMessage::Step2(vec![0, 0])),
            ]
        );
    }

    #[test]
    fn test_decode_truncated_payload() {
        let mut framed = frame_awareness(b"payload");
        framed.truncate(framed.len() - 2);
        assert!(matches!(
            Message::decode(&framed),
            Err(ProtocolError::LengthExceedsInput { declared: 7, remaining: 5 })
        ));
    }
}
