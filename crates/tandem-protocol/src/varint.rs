//! Variable-length integer codec
//!
//! Unsigned integers are written little-endian in 7-bit groups; every byte but
//! the last has the continuation bit (0x80) set. Byte strings are written as a
//! varuint length followed by the raw bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Append the varuint encoding of `n` to `buf`
pub fn write_var_uint<B: BufMut>(buf: &mut B, mut n: u64) {
    while n > 0x7f {
        buf.put_u8(0x80 | (n as u8 & 0x7f));
        n >>= 7;
    }
    buf.put_u8(n as u8);
}

/// Encode `n` as a varuint
pub fn encode_uint(n: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10);
    write_var_uint(&mut buf, n);
    buf
}

/// Decode a varuint starting at `cursor`, returning the value and the cursor
/// just past it
pub fn decode_uint(stream: &[u8], cursor: usize) -> ProtocolResult<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    let mut pos = cursor;

    loop {
        let byte = *stream
            .get(pos)
            .ok_or(ProtocolError::UnexpectedEof { position: pos })?;
        pos += 1;

        let bits = u64::from(byte & 0x7f);
        if shift >= 64 || (shift == 63 && bits > 1) {
            return Err(ProtocolError::VarintOverflow);
        }
        value |= bits << shift;

        if byte & 0x80 == 0 {
            return Ok((value, pos));
        }
        shift += 7;
    }
}

/// Encode `payload` prefixed with its varuint length
pub fn encode_length_prefixed(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 5);
    write_var_uint(&mut buf, payload.len() as u64);
    buf.extend_from_slice(payload);
    buf
}

/// Decode a length-prefixed payload starting at `cursor`
///
/// A declared length of zero yields an empty slice.
pub fn decode_length_prefixed(stream: &[u8], cursor: usize) -> ProtocolResult<(&[u8], usize)> {
    let (declared, pos) = decode_uint(stream, cursor)?;
    let remaining = stream.len() - pos;

    if declared > remaining as u64 {
        return Err(ProtocolError::LengthExceedsInput { declared, remaining });
    }

    let end = pos + declared as usize;
    Ok((&stream[pos..end], end))
}

/// Iterate over consecutive length-prefixed payloads until `stream` is exhausted
pub fn decode_all_messages(stream: &[u8]) -> Messages<'_> {
    Decoder::new(stream).messages()
}

/// Same as [`encode_length_prefixed`]
pub fn write_message(payload: &[u8]) -> Vec<u8> {
    encode_length_prefixed(payload)
}

/// Read the first length-prefixed payload of `stream`
pub fn read_message(stream: &[u8]) -> ProtocolResult<&[u8]> {
    Decoder::new(stream)
        .read_message()?
        .ok_or(ProtocolError::UnexpectedEof { position: 0 })
}

/// Buffer builder for the varuint wire format
#[derive(Debug, Default, Clone)]
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Write one raw byte (message tags)
    pub fn write_u8(&mut self, byte: u8) {
        self.buf.put_u8(byte);
    }

    pub fn write_var_uint(&mut self, n: u64) {
        write_var_uint(&mut self.buf, n);
    }

    /// Write a length-prefixed byte string
    pub fn write_buf(&mut self, data: &[u8]) {
        self.write_var_uint(data.len() as u64);
        self.buf.put_slice(data);
    }

    /// Write a length-prefixed UTF-8 string
    pub fn write_var_string(&mut self, s: &str) {
        self.write_buf(s.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Cursor over an immutable byte buffer
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read offset
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread tail of the buffer
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(ProtocolError::UnexpectedEof { position: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_var_uint(&mut self) -> ProtocolResult<u64> {
        let (value, pos) = decode_uint(self.data, self.pos)?;
        self.pos = pos;
        Ok(value)
    }

    /// Read a length-prefixed byte string
    pub fn read_buf(&mut self) -> ProtocolResult<&'a [u8]> {
        let (payload, pos) = decode_length_prefixed(self.data, self.pos)?;
        self.pos = pos;
        Ok(payload)
    }

    /// Read the next length-prefixed payload, or `None` once the buffer is
    /// exhausted
    pub fn read_message(&mut self) -> ProtocolResult<Option<&'a [u8]>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.read_buf().map(Some)
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_var_string(&mut self) -> ProtocolResult<&'a str> {
        let raw = self.read_buf()?;
        Ok(std::str::from_utf8(raw)?)
    }

    /// Consume the decoder as an iterator of length-prefixed payloads
    pub fn messages(self) -> Messages<'a> {
        Messages {
            decoder: self,
            failed: false,
        }
    }
}

/// Iterator returned by [`decode_all_messages`]
///
/// Stops after the first decoding error.
#[derive(Debug, Clone)]
pub struct Messages<'a> {
    decoder: Decoder<'a>,
    failed: bool,
}

impl<'a> Iterator for Messages<'a> {
    type Item = ProtocolResult<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.decoder.read_message() {
            Ok(Some(payload)) => Some(Ok(payload)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_uint_known_values() {
        assert_eq!(encode_uint(0), vec![0x00]);
        assert_eq!(encode_uint(127), vec![0x7f]);
        assert_eq!(encode_uint(128), vec![0x80, 0x01]);
        assert_eq!(encode_uint(300), vec![0xac, 0x02]);
        assert_eq!(encode_uint(u64::MAX).len(), 10);
    }

    #[test]
    fn test_decode_uint_advances_cursor() {
        let stream = [0x05, 0xac, 0x02, 0x7f];
        let (a, pos) = decode_uint(&stream, 0).unwrap();
        let (b, pos) = decode_uint(&stream, pos).unwrap();
        let (c, pos) = decode_uint(&stream, pos).unwrap();
        assert_eq!((a, b, c, pos), (5, 300, 127, 4));
    }

    #[test]
    fn test_decode_uint_exhausted() {
        assert!(matches!(
            decode_uint(&[], 0),
            Err(ProtocolError::UnexpectedEof { position: 0 })
        ));
        // Continuation bit set on the last available byte
        assert!(matches!(
            decode_uint(&[0x80, 0x80], 0),
            Err(ProtocolError::UnexpectedEof { position: 2 })
        ));
    }

    #[test]
    fn test_decode_uint_overflow() {
        let mut stream = vec![0xff; 10];
        stream.push(0x01);
        assert!(matches!(decode_uint(&stream, 0), Err(ProtocolError::VarintOverflow)));

        let mut stream = vec![0xff; 9];
        stream.push(0x02);
        assert!(matches!(decode_uint(&stream, 0), Err(ProtocolError::VarintOverflow)));
    }

    #[test]
    fn test_length_prefixed() {
        let encoded = encode_length_prefixed(b"Hello");
        assert_eq!(encoded, b"\x05Hello");

        let (payload, pos) = decode_length_prefixed(&encoded, 0).unwrap();
        assert_eq!(payload, b"Hello");
        assert_eq!(pos, 6);
    }

    #[test]
    fn test_length_prefixed_zero_length() {
        let (payload, pos) = decode_length_prefixed(&[0x00], 0).unwrap();
        assert!(payload.is_empty());
        assert_eq!(pos, 1);
    }

    #[test]
    fn test_length_prefixed_truncated() {
        let err = decode_length_prefixed(b"\x05Hel", 0).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::LengthExceedsInput { declared: 5, remaining: 3 }
        ));
    }

    #[test]
    fn test_decode_all_messages() {
        assert_eq!(decode_all_messages(b"").count(), 0);

        let single: Vec<_> = decode_all_messages(b"\x00").collect::<Result<_, _>>().unwrap();
        assert_eq!(single, vec![&b""[..]]);

        let mut stream = encode_length_prefixed(b"one");
        stream.extend(encode_length_prefixed(b"two"));
        let messages: Vec<_> = decode_all_messages(&stream).collect::<Result<_, _>>().unwrap();
        assert_eq!(messages, vec![&b"one"[..], &b"two"[..]]);

        // Restartable by wrapping the same buffer again
        assert_eq!(decode_all_messages(&stream).count(), 2);
    }

    #[test]
    fn test_decode_all_messages_stops_after_error() {
        let mut stream = encode_length_prefixed(b"ok");
        stream.extend_from_slice(b"\x09short");
        let results: Vec<_> = decode_all_messages(&stream).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_read_message() {
        assert_eq!(read_message(b"\x03abcXYZ").unwrap(), b"abc");
        assert!(read_message(b"").is_err());
        assert_eq!(write_message(b"abc"), b"\x03abc");
    }

    #[test]
    fn test_encoder_decoder() {
        let mut encoder = Encoder::new();
        encoder.write_u8(1);
        encoder.write_var_uint(853790970);
        encoder.write_var_string("Hello");
        let bytes = encoder.into_vec();

        let mut decoder = Decoder::new(&bytes);
        assert_eq!(decoder.read_u8().unwrap(), 1);
        assert_eq!(decoder.read_var_uint().unwrap(), 853790970);
        assert_eq!(decoder.read_var_string().unwrap(), "Hello");
        assert!(decoder.is_empty());
        assert!(decoder.read_var_string().is_err());
    }

    #[test]
    fn test_read_var_string_invalid_utf8() {
        let mut decoder = Decoder::new(b"\x02\xff\xfe");
        assert!(matches!(
            decoder.read_var_string(),
            Err(ProtocolError::InvalidUtf8(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_varint_round_trip(n in any::<u64>()) {
            let encoded = encode_uint(n);
            let (decoded, pos) = decode_uint(&encoded, 0).unwrap();
            prop_assert_eq!(decoded, n);
            prop_assert_eq!(pos, encoded.len());
        }
    }
}
