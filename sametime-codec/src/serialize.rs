//! The [`PutBuffer`] write cursor and primitive marshalling.

use crate::common::Opaque;

/// A growable byte buffer that values are marshalled onto.
///
/// Integers are written big-endian. A boolean is a single byte. Strings
/// are `u16`-length-prefixed UTF-8 (an empty string is just a zero
/// length, no terminator); opaques are `u32`-length-prefixed blobs.
#[derive(Clone, Debug, Default)]
pub struct PutBuffer {
    buf: Vec<u8>,
}

impl PutBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Create an empty buffer with `cap` bytes reserved.
    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap) }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append raw bytes without any framing.
    pub fn write(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Append a big-endian `u16`.
    pub fn put_u16(&mut self, val: u16) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    /// Append a big-endian `u32`.
    pub fn put_u32(&mut self, val: u32) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    /// Append a one-byte boolean.
    pub fn put_bool(&mut self, val: bool) {
        self.buf.push(val as u8);
    }

    /// Append a `u16`-length-prefixed string.
    pub fn put_str(&mut self, val: &str) {
        let bytes = val.as_bytes();
        self.put_u16(bytes.len() as u16);
        self.buf.extend_from_slice(bytes);
    }

    /// Append a `u32`-length-prefixed opaque.
    pub fn put_opaque(&mut self, val: &Opaque) {
        self.put_u32(val.len() as u32);
        self.buf.extend_from_slice(val.as_slice());
    }

    /// Consume the buffer, returning the written bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    /// Consume the buffer, returning the written bytes as an [`Opaque`].
    pub fn into_opaque(self) -> Opaque {
        Opaque::from(self.buf)
    }
}
