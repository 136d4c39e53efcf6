//! Little-endian writer used by the encoder.

use bytes::{BufMut, BytesMut};

/// Growable output buffer
#[derive(Debug, Default)]
pub(crate) struct MapWriter {
    buf: BytesMut,
}

impl MapWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub(crate) fn put_u16(&mut self, v: u16) {
        self.buf.put_u16_le(v);
    }

    pub(crate) fn put_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    pub(crate) fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// u8 length prefix followed by the UTF-8 bytes; `None` if too long
    pub(crate) fn put_string(&mut self, s: &str) -> Option<()> {
        let len = u8::try_from(s.len()).ok()?;
        self.buf.put_u8(len);
        self.buf.put_slice(s.as_bytes());
        Some(())
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}
