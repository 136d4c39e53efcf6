//! Bounds-checked little-endian reader over a map buffer.
//!
//! `bytes::Buf` panics on underflow, so every read checks the remaining
//! length first and reports the absolute offset of the failure.

use crate::error::DecodeError;
use bytes::Buf;

/// Cursor over a borrowed byte slice
#[derive(Debug, Clone)]
pub(crate) struct MapReader<'a> {
    buf: &'a [u8],
    base: usize,
    len: usize,
}

impl<'a> MapReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    fn at(data: &'a [u8], base: usize) -> Self {
        Self {
            buf: data,
            base,
            len: data.len(),
        }
    }

    /// Absolute offset of the next byte
    pub(crate) fn offset(&self) -> usize {
        self.base + (self.len - self.buf.remaining())
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn ensure(&self, n: usize) -> Result<(), DecodeError> {
        if self.buf.remaining() < n {
            return Err(DecodeError::UnexpectedEof {
                offset: self.offset(),
                needed: n - self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub(crate) fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// u8 length prefix followed by UTF-8 bytes
    pub(crate) fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u8()? as usize;
        let offset = self.offset();
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidString { offset })
    }

    /// Splits off the next `n` bytes as an independent reader that keeps
    /// reporting absolute offsets
    pub(crate) fn section(&mut self, n: usize) -> Result<MapReader<'a>, DecodeError> {
        let base = self.offset();
        let bytes = self.read_bytes(n)?;
        Ok(Self::at(bytes, base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian() {
        let data = [0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut reader = MapReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0x1234_5678);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_eof_reports_offset() {
        let data = [0x01, 0x02, 0x03];
        let mut reader = MapReader::new(&data);
        reader.read_u16().unwrap();
        assert_eq!(
            reader.read_u32(),
            Err(DecodeError::UnexpectedEof {
                offset: 2,
                needed: 3
            })
        );
    }

    #[test]
    fn test_section_keeps_absolute_offsets() {
        let data = [0xAA, 0x01, 0x02, 0x03];
        let mut reader = MapReader::new(&data);
        reader.read_u8().unwrap();
        let mut section = reader.section(2).unwrap();
        assert_eq!(section.offset(), 1);
        section.read_u16().unwrap();
        assert!(section.is_empty());
        assert_eq!(section.read_u8().unwrap_err(), DecodeError::UnexpectedEof {
            offset: 3,
            needed: 1
        });
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_invalid_string() {
        let data = [0x02, 0xFF, 0xFE];
        let mut reader = MapReader::new(&data);
        assert_eq!(reader.read_string(), Err(DecodeError::InvalidString { offset: 1 }));
    }
}
