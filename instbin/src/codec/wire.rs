//! Little-endian primitive encoding over in-memory buffers.

use crate::error::FormatError;

/// Appends little-endian primitives to a byte buffer.
#[derive(Debug, Default)]
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes an `i32` length prefix followed by the bytes.
    pub fn write_blob(&mut self, bytes: &[u8]) -> Result<(), FormatError> {
        let len = i32::try_from(bytes.len()).map_err(|_| FormatError::RecordTooLarge {
            size: bytes.len() as i64,
            limit: i32::MAX as usize,
        })?;
        self.write_i32(len);
        self.write_bytes(bytes);
        Ok(())
    }

    pub fn write_string(&mut self, s: &str) -> Result<(), FormatError> {
        self.write_blob(s.as_bytes())
    }
}

/// Reads little-endian primitives from a byte slice.
pub(crate) struct ByteReader<'a> {
    rest: &'a [u8],
    what: &'static str,
}

impl<'a> ByteReader<'a> {
    /// `what` names the structure being read, for truncation errors.
    pub fn new(data: &'a [u8], what: &'static str) -> Self {
        Self { rest: data, what }
    }

    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    /// The unread tail, for decoders that advance a `&mut &[u8]` themselves.
    pub fn rest_mut(&mut self) -> &mut &'a [u8] {
        &mut self.rest
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let data: &'a [u8] = self.rest;
        let (head, tail) = data
            .split_first_chunk::<N>()
            .ok_or(FormatError::Truncated(self.what))?;
        self.rest = tail;
        Ok(*head)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        if self.rest.len() < len {
            return Err(FormatError::Truncated(self.what));
        }
        let data: &'a [u8] = self.rest;
        let (head, tail) = data.split_at(len);
        self.rest = tail;
        Ok(head)
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        self.take::<1>().map(|[b]| b)
    }

    pub fn read_u16(&mut self) -> Result<u16, FormatError> {
        self.take().map(u16::from_le_bytes)
    }

    pub fn read_i16(&mut self) -> Result<i16, FormatError> {
        self.take().map(i16::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, FormatError> {
        self.take().map(i32::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        self.take().map(u32::from_le_bytes)
    }

    pub fn read_i64(&mut self) -> Result<i64, FormatError> {
        self.take().map(i64::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32, FormatError> {
        self.take().map(f32::from_le_bytes)
    }

    pub fn read_f64(&mut self) -> Result<f64, FormatError> {
        self.take().map(f64::from_le_bytes)
    }

    /// Reads a non-negative `i32` count.
    pub fn read_count(&mut self, what: &'static str) -> Result<usize, FormatError> {
        let count = self.read_i32()?;
        usize::try_from(count).map_err(|_| FormatError::NegativeCount { what, count })
    }

    pub fn read_blob(&mut self) -> Result<&'a [u8], FormatError> {
        let len = self.read_count("byte")?;
        self.read_bytes(len)
    }

    pub fn read_string(&mut self) -> Result<String, FormatError> {
        let bytes = self.read_blob()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FormatError::InvalidUtf8(self.what))
    }
}
