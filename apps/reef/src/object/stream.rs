//! Little-endian typed byte streams used for object deltas.
//!
//! A write of N bytes on the output side is always readable as N
//! contiguous bytes on the input side, regardless of how the transport
//! fragments buffers underneath.

use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use super::{ObjectVersion, Version};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("unexpected end of stream")]
    UnexpectedEof,
    #[error("invalid utf-8 in string")]
    InvalidUtf8,
    #[error("sequence of {0} elements exceeds remaining stream")]
    LengthOverflow(u64),
    #[error("invalid value for {0}")]
    InvalidValue(&'static str),
}

#[derive(Debug, Default)]
pub struct OutputStream {
    buf: Vec<u8>,
}

impl OutputStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u128(&mut self, value: u128) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_uuid(&mut self, value: Uuid) {
        self.write_u128(value.as_u128());
    }

    /// `<u64 length><bytes>`.
    pub fn write_string(&mut self, value: &str) {
        self.write_u64(value.len() as u64);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Raw fixed-size float run, no length prefix.
    pub fn write_f32s(&mut self, values: &[f32]) {
        for value in values {
            self.write_f32(*value);
        }
    }

    /// Flat sequence of trivially-copyable floats: `<u64 count><raw>`.
    pub fn write_f32_vec(&mut self, values: &[f32]) {
        self.write_u64(values.len() as u64);
        self.write_f32s(values);
    }

    pub fn write_object_version(&mut self, value: &ObjectVersion) {
        self.write_uuid(value.id);
        self.write_u128(value.version);
    }

    /// Flat sequence of object references: `<u64 count><uuid, version>…`.
    pub fn write_object_versions(&mut self, values: &[ObjectVersion]) {
        self.write_u64(values.len() as u64);
        for value in values {
            self.write_object_version(value);
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputStream {
    data: Bytes,
    pos: usize,
}

impl InputStream {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn has_data(&self) -> bool {
        self.remaining() > 0
    }

    fn take(&mut self, len: usize) -> Result<&[u8], StreamError> {
        if self.remaining() < len {
            return Err(StreamError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, StreamError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, StreamError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(StreamError::InvalidValue("bool")),
        }
    }

    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("sized take");
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_i32(&mut self) -> Result<i32, StreamError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("sized take");
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn read_u64(&mut self) -> Result<u64, StreamError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("sized take");
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_u128(&mut self) -> Result<u128, StreamError> {
        let bytes: [u8; 16] = self.take(16)?.try_into().expect("sized take");
        Ok(u128::from_le_bytes(bytes))
    }

    pub fn read_f32(&mut self) -> Result<f32, StreamError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("sized take");
        Ok(f32::from_le_bytes(bytes))
    }

    pub fn read_uuid(&mut self) -> Result<Uuid, StreamError> {
        Ok(Uuid::from_u128(self.read_u128()?))
    }

    pub fn read_string(&mut self) -> Result<String, StreamError> {
        let len = self.read_u64()?;
        if len > self.remaining() as u64 {
            return Err(StreamError::LengthOverflow(len));
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| StreamError::InvalidUtf8)
    }

    pub fn read_f32s(&mut self, out: &mut [f32]) -> Result<(), StreamError> {
        for slot in out.iter_mut() {
            *slot = self.read_f32()?;
        }
        Ok(())
    }

    pub fn read_f32_vec(&mut self) -> Result<Vec<f32>, StreamError> {
        let count = self.read_u64()?;
        if count.saturating_mul(4) > self.remaining() as u64 {
            return Err(StreamError::LengthOverflow(count));
        }
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            values.push(self.read_f32()?);
        }
        Ok(values)
    }

    pub fn read_object_version(&mut self) -> Result<ObjectVersion, StreamError> {
        let id = self.read_uuid()?;
        let version: Version = self.read_u128()?;
        Ok(ObjectVersion { id, version })
    }

    pub fn read_object_versions(&mut self) -> Result<Vec<ObjectVersion>, StreamError> {
        let count = self.read_u64()?;
        if count.saturating_mul(32) > self.remaining() as u64 {
            return Err(StreamError::LengthOverflow(count));
        }
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            values.push(self.read_object_version()?);
        }
        Ok(values)
    }
}
