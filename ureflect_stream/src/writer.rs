use bytes::{BufMut, Bytes, BytesMut};

use crate::names::NameId;
use crate::objects::ObjectRef;
use crate::{StreamError, MAX_ARRAY_INDEX};

/// Produces the encodings [`PackageStream`](crate::PackageStream) reads.
#[derive(Debug, Clone, Default)]
pub struct PackageWriter {
    buf: BytesMut,
}

impl PackageWriter {
    pub fn new() -> Self {
        Self::default()
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
        self.buf.freeze()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32_le(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_f64_le(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn write_index(&mut self, value: i32) {
        let mut remaining = value.unsigned_abs();
        let mut first = (remaining & 0x3f) as u8;
        remaining >>= 6;
        if value < 0 {
            first |= 0x80;
        }
        if remaining != 0 {
            first |= 0x40;
        }
        self.buf.put_u8(first);
        while remaining != 0 {
            let mut next = (remaining & 0x7f) as u8;
            remaining >>= 7;
            if remaining != 0 {
                next |= 0x80;
            }
            self.buf.put_u8(next);
        }
    }

    pub fn write_array_index(&mut self, index: u32) -> Result<(), StreamError> {
        if index < 0x80 {
            self.buf.put_u8(index as u8);
        } else if index < 0x4000 {
            self.buf.put_u8(((index >> 8) as u8) | 0x80);
            self.buf.put_u8(index as u8);
        } else if index <= MAX_ARRAY_INDEX {
            self.buf.put_u32(index | 0xc000_0000);
        } else {
            return Err(StreamError::ArrayIndexTooLarge(index));
        }
        Ok(())
    }

    pub fn write_name(&mut self, name: NameId) {
        self.write_index(name.0 as i32);
    }

    pub fn write_object(&mut self, reference: ObjectRef) {
        self.write_index(reference.0);
    }

    /// Characters outside Latin-1 are written as `?`.
    pub fn write_ascii_z(&mut self, text: &str) {
        for ch in text.chars() {
            self.buf.put_u8(u8::try_from(ch).unwrap_or(b'?'));
        }
        self.buf.put_u8(0);
    }

    pub fn write_unicode_z(&mut self, text: &str) {
        for unit in text.encode_utf16() {
            self.buf.put_u16_le(unit);
        }
        self.buf.put_u16_le(0);
    }

    /// Length-prefixed string, Latin-1 when every character fits and UTF-16
    /// otherwise.
    pub fn write_string(&mut self, text: &str) {
        if text.is_empty() {
            self.write_index(0);
        } else if text.chars().all(|ch| u32::from(ch) <= 0xff) {
            self.write_index(text.chars().count() as i32 + 1);
            self.write_ascii_z(text);
        } else {
            let units = text.encode_utf16().count() as i32 + 1;
            self.write_index(-units);
            self.write_unicode_z(text);
        }
    }
}
