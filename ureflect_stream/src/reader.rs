use std::io::{self, Cursor};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::names::{NameId, NameTable};
use crate::objects::ObjectRef;
use crate::{Package, StreamError};

type Result<T> = std::result::Result<T, StreamError>;

/// Typed little-endian reads over one package-owned byte slice.
#[derive(Debug, Clone)]
pub struct PackageStream<'a> {
    package: &'a Package,
    cursor: Cursor<&'a [u8]>,
}

impl<'a> PackageStream<'a> {
    pub fn new(package: &'a Package, bytes: &'a [u8]) -> Self {
        Self {
            package,
            cursor: Cursor::new(bytes),
        }
    }

    pub fn package(&self) -> &'a Package {
        self.package
    }

    pub fn names(&self) -> &'a NameTable {
        self.package.names()
    }

    pub fn format_version(&self) -> u32 {
        self.package.version()
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.cursor.position() as usize)
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        let offset = self.position();
        if count > self.remaining() {
            return Err(StreamError::UnexpectedEof {
                offset,
                wanted: count,
            });
        }
        self.cursor.set_position(offset + count as u64);
        Ok(())
    }

    fn fixed<T>(
        &mut self,
        wanted: usize,
        read: impl FnOnce(&mut Cursor<&'a [u8]>) -> io::Result<T>,
    ) -> Result<T> {
        let offset = self.position();
        read(&mut self.cursor).map_err(|_| {
            self.cursor.set_position(offset);
            StreamError::UnexpectedEof { offset, wanted }
        })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.fixed(1, |cursor| cursor.read_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.fixed(2, |cursor| cursor.read_u16::<LittleEndian>())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.fixed(4, |cursor| cursor.read_u32::<LittleEndian>())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.fixed(4, |cursor| cursor.read_i32::<LittleEndian>())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.fixed(8, |cursor| cursor.read_u64::<LittleEndian>())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.fixed(4, |cursor| cursor.read_f32::<LittleEndian>())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.fixed(8, |cursor| cursor.read_f64::<LittleEndian>())
    }

    /// Signed compact index: the first byte carries the sign (0x80), a
    /// continuation bit (0x40) and six value bits; each following byte
    /// carries a continuation bit (0x80) and seven more value bits.
    pub fn read_index(&mut self) -> Result<i32> {
        let start = self.position();
        let first = self.read_u8()?;
        let mut value = i64::from(first & 0x3f);
        if first & 0x40 != 0 {
            let mut shift = 6;
            loop {
                if shift > 27 {
                    return Err(StreamError::IndexOverflow { offset: start });
                }
                let next = self.read_u8()?;
                value |= i64::from(next & 0x7f) << shift;
                shift += 7;
                if next & 0x80 == 0 {
                    break;
                }
            }
        }
        if first & 0x80 != 0 {
            value = -value;
        }
        i32::try_from(value).map_err(|_| StreamError::IndexOverflow { offset: start })
    }

    /// Unsigned 1/2/4-byte array index used by tagged property headers.
    pub fn read_array_index(&mut self) -> Result<u32> {
        let first = u32::from(self.read_u8()?);
        if first & 0x80 == 0 {
            Ok(first)
        } else if first & 0xc0 == 0x80 {
            let low = u32::from(self.read_u8()?);
            Ok(((first & 0x7f) << 8) | low)
        } else {
            let b1 = u32::from(self.read_u8()?);
            let b2 = u32::from(self.read_u8()?);
            let b3 = u32::from(self.read_u8()?);
            Ok(((first & 0x3f) << 24) | (b1 << 16) | (b2 << 8) | b3)
        }
    }

    pub fn read_name(&mut self) -> Result<NameId> {
        let index = self.read_index()?;
        let names = self.names();
        if index < 0 || index as usize >= names.len() {
            return Err(StreamError::NameOutOfRange(i64::from(index)));
        }
        Ok(NameId(index as u32))
    }

    /// Read a name and return its text.
    pub fn read_name_str(&mut self) -> Result<&'a str> {
        let id = self.read_name()?;
        self.names()
            .get(id)
            .ok_or(StreamError::NameOutOfRange(i64::from(id.0)))
    }

    /// Object reference; resolution against the object table is left to the
    /// caller so references to not-yet-loaded exports can still be read.
    pub fn read_object(&mut self) -> Result<ObjectRef> {
        self.read_index().map(ObjectRef)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let offset = self.position() as usize;
        self.skip(count)?;
        let bytes: &'a [u8] = *self.cursor.get_ref();
        Ok(&bytes[offset..offset + count])
    }

    /// Raw bytes up to (not including) the next NUL, which is consumed.
    pub fn read_bytes_z(&mut self) -> Result<&'a [u8]> {
        let start = self.position();
        let bytes: &'a [u8] = *self.cursor.get_ref();
        let tail = &bytes[start as usize..];
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(StreamError::UnterminatedString { offset: start })?;
        self.cursor.set_position(start + end as u64 + 1);
        Ok(&tail[..end])
    }

    /// UTF-16 code units up to the next NUL unit, which is consumed.
    pub fn read_units_z(&mut self) -> Result<Vec<u16>> {
        let start = self.position();
        let mut units = Vec::new();
        loop {
            let unit = self.read_u16().map_err(|err| {
                if err.is_eof() {
                    StreamError::UnterminatedString { offset: start }
                } else {
                    err
                }
            })?;
            if unit == 0 {
                return Ok(units);
            }
            units.push(unit);
        }
    }

    /// NUL-terminated Latin-1 string.
    pub fn read_ascii_z(&mut self) -> Result<String> {
        Ok(latin1(self.read_bytes_z()?))
    }

    /// NUL-terminated UTF-16 string.
    pub fn read_unicode_z(&mut self) -> Result<String> {
        let start = self.position();
        let units = self.read_units_z()?;
        String::from_utf16(&units).map_err(|_| StreamError::InvalidText { offset: start })
    }

    /// Length-prefixed string: a compact index holding the length including
    /// the terminator, negative for UTF-16 payloads.
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.position();
        let length = self.read_index()?;
        if length == 0 {
            return Ok(String::new());
        }
        if length > 0 {
            let bytes = self.read_bytes(length as usize)?;
            let (last, text) = bytes
                .split_last()
                .ok_or(StreamError::UnterminatedString { offset: start })?;
            if *last != 0 {
                return Err(StreamError::UnterminatedString { offset: start });
            }
            return Ok(latin1(text));
        }
        let count = length.unsigned_abs() as usize;
        let mut units = Vec::with_capacity(count.min(self.remaining() / 2));
        for _ in 0..count {
            units.push(self.read_u16()?);
        }
        if units.pop() != Some(0) {
            return Err(StreamError::UnterminatedString { offset: start });
        }
        String::from_utf16(&units).map_err(|_| StreamError::InvalidText { offset: start })
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
