//! Sparse, self-describing per-instance property stream.
//!
//! Each entry is a name, an info byte (type tag, size class, array/bool
//! bit), an optional struct name, an optional explicit size, an optional
//! array index and the payload. A `None` name ends the list.

use log::{debug, warn};
use serde::Serialize;
use ureflect_stream::{NONE_NAME, NameId, NameTable, PackageStream, PackageWriter, StreamError};

use crate::data_block::PropertyDataBlock;
use crate::error::PropertyError;
use crate::property::{PropertyFlags, TypeTag};

const INFO_TYPE_MASK: u8 = 0x0f;
const INFO_SIZE_SHIFT: u8 = 4;
const INFO_SIZE_MASK: u8 = 0x07;
const INFO_HIGH_BIT: u8 = 0x80;

/// Payload sizes selected by size classes 0 through 4.
const FIXED_SIZES: [u32; 5] = [1, 2, 4, 12, 16];

/// Decoded header of one tagged entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyTag {
    pub name: NameId,
    pub tag: TypeTag,
    pub size: u32,
    pub array_index: u32,
    pub struct_name: Option<NameId>,
    /// Value of a bool entry, carried in the info byte's high bit.
    pub bool_value: bool,
}

impl PropertyTag {
    /// Read the next header, or `None` at the terminating `None` name.
    pub fn read(stream: &mut PackageStream<'_>) -> Result<Option<Self>, StreamError> {
        let name = stream.read_name()?;
        if stream.names().is_none(name) {
            return Ok(None);
        }
        let info = stream.read_u8()?;
        let tag = TypeTag::from_bits(info & INFO_TYPE_MASK);
        let struct_name = match tag {
            TypeTag::Struct => Some(stream.read_name()?),
            _ => None,
        };
        let size = match (info >> INFO_SIZE_SHIFT) & INFO_SIZE_MASK {
            class @ 0..=4 => FIXED_SIZES[class as usize],
            5 => u32::from(stream.read_u8()?),
            6 => u32::from(stream.read_u16()?),
            _ => stream.read_u32()?,
        };
        let high = info & INFO_HIGH_BIT != 0;
        let (array_index, bool_value) = match tag {
            TypeTag::Bool => (0, high),
            _ if high => (stream.read_array_index()?, false),
            _ => (0, false),
        };
        Ok(Some(Self {
            name,
            tag,
            size,
            array_index,
            struct_name,
            bool_value,
        }))
    }

    pub fn write(&self, writer: &mut PackageWriter) -> Result<(), StreamError> {
        let size_class = match FIXED_SIZES.iter().position(|&size| size == self.size) {
            Some(class) => class as u8,
            None if self.size <= u32::from(u8::MAX) => 5,
            None if self.size <= u32::from(u16::MAX) => 6,
            None => 7,
        };
        let high = match self.tag {
            TypeTag::Bool => self.bool_value,
            _ => self.array_index != 0,
        };
        let mut info = self.tag.bits() | (size_class << INFO_SIZE_SHIFT);
        if high {
            info |= INFO_HIGH_BIT;
        }

        writer.write_name(self.name);
        writer.write_u8(info);
        if self.tag == TypeTag::Struct {
            writer.write_name(self.struct_name.unwrap_or(NameId(0)));
        }
        match size_class {
            5 => writer.write_u8(self.size as u8),
            6 => writer.write_u16(self.size as u16),
            7 => writer.write_u32(self.size),
            _ => {}
        }
        if high && self.tag != TypeTag::Bool {
            writer.write_array_index(self.array_index)?;
        }
        Ok(())
    }
}

/// Outcome of a tagged load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    /// Names of entries with no matching property, in stream order.
    pub skipped: Vec<String>,
}

/// Overlay tagged entries from `stream` onto `block` until the `None`
/// terminator.
///
/// Unknown names are skipped using the header size. Any other failure,
/// including a tag that disagrees with the declared kind, aborts the load.
pub fn read_properties(
    block: &mut PropertyDataBlock,
    stream: &mut PackageStream<'_>,
) -> Result<LoadReport, PropertyError> {
    let mut report = LoadReport::default();
    while let Some(tag) = PropertyTag::read(stream)? {
        let name = stream.names().get(tag.name).unwrap_or("?");
        let wants_struct = tag.tag == TypeTag::Struct;
        let Some(prop) = block.layout().find_tagged(name, wants_struct).cloned() else {
            if wants_struct {
                warn!("skipping struct entry {name} unknown to {}", block.layout().name());
            } else {
                debug!("skipping unknown property {name} ({} bytes)", tag.size);
            }
            stream
                .skip(tag.size as usize)
                .map_err(|err| PropertyError::from(err).in_property(name))?;
            report.skipped.push(name.to_string());
            continue;
        };

        let index = tag.array_index as usize;
        if index >= prop.array_dim() {
            return Err(PropertyError::ArrayIndexOutOfRange {
                property: prop.name().to_string(),
                index: tag.array_index,
                array_dim: prop.array_dim(),
            });
        }

        let start = stream.position();
        block.load_tagged(&prop, index, stream, &tag)?;
        let consumed = stream.position() - start;
        if tag.tag != TypeTag::Bool && consumed != u64::from(tag.size) {
            return Err(PropertyError::SizeMismatch {
                property: prop.name().to_string(),
                declared: tag.size,
                consumed,
            });
        }
        report.loaded += 1;
    }
    Ok(report)
}

/// Write every element of `block` that differs from `defaults` (or every
/// element when there are no defaults), followed by the `None` terminator.
/// Transient properties are never written. Returns the number of entries.
///
/// Names are interned into `names`, which must be the table the stream will
/// be read back with.
pub fn write_properties(
    block: &PropertyDataBlock,
    defaults: Option<&PropertyDataBlock>,
    names: &mut NameTable,
    writer: &mut PackageWriter,
) -> Result<usize, PropertyError> {
    let mut written = 0;
    for prop in block.layout().properties() {
        if prop.flags().contains(PropertyFlags::TRANSIENT) {
            continue;
        }
        let defaults = defaults.filter(|defaults| defaults.layout().contains(prop));
        for index in 0..prop.array_dim() {
            if let Some(defaults) = defaults {
                if block.identical(prop, index, defaults)? {
                    continue;
                }
            }
            let is_bool = prop.ty().is_bool();
            if is_bool && prop.array_dim() > 1 {
                return Err(PropertyError::UnsupportedBoolArray {
                    property: prop.name().to_string(),
                });
            }

            let mut payload = PackageWriter::new();
            let bool_value = if is_bool {
                block.get_bool(prop, index)?
            } else {
                block.write_element(prop, index, &mut payload)?;
                false
            };
            let tag = PropertyTag {
                name: names.intern(prop.name()),
                tag: prop.ty().tag(),
                size: payload.len() as u32,
                array_index: index as u32,
                struct_name: prop
                    .ty()
                    .struct_layout()
                    .map(|layout| names.intern(layout.name())),
                bool_value,
            };
            tag.write(writer)?;
            writer.write_bytes(payload.as_slice());
            written += 1;
        }
    }
    writer.write_name(names.intern(NONE_NAME));
    Ok(written)
}
