//! The closed set of property kinds and the behavior each one carries.
//!
//! Every operation dispatches with an exhaustive `match` over
//! [`PropertyType`], so adding a kind fails to compile until each behavior
//! handles it.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use ureflect_stream::{NameId, ObjectHandle, Package, PackageStream, PackageWriter};

use crate::error::PropertyError;
use crate::layout::{StructLayout, align_up};
use crate::storage::{Addr, HANDLE_SIZE, HeapValue, ValueStore};
use crate::tagged::PropertyTag;
use crate::value::Value;

type Result<T> = std::result::Result<T, PropertyError>;

/// Mask used for bools that are container elements rather than bitfields.
pub(crate) const ELEMENT_MASK: u32 = 1;

/// Type tag carried in the low nibble of a tagged property's info byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum TypeTag {
    Invalid = 0,
    Byte = 1,
    Int = 2,
    Bool = 3,
    Float = 4,
    Object = 5,
    Name = 6,
    String = 7,
    Class = 8,
    Array = 9,
    Struct = 10,
    Vector = 11,
    Rotator = 12,
    Str = 13,
    Map = 14,
    FixedArray = 15,
}

impl TypeTag {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x0f {
            1 => TypeTag::Byte,
            2 => TypeTag::Int,
            3 => TypeTag::Bool,
            4 => TypeTag::Float,
            5 => TypeTag::Object,
            6 => TypeTag::Name,
            7 => TypeTag::String,
            8 => TypeTag::Class,
            9 => TypeTag::Array,
            10 => TypeTag::Struct,
            11 => TypeTag::Vector,
            12 => TypeTag::Rotator,
            13 => TypeTag::Str,
            14 => TypeTag::Map,
            15 => TypeTag::FixedArray,
            _ => TypeTag::Invalid,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Invalid => "InvalidProperty",
            TypeTag::Byte => "ByteProperty",
            TypeTag::Int => "IntProperty",
            TypeTag::Bool => "BoolProperty",
            TypeTag::Float => "FloatProperty",
            TypeTag::Object => "ObjectProperty",
            TypeTag::Name => "NameProperty",
            TypeTag::String => "StringProperty",
            TypeTag::Class => "ClassProperty",
            TypeTag::Array => "ArrayProperty",
            TypeTag::Struct => "StructProperty",
            TypeTag::Vector => "VectorProperty",
            TypeTag::Rotator => "RotatorProperty",
            TypeTag::Str => "StrProperty",
            TypeTag::Map => "MapProperty",
            TypeTag::FixedArray => "FixedArrayProperty",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Declaration flags of a property.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PropertyFlags: u32 {
        const EDIT = 0x0000_0001;
        const CONST = 0x0000_0002;
        const INPUT = 0x0000_0004;
        const EXPORT_OBJECT = 0x0000_0008;
        const OPTIONAL_PARM = 0x0000_0010;
        const NET = 0x0000_0020;
        const PARM = 0x0000_0080;
        const OUT_PARM = 0x0000_0100;
        const RETURN_PARM = 0x0000_0400;
        const NATIVE = 0x0000_1000;
        const TRANSIENT = 0x0000_2000;
        const CONFIG = 0x0000_4000;
        const LOCALIZED = 0x0000_8000;
        const TRAVEL = 0x0001_0000;
        const EDIT_CONST = 0x0002_0000;
        const GLOBAL_CONFIG = 0x0004_0000;
    }
}

/// Property kind. Container kinds own their element kinds; struct kinds share
/// the already-resolved nested layout.
#[derive(Debug, Clone)]
pub enum PropertyType {
    Byte,
    Int,
    Bool,
    Float,
    Name,
    Str,
    Object { class: String },
    Class { meta_class: String },
    Struct(Arc<StructLayout>),
    FixedArray { inner: Box<PropertyType>, count: usize },
    Array(Box<PropertyType>),
    Map {
        key: Box<PropertyType>,
        value: Box<PropertyType>,
    },
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::Byte => f.write_str("Byte"),
            PropertyType::Int => f.write_str("Int"),
            PropertyType::Bool => f.write_str("Bool"),
            PropertyType::Float => f.write_str("Float"),
            PropertyType::Name => f.write_str("Name"),
            PropertyType::Str => f.write_str("Str"),
            PropertyType::Object { class } => write!(f, "Object<{class}>"),
            PropertyType::Class { meta_class } => write!(f, "Class<{meta_class}>"),
            PropertyType::Struct(layout) => write!(f, "Struct<{}>", layout.name()),
            PropertyType::FixedArray { inner, count } => write!(f, "{inner}[{count}]"),
            PropertyType::Array(inner) => write!(f, "Array<{inner}>"),
            PropertyType::Map { key, value } => write!(f, "Map<{key}, {value}>"),
        }
    }
}

impl PropertyType {
    pub fn tag(&self) -> TypeTag {
        match self {
            PropertyType::Byte => TypeTag::Byte,
            PropertyType::Int => TypeTag::Int,
            PropertyType::Bool => TypeTag::Bool,
            PropertyType::Float => TypeTag::Float,
            PropertyType::Name => TypeTag::Name,
            PropertyType::Str => TypeTag::Str,
            PropertyType::Object { .. } => TypeTag::Object,
            PropertyType::Class { .. } => TypeTag::Class,
            PropertyType::Struct(_) => TypeTag::Struct,
            PropertyType::FixedArray { .. } => TypeTag::FixedArray,
            PropertyType::Array(_) => TypeTag::Array,
            PropertyType::Map { .. } => TypeTag::Map,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyType::Byte => "byte",
            PropertyType::Int => "int",
            PropertyType::Bool => "bool",
            PropertyType::Float => "float",
            PropertyType::Name => "name",
            PropertyType::Str => "str",
            PropertyType::Object { .. } => "object",
            PropertyType::Class { .. } => "class",
            PropertyType::Struct(_) => "struct",
            PropertyType::FixedArray { .. } => "fixed array",
            PropertyType::Array(_) => "array",
            PropertyType::Map { .. } => "map",
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, PropertyType::Bool)
    }

    pub fn struct_layout(&self) -> Option<&Arc<StructLayout>> {
        match self {
            PropertyType::Struct(layout) => Some(layout),
            _ => None,
        }
    }

    pub fn natural_alignment(&self) -> usize {
        match self {
            PropertyType::Byte => 1,
            PropertyType::Int | PropertyType::Bool | PropertyType::Float | PropertyType::Name => 4,
            PropertyType::Str
            | PropertyType::Object { .. }
            | PropertyType::Class { .. }
            | PropertyType::Array(_)
            | PropertyType::Map { .. } => HANDLE_SIZE,
            PropertyType::Struct(layout) => layout.alignment(),
            PropertyType::FixedArray { inner, .. } => inner.natural_alignment(),
        }
    }

    /// Storage of a single element, before padding to alignment.
    pub fn element_size(&self) -> usize {
        match self {
            PropertyType::Byte => 1,
            PropertyType::Int | PropertyType::Bool | PropertyType::Float | PropertyType::Name => 4,
            PropertyType::Str
            | PropertyType::Object { .. }
            | PropertyType::Class { .. }
            | PropertyType::Array(_)
            | PropertyType::Map { .. } => HANDLE_SIZE,
            PropertyType::Struct(layout) => layout.size(),
            PropertyType::FixedArray { inner, count } => inner.pitch() * count,
        }
    }

    /// Distance between consecutive elements of this kind.
    pub fn pitch(&self) -> usize {
        align_up(self.element_size(), self.natural_alignment())
    }

    fn accepts(&self, tag: TypeTag) -> bool {
        match (self, tag) {
            (PropertyType::Str, TypeTag::String) => true,
            (PropertyType::Struct(layout), TypeTag::Vector) => {
                layout.name().eq_ignore_ascii_case("Vector")
            }
            (PropertyType::Struct(layout), TypeTag::Rotator) => {
                layout.name().eq_ignore_ascii_case("Rotator")
            }
            _ => self.tag() == tag,
        }
    }

    pub(crate) fn default_construct(&self, store: &mut ValueStore, addr: Addr, mask: u32) -> Result<()> {
        match self {
            PropertyType::Bool => set_bool(store, addr, mask, false),
            PropertyType::Struct(layout) => {
                store.zero(addr, layout.size())?;
                for (member, offset) in member_slots(layout) {
                    member
                        .ty()
                        .default_construct(store, addr.add(offset), member.bit_mask())?;
                }
                Ok(())
            }
            PropertyType::FixedArray { inner, count } => {
                for index in 0..*count {
                    inner.default_construct(store, addr.add(index * inner.pitch()), ELEMENT_MASK)?;
                }
                Ok(())
            }
            _ => store.zero(addr, self.element_size()),
        }
    }

    /// Construct a copy of the value at `src_addr` in `src` into a freshly
    /// constructed `dst_addr`. Heap values are duplicated into `dst`.
    pub(crate) fn copy_construct(
        &self,
        dst: &mut ValueStore,
        dst_addr: Addr,
        src: &ValueStore,
        src_addr: Addr,
        mask: u32,
    ) -> Result<()> {
        match self {
            PropertyType::Bool => set_bool(dst, dst_addr, mask, get_bool(src, src_addr, mask)?),
            PropertyType::Str => {
                let slot = match src.read_handle(src_addr)? {
                    Some(slot) => Some(dst.alloc(HeapValue::Text(src.text(slot)?.to_string()))),
                    None => None,
                };
                dst.write_handle(dst_addr, slot)
            }
            PropertyType::Struct(layout) => {
                for (member, offset) in member_slots(layout) {
                    member.ty().copy_construct(
                        dst,
                        dst_addr.add(offset),
                        src,
                        src_addr.add(offset),
                        member.bit_mask(),
                    )?;
                }
                Ok(())
            }
            PropertyType::FixedArray { inner, count } => {
                for index in 0..*count {
                    let offset = index * inner.pitch();
                    inner.copy_construct(
                        dst,
                        dst_addr.add(offset),
                        src,
                        src_addr.add(offset),
                        ELEMENT_MASK,
                    )?;
                }
                Ok(())
            }
            PropertyType::Array(inner) => {
                let Some((src_slot, count)) = element_slot(src, src_addr)? else {
                    return dst.write_handle(dst_addr, None);
                };
                let pitch = inner.pitch();
                let slot = alloc_elements(dst, dst_addr, count, pitch)?;
                for index in 0..count {
                    inner.copy_construct(
                        dst,
                        Addr::element(slot, index * pitch),
                        src,
                        Addr::element(src_slot, index * pitch),
                        ELEMENT_MASK,
                    )?;
                }
                Ok(())
            }
            PropertyType::Map { key, value } => {
                let Some((src_slot, count)) = element_slot(src, src_addr)? else {
                    return dst.write_handle(dst_addr, None);
                };
                let (value_offset, pitch) = map_entry(key, value);
                let slot = alloc_elements(dst, dst_addr, count, pitch)?;
                for index in 0..count {
                    let base = index * pitch;
                    key.copy_construct(
                        dst,
                        Addr::element(slot, base),
                        src,
                        Addr::element(src_slot, base),
                        ELEMENT_MASK,
                    )?;
                    value.copy_construct(
                        dst,
                        Addr::element(slot, base + value_offset),
                        src,
                        Addr::element(src_slot, base + value_offset),
                        ELEMENT_MASK,
                    )?;
                }
                Ok(())
            }
            _ => dst.write(dst_addr, src.bytes(src_addr, self.element_size())?),
        }
    }

    /// Release heap values owned by the value and reset it to its default.
    pub(crate) fn destruct(&self, store: &mut ValueStore, addr: Addr, mask: u32) -> Result<()> {
        match self {
            PropertyType::Bool => set_bool(store, addr, mask, false),
            PropertyType::Str => {
                if let Some(slot) = store.read_handle(addr)? {
                    store.free(slot);
                }
                store.write_handle(addr, None)
            }
            PropertyType::Struct(layout) => {
                for (member, offset) in member_slots(layout) {
                    member
                        .ty()
                        .destruct(store, addr.add(offset), member.bit_mask())?;
                }
                Ok(())
            }
            PropertyType::FixedArray { inner, count } => {
                for index in 0..*count {
                    inner.destruct(store, addr.add(index * inner.pitch()), ELEMENT_MASK)?;
                }
                Ok(())
            }
            PropertyType::Array(inner) => {
                if let Some((slot, count)) = element_slot(store, addr)? {
                    let pitch = inner.pitch();
                    for index in 0..count {
                        inner.destruct(store, Addr::element(slot, index * pitch), ELEMENT_MASK)?;
                    }
                    store.free(slot);
                }
                store.write_handle(addr, None)
            }
            PropertyType::Map { key, value } => {
                if let Some((slot, count)) = element_slot(store, addr)? {
                    let (value_offset, pitch) = map_entry(key, value);
                    for index in 0..count {
                        let base = index * pitch;
                        key.destruct(store, Addr::element(slot, base), ELEMENT_MASK)?;
                        value.destruct(
                            store,
                            Addr::element(slot, base + value_offset),
                            ELEMENT_MASK,
                        )?;
                    }
                    store.free(slot);
                }
                store.write_handle(addr, None)
            }
            _ => store.zero(addr, self.element_size()),
        }
    }

    /// Decode one untagged value. Struct members, array elements and map
    /// entries are serialized this way inside tagged payloads.
    pub(crate) fn read_value(
        &self,
        store: &mut ValueStore,
        addr: Addr,
        mask: u32,
        stream: &mut PackageStream<'_>,
    ) -> Result<()> {
        match self {
            PropertyType::Byte => store.write(addr, &[stream.read_u8()?]),
            PropertyType::Int => store.write(addr, &stream.read_i32()?.to_le_bytes()),
            PropertyType::Bool => {
                let value = stream.read_u8()? != 0;
                set_bool(store, addr, mask, value)
            }
            PropertyType::Float => store.write(addr, &stream.read_f32()?.to_le_bytes()),
            PropertyType::Name => store.write_u32(addr, stream.read_name()?.0),
            PropertyType::Object { .. } | PropertyType::Class { .. } => {
                let reference = stream.read_object()?;
                let handle = stream.package().objects().resolve(reference)?;
                store.write_u64(addr, handle.0)
            }
            PropertyType::Str => {
                let text = stream.read_string()?;
                self.destruct(store, addr, mask)?;
                let slot = (!text.is_empty()).then(|| store.alloc(HeapValue::Text(text)));
                store.write_handle(addr, slot)
            }
            PropertyType::Struct(layout) => {
                for (member, offset) in member_slots(layout) {
                    member
                        .ty()
                        .read_value(store, addr.add(offset), member.bit_mask(), stream)?;
                }
                Ok(())
            }
            PropertyType::FixedArray { inner, count } => {
                for index in 0..*count {
                    inner.read_value(store, addr.add(index * inner.pitch()), ELEMENT_MASK, stream)?;
                }
                Ok(())
            }
            PropertyType::Array(inner) => {
                let count = read_count(stream)?;
                self.destruct(store, addr, mask)?;
                let pitch = inner.pitch();
                let slot = alloc_elements(store, addr, count, pitch)?;
                for index in 0..count {
                    inner.read_value(store, Addr::element(slot, index * pitch), ELEMENT_MASK, stream)?;
                }
                Ok(())
            }
            PropertyType::Map { key, value } => {
                let count = read_count(stream)?;
                self.destruct(store, addr, mask)?;
                let (value_offset, pitch) = map_entry(key, value);
                let slot = alloc_elements(store, addr, count, pitch)?;
                for index in 0..count {
                    let base = index * pitch;
                    key.read_value(store, Addr::element(slot, base), ELEMENT_MASK, stream)?;
                    value.read_value(
                        store,
                        Addr::element(slot, base + value_offset),
                        ELEMENT_MASK,
                        stream,
                    )?;
                }
                Ok(())
            }
        }
    }

    /// Encode one untagged value, the inverse of [`read_value`](Self::read_value).
    pub(crate) fn write_value(
        &self,
        store: &ValueStore,
        addr: Addr,
        mask: u32,
        writer: &mut PackageWriter,
    ) -> Result<()> {
        match self {
            PropertyType::Byte => writer.write_u8(store.read::<1>(addr)?[0]),
            PropertyType::Int => writer.write_i32(i32::from_le_bytes(store.read(addr)?)),
            PropertyType::Bool => writer.write_u8(u8::from(get_bool(store, addr, mask)?)),
            PropertyType::Float => writer.write_f32(f32::from_le_bytes(store.read(addr)?)),
            PropertyType::Name => writer.write_name(NameId(store.read_u32(addr)?)),
            PropertyType::Object { .. } | PropertyType::Class { .. } => {
                writer.write_object(ObjectHandle(store.read_u64(addr)?).to_ref())
            }
            PropertyType::Str => match store.read_handle(addr)? {
                Some(slot) => writer.write_string(store.text(slot)?),
                None => writer.write_string(""),
            },
            PropertyType::Struct(layout) => {
                for (member, offset) in member_slots(layout) {
                    member
                        .ty()
                        .write_value(store, addr.add(offset), member.bit_mask(), writer)?;
                }
            }
            PropertyType::FixedArray { inner, count } => {
                for index in 0..*count {
                    inner.write_value(store, addr.add(index * inner.pitch()), ELEMENT_MASK, writer)?;
                }
            }
            PropertyType::Array(inner) => {
                let (slot, count) = element_slot(store, addr)?.unwrap_or((0, 0));
                writer.write_index(count as i32);
                let pitch = inner.pitch();
                for index in 0..count {
                    inner.write_value(store, Addr::element(slot, index * pitch), ELEMENT_MASK, writer)?;
                }
            }
            PropertyType::Map { key, value } => {
                let (slot, count) = element_slot(store, addr)?.unwrap_or((0, 0));
                writer.write_index(count as i32);
                let (value_offset, pitch) = map_entry(key, value);
                for index in 0..count {
                    let base = index * pitch;
                    key.write_value(store, Addr::element(slot, base), ELEMENT_MASK, writer)?;
                    value.write_value(
                        store,
                        Addr::element(slot, base + value_offset),
                        ELEMENT_MASK,
                        writer,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Decode the payload of a tagged entry whose header has already been
    /// read. Bools take their value from the header and read nothing.
    pub(crate) fn load_tagged_value(
        &self,
        store: &mut ValueStore,
        addr: Addr,
        mask: u32,
        stream: &mut PackageStream<'_>,
        tag: &PropertyTag,
        property: &str,
    ) -> Result<()> {
        if !self.accepts(tag.tag) {
            return Err(PropertyError::TypeMismatch {
                property: property.to_string(),
                expected: self.tag(),
                found: tag.tag,
            });
        }
        if let (PropertyType::Struct(layout), Some(found)) = (self, tag.struct_name) {
            let found = stream.names().get(found).unwrap_or("?");
            if !found.eq_ignore_ascii_case(layout.name()) {
                return Err(PropertyError::StructMismatch {
                    property: property.to_string(),
                    expected: layout.name().to_string(),
                    found: found.to_string(),
                });
            }
        }
        match self {
            PropertyType::Bool => set_bool(store, addr, mask, tag.bool_value),
            _ => self
                .read_value(store, addr, mask, stream)
                .map_err(|err| err.in_property(property)),
        }
    }

    /// Owned copy of the value, used for comparisons, printing and tests.
    pub(crate) fn snapshot(&self, store: &ValueStore, addr: Addr, mask: u32) -> Result<Value> {
        Ok(match self {
            PropertyType::Byte => Value::Byte(store.read::<1>(addr)?[0]),
            PropertyType::Int => Value::Int(i32::from_le_bytes(store.read(addr)?)),
            PropertyType::Bool => Value::Bool(get_bool(store, addr, mask)?),
            PropertyType::Float => Value::Float(f32::from_le_bytes(store.read(addr)?)),
            PropertyType::Name => Value::Name(NameId(store.read_u32(addr)?)),
            PropertyType::Object { .. } | PropertyType::Class { .. } => {
                Value::Object(ObjectHandle(store.read_u64(addr)?))
            }
            PropertyType::Str => Value::Str(match store.read_handle(addr)? {
                Some(slot) => store.text(slot)?.to_string(),
                None => String::new(),
            }),
            PropertyType::Struct(layout) => {
                let mut members = Vec::with_capacity(layout.properties().len());
                for member in layout.properties() {
                    let mut values = Vec::with_capacity(member.array_dim());
                    for index in 0..member.array_dim() {
                        values.push(member.ty().snapshot(
                            store,
                            addr.add(member.element_offset(index)),
                            member.bit_mask(),
                        )?);
                    }
                    members.push((member.name().to_string(), values));
                }
                Value::Struct(members)
            }
            PropertyType::FixedArray { inner, count } => {
                let mut items = Vec::with_capacity(*count);
                for index in 0..*count {
                    items.push(inner.snapshot(store, addr.add(index * inner.pitch()), ELEMENT_MASK)?);
                }
                Value::Array(items)
            }
            PropertyType::Array(inner) => {
                let (slot, count) = element_slot(store, addr)?.unwrap_or((0, 0));
                let pitch = inner.pitch();
                let mut items = Vec::with_capacity(count);
                for index in 0..count {
                    items.push(inner.snapshot(store, Addr::element(slot, index * pitch), ELEMENT_MASK)?);
                }
                Value::Array(items)
            }
            PropertyType::Map { key, value } => {
                let (slot, count) = element_slot(store, addr)?.unwrap_or((0, 0));
                let (value_offset, pitch) = map_entry(key, value);
                let mut entries = Vec::with_capacity(count);
                for index in 0..count {
                    let base = index * pitch;
                    entries.push((
                        key.snapshot(store, Addr::element(slot, base), ELEMENT_MASK)?,
                        value.snapshot(store, Addr::element(slot, base + value_offset), ELEMENT_MASK)?,
                    ));
                }
                Value::Map(entries)
            }
        })
    }

    /// Overwrite the stored value with `value`, which must have this kind's
    /// shape. Struct values may name a subset of the members.
    pub(crate) fn assign(&self, store: &mut ValueStore, addr: Addr, mask: u32, value: &Value) -> Result<()> {
        match (self, value) {
            (PropertyType::Byte, Value::Byte(v)) => store.write(addr, &[*v]),
            (PropertyType::Int, Value::Int(v)) => store.write(addr, &v.to_le_bytes()),
            (PropertyType::Bool, Value::Bool(v)) => set_bool(store, addr, mask, *v),
            (PropertyType::Float, Value::Float(v)) => store.write(addr, &v.to_le_bytes()),
            (PropertyType::Name, Value::Name(v)) => store.write_u32(addr, v.0),
            (PropertyType::Object { .. } | PropertyType::Class { .. }, Value::Object(handle)) => {
                store.write_u64(addr, handle.0)
            }
            (PropertyType::Str, Value::Str(text)) => {
                self.destruct(store, addr, mask)?;
                let slot = (!text.is_empty()).then(|| store.alloc(HeapValue::Text(text.clone())));
                store.write_handle(addr, slot)
            }
            (PropertyType::Struct(layout), Value::Struct(members)) => {
                for (name, values) in members {
                    let member = layout.find_property(name).ok_or_else(|| {
                        PropertyError::ForeignProperty {
                            property: name.clone(),
                            layout: layout.name().to_string(),
                        }
                    })?;
                    if values.len() > member.array_dim() {
                        return Err(PropertyError::ArrayIndexOutOfRange {
                            property: name.clone(),
                            index: values.len() as u32 - 1,
                            array_dim: member.array_dim(),
                        });
                    }
                    for (index, item) in values.iter().enumerate() {
                        member.ty().assign(
                            store,
                            addr.add(member.element_offset(index)),
                            member.bit_mask(),
                            item,
                        )?;
                    }
                }
                Ok(())
            }
            (PropertyType::FixedArray { inner, count }, Value::Array(items)) => {
                if items.len() > *count {
                    return Err(PropertyError::InvalidCount {
                        count: items.len() as i64,
                        remaining: *count,
                    });
                }
                for (index, item) in items.iter().enumerate() {
                    inner.assign(store, addr.add(index * inner.pitch()), ELEMENT_MASK, item)?;
                }
                Ok(())
            }
            (PropertyType::Array(inner), Value::Array(items)) => {
                self.destruct(store, addr, mask)?;
                let pitch = inner.pitch();
                let slot = alloc_elements(store, addr, items.len(), pitch)?;
                for (index, item) in items.iter().enumerate() {
                    inner.assign(store, Addr::element(slot, index * pitch), ELEMENT_MASK, item)?;
                }
                Ok(())
            }
            (PropertyType::Map { key, value }, Value::Map(entries)) => {
                self.destruct(store, addr, mask)?;
                let (value_offset, pitch) = map_entry(key, value);
                let slot = alloc_elements(store, addr, entries.len(), pitch)?;
                for (index, (entry_key, entry_value)) in entries.iter().enumerate() {
                    let base = index * pitch;
                    key.assign(store, Addr::element(slot, base), ELEMENT_MASK, entry_key)?;
                    value.assign(
                        store,
                        Addr::element(slot, base + value_offset),
                        ELEMENT_MASK,
                        entry_value,
                    )?;
                }
                Ok(())
            }
            (expected, found) => Err(PropertyError::ValueMismatch {
                expected: expected.kind_name(),
                found: found.kind(),
            }),
        }
    }

    pub(crate) fn print_value(
        &self,
        store: &ValueStore,
        addr: Addr,
        mask: u32,
        package: &Package,
    ) -> Result<String> {
        Ok(self.snapshot(store, addr, mask)?.render(package))
    }

    /// Compare two stored values. Plain kinds compare their stored bytes, so
    /// `-0.0` differs from `0.0` and a NaN matches the same NaN.
    pub(crate) fn identical(
        &self,
        left: &ValueStore,
        left_addr: Addr,
        right: &ValueStore,
        right_addr: Addr,
        mask: u32,
    ) -> Result<bool> {
        match self {
            PropertyType::Bool => {
                Ok(get_bool(left, left_addr, mask)? == get_bool(right, right_addr, mask)?)
            }
            PropertyType::Str => {
                let text = |store: &ValueStore, addr: Addr| -> Result<String> {
                    Ok(match store.read_handle(addr)? {
                        Some(slot) => store.text(slot)?.to_string(),
                        None => String::new(),
                    })
                };
                Ok(text(left, left_addr)? == text(right, right_addr)?)
            }
            PropertyType::Struct(layout) => {
                for (member, offset) in member_slots(layout) {
                    if !member.ty().identical(
                        left,
                        left_addr.add(offset),
                        right,
                        right_addr.add(offset),
                        member.bit_mask(),
                    )? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            PropertyType::FixedArray { inner, count } => {
                for index in 0..*count {
                    let offset = index * inner.pitch();
                    if !inner.identical(
                        left,
                        left_addr.add(offset),
                        right,
                        right_addr.add(offset),
                        ELEMENT_MASK,
                    )? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            PropertyType::Array(inner) => {
                let (left_slot, count) = element_slot(left, left_addr)?.unwrap_or((0, 0));
                let (right_slot, right_count) = element_slot(right, right_addr)?.unwrap_or((0, 0));
                if count != right_count {
                    return Ok(false);
                }
                let pitch = inner.pitch();
                for index in 0..count {
                    if !inner.identical(
                        left,
                        Addr::element(left_slot, index * pitch),
                        right,
                        Addr::element(right_slot, index * pitch),
                        ELEMENT_MASK,
                    )? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            PropertyType::Map { key, value } => {
                let (left_slot, count) = element_slot(left, left_addr)?.unwrap_or((0, 0));
                let (right_slot, right_count) = element_slot(right, right_addr)?.unwrap_or((0, 0));
                if count != right_count {
                    return Ok(false);
                }
                let (value_offset, pitch) = map_entry(key, value);
                for index in 0..count {
                    let base = index * pitch;
                    let same = key.identical(
                        left,
                        Addr::element(left_slot, base),
                        right,
                        Addr::element(right_slot, base),
                        ELEMENT_MASK,
                    )? && value.identical(
                        left,
                        Addr::element(left_slot, base + value_offset),
                        right,
                        Addr::element(right_slot, base + value_offset),
                        ELEMENT_MASK,
                    )?;
                    if !same {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => {
                let size = self.element_size();
                Ok(left.bytes(left_addr, size)? == right.bytes(right_addr, size)?)
            }
        }
    }
}

/// One declared field with its computed placement.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    name: String,
    ty: PropertyType,
    array_dim: usize,
    flags: PropertyFlags,
    owner: String,
    offset: usize,
    bit_mask: u32,
}

impl PropertyDescriptor {
    pub(crate) fn new(
        name: String,
        ty: PropertyType,
        array_dim: usize,
        flags: PropertyFlags,
        owner: String,
        offset: usize,
        bit_mask: u32,
    ) -> Self {
        Self {
            name,
            ty,
            array_dim,
            flags,
            owner,
            offset,
            bit_mask,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &PropertyType {
        &self.ty
    }

    pub fn array_dim(&self) -> usize {
        self.array_dim
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    /// Name of the struct that declared this property.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bit selecting this property inside its shared word; only meaningful
    /// for bools.
    pub fn bit_mask(&self) -> u32 {
        self.bit_mask
    }

    /// Bytes covered by every element of the property.
    pub fn size(&self) -> usize {
        self.ty.pitch() * self.array_dim
    }

    pub fn element_offset(&self, index: usize) -> usize {
        self.offset + index * self.ty.pitch()
    }
}

/// Each member element of a struct with its offset relative to the struct.
fn member_slots(layout: &StructLayout) -> impl Iterator<Item = (&PropertyDescriptor, usize)> {
    layout.properties().iter().flat_map(|member| {
        (0..member.array_dim()).map(move |index| (member.as_ref(), member.element_offset(index)))
    })
}

fn map_entry(key: &PropertyType, value: &PropertyType) -> (usize, usize) {
    let value_offset = align_up(key.element_size(), value.natural_alignment());
    let align = key.natural_alignment().max(value.natural_alignment());
    (value_offset, align_up(value_offset + value.element_size(), align))
}

fn get_bool(store: &ValueStore, addr: Addr, mask: u32) -> Result<bool> {
    Ok(store.read_u32(addr)? & mask != 0)
}

fn set_bool(store: &mut ValueStore, addr: Addr, mask: u32, value: bool) -> Result<()> {
    let word = store.read_u32(addr)?;
    let word = if value { word | mask } else { word & !mask };
    store.write_u32(addr, word)
}

fn element_slot(store: &ValueStore, addr: Addr) -> Result<Option<(usize, usize)>> {
    match store.read_handle(addr)? {
        Some(slot) => Ok(Some((slot, store.element_count(slot)?))),
        None => Ok(None),
    }
}

/// Allocate zeroed element storage and point the handle at `addr` to it.
fn alloc_elements(store: &mut ValueStore, addr: Addr, count: usize, pitch: usize) -> Result<usize> {
    let slot = store.alloc(HeapValue::Elements {
        bytes: vec![0; count * pitch],
        count,
    });
    store.write_handle(addr, Some(slot))?;
    Ok(slot)
}

fn read_count(stream: &mut PackageStream<'_>) -> Result<usize> {
    let count = stream.read_index()?;
    let remaining = stream.remaining();
    if count < 0 || count as usize > remaining {
        return Err(PropertyError::InvalidCount {
            count: i64::from(count),
            remaining,
        });
    }
    Ok(count as usize)
}
