//! Per-instance property storage.
//!
//! A block is sized by its layout and constructed either as a class's
//! default object (copying inherited values from the base class defaults) or
//! as an instance copied from its class defaults. Callers only reach the
//! storage through descriptors of the block's own layout.

use std::sync::Arc;

use ureflect_stream::{NameId, ObjectHandle, Package, PackageStream, PackageWriter};

use crate::error::PropertyError;
use crate::layout::{POINTER_SIZE, StructLayout, align_up};
use crate::property::PropertyDescriptor;
use crate::storage::{Addr, ValueStore};
use crate::tagged::PropertyTag;
use crate::value::Value;

type Result<T> = std::result::Result<T, PropertyError>;

#[derive(Debug)]
pub struct PropertyDataBlock {
    layout: Arc<StructLayout>,
    store: ValueStore,
}

impl PropertyDataBlock {
    /// Construct a class default object. Properties inherited from the base
    /// layout are copied from `base_defaults`; the rest are default
    /// constructed.
    pub fn new_default(
        layout: Arc<StructLayout>,
        base_defaults: Option<&PropertyDataBlock>,
    ) -> Result<Self> {
        if let Some(base) = base_defaults {
            if !layout.is_a(base.layout.name()) {
                return Err(PropertyError::LayoutMismatch {
                    expected: layout.name().to_string(),
                    found: base.layout.name().to_string(),
                });
            }
        }

        let mut store = ValueStore::with_size(align_up(layout.size(), POINTER_SIZE));
        for prop in layout.properties() {
            let source = base_defaults.filter(|base| base.layout.contains(prop));
            for index in 0..prop.array_dim() {
                let addr = Addr::root(prop.element_offset(index));
                match source {
                    Some(base) => {
                        prop.ty()
                            .copy_construct(&mut store, addr, &base.store, addr, prop.bit_mask())?
                    }
                    None => prop.ty().default_construct(&mut store, addr, prop.bit_mask())?,
                }
            }
        }
        Ok(Self { layout, store })
    }

    /// Construct an instance whose every property starts as a copy of
    /// `defaults`.
    pub fn new_instance(defaults: &PropertyDataBlock) -> Result<Self> {
        let layout = defaults.layout.clone();
        let mut store = ValueStore::with_size(defaults.store.root().len());
        for prop in layout.properties() {
            for index in 0..prop.array_dim() {
                let addr = Addr::root(prop.element_offset(index));
                prop.ty()
                    .copy_construct(&mut store, addr, &defaults.store, addr, prop.bit_mask())?;
            }
        }
        Ok(Self { layout, store })
    }

    pub fn layout(&self) -> &Arc<StructLayout> {
        &self.layout
    }

    /// Allocated size, the layout size rounded to [`POINTER_SIZE`].
    pub fn size(&self) -> usize {
        self.store.root().len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.store.root()
    }

    /// Number of live strings and container element buffers.
    pub fn heap_values(&self) -> usize {
        self.store.live_slots()
    }

    fn check(&self, prop: &PropertyDescriptor) -> Result<()> {
        if self.layout.contains(prop) {
            Ok(())
        } else {
            Err(PropertyError::ForeignProperty {
                property: prop.name().to_string(),
                layout: self.layout.name().to_string(),
            })
        }
    }

    fn element(&self, prop: &PropertyDescriptor, index: usize) -> Result<Addr> {
        self.check(prop)?;
        if index >= prop.array_dim() {
            return Err(PropertyError::ArrayIndexOutOfRange {
                property: prop.name().to_string(),
                index: index as u32,
                array_dim: prop.array_dim(),
            });
        }
        Ok(Addr::root(prop.element_offset(index)))
    }

    /// Raw bytes of every element of `prop`.
    pub fn slice(&self, prop: &PropertyDescriptor) -> Result<&[u8]> {
        self.check(prop)?;
        self.store.bytes(Addr::root(prop.offset()), prop.size())
    }

    pub fn slice_mut(&mut self, prop: &PropertyDescriptor) -> Result<&mut [u8]> {
        self.check(prop)?;
        self.store.bytes_mut(Addr::root(prop.offset()), prop.size())
    }

    pub fn value(&self, prop: &PropertyDescriptor, index: usize) -> Result<Value> {
        let addr = self.element(prop, index)?;
        prop.ty().snapshot(&self.store, addr, prop.bit_mask())
    }

    pub fn set_value(&mut self, prop: &PropertyDescriptor, index: usize, value: &Value) -> Result<()> {
        let addr = self.element(prop, index)?;
        prop.ty().assign(&mut self.store, addr, prop.bit_mask(), value)
    }

    pub fn print_value(&self, prop: &PropertyDescriptor, index: usize, package: &Package) -> Result<String> {
        let addr = self.element(prop, index)?;
        prop.ty()
            .print_value(&self.store, addr, prop.bit_mask(), package)
    }

    /// Compare one element against the same element of `other`, which must
    /// also contain `prop`.
    pub fn identical(&self, prop: &PropertyDescriptor, index: usize, other: &PropertyDataBlock) -> Result<bool> {
        let addr = self.element(prop, index)?;
        let other_addr = other.element(prop, index)?;
        prop.ty()
            .identical(&self.store, addr, &other.store, other_addr, prop.bit_mask())
    }

    pub fn get_bool(&self, prop: &PropertyDescriptor, index: usize) -> Result<bool> {
        match self.value(prop, index)? {
            Value::Bool(v) => Ok(v),
            other => Err(mismatch("bool", &other)),
        }
    }

    pub fn set_bool(&mut self, prop: &PropertyDescriptor, index: usize, value: bool) -> Result<()> {
        self.set_value(prop, index, &Value::Bool(value))
    }

    pub fn get_byte(&self, prop: &PropertyDescriptor, index: usize) -> Result<u8> {
        match self.value(prop, index)? {
            Value::Byte(v) => Ok(v),
            other => Err(mismatch("byte", &other)),
        }
    }

    pub fn set_byte(&mut self, prop: &PropertyDescriptor, index: usize, value: u8) -> Result<()> {
        self.set_value(prop, index, &Value::Byte(value))
    }

    pub fn get_int(&self, prop: &PropertyDescriptor, index: usize) -> Result<i32> {
        match self.value(prop, index)? {
            Value::Int(v) => Ok(v),
            other => Err(mismatch("int", &other)),
        }
    }

    pub fn set_int(&mut self, prop: &PropertyDescriptor, index: usize, value: i32) -> Result<()> {
        self.set_value(prop, index, &Value::Int(value))
    }

    pub fn get_float(&self, prop: &PropertyDescriptor, index: usize) -> Result<f32> {
        match self.value(prop, index)? {
            Value::Float(v) => Ok(v),
            other => Err(mismatch("float", &other)),
        }
    }

    pub fn set_float(&mut self, prop: &PropertyDescriptor, index: usize, value: f32) -> Result<()> {
        self.set_value(prop, index, &Value::Float(value))
    }

    pub fn get_name(&self, prop: &PropertyDescriptor, index: usize) -> Result<NameId> {
        match self.value(prop, index)? {
            Value::Name(v) => Ok(v),
            other => Err(mismatch("name", &other)),
        }
    }

    pub fn set_name(&mut self, prop: &PropertyDescriptor, index: usize, value: NameId) -> Result<()> {
        self.set_value(prop, index, &Value::Name(value))
    }

    pub fn get_object(&self, prop: &PropertyDescriptor, index: usize) -> Result<ObjectHandle> {
        match self.value(prop, index)? {
            Value::Object(v) => Ok(v),
            other => Err(mismatch("object", &other)),
        }
    }

    pub fn set_object(&mut self, prop: &PropertyDescriptor, index: usize, value: ObjectHandle) -> Result<()> {
        self.set_value(prop, index, &Value::Object(value))
    }

    pub fn get_str(&self, prop: &PropertyDescriptor, index: usize) -> Result<String> {
        match self.value(prop, index)? {
            Value::Str(v) => Ok(v),
            other => Err(mismatch("str", &other)),
        }
    }

    pub fn set_str(&mut self, prop: &PropertyDescriptor, index: usize, value: &str) -> Result<()> {
        self.set_value(prop, index, &Value::Str(value.to_string()))
    }

    pub(crate) fn load_tagged(
        &mut self,
        prop: &PropertyDescriptor,
        index: usize,
        stream: &mut PackageStream<'_>,
        tag: &PropertyTag,
    ) -> Result<()> {
        let addr = self.element(prop, index)?;
        prop.ty()
            .load_tagged_value(&mut self.store, addr, prop.bit_mask(), stream, tag, prop.name())
    }

    pub(crate) fn write_element(
        &self,
        prop: &PropertyDescriptor,
        index: usize,
        writer: &mut PackageWriter,
    ) -> Result<()> {
        let addr = self.element(prop, index)?;
        prop.ty()
            .write_value(&self.store, addr, prop.bit_mask(), writer)
    }
}

fn mismatch(expected: &'static str, found: &Value) -> PropertyError {
    PropertyError::ValueMismatch {
        expected,
        found: found.kind(),
    }
}
