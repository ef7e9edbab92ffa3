//! Field placement for structs and classes.
//!
//! Offsets follow the runtime's compiler: base properties keep their base
//! offsets, own properties are appended in declaration order, and runs of
//! consecutive bools share 32-bit words.

use std::collections::HashSet;
use std::sync::Arc;

use log::trace;

use crate::error::LayoutError;
use crate::property::{ELEMENT_MASK, PropertyDescriptor, PropertyFlags, PropertyType};

/// Size of a pointer on the layout target.
pub const POINTER_SIZE: usize = 8;

/// Built-in geometry structs whose size rounds to 4 bytes instead of
/// [`POINTER_SIZE`].
const NARROW_STRUCTS: [&str; 2] = ["Vector", "Rotator"];

const BOOL_WORD: usize = 4;

pub(crate) fn align_up(value: usize, align: usize) -> usize {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// Names must look like identifiers: ASCII letters, digits and `_`, not
/// starting with a digit.
pub(crate) fn validate_name(name: &str) -> Result<(), LayoutError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(LayoutError::MalformedName(name.to_string()))
    }
}

/// Resolved placement of every property of one struct. Immutable once built
/// and shared by every instance and every derived layout.
#[derive(Debug)]
pub struct StructLayout {
    name: String,
    base: Option<Arc<StructLayout>>,
    properties: Vec<Arc<PropertyDescriptor>>,
    own_start: usize,
    nested: Vec<Arc<StructLayout>>,
    size: usize,
    alignment: usize,
}

impl StructLayout {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Option<&Arc<StructLayout>> {
        self.base.as_ref()
    }

    /// Base properties first, then own properties in declaration order.
    pub fn properties(&self) -> &[Arc<PropertyDescriptor>] {
        &self.properties
    }

    pub fn own_properties(&self) -> &[Arc<PropertyDescriptor>] {
        &self.properties[self.own_start..]
    }

    /// Struct types declared inside this struct.
    pub fn nested(&self) -> &[Arc<StructLayout>] {
        &self.nested
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Most-derived property with this name, ignoring case.
    pub fn find_property(&self, name: &str) -> Option<&Arc<PropertyDescriptor>> {
        self.properties
            .iter()
            .rev()
            .find(|prop| prop.name().eq_ignore_ascii_case(name))
    }

    /// Lookup used by the tagged stream. When a derived struct shadows a
    /// base property of another kind, the struct-typed declaration is chosen
    /// only for struct-tagged entries.
    pub fn find_tagged(&self, name: &str, wants_struct: bool) -> Option<&Arc<PropertyDescriptor>> {
        let mut fallback = None;
        for prop in self
            .properties
            .iter()
            .rev()
            .filter(|prop| prop.name().eq_ignore_ascii_case(name))
        {
            if prop.ty().struct_layout().is_some() == wants_struct {
                return Some(prop);
            }
            fallback.get_or_insert(prop);
        }
        fallback
    }

    /// True when this layout is `name` or derives from it.
    pub fn is_a(&self, name: &str) -> bool {
        let mut current = Some(self);
        while let Some(layout) = current {
            if layout.name.eq_ignore_ascii_case(name) {
                return true;
            }
            current = layout.base.as_deref();
        }
        false
    }

    /// True when `prop` is one of this layout's descriptors (own or inherited).
    pub fn contains(&self, prop: &PropertyDescriptor) -> bool {
        self.properties
            .iter()
            .any(|candidate| std::ptr::eq(candidate.as_ref(), prop))
    }
}

/// One declared field, in declaration order.
#[derive(Debug, Clone)]
pub enum LayoutField {
    Property {
        name: String,
        ty: PropertyType,
        array_dim: usize,
        flags: PropertyFlags,
    },
    /// A struct type declared inside this struct. It occupies no space but
    /// still ends a bool run.
    Struct(Arc<StructLayout>),
}

#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    name: String,
    base: Option<Arc<StructLayout>>,
    fields: Vec<LayoutField>,
}

impl LayoutBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            fields: Vec::new(),
        }
    }

    pub fn with_base(mut self, base: Arc<StructLayout>) -> Self {
        self.base = Some(base);
        self
    }

    pub fn property(self, name: impl Into<String>, ty: PropertyType) -> Self {
        self.property_with(name, ty, 1, PropertyFlags::empty())
    }

    pub fn property_with(
        mut self,
        name: impl Into<String>,
        ty: PropertyType,
        array_dim: usize,
        flags: PropertyFlags,
    ) -> Self {
        self.push(LayoutField::Property {
            name: name.into(),
            ty,
            array_dim,
            flags,
        });
        self
    }

    pub fn nested(mut self, layout: Arc<StructLayout>) -> Self {
        self.push(LayoutField::Struct(layout));
        self
    }

    pub fn push(&mut self, field: LayoutField) {
        self.fields.push(field);
    }

    pub fn build(self) -> Result<StructLayout, LayoutError> {
        validate_name(&self.name)?;

        let mut properties = self
            .base
            .as_ref()
            .map(|base| base.properties.clone())
            .unwrap_or_default();
        let own_start = properties.len();
        let mut offset = self.base.as_ref().map_or(0, |base| base.size);
        let mut alignment = self.base.as_ref().map_or(1, |base| base.alignment);
        let mut nested = Vec::new();
        let mut seen = HashSet::new();

        // Next free bit in the current bool word; `None` starts a new word.
        let mut next_bit: Option<u32> = None;
        let mut word_offset = 0;

        for field in self.fields {
            match field {
                LayoutField::Struct(layout) => {
                    next_bit = None;
                    nested.push(layout);
                }
                LayoutField::Property {
                    name,
                    ty,
                    array_dim,
                    flags,
                } => {
                    validate_name(&name)?;
                    if !seen.insert(name.to_ascii_lowercase()) {
                        return Err(LayoutError::DuplicateProperty {
                            struct_name: self.name.clone(),
                            property: name,
                        });
                    }
                    if array_dim == 0 {
                        return Err(LayoutError::InvalidArrayDim {
                            struct_name: self.name.clone(),
                            property: name,
                        });
                    }

                    let (prop_offset, bit_mask) = if ty.is_bool() && array_dim == 1 {
                        match next_bit {
                            Some(bit) => {
                                next_bit = (bit + 1 < u32::BITS).then_some(bit + 1);
                                (word_offset, 1u32 << bit)
                            }
                            None => {
                                offset = align_up(offset, BOOL_WORD);
                                word_offset = offset;
                                offset += BOOL_WORD;
                                next_bit = Some(1);
                                (word_offset, 1)
                            }
                        }
                    } else {
                        next_bit = None;
                        offset = align_up(offset, ty.natural_alignment());
                        let start = offset;
                        offset += ty.pitch() * array_dim;
                        (start, if ty.is_bool() { ELEMENT_MASK } else { 0 })
                    };

                    alignment = alignment.max(ty.natural_alignment());
                    trace!("{}.{name} at {prop_offset} mask {bit_mask:#x}", self.name);
                    properties.push(Arc::new(PropertyDescriptor::new(
                        name,
                        ty,
                        array_dim,
                        flags,
                        self.name.clone(),
                        prop_offset,
                        bit_mask,
                    )));
                }
            }
        }

        let granularity = if NARROW_STRUCTS
            .iter()
            .any(|narrow| narrow.eq_ignore_ascii_case(&self.name))
        {
            4
        } else {
            POINTER_SIZE
        };
        let size = align_up(offset, granularity);

        for prop in &properties {
            let end = prop.offset() + prop.size();
            if end > size {
                return Err(LayoutError::PropertyOverflow {
                    struct_name: self.name.clone(),
                    property: prop.name().to_string(),
                    end,
                    size,
                });
            }
        }

        Ok(StructLayout {
            name: self.name,
            base: self.base,
            properties,
            own_start,
            nested,
            size,
            alignment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector() -> Arc<StructLayout> {
        Arc::new(
            LayoutBuilder::new("Vector")
                .property("X", PropertyType::Float)
                .property("Y", PropertyType::Float)
                .property("Z", PropertyType::Float)
                .build()
                .unwrap(),
        )
    }

    fn placement(layout: &StructLayout, name: &str) -> (usize, u32) {
        let prop = layout.find_property(name).unwrap();
        (prop.offset(), prop.bit_mask())
    }

    #[test]
    fn geometry_structs_round_to_four_bytes() {
        assert_eq!(vector().size(), 12);
        let color = LayoutBuilder::new("Color")
            .property("R", PropertyType::Byte)
            .property("G", PropertyType::Byte)
            .property("B", PropertyType::Byte)
            .build()
            .unwrap();
        assert_eq!(color.size(), 8);
        assert_eq!(color.alignment(), 1);
    }

    #[test]
    fn derived_layout_appends_after_base() {
        let base = Arc::new(
            LayoutBuilder::new("Object")
                .property("bDeleteMe", PropertyType::Bool)
                .property("Tag", PropertyType::Name)
                .build()
                .unwrap(),
        );
        let derived = LayoutBuilder::new("Actor")
            .with_base(base.clone())
            .property("bHidden", PropertyType::Bool)
            .property("Location", PropertyType::Struct(vector()))
            .build()
            .unwrap();

        assert_eq!(base.size(), 8);
        assert_eq!(placement(&derived, "bDeleteMe"), (0, 1));
        assert_eq!(placement(&derived, "Tag"), (4, 0));
        assert_eq!(placement(&derived, "bHidden"), (8, 1));
        assert_eq!(placement(&derived, "Location"), (12, 0));
        assert_eq!(derived.size(), 24);
        assert_eq!(derived.own_properties().len(), 2);
        assert!(derived.is_a("object"));
        assert!(derived.contains(&base.properties()[0]));
    }

    #[test]
    fn nested_struct_declarations_end_a_bool_run() {
        let layout = LayoutBuilder::new("Pawn")
            .property("bA", PropertyType::Bool)
            .nested(vector())
            .property("bB", PropertyType::Bool)
            .build()
            .unwrap();
        assert_eq!(placement(&layout, "bA"), (0, 1));
        assert_eq!(placement(&layout, "bB"), (4, 1));
        assert_eq!(layout.nested().len(), 1);
    }

    #[test]
    fn arrays_use_element_pitch() {
        let layout = LayoutBuilder::new("Inventory")
            .property("Charge", PropertyType::Byte)
            .property_with("Slots", PropertyType::Int, 3, PropertyFlags::EDIT)
            .property_with("Flags", PropertyType::Bool, 2, PropertyFlags::empty())
            .build()
            .unwrap();
        let slots = layout.find_property("slots").unwrap();
        assert_eq!(slots.offset(), 4);
        assert_eq!(slots.size(), 12);
        assert_eq!(slots.element_offset(2), 12);
        assert_eq!(placement(&layout, "Flags"), (16, ELEMENT_MASK));
        assert_eq!(layout.size(), 24);
    }

    #[test]
    fn rejects_malformed_declarations() {
        assert_eq!(
            LayoutBuilder::new("9Lives").build().unwrap_err(),
            LayoutError::MalformedName("9Lives".into())
        );
        assert!(matches!(
            LayoutBuilder::new("Thing")
                .property("Count", PropertyType::Int)
                .property("count", PropertyType::Int)
                .build(),
            Err(LayoutError::DuplicateProperty { .. })
        ));
        assert!(matches!(
            LayoutBuilder::new("Thing")
                .property_with("Count", PropertyType::Int, 0, PropertyFlags::empty())
                .build(),
            Err(LayoutError::InvalidArrayDim { .. })
        ));
    }
}
