//! Name-keyed offset lookup built from resolved layouts.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::layout::StructLayout;
use crate::registry::StructRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PropertyOffset {
    pub offset: usize,
    /// Non-zero only for bools.
    pub bit_mask: u32,
}

/// Name-based `(struct, property)` lookup of well-known field placements,
/// captured once from resolved layouts. Names are case-insensitive and a
/// derived declaration wins over a shadowed base one.
#[derive(Debug, Clone, Default)]
pub struct OffsetTable {
    entries: HashMap<(String, String), PropertyOffset>,
}

impl OffsetTable {
    /// Capture every layout the registry has resolved so far.
    pub fn build(registry: &StructRegistry) -> Self {
        Self::from_layouts(registry.layouts())
    }

    pub fn from_layouts<'a>(layouts: impl IntoIterator<Item = &'a Arc<StructLayout>>) -> Self {
        let mut entries = HashMap::new();
        for layout in layouts {
            let struct_key = layout.name().to_ascii_lowercase();
            for prop in layout.properties() {
                entries.insert(
                    (struct_key.clone(), prop.name().to_ascii_lowercase()),
                    PropertyOffset {
                        offset: prop.offset(),
                        bit_mask: prop.bit_mask(),
                    },
                );
            }
        }
        Self { entries }
    }

    pub fn find(&self, struct_name: &str, property: &str) -> Option<PropertyOffset> {
        self.entries
            .get(&(struct_name.to_ascii_lowercase(), property.to_ascii_lowercase()))
            .copied()
    }

    pub fn offset_of(&self, struct_name: &str, property: &str) -> Option<usize> {
        self.find(struct_name, property).map(|entry| entry.offset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
