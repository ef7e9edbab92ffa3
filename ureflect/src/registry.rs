//! Named struct definitions and their resolution into layouts.
//!
//! Each definition moves from `Unloaded` to `Loading` to `Loaded` exactly
//! once; dependencies are resolved before the struct that needs them.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use ureflect_stream::LoadState;

use crate::error::LayoutError;
use crate::layout::{LayoutBuilder, LayoutField, StructLayout, validate_name};
use crate::property::PropertyType;
use crate::schema::{FieldDef, Schema, StructDef, TypeRef};

/// Deepest chain of base/nested/struct-typed dependencies resolved for one
/// struct.
pub const MAX_RESOLVE_DEPTH: usize = 64;

#[derive(Debug)]
enum Entry {
    Unloaded(StructDef),
    Loading,
    Loaded(Arc<StructLayout>),
}

/// Struct definitions keyed by case-insensitive name, resolved on demand.
///
/// Resolving a struct first resolves its base, every nested declaration and
/// every struct it references, so a layout is never built over an unresolved
/// dependency. Reaching a struct that is still being resolved is a cycle.
#[derive(Debug, Default)]
pub struct StructRegistry {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

impl StructRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the built-in geometry and color structs.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for def in builtin_structs() {
            let key = def.name.to_ascii_lowercase();
            registry.order.push(key.clone());
            registry.entries.insert(key, Entry::Unloaded(def));
        }
        registry
    }

    /// Add a definition and every struct declared inside it.
    pub fn register(&mut self, def: StructDef) -> Result<(), LayoutError> {
        validate_name(&def.name)?;
        let key = def.name.to_ascii_lowercase();
        if self.entries.contains_key(&key) {
            return Err(LayoutError::DuplicateStruct(def.name));
        }
        for field in &def.fields {
            if let FieldDef::Struct(nested) = field {
                self.register(nested.clone())?;
            }
        }
        self.order.push(key.clone());
        self.entries.insert(key, Entry::Unloaded(def));
        Ok(())
    }

    pub fn register_schema(&mut self, schema: Schema) -> Result<(), LayoutError> {
        schema
            .structs
            .into_iter()
            .try_for_each(|def| self.register(def))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn state(&self, name: &str) -> Option<LoadState> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|entry| match entry {
                Entry::Unloaded(_) => LoadState::Unloaded,
                Entry::Loading => LoadState::Loading,
                Entry::Loaded(_) => LoadState::Loaded,
            })
    }

    /// Resolved layout, if `name` has already been resolved.
    pub fn get(&self, name: &str) -> Option<Arc<StructLayout>> {
        match self.entries.get(&name.to_ascii_lowercase()) {
            Some(Entry::Loaded(layout)) => Some(layout.clone()),
            _ => None,
        }
    }

    /// Resolved layouts in registration order.
    pub fn layouts(&self) -> impl Iterator<Item = &Arc<StructLayout>> {
        self.order.iter().filter_map(|key| match self.entries.get(key) {
            Some(Entry::Loaded(layout)) => Some(layout),
            _ => None,
        })
    }

    pub fn resolve(&mut self, name: &str) -> Result<Arc<StructLayout>, LayoutError> {
        self.resolve_at(name, 0)
    }

    /// Resolve every registered struct, returning them in registration order.
    pub fn resolve_all(&mut self) -> Result<Vec<Arc<StructLayout>>, LayoutError> {
        let keys = self.order.clone();
        keys.iter().map(|key| self.resolve(key)).collect()
    }

    fn resolve_at(&mut self, name: &str, depth: usize) -> Result<Arc<StructLayout>, LayoutError> {
        if depth > MAX_RESOLVE_DEPTH {
            return Err(LayoutError::DepthExceeded {
                struct_name: name.to_string(),
                depth: MAX_RESOLVE_DEPTH,
            });
        }
        let key = name.to_ascii_lowercase();
        let def = match self.entries.insert(key.clone(), Entry::Loading) {
            None => {
                self.entries.remove(&key);
                return Err(LayoutError::UnknownStruct(name.to_string()));
            }
            Some(Entry::Loaded(layout)) => {
                self.entries.insert(key, Entry::Loaded(layout.clone()));
                return Ok(layout);
            }
            Some(Entry::Loading) => return Err(LayoutError::RecursiveStruct(name.to_string())),
            Some(Entry::Unloaded(def)) => def,
        };

        match self.build(&def, depth) {
            Ok(layout) => {
                let layout = Arc::new(layout);
                debug!(
                    "resolved {} ({} properties, {} bytes)",
                    layout.name(),
                    layout.properties().len(),
                    layout.size()
                );
                self.entries.insert(key, Entry::Loaded(layout.clone()));
                Ok(layout)
            }
            Err(err) => {
                self.entries.insert(key, Entry::Unloaded(def));
                Err(err)
            }
        }
    }

    fn build(&mut self, def: &StructDef, depth: usize) -> Result<StructLayout, LayoutError> {
        let mut builder = LayoutBuilder::new(def.name.clone());
        if let Some(base) = &def.base {
            builder = builder.with_base(self.resolve_at(base, depth + 1)?);
        }
        for field in &def.fields {
            match field {
                FieldDef::Struct(nested) => {
                    let layout = self.resolve_at(&nested.name, depth + 1)?;
                    builder.push(LayoutField::Struct(layout));
                }
                FieldDef::Property(prop) => {
                    let ty = self.resolve_type(&prop.ty, depth)?;
                    builder.push(LayoutField::Property {
                        name: prop.name.clone(),
                        ty,
                        array_dim: prop.array_dim,
                        flags: prop.flags,
                    });
                }
            }
        }
        builder.build()
    }

    fn resolve_type(&mut self, ty: &TypeRef, depth: usize) -> Result<PropertyType, LayoutError> {
        Ok(match ty {
            TypeRef::Byte => PropertyType::Byte,
            TypeRef::Int => PropertyType::Int,
            TypeRef::Bool => PropertyType::Bool,
            TypeRef::Float => PropertyType::Float,
            TypeRef::Name => PropertyType::Name,
            TypeRef::Str => PropertyType::Str,
            TypeRef::Object { class } => PropertyType::Object {
                class: class.clone(),
            },
            TypeRef::Class { meta_class } => PropertyType::Class {
                meta_class: meta_class.clone(),
            },
            TypeRef::Struct { name } => PropertyType::Struct(self.resolve_at(name, depth + 1)?),
            TypeRef::FixedArray { inner, count } => PropertyType::FixedArray {
                inner: Box::new(self.resolve_type(inner, depth)?),
                count: *count,
            },
            TypeRef::Array { inner } => {
                PropertyType::Array(Box::new(self.resolve_type(inner, depth)?))
            }
            TypeRef::Map { key, value } => PropertyType::Map {
                key: Box::new(self.resolve_type(key, depth)?),
                value: Box::new(self.resolve_type(value, depth)?),
            },
        })
    }
}

fn builtin_structs() -> Vec<StructDef> {
    vec![
        StructDef::new("Vector")
            .property("X", TypeRef::Float)
            .property("Y", TypeRef::Float)
            .property("Z", TypeRef::Float),
        StructDef::new("Rotator")
            .property("Pitch", TypeRef::Int)
            .property("Yaw", TypeRef::Int)
            .property("Roll", TypeRef::Int),
        StructDef::new("Color")
            .property("R", TypeRef::Byte)
            .property("G", TypeRef::Byte)
            .property("B", TypeRef::Byte)
            .property("A", TypeRef::Byte),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_dependencies_eagerly() {
        let mut registry = StructRegistry::with_builtins();
        registry
            .register(
                StructDef::new("Actor")
                    .base("Object")
                    .property("Location", TypeRef::structure("Vector")),
            )
            .unwrap();
        registry.register(StructDef::new("Object")).unwrap();
        assert_eq!(registry.state("vector"), Some(LoadState::Unloaded));

        let actor = registry.resolve("Actor").unwrap();
        assert_eq!(actor.base().map(|base| base.name()), Some("Object"));
        assert_eq!(registry.state("Vector"), Some(LoadState::Loaded));
        assert_eq!(registry.state("Object"), Some(LoadState::Loaded));
        assert!(registry.get("rotator").is_none());
        assert!(Arc::ptr_eq(&actor, &registry.resolve("ACTOR").unwrap()));
    }

    #[test]
    fn builtins_resolve_and_reject_redefinition() {
        let mut registry = StructRegistry::with_builtins();
        assert_eq!(registry.state("vector"), Some(LoadState::Unloaded));
        let sizes: Vec<_> = registry
            .resolve_all()
            .unwrap()
            .iter()
            .map(|layout| (layout.name().to_string(), layout.size()))
            .collect();
        assert_eq!(
            sizes,
            vec![
                ("Vector".to_string(), 12),
                ("Rotator".to_string(), 12),
                ("Color".to_string(), 8),
            ]
        );
        assert_eq!(
            registry.register(StructDef::new("Color")),
            Err(LayoutError::DuplicateStruct("Color".into()))
        );
    }

    #[test]
    fn cycles_are_reported() {
        let mut registry = StructRegistry::new();
        registry.register(StructDef::new("A").base("B")).unwrap();
        registry
            .register(StructDef::new("B").property("Inner", TypeRef::structure("A")))
            .unwrap();
        assert_eq!(
            registry.resolve("A").unwrap_err(),
            LayoutError::RecursiveStruct("A".into())
        );
        assert_eq!(registry.state("A"), Some(LoadState::Unloaded));
        assert_eq!(registry.state("B"), Some(LoadState::Unloaded));
    }

    #[test]
    fn depth_is_bounded() {
        let mut registry = StructRegistry::new();
        registry.register(StructDef::new("S0")).unwrap();
        for level in 1..=MAX_RESOLVE_DEPTH + 1 {
            registry
                .register(StructDef::new(format!("S{level}")).base(format!("S{}", level - 1)))
                .unwrap();
        }
        assert!(matches!(
            registry.resolve(&format!("S{}", MAX_RESOLVE_DEPTH + 1)),
            Err(LayoutError::DepthExceeded { .. })
        ));
        assert!(registry.resolve(&format!("S{MAX_RESOLVE_DEPTH}")).is_ok());
    }

    #[test]
    fn nested_declarations_are_registered() {
        let mut registry = StructRegistry::new();
        registry
            .register(
                StructDef::new("Zone")
                    .nested(StructDef::new("Region").property("Id", TypeRef::Int))
                    .property("Area", TypeRef::structure("Region")),
            )
            .unwrap();
        let zone = registry.resolve("Zone").unwrap();
        assert_eq!(zone.nested()[0].name(), "Region");
        assert!(matches!(
            registry.register(StructDef::new("region")),
            Err(LayoutError::DuplicateStruct(_))
        ));
        assert!(matches!(
            registry.resolve("Missing"),
            Err(LayoutError::UnknownStruct(_))
        ));
    }
}
