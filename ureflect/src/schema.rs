//! Declarative struct definitions as handed over by the package loader.
//!
//! Definitions are plain serde types so tools can also feed them from JSON:
//!
//! ```json
//! { "structs": [
//!     { "name": "Actor", "fields": [
//!         { "field": "property", "name": "bHidden", "type": { "kind": "bool" } },
//!         { "field": "property", "name": "Location",
//!           "type": { "kind": "struct", "name": "Vector" } } ] } ] }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::property::PropertyFlags;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub structs: Vec<StructDef>,
}

impl Schema {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_slice(&bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl StructDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            fields: Vec::new(),
        }
    }

    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn property(self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.field(FieldDef::Property(PropertyDef::new(name, ty)))
    }

    pub fn nested(self, def: StructDef) -> Self {
        self.field(FieldDef::Struct(def))
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum FieldDef {
    Property(PropertyDef),
    /// A struct type declared inside the enclosing struct.
    Struct(StructDef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default = "default_array_dim")]
    pub array_dim: usize,
    #[serde(default)]
    pub flags: PropertyFlags,
}

fn default_array_dim() -> usize {
    1
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            array_dim: 1,
            flags: PropertyFlags::empty(),
        }
    }

    pub fn array_dim(mut self, array_dim: usize) -> Self {
        self.array_dim = array_dim;
        self
    }

    pub fn flags(mut self, flags: PropertyFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Declared kind of a property. Struct references are by name and resolved
/// through the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeRef {
    Byte,
    Int,
    Bool,
    Float,
    Name,
    Str,
    Object {
        #[serde(default = "default_object_class")]
        class: String,
    },
    Class {
        #[serde(default = "default_object_class")]
        meta_class: String,
    },
    Struct {
        name: String,
    },
    FixedArray {
        inner: Box<TypeRef>,
        count: usize,
    },
    Array {
        inner: Box<TypeRef>,
    },
    Map {
        key: Box<TypeRef>,
        value: Box<TypeRef>,
    },
}

fn default_object_class() -> String {
    "Object".to_string()
}

impl TypeRef {
    pub fn object(class: impl Into<String>) -> Self {
        TypeRef::Object {
            class: class.into(),
        }
    }

    pub fn structure(name: impl Into<String>) -> Self {
        TypeRef::Struct { name: name.into() }
    }

    pub fn array(inner: TypeRef) -> Self {
        TypeRef::Array {
            inner: Box::new(inner),
        }
    }

    pub fn fixed_array(inner: TypeRef, count: usize) -> Self {
        TypeRef::FixedArray {
            inner: Box::new(inner),
            count,
        }
    }

    pub fn map(key: TypeRef, value: TypeRef) -> Self {
        TypeRef::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_definitions() {
        let schema = Schema::from_json(
            r#"{ "structs": [
                { "name": "Actor", "base": "Object", "fields": [
                    { "field": "property", "name": "Tags", "array_dim": 4, "flags": "EDIT",
                      "type": { "kind": "fixed_array", "count": 2,
                                "inner": { "kind": "name" } } },
                    { "field": "struct", "name": "Region",
                      "fields": [ { "field": "property", "name": "Zone",
                                    "type": { "kind": "object" } } ] } ] } ] }"#,
        )
        .unwrap();

        let expected = StructDef::new("Actor")
            .base("Object")
            .field(FieldDef::Property(
                PropertyDef::new("Tags", TypeRef::fixed_array(TypeRef::Name, 2))
                    .array_dim(4)
                    .flags(PropertyFlags::EDIT),
            ))
            .nested(StructDef::new("Region").property("Zone", TypeRef::object("Object")));
        assert_eq!(schema.structs, vec![expected]);
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        let err = Schema::from_json(
            r#"{ "structs": [ { "name": "A", "fields": [
                { "field": "property", "name": "B", "type": { "kind": "quaternion" } } ] } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::Error::Schema(_)));
    }
}
