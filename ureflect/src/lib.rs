//! Reflection core for a versioned binary object format.
//!
//! Struct definitions are resolved into immutable [`StructLayout`]s by the
//! [`StructRegistry`]; instances live in [`PropertyDataBlock`]s that are
//! filled from tagged property streams; compiled bodies are decoded into
//! [`Script`] blobs. Primitive stream access comes from `ureflect_stream`.

pub mod bytecode;
pub mod class;
pub mod data_block;
pub mod error;
pub mod layout;
pub mod offsets;
pub mod property;
pub mod registry;
pub mod schema;
mod storage;
pub mod tagged;
pub mod value;

pub use bytecode::{Opcode, Script, TokenRecord};
pub use class::ClassObject;
pub use data_block::PropertyDataBlock;
pub use error::{BytecodeError, Error, LayoutError, PropertyError, Result};
pub use layout::{LayoutBuilder, LayoutField, POINTER_SIZE, StructLayout};
pub use offsets::{OffsetTable, PropertyOffset};
pub use property::{PropertyDescriptor, PropertyFlags, PropertyType, TypeTag};
pub use registry::StructRegistry;
pub use schema::{FieldDef, PropertyDef, Schema, StructDef, TypeRef};
pub use tagged::{LoadReport, PropertyTag, read_properties, write_properties};
pub use value::Value;

pub use ureflect_stream;
