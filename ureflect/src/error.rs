use thiserror::Error;
use ureflect_stream::StreamError;

use crate::property::TypeTag;

/// Schema and layout failures. All of them reject the struct being built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("malformed declared name '{0}'")]
    MalformedName(String),
    #[error("struct {0} is registered twice")]
    DuplicateStruct(String),
    #[error("struct {struct_name} declares {property} twice")]
    DuplicateProperty {
        struct_name: String,
        property: String,
    },
    #[error("{struct_name}.{property} has array dimension 0")]
    InvalidArrayDim {
        struct_name: String,
        property: String,
    },
    #[error("unknown struct {0}")]
    UnknownStruct(String),
    #[error("struct {0} refers to itself while being resolved")]
    RecursiveStruct(String),
    #[error("resolving {struct_name} nests deeper than {depth} structs")]
    DepthExceeded { struct_name: String, depth: usize },
    #[error("{struct_name}.{property} ends at byte {end}, past the struct size {size}")]
    PropertyOverflow {
        struct_name: String,
        property: String,
        end: usize,
        size: usize,
    },
}

/// Failures while constructing, accessing or (de)serializing property values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PropertyError {
    #[error("property {property}: stream tag {found} does not match declared {expected}")]
    TypeMismatch {
        property: String,
        expected: TypeTag,
        found: TypeTag,
    },
    #[error("property {property}: stream struct {found} does not match declared {expected}")]
    StructMismatch {
        property: String,
        expected: String,
        found: String,
    },
    #[error("property {property}: array index {index} outside dimension {array_dim}")]
    ArrayIndexOutOfRange {
        property: String,
        index: u32,
        array_dim: usize,
    },
    #[error("property {property}: header declared {declared} payload bytes but {consumed} were read")]
    SizeMismatch {
        property: String,
        declared: u32,
        consumed: u64,
    },
    #[error("property {property}: bool arrays cannot be written as tagged entries")]
    UnsupportedBoolArray { property: String },
    #[error("property {property} does not belong to layout {layout}")]
    ForeignProperty { property: String, layout: String },
    #[error("value of kind {found} cannot be stored in a {expected} property")]
    ValueMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("default block of {found} cannot seed a block of {expected}")]
    LayoutMismatch { expected: String, found: String },
    #[error("access of {len} bytes at offset {offset} exceeds region size {size}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("heap handle {0} does not refer to a live value")]
    DanglingHandle(usize),
    #[error("container count {count} is invalid with {remaining} bytes left")]
    InvalidCount { count: i64, remaining: usize },
    #[error("property {property}: {source}")]
    Payload {
        property: String,
        #[source]
        source: StreamError,
    },
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl PropertyError {
    /// Attach the property name to stream failures raised while decoding its
    /// payload.
    pub fn in_property(self, property: &str) -> Self {
        match self {
            PropertyError::Stream(source) => PropertyError::Payload {
                property: property.to_string(),
                source,
            },
            other => other,
        }
    }
}

/// Bytecode decode failures. None of them leave a usable script behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BytecodeError {
    #[error("unknown opcode {opcode:#04x} at decoded offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("expression nesting exceeds {limit} at decoded offset {offset}")]
    DepthExceeded { limit: usize, offset: usize },
    #[error("bytecode load failed: declared script size {declared}, decoded {decoded}")]
    LengthMismatch { declared: usize, decoded: usize },
    #[error("operand of {opcode} at decoded offset {offset}: {source}")]
    Operand {
        opcode: &'static str,
        offset: usize,
        #[source]
        source: StreamError,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("class {class}: {source}")]
    Class {
        class: String,
        #[source]
        source: Box<Error>,
    },
    #[error("schema decode error: {0}")]
    Schema(#[from] serde_json::Error),
    #[error("schema read error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
