//! Primitive package stream shared by the reflection crates.
//!
//! A package is a name table, an object table and a format version. The
//! [`PackageStream`] reads typed values out of a byte slice that belongs to a
//! package; [`PackageWriter`] produces the same encodings so loaders and tests
//! can build streams without hand-assembling bytes.

use thiserror::Error;

pub mod names;
pub mod objects;
pub mod reader;
pub mod writer;

pub use names::{NameId, NameTable, NONE_NAME};
pub use objects::{LoadState, ObjectEntry, ObjectHandle, ObjectRef, ObjectTable};
pub use reader::PackageStream;
pub use writer::PackageWriter;

/// Largest value the 1/2/4-byte array index encoding can carry.
pub const MAX_ARRAY_INDEX: u32 = 0x3fff_ffff;

/// A loaded package: its format version plus the tables that names and
/// object references in its streams index into.
#[derive(Debug, Clone, Default)]
pub struct Package {
    version: u32,
    names: NameTable,
    objects: ObjectTable,
}

impl Package {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            names: NameTable::new(),
            objects: ObjectTable::default(),
        }
    }

    pub fn with_tables(version: u32, names: NameTable, objects: ObjectTable) -> Self {
        Self {
            version,
            names,
            objects,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn names(&self) -> &NameTable {
        &self.names
    }

    pub fn names_mut(&mut self) -> &mut NameTable {
        &mut self.names
    }

    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectTable {
        &mut self.objects
    }

    /// Open a stream over `bytes`, which must come from this package.
    pub fn stream<'a>(&'a self, bytes: &'a [u8]) -> PackageStream<'a> {
        PackageStream::new(self, bytes)
    }
}

/// Error conditions raised while reading or writing package streams.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("unexpected end of stream at offset {offset} (wanted {wanted} bytes)")]
    UnexpectedEof { offset: u64, wanted: usize },
    #[error("compact index at offset {offset} does not fit 32 bits")]
    IndexOverflow { offset: u64 },
    #[error("name index {0} is outside the name table")]
    NameOutOfRange(i64),
    #[error("object reference {0} is outside the object table")]
    ObjectOutOfRange(i32),
    #[error("string at offset {offset} is not terminated")]
    UnterminatedString { offset: u64 },
    #[error("string at offset {offset} is not valid UTF-16")]
    InvalidText { offset: u64 },
    #[error("array index {0} does not fit the 30-bit encoding")]
    ArrayIndexTooLarge(u32),
    #[error("object {0} is already being loaded")]
    ReentrantLoad(String),
}

impl StreamError {
    pub fn is_eof(&self) -> bool {
        matches!(self, StreamError::UnexpectedEof { .. })
    }
}
