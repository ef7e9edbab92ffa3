//! Compiled script bodies.
//!
//! Scripts are decoded token by token into a flat blob whose operands have a
//! fixed width regardless of how the package stream encoded them. The blob
//! length must equal the size declared by the owning struct.

mod decoder;
mod opcode;

use log::debug;
use serde::Serialize;
use ureflect_stream::PackageStream;

use crate::error::BytecodeError;

pub use decoder::{BlobSource, LET_BOOL_VERSION, MAX_DEPTH, RETURN_VALUE_VERSION, ScriptSource};
pub use opcode::{FIRST_CONVERSION, FIRST_EXTENDED_NATIVE, FIRST_NATIVE, Opcode};

use decoder::ScriptDecoder;

/// One token found while walking a decoded blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenRecord {
    pub offset: usize,
    pub depth: usize,
    pub opcode: Opcode,
}

/// Decoded instruction blob of one struct or function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    version: u32,
    bytes: Vec<u8>,
    statements: Vec<usize>,
    none_name: Option<u32>,
}

impl Script {
    /// Decode `script_size` bytes of canonical output from a package stream,
    /// using the stream's format version.
    pub fn decode(stream: &mut PackageStream<'_>, script_size: usize) -> Result<Self, BytecodeError> {
        let version = stream.format_version();
        Self::decode_from(stream, script_size, version)
    }

    pub fn decode_from<S: ScriptSource>(
        source: &mut S,
        script_size: usize,
        version: u32,
    ) -> Result<Self, BytecodeError> {
        let mut decoder = ScriptDecoder::new(source, version);
        while decoder.out.len() < script_size {
            match decoder.decode_statement() {
                Ok(_) => {}
                Err(BytecodeError::Operand { source, .. }) if source.is_eof() => {
                    return Err(BytecodeError::LengthMismatch {
                        declared: script_size,
                        decoded: decoder.out.len(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        if decoder.out.len() != script_size {
            return Err(BytecodeError::LengthMismatch {
                declared: script_size,
                decoded: decoder.out.len(),
            });
        }
        debug!(
            "decoded script of {} bytes, {} statements",
            script_size,
            decoder.statements.len()
        );
        Ok(Self {
            version,
            none_name: decoder.none_name,
            bytes: decoder.out,
            statements: decoder.statements,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Start offsets of the top-level statements.
    pub fn statements(&self) -> &[usize] {
        &self.statements
    }

    /// Index of the statement containing byte `offset` of the blob.
    pub fn statement_index(&self, offset: usize) -> Option<usize> {
        if offset >= self.bytes.len() {
            return None;
        }
        match self.statements.binary_search(&offset) {
            Ok(index) => Some(index),
            Err(0) => None,
            Err(index) => Some(index - 1),
        }
    }

    /// Re-walk the blob, listing every token with its nesting depth.
    pub fn walk(&self) -> Result<Vec<TokenRecord>, BytecodeError> {
        let mut source = BlobSource::new(&self.bytes, self.none_name);
        let mut decoder = ScriptDecoder::new(&mut source, self.version);
        while decoder.out.len() < self.bytes.len() {
            decoder.decode_statement()?;
        }
        Ok(decoder.tokens)
    }
}
