//! Token decoder shared by package streams and decoded blobs.
//!
//! Object and name operands are re-emitted as 4-byte values; everything
//! else is copied at its encoded width.

use std::io::{self, Cursor};

use byteorder::{LittleEndian, ReadBytesExt};
use ureflect_stream::{PackageStream, StreamError};

use super::opcode::Opcode;
use super::TokenRecord;
use crate::error::BytecodeError;

type Result<T> = std::result::Result<T, BytecodeError>;

/// Deepest expression nesting accepted before the input is rejected.
pub const MAX_DEPTH: usize = 64;
/// First format version whose `Return` carries a value expression.
pub const RETURN_VALUE_VERSION: u32 = 62;
/// First format version whose `LetBool` takes two expressions.
pub const LET_BOOL_VERSION: u32 = 64;

/// Operand reads a script decoder needs. Package streams carry object and
/// name references as compact indices; decoded blobs carry them as 4-byte
/// values.
pub trait ScriptSource {
    fn read_u8(&mut self) -> std::result::Result<u8, StreamError>;
    fn read_u16(&mut self) -> std::result::Result<u16, StreamError>;
    fn read_u32(&mut self) -> std::result::Result<u32, StreamError>;
    fn read_object(&mut self) -> std::result::Result<i32, StreamError>;
    fn read_name(&mut self) -> std::result::Result<u32, StreamError>;
    fn is_none_name(&self, name: u32) -> bool;
    /// Bytes up to the next NUL; the NUL is consumed but not returned.
    fn read_bytes_z(&mut self) -> std::result::Result<Vec<u8>, StreamError>;
    fn read_units_z(&mut self) -> std::result::Result<Vec<u16>, StreamError>;
}

impl ScriptSource for PackageStream<'_> {
    fn read_u8(&mut self) -> std::result::Result<u8, StreamError> {
        PackageStream::read_u8(self)
    }

    fn read_u16(&mut self) -> std::result::Result<u16, StreamError> {
        PackageStream::read_u16(self)
    }

    fn read_u32(&mut self) -> std::result::Result<u32, StreamError> {
        PackageStream::read_u32(self)
    }

    fn read_object(&mut self) -> std::result::Result<i32, StreamError> {
        PackageStream::read_object(self).map(|reference| reference.0)
    }

    fn read_name(&mut self) -> std::result::Result<u32, StreamError> {
        PackageStream::read_name(self).map(|name| name.0)
    }

    fn is_none_name(&self, name: u32) -> bool {
        self.names().is_none(ureflect_stream::NameId(name))
    }

    fn read_bytes_z(&mut self) -> std::result::Result<Vec<u8>, StreamError> {
        PackageStream::read_bytes_z(self).map(<[u8]>::to_vec)
    }

    fn read_units_z(&mut self) -> std::result::Result<Vec<u16>, StreamError> {
        PackageStream::read_units_z(self)
    }
}

/// Reads a blob previously produced by the decoder.
///
/// The blob keeps label names as package name indices, so the index that
/// ended the label tables during decoding must be supplied.
#[derive(Debug, Clone)]
pub struct BlobSource<'a> {
    cursor: Cursor<&'a [u8]>,
    none_name: Option<u32>,
}

impl<'a> BlobSource<'a> {
    pub fn new(bytes: &'a [u8], none_name: Option<u32>) -> Self {
        Self {
            cursor: Cursor::new(bytes),
            none_name,
        }
    }

    fn fixed<T>(
        &mut self,
        wanted: usize,
        read: impl FnOnce(&mut Cursor<&'a [u8]>) -> io::Result<T>,
    ) -> std::result::Result<T, StreamError> {
        let offset = self.cursor.position();
        read(&mut self.cursor).map_err(|_| StreamError::UnexpectedEof { offset, wanted })
    }
}

impl ScriptSource for BlobSource<'_> {
    fn read_u8(&mut self) -> std::result::Result<u8, StreamError> {
        self.fixed(1, |cursor| cursor.read_u8())
    }

    fn read_u16(&mut self) -> std::result::Result<u16, StreamError> {
        self.fixed(2, |cursor| cursor.read_u16::<LittleEndian>())
    }

    fn read_u32(&mut self) -> std::result::Result<u32, StreamError> {
        self.fixed(4, |cursor| cursor.read_u32::<LittleEndian>())
    }

    fn read_object(&mut self) -> std::result::Result<i32, StreamError> {
        self.fixed(4, |cursor| cursor.read_i32::<LittleEndian>())
    }

    fn read_name(&mut self) -> std::result::Result<u32, StreamError> {
        self.read_u32()
    }

    fn is_none_name(&self, name: u32) -> bool {
        self.none_name == Some(name)
    }

    fn read_bytes_z(&mut self) -> std::result::Result<Vec<u8>, StreamError> {
        let mut bytes = Vec::new();
        loop {
            match self.read_u8()? {
                0 => return Ok(bytes),
                byte => bytes.push(byte),
            }
        }
    }

    fn read_units_z(&mut self) -> std::result::Result<Vec<u16>, StreamError> {
        let mut units = Vec::new();
        loop {
            match self.read_u16()? {
                0 => return Ok(units),
                unit => units.push(unit),
            }
        }
    }
}

/// Recursive single-token decoder. Every token is re-emitted into `out` in
/// the canonical operand layout.
pub(crate) struct ScriptDecoder<'s, S: ScriptSource> {
    source: &'s mut S,
    version: u32,
    depth: usize,
    pub out: Vec<u8>,
    pub statements: Vec<usize>,
    pub tokens: Vec<TokenRecord>,
    /// Name index that terminated the last label table.
    pub none_name: Option<u32>,
}

impl<'s, S: ScriptSource> ScriptDecoder<'s, S> {
    pub fn new(source: &'s mut S, version: u32) -> Self {
        Self {
            source,
            version,
            depth: 0,
            out: Vec::new(),
            statements: Vec::new(),
            tokens: Vec::new(),
            none_name: None,
        }
    }

    pub fn decode_statement(&mut self) -> Result<Opcode> {
        self.statements.push(self.out.len());
        self.decode_token()
    }

    fn decode_token(&mut self) -> Result<Opcode> {
        let offset = self.out.len();
        if self.depth >= MAX_DEPTH {
            return Err(BytecodeError::DepthExceeded {
                limit: MAX_DEPTH,
                offset,
            });
        }
        self.depth += 1;
        let result = self.decode_body(offset);
        self.depth -= 1;
        result
    }

    fn decode_body(&mut self, offset: usize) -> Result<Opcode> {
        let byte = self
            .source
            .read_u8()
            .map_err(|source| BytecodeError::Operand {
                opcode: "opcode",
                offset,
                source,
            })?;
        let op = Opcode::from_byte(byte).ok_or(BytecodeError::UnknownOpcode {
            opcode: byte,
            offset,
        })?;
        self.tokens.push(TokenRecord {
            offset,
            depth: self.depth - 1,
            opcode: op,
        });
        self.out.push(byte);

        match op {
            Opcode::LocalVariable
            | Opcode::InstanceVariable
            | Opcode::DefaultVariable
            | Opcode::NativeParm
            | Opcode::ObjectConst => self.object(op)?,
            Opcode::Return => {
                if self.version >= RETURN_VALUE_VERSION {
                    self.decode_token()?;
                }
            }
            Opcode::Switch => {
                self.copy_u8(op)?;
                self.decode_token()?;
            }
            Opcode::Jump => {
                self.copy_u16(op)?;
            }
            Opcode::JumpIfNot | Opcode::Assert | Opcode::Skip => {
                self.copy_u16(op)?;
                self.decode_token()?;
            }
            Opcode::Case => {
                if self.copy_u16(op)? != 0xffff {
                    self.decode_token()?;
                }
            }
            Opcode::LabelTable => loop {
                let name = self.name(op)?;
                self.copy_u32(op)?;
                if self.source.is_none_name(name) {
                    self.none_name = Some(name);
                    break;
                }
            },
            Opcode::GotoLabel | Opcode::EatString | Opcode::BoolVariable | Opcode::Conversion(_) => {
                self.decode_token()?;
            }
            Opcode::Let | Opcode::DynArrayElement | Opcode::ArrayElement => {
                self.decode_token()?;
                self.decode_token()?;
            }
            Opcode::New => {
                for _ in 0..4 {
                    self.decode_token()?;
                }
            }
            Opcode::ClassContext | Opcode::Context => {
                self.decode_token()?;
                self.copy_u16(op)?;
                self.copy_u8(op)?;
                self.decode_token()?;
            }
            Opcode::MetaCast | Opcode::DynamicCast | Opcode::StructMember => {
                self.object(op)?;
                self.decode_token()?;
            }
            Opcode::LetBool => {
                if self.version >= LET_BOOL_VERSION {
                    self.decode_token()?;
                } else {
                    self.object(op)?;
                }
                self.decode_token()?;
            }
            Opcode::VirtualFunction | Opcode::GlobalFunction => {
                self.name(op)?;
                self.parameters()?;
            }
            Opcode::FinalFunction => {
                self.object(op)?;
                self.parameters()?;
            }
            Opcode::IntConst | Opcode::FloatConst => {
                self.copy_u32(op)?;
            }
            Opcode::RotationConst | Opcode::VectorConst => {
                for _ in 0..3 {
                    self.copy_u32(op)?;
                }
            }
            Opcode::ByteConst | Opcode::IntConstByte => {
                self.copy_u8(op)?;
            }
            Opcode::StringConst => {
                let bytes = self.operand(op, S::read_bytes_z)?;
                self.out.extend_from_slice(&bytes);
                self.out.push(0);
            }
            Opcode::UnicodeStringConst => {
                let units = self.operand(op, S::read_units_z)?;
                for unit in units.into_iter().chain([0]) {
                    self.out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            Opcode::NameConst => {
                self.name(op)?;
            }
            Opcode::Iterator => {
                self.decode_token()?;
                self.copy_u16(op)?;
            }
            Opcode::StructCmpEq | Opcode::StructCmpNe => {
                self.object(op)?;
                self.decode_token()?;
                self.decode_token()?;
            }
            Opcode::ExtendedNative(_) => {
                self.copy_u8(op)?;
                self.parameters()?;
            }
            Opcode::Native(_) => self.parameters()?,
            Opcode::Stop
            | Opcode::Nothing
            | Opcode::EndFunctionParms
            | Opcode::SelfRef
            | Opcode::IntZero
            | Opcode::IntOne
            | Opcode::True
            | Opcode::False
            | Opcode::NoObject
            | Opcode::IteratorPop
            | Opcode::IteratorNext => {}
        }
        Ok(op)
    }

    /// Argument expressions up to and including `EndFunctionParms`.
    fn parameters(&mut self) -> Result<()> {
        while self.decode_token()? != Opcode::EndFunctionParms {}
        Ok(())
    }

    fn operand<T>(
        &mut self,
        op: Opcode,
        read: impl FnOnce(&mut S) -> std::result::Result<T, StreamError>,
    ) -> Result<T> {
        let offset = self.out.len();
        read(&mut *self.source).map_err(|source| BytecodeError::Operand {
            opcode: op.name(),
            offset,
            source,
        })
    }

    fn copy_u8(&mut self, op: Opcode) -> Result<u8> {
        let value = self.operand(op, S::read_u8)?;
        self.out.push(value);
        Ok(value)
    }

    fn copy_u16(&mut self, op: Opcode) -> Result<u16> {
        let value = self.operand(op, S::read_u16)?;
        self.out.extend_from_slice(&value.to_le_bytes());
        Ok(value)
    }

    fn copy_u32(&mut self, op: Opcode) -> Result<u32> {
        let value = self.operand(op, S::read_u32)?;
        self.out.extend_from_slice(&value.to_le_bytes());
        Ok(value)
    }

    fn object(&mut self, op: Opcode) -> Result<()> {
        let reference = self.operand(op, S::read_object)?;
        self.out.extend_from_slice(&reference.to_le_bytes());
        Ok(())
    }

    fn name(&mut self, op: Opcode) -> Result<u32> {
        let name = self.operand(op, S::read_name)?;
        self.out.extend_from_slice(&name.to_le_bytes());
        Ok(name)
    }
}
