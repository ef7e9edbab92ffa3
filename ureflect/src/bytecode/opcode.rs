//! Script opcode table.

use std::fmt;

use serde::Serialize;

pub const FIRST_CONVERSION: u8 = 0x39;
pub const FIRST_EXTENDED_NATIVE: u8 = 0x60;
pub const FIRST_NATIVE: u8 = 0x70;

/// Expression tokens of the compiled script format.
///
/// The range variants keep their raw byte: conversions (`0x39..0x60`),
/// extended natives whose index continues in a second byte (`0x60..0x70`)
/// and direct natives (`0x70..`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Opcode {
    LocalVariable,
    InstanceVariable,
    DefaultVariable,
    Return,
    Switch,
    Jump,
    JumpIfNot,
    Stop,
    Assert,
    Case,
    Nothing,
    LabelTable,
    GotoLabel,
    EatString,
    Let,
    DynArrayElement,
    New,
    ClassContext,
    MetaCast,
    LetBool,
    EndFunctionParms,
    SelfRef,
    Skip,
    Context,
    ArrayElement,
    VirtualFunction,
    FinalFunction,
    IntConst,
    FloatConst,
    StringConst,
    ObjectConst,
    NameConst,
    RotationConst,
    VectorConst,
    ByteConst,
    IntZero,
    IntOne,
    True,
    False,
    NativeParm,
    NoObject,
    IntConstByte,
    BoolVariable,
    DynamicCast,
    Iterator,
    IteratorPop,
    IteratorNext,
    StructCmpEq,
    StructCmpNe,
    UnicodeStringConst,
    StructMember,
    GlobalFunction,
    Conversion(u8),
    ExtendedNative(u8),
    Native(u8),
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Opcode::LocalVariable,
            0x01 => Opcode::InstanceVariable,
            0x02 => Opcode::DefaultVariable,
            0x04 => Opcode::Return,
            0x05 => Opcode::Switch,
            0x06 => Opcode::Jump,
            0x07 => Opcode::JumpIfNot,
            0x08 => Opcode::Stop,
            0x09 => Opcode::Assert,
            0x0a => Opcode::Case,
            0x0b => Opcode::Nothing,
            0x0c => Opcode::LabelTable,
            0x0d => Opcode::GotoLabel,
            0x0e => Opcode::EatString,
            0x0f => Opcode::Let,
            0x10 => Opcode::DynArrayElement,
            0x11 => Opcode::New,
            0x12 => Opcode::ClassContext,
            0x13 => Opcode::MetaCast,
            0x14 => Opcode::LetBool,
            0x16 => Opcode::EndFunctionParms,
            0x17 => Opcode::SelfRef,
            0x18 => Opcode::Skip,
            0x19 => Opcode::Context,
            0x1a => Opcode::ArrayElement,
            0x1b => Opcode::VirtualFunction,
            0x1c => Opcode::FinalFunction,
            0x1d => Opcode::IntConst,
            0x1e => Opcode::FloatConst,
            0x1f => Opcode::StringConst,
            0x20 => Opcode::ObjectConst,
            0x21 => Opcode::NameConst,
            0x22 => Opcode::RotationConst,
            0x23 => Opcode::VectorConst,
            0x24 => Opcode::ByteConst,
            0x25 => Opcode::IntZero,
            0x26 => Opcode::IntOne,
            0x27 => Opcode::True,
            0x28 => Opcode::False,
            0x29 => Opcode::NativeParm,
            0x2a => Opcode::NoObject,
            0x2c => Opcode::IntConstByte,
            0x2d => Opcode::BoolVariable,
            0x2e => Opcode::DynamicCast,
            0x2f => Opcode::Iterator,
            0x30 => Opcode::IteratorPop,
            0x31 => Opcode::IteratorNext,
            0x32 => Opcode::StructCmpEq,
            0x33 => Opcode::StructCmpNe,
            0x34 => Opcode::UnicodeStringConst,
            0x36 => Opcode::StructMember,
            0x38 => Opcode::GlobalFunction,
            FIRST_CONVERSION..FIRST_EXTENDED_NATIVE => Opcode::Conversion(byte),
            FIRST_EXTENDED_NATIVE..FIRST_NATIVE => Opcode::ExtendedNative(byte),
            FIRST_NATIVE.. => Opcode::Native(byte),
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::LocalVariable => "LocalVariable",
            Opcode::InstanceVariable => "InstanceVariable",
            Opcode::DefaultVariable => "DefaultVariable",
            Opcode::Return => "Return",
            Opcode::Switch => "Switch",
            Opcode::Jump => "Jump",
            Opcode::JumpIfNot => "JumpIfNot",
            Opcode::Stop => "Stop",
            Opcode::Assert => "Assert",
            Opcode::Case => "Case",
            Opcode::Nothing => "Nothing",
            Opcode::LabelTable => "LabelTable",
            Opcode::GotoLabel => "GotoLabel",
            Opcode::EatString => "EatString",
            Opcode::Let => "Let",
            Opcode::DynArrayElement => "DynArrayElement",
            Opcode::New => "New",
            Opcode::ClassContext => "ClassContext",
            Opcode::MetaCast => "MetaCast",
            Opcode::LetBool => "LetBool",
            Opcode::EndFunctionParms => "EndFunctionParms",
            Opcode::SelfRef => "Self",
            Opcode::Skip => "Skip",
            Opcode::Context => "Context",
            Opcode::ArrayElement => "ArrayElement",
            Opcode::VirtualFunction => "VirtualFunction",
            Opcode::FinalFunction => "FinalFunction",
            Opcode::IntConst => "IntConst",
            Opcode::FloatConst => "FloatConst",
            Opcode::StringConst => "StringConst",
            Opcode::ObjectConst => "ObjectConst",
            Opcode::NameConst => "NameConst",
            Opcode::RotationConst => "RotationConst",
            Opcode::VectorConst => "VectorConst",
            Opcode::ByteConst => "ByteConst",
            Opcode::IntZero => "IntZero",
            Opcode::IntOne => "IntOne",
            Opcode::True => "True",
            Opcode::False => "False",
            Opcode::NativeParm => "NativeParm",
            Opcode::NoObject => "NoObject",
            Opcode::IntConstByte => "IntConstByte",
            Opcode::BoolVariable => "BoolVariable",
            Opcode::DynamicCast => "DynamicCast",
            Opcode::Iterator => "Iterator",
            Opcode::IteratorPop => "IteratorPop",
            Opcode::IteratorNext => "IteratorNext",
            Opcode::StructCmpEq => "StructCmpEq",
            Opcode::StructCmpNe => "StructCmpNe",
            Opcode::UnicodeStringConst => "UnicodeStringConst",
            Opcode::StructMember => "StructMember",
            Opcode::GlobalFunction => "GlobalFunction",
            Opcode::Conversion(_) => "Conversion",
            Opcode::ExtendedNative(_) => "ExtendedNative",
            Opcode::Native(_) => "Native",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Conversion(byte) | Opcode::ExtendedNative(byte) | Opcode::Native(byte) => {
                write!(f, "{}({byte:#04x})", self.name())
            }
            _ => f.write_str(self.name()),
        }
    }
}
