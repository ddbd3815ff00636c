use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Built-in scalar kinds. Signedness is part of the kind.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    Char,
    Uchar,
    Short,
    Ushort,
    Int,
    Uint,
    Long,
    Ulong,
    Cent,
    Ucent,
    Half,
    Bhalf,
    Float,
    Double,
    Real,
}

impl ScalarKind {
    pub fn bits(self) -> u64 {
        use ScalarKind::*;
        match self {
            Bool => 1,
            Char | Uchar => 8,
            Short | Ushort | Half | Bhalf => 16,
            Int | Uint | Float => 32,
            Long | Ulong | Double => 64,
            Cent | Ucent | Real => 128,
        }
    }

    /// Storage size in bytes; `bool` occupies a full byte.
    pub fn bytes(self) -> u64 {
        self.bits().div_ceil(8)
    }

    pub fn align(self) -> u64 {
        self.bytes()
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            ScalarKind::Half
                | ScalarKind::Bhalf
                | ScalarKind::Float
                | ScalarKind::Double
                | ScalarKind::Real
        )
    }

    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    pub fn is_unsigned(self) -> bool {
        use ScalarKind::*;
        matches!(self, Bool | Uchar | Ushort | Uint | Ulong | Ucent)
    }

    pub fn is_signed(self) -> bool {
        self.is_integer() && !self.is_unsigned()
    }

    /// Mangling code: `i` for int, `ui` for uint, `hf` for half ...
    pub fn code(self) -> &'static str {
        use ScalarKind::*;
        match self {
            Bool => "b",
            Char => "c",
            Uchar => "uc",
            Short => "h",
            Ushort => "uh",
            Int => "i",
            Uint => "ui",
            Long => "l",
            Ulong => "ul",
            Cent => "t",
            Ucent => "ut",
            Half => "hf",
            Bhalf => "bf",
            Float => "f",
            Double => "d",
            Real => "r",
        }
    }

    /// Smallest signed integer kind holding `bits`.
    pub fn int_for_bits(bits: u64) -> Option<ScalarKind> {
        match bits {
            0..=8 => Some(ScalarKind::Char),
            9..=16 => Some(ScalarKind::Short),
            17..=32 => Some(ScalarKind::Int),
            33..=64 => Some(ScalarKind::Long),
            65..=128 => Some(ScalarKind::Cent),
            _ => None,
        }
    }

    /// Integer-literal typing: `int` when it fits, `long` otherwise.
    pub fn for_int_literal(value: i128) -> ScalarKind {
        if i32::try_from(value).is_ok() {
            ScalarKind::Int
        } else if i64::try_from(value).is_ok() {
            ScalarKind::Long
        } else {
            ScalarKind::Cent
        }
    }
}
