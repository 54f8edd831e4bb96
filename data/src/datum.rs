//! Element types of tensors, as every supported framework spells them.
use byteorder::{ByteOrder, LittleEndian};
use half::f16;
use serde::{Deserialize, Serialize};
use std::{fmt, ops};

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Blob(pub Vec<u8>);

impl ops::Deref for Blob {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Blob {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match std::str::from_utf8(self) {
            Ok(s) => write!(fmt, "{s:?}"),
            Err(_) => write!(fmt, "Blob of {} bytes", self.len()),
        }
    }
}

impl From<&str> for Blob {
    fn from(s: &str) -> Blob {
        Blob(s.as_bytes().to_vec())
    }
}

impl std::str::FromStr for Blob {
    type Err = ();
    fn from_str(s: &str) -> Result<Blob, ()> {
        Ok(Blob(s.as_bytes().to_vec()))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum DatumType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I4,
    I8,
    I16,
    I32,
    I64,
    F16,
    BF16,
    F32,
    F64,
    C64,
    C128,
    String,
    Resource,
    Variant,
}

impl DatumType {
    /// Plain fixed-size values with a byte-aligned little-endian encoding.
    pub fn is_copy(&self) -> bool {
        self.size_of().is_some()
    }

    /// Size in bytes of one element, if elements have a fixed byte size.
    #[inline]
    pub fn size_of(&self) -> Option<usize> {
        use DatumType::*;
        match self {
            Bool | U8 | I8 => Some(1),
            U16 | I16 | F16 | BF16 => Some(2),
            U32 | I32 | F32 => Some(4),
            U64 | I64 | F64 | C64 => Some(8),
            C128 => Some(16),
            I4 | String | Resource | Variant => None,
        }
    }

    /// Canonical lowercase name, used for display.
    pub fn name(&self) -> &'static str {
        use DatumType::*;
        match self {
            Bool => "boolean",
            U8 => "uint8",
            U16 => "uint16",
            U32 => "uint32",
            U64 => "uint64",
            I4 => "int4",
            I8 => "int8",
            I16 => "int16",
            I32 => "int32",
            I64 => "int64",
            F16 => "float16",
            BF16 => "bfloat16",
            F32 => "float32",
            F64 => "float64",
            C64 => "complex64",
            C128 => "complex128",
            String => "string",
            Resource => "resource",
            Variant => "variant",
        }
    }

    /// Parses the names and abbreviations frameworks use for element types.
    ///
    /// Matching is case-insensitive: `FP32`, `f32` and `float32` all map to `F32`.
    pub fn from_name(s: &str) -> Option<DatumType> {
        use DatumType::*;
        let dt = match s.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Bool,
            "u8" | "uint8" => U8,
            "u16" | "uint16" => U16,
            "u32" | "uint32" => U32,
            "u64" | "uint64" => U64,
            "i4" | "int4" => I4,
            "i8" | "int8" => I8,
            "i16" | "int16" => I16,
            "i32" | "int32" => I32,
            "i64" | "int64" => I64,
            "f16" | "fp16" | "float16" | "half" => F16,
            "bf16" | "bfloat16" => BF16,
            "f32" | "fp32" | "float32" | "float" => F32,
            "f64" | "fp64" | "float64" | "double" => F64,
            "c64" | "complex64" => C64,
            "c128" | "complex128" => C128,
            "string" | "str" => String,
            "resource" => Resource,
            "variant" => Variant,
            _ => return None,
        };
        Some(dt)
    }
}

impl fmt::Display for DatumType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DatumType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatumType::from_name(s).ok_or(())
    }
}

/// A rust type that can be decoded from little-endian tensor storage.
pub trait Datum: Copy + Send + Sync + fmt::Debug + fmt::Display + PartialEq + 'static {
    fn datum_type() -> DatumType;
    /// Reads one value. `bytes` holds exactly `datum_type().size_of()` bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! datum {
    ($t:ty, $v:ident, $read:expr) => {
        impl Datum for $t {
            fn datum_type() -> DatumType {
                DatumType::$v
            }

            fn read_le(bytes: &[u8]) -> Self {
                $read(bytes)
            }
        }
    };
}

datum!(bool, Bool, |b: &[u8]| b[0] != 0);
datum!(u8, U8, |b: &[u8]| b[0]);
datum!(u16, U16, LittleEndian::read_u16);
datum!(u32, U32, LittleEndian::read_u32);
datum!(u64, U64, LittleEndian::read_u64);
datum!(i8, I8, |b: &[u8]| b[0] as i8);
datum!(i16, I16, LittleEndian::read_i16);
datum!(i32, I32, LittleEndian::read_i32);
datum!(i64, I64, LittleEndian::read_i64);
datum!(f16, F16, |b: &[u8]| f16::from_bits(LittleEndian::read_u16(b)));
datum!(f32, F32, LittleEndian::read_f32);
datum!(f64, F64, LittleEndian::read_f64);
