//! Element types and node kinds.

use crate::buffer::Buffer;
use num_complex::Complex;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Element type of an attribute, array or table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ElementType {
    /// Single byte character.
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    /// Variable-length UTF-8 string.
    Str,
    /// Complex number with 16-bit integer parts, as produced by correlators.
    #[cfg_attr(feature = "serde", serde(rename = "complex_int16"))]
    ComplexI16,
    /// Complex number with `f32` parts.
    #[cfg_attr(feature = "serde", serde(rename = "complex_float32"))]
    ComplexF32,
}

impl ElementType {
    /// Every element type, in tag order.
    pub const ALL: [ElementType; 14] = [
        ElementType::Char,
        ElementType::I8,
        ElementType::I16,
        ElementType::I32,
        ElementType::I64,
        ElementType::U8,
        ElementType::U16,
        ElementType::U32,
        ElementType::U64,
        ElementType::F32,
        ElementType::F64,
        ElementType::Str,
        ElementType::ComplexI16,
        ElementType::ComplexF32,
    ];

    /// Stable on-disk tag.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            ElementType::Char => 0,
            ElementType::I8 => 1,
            ElementType::I16 => 2,
            ElementType::I32 => 3,
            ElementType::I64 => 4,
            ElementType::U8 => 5,
            ElementType::U16 => 6,
            ElementType::U32 => 7,
            ElementType::U64 => 8,
            ElementType::F32 => 9,
            ElementType::F64 => 10,
            ElementType::Str => 11,
            ElementType::ComplexI16 => 12,
            ElementType::ComplexF32 => 13,
        }
    }

    /// Inverse of [`ElementType::tag`].
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(usize::from(tag)).copied()
    }

    /// Size of one element in bytes, `None` for variable-length strings.
    #[must_use]
    pub fn size(self) -> Option<usize> {
        match self {
            ElementType::Char | ElementType::I8 | ElementType::U8 => Some(1),
            ElementType::I16 | ElementType::U16 => Some(2),
            ElementType::I32 | ElementType::U32 | ElementType::F32 | ElementType::ComplexI16 => {
                Some(4)
            }
            ElementType::I64 | ElementType::U64 | ElementType::F64 | ElementType::ComplexF32 => {
                Some(8)
            }
            ElementType::Str => None,
        }
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        self != ElementType::Str
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, ElementType::F32 | ElementType::F64)
    }

    #[must_use]
    pub fn is_complex(self) -> bool {
        matches!(self, ElementType::ComplexI16 | ElementType::ComplexF32)
    }

    /// Lower-case type name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ElementType::Char => "char",
            ElementType::I8 => "int8",
            ElementType::I16 => "int16",
            ElementType::I32 => "int32",
            ElementType::I64 => "int64",
            ElementType::U8 => "uint8",
            ElementType::U16 => "uint16",
            ElementType::U32 => "uint32",
            ElementType::U64 => "uint64",
            ElementType::F32 => "float32",
            ElementType::F64 => "float64",
            ElementType::Str => "string",
            ElementType::ComplexI16 => "complex_int16",
            ElementType::ComplexF32 => "complex_float32",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of a node in the storage tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NodeKind {
    Group,
    Table,
    Array,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Group => "group",
            NodeKind::Table => "table",
            NodeKind::Array => "array",
        };
        f.write_str(name)
    }
}

/// A single byte character element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(transparent)]
pub struct Char(pub u8);

impl Char {
    #[must_use]
    pub fn as_char(self) -> char {
        char::from(self.0)
    }
}

impl From<u8> for Char {
    fn from(value: u8) -> Self {
        Char(value)
    }
}

/// Rust types that map onto exactly one [`ElementType`].
pub trait Element: Clone + Default + PartialEq + fmt::Debug + 'static {
    /// The element type this Rust type is stored as.
    const TYPE: ElementType;

    /// Wraps a vector into the matching buffer variant.
    fn into_buffer(values: Vec<Self>) -> Buffer;

    /// Borrows the buffer contents if the buffer holds this type.
    fn as_slice(buffer: &Buffer) -> Option<&[Self]>;

    /// Unwraps the buffer contents if the buffer holds this type.
    fn from_buffer(buffer: Buffer) -> Option<Vec<Self>>;
}

macro_rules! impl_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const TYPE: ElementType = ElementType::$variant;

            fn into_buffer(values: Vec<Self>) -> Buffer {
                Buffer::$variant(values)
            }

            fn as_slice(buffer: &Buffer) -> Option<&[Self]> {
                match buffer {
                    Buffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn from_buffer(buffer: Buffer) -> Option<Vec<Self>> {
                match buffer {
                    Buffer::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(Char, Char);
impl_element!(i8, I8);
impl_element!(i16, I16);
impl_element!(i32, I32);
impl_element!(i64, I64);
impl_element!(u8, U8);
impl_element!(u16, U16);
impl_element!(u32, U32);
impl_element!(u64, U64);
impl_element!(f32, F32);
impl_element!(f64, F64);
impl_element!(String, Str);
impl_element!(Complex<i16>, ComplexI16);
impl_element!(Complex<f32>, ComplexF32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for ty in ElementType::ALL {
            assert_eq!(ElementType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(ElementType::from_tag(200), None);
    }

    #[test]
    fn test_element_mapping() {
        let buffer = i32::into_buffer(vec![1, 2, 3]);
        assert_eq!(buffer.element_type(), ElementType::I32);
        assert_eq!(i32::as_slice(&buffer), Some(&[1, 2, 3][..]));
        assert!(f64::as_slice(&buffer).is_none());

        let visibilities = Complex::<f32>::into_buffer(vec![Complex::new(1.0, -1.0)]);
        assert_eq!(visibilities.element_type(), ElementType::ComplexF32);
        assert_eq!(ElementType::ComplexI16.size(), Some(4));
        assert!(ElementType::ComplexF32.is_complex());
    }

    #[test]
    fn test_char_display() {
        assert_eq!(Char(b'x').as_char(), 'x');
        assert_eq!(ElementType::Char.to_string(), "char");
        assert_eq!(NodeKind::Table.to_string(), "table");
    }
}
