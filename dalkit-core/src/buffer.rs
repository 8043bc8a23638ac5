//! Typed homogeneous buffers.
//!
//! A [`Buffer`] is the unit of data exchanged with every node: attribute
//! values, table cells and columns, array contents and query results.
//!
//! # Numeric conversion
//!
//! [`Buffer::cast`] converts between numeric element types with one fixed
//! rule set, used for array writes and typed reads alike:
//!
//! | from \ to        | integer                     | float              |
//! |------------------|-----------------------------|--------------------|
//! | integer          | saturate at the target range| round to nearest   |
//! | float            | truncate toward zero, saturate, NaN → 0 | round to nearest, overflow → ±inf |
//!
//! `Char` converts like `U8`. Strings never convert to or from numbers.
//! Complex types convert only into each other, applying the same rules to
//! the real and imaginary parts; real and complex never mix.

use crate::types::{Char, Element, ElementType};
use crate::{Error, Result};
use num_complex::Complex;
use std::ops::Range;

/// A homogeneous vector of one element type.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    Char(Vec<Char>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Str(Vec<String>),
    ComplexI16(Vec<Complex<i16>>),
    ComplexF32(Vec<Complex<f32>>),
}

/// Evaluates `$body` with `$v` bound to the inner vector, whatever its type.
macro_rules! with_vec {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            Buffer::Char($v) => $body,
            Buffer::I8($v) => $body,
            Buffer::I16($v) => $body,
            Buffer::I32($v) => $body,
            Buffer::I64($v) => $body,
            Buffer::U8($v) => $body,
            Buffer::U16($v) => $body,
            Buffer::U32($v) => $body,
            Buffer::U64($v) => $body,
            Buffer::F32($v) => $body,
            Buffer::F64($v) => $body,
            Buffer::Str($v) => $body,
            Buffer::ComplexI16($v) => $body,
            Buffer::ComplexF32($v) => $body,
        }
    };
}

/// Like [`with_vec`], rewrapping the result in the same variant.
macro_rules! map_vec {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            Buffer::Char($v) => Buffer::Char($body),
            Buffer::I8($v) => Buffer::I8($body),
            Buffer::I16($v) => Buffer::I16($body),
            Buffer::I32($v) => Buffer::I32($body),
            Buffer::I64($v) => Buffer::I64($body),
            Buffer::U8($v) => Buffer::U8($body),
            Buffer::U16($v) => Buffer::U16($body),
            Buffer::U32($v) => Buffer::U32($body),
            Buffer::U64($v) => Buffer::U64($body),
            Buffer::F32($v) => Buffer::F32($body),
            Buffer::F64($v) => Buffer::F64($body),
            Buffer::Str($v) => Buffer::Str($body),
            Buffer::ComplexI16($v) => Buffer::ComplexI16($body),
            Buffer::ComplexF32($v) => Buffer::ComplexF32($body),
        }
    };
}

pub(crate) use map_vec;

impl Buffer {
    /// Creates an empty buffer of the given type.
    #[must_use]
    pub fn empty(ty: ElementType) -> Self {
        Self::with_capacity(ty, 0)
    }

    /// Creates an empty buffer with reserved capacity.
    #[must_use]
    pub fn with_capacity(ty: ElementType, capacity: usize) -> Self {
        match ty {
            ElementType::Char => Buffer::Char(Vec::with_capacity(capacity)),
            ElementType::I8 => Buffer::I8(Vec::with_capacity(capacity)),
            ElementType::I16 => Buffer::I16(Vec::with_capacity(capacity)),
            ElementType::I32 => Buffer::I32(Vec::with_capacity(capacity)),
            ElementType::I64 => Buffer::I64(Vec::with_capacity(capacity)),
            ElementType::U8 => Buffer::U8(Vec::with_capacity(capacity)),
            ElementType::U16 => Buffer::U16(Vec::with_capacity(capacity)),
            ElementType::U32 => Buffer::U32(Vec::with_capacity(capacity)),
            ElementType::U64 => Buffer::U64(Vec::with_capacity(capacity)),
            ElementType::F32 => Buffer::F32(Vec::with_capacity(capacity)),
            ElementType::F64 => Buffer::F64(Vec::with_capacity(capacity)),
            ElementType::Str => Buffer::Str(Vec::with_capacity(capacity)),
            ElementType::ComplexI16 => Buffer::ComplexI16(Vec::with_capacity(capacity)),
            ElementType::ComplexF32 => Buffer::ComplexF32(Vec::with_capacity(capacity)),
        }
    }

    /// Creates a buffer of `len` default values (zero, or empty strings).
    ///
    /// # Panics
    /// Panics if the allocation fails; see [`Buffer::try_zeros`].
    #[must_use]
    pub fn zeros(ty: ElementType, len: usize) -> Self {
        map_vec!(Self::empty(ty), v => {
            let mut v = v;
            v.resize(len, Default::default());
            v
        })
    }

    /// Fallible [`Buffer::zeros`] for caller-supplied sizes.
    ///
    /// # Errors
    /// Returns `InvalidShape` if `len` elements exceed the address space or
    /// cannot be allocated.
    pub fn try_zeros(ty: ElementType, len: usize) -> Result<Self> {
        let width = ty.size().unwrap_or(std::mem::size_of::<String>());
        let addressable = len
            .checked_mul(width)
            .is_some_and(|bytes| isize::try_from(bytes).is_ok());
        if !addressable {
            return Err(Error::InvalidShape(format!(
                "{len} {ty} elements exceed the address space"
            )));
        }
        Ok(map_vec!(Self::empty(ty), v => {
            let mut v = v;
            v.try_reserve_exact(len).map_err(|e| {
                Error::InvalidShape(format!("cannot allocate {len} {ty} elements: {e}"))
            })?;
            v.resize(len, Default::default());
            v
        }))
    }

    /// Wraps a vector of any [`Element`] type.
    #[must_use]
    pub fn from_vec<T: Element>(values: Vec<T>) -> Self {
        T::into_buffer(values)
    }

    /// Wraps a single value.
    #[must_use]
    pub fn scalar<T: Element>(value: T) -> Self {
        T::into_buffer(vec![value])
    }

    /// Element type of the contents.
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        match self {
            Buffer::Char(_) => ElementType::Char,
            Buffer::I8(_) => ElementType::I8,
            Buffer::I16(_) => ElementType::I16,
            Buffer::I32(_) => ElementType::I32,
            Buffer::I64(_) => ElementType::I64,
            Buffer::U8(_) => ElementType::U8,
            Buffer::U16(_) => ElementType::U16,
            Buffer::U32(_) => ElementType::U32,
            Buffer::U64(_) => ElementType::U64,
            Buffer::F32(_) => ElementType::F32,
            Buffer::F64(_) => ElementType::F64,
            Buffer::Str(_) => ElementType::Str,
            Buffer::ComplexI16(_) => ElementType::ComplexI16,
            Buffer::ComplexF32(_) => ElementType::ComplexF32,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        with_vec!(self, v => v.len())
    }

    /// Returns true if the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows the contents as `T`, if the buffer holds `T`.
    #[must_use]
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::as_slice(self)
    }

    /// Unwraps the contents as `T`, if the buffer holds `T`.
    #[must_use]
    pub fn into_vec<T: Element>(self) -> Option<Vec<T>> {
        T::from_buffer(self)
    }

    /// Copies a contiguous sub-range.
    ///
    /// # Panics
    /// Panics if `range` is out of bounds; callers validate ranges first.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Buffer {
        map_vec!(self, v => v[range.clone()].to_vec())
    }

    /// Copies the elements at `indices`, in the given order.
    ///
    /// # Panics
    /// Panics if an index is out of bounds.
    #[must_use]
    pub fn gather(&self, indices: &[usize]) -> Buffer {
        map_vec!(self, v => indices.iter().map(|&i| v[i].clone()).collect())
    }

    /// Copies `width` consecutive elements starting at every `row * width`.
    ///
    /// Used to pull multi-element cells out of a flat column.
    #[must_use]
    pub fn gather_blocks(&self, rows: &[usize], width: usize) -> Buffer {
        map_vec!(self, v => {
            let mut out = Vec::with_capacity(rows.len() * width);
            for &row in rows {
                out.extend_from_slice(&v[row * width..(row + 1) * width]);
            }
            out
        })
    }

    /// Appends another buffer of the same type.
    ///
    /// Returns false (and leaves `self` untouched) if the types differ.
    pub fn extend_from(&mut self, other: &Buffer) -> bool {
        match (self, other) {
            (Buffer::Char(a), Buffer::Char(b)) => a.extend_from_slice(b),
            (Buffer::I8(a), Buffer::I8(b)) => a.extend_from_slice(b),
            (Buffer::I16(a), Buffer::I16(b)) => a.extend_from_slice(b),
            (Buffer::I32(a), Buffer::I32(b)) => a.extend_from_slice(b),
            (Buffer::I64(a), Buffer::I64(b)) => a.extend_from_slice(b),
            (Buffer::U8(a), Buffer::U8(b)) => a.extend_from_slice(b),
            (Buffer::U16(a), Buffer::U16(b)) => a.extend_from_slice(b),
            (Buffer::U32(a), Buffer::U32(b)) => a.extend_from_slice(b),
            (Buffer::U64(a), Buffer::U64(b)) => a.extend_from_slice(b),
            (Buffer::F32(a), Buffer::F32(b)) => a.extend_from_slice(b),
            (Buffer::F64(a), Buffer::F64(b)) => a.extend_from_slice(b),
            (Buffer::Str(a), Buffer::Str(b)) => a.extend_from_slice(b),
            (Buffer::ComplexI16(a), Buffer::ComplexI16(b)) => a.extend_from_slice(b),
            (Buffer::ComplexF32(a), Buffer::ComplexF32(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }

    /// Truncates to `len` elements.
    pub fn truncate(&mut self, len: usize) {
        with_vec!(self, v => v.truncate(len));
    }

    /// Converts to another element type using the module-level rules.
    ///
    /// Returns `None` when either side is a string type, or exactly one side
    /// is complex, and the types differ. A cast to the buffer's own type is
    /// an exact copy.
    #[must_use]
    pub fn cast(&self, target: ElementType) -> Option<Buffer> {
        if self.element_type() == target {
            return Some(self.clone());
        }
        match (self.complex_parts(), target) {
            (Some((re, im)), ElementType::ComplexI16) => Some(Buffer::ComplexI16(zip_parts(
                from_nums(ElementType::I16, &re)?.into_vec()?,
                from_nums(ElementType::I16, &im)?.into_vec()?,
            ))),
            (Some((re, im)), ElementType::ComplexF32) => Some(Buffer::ComplexF32(zip_parts(
                from_nums(ElementType::F32, &re)?.into_vec()?,
                from_nums(ElementType::F32, &im)?.into_vec()?,
            ))),
            (Some(_), _) => None,
            (None, _) => from_nums(target, &self.to_nums()?),
        }
    }

    /// Consuming variant of [`Buffer::cast`] that avoids a copy for equal types.
    #[must_use]
    pub fn cast_into(self, target: ElementType) -> Option<Buffer> {
        if self.element_type() == target {
            Some(self)
        } else {
            self.cast(target)
        }
    }

    fn to_nums(&self) -> Option<Vec<Num>> {
        let nums = match self {
            Buffer::Char(v) => v.iter().map(|c| Num::Int(i128::from(c.0))).collect(),
            Buffer::I8(v) => ints(v),
            Buffer::I16(v) => ints(v),
            Buffer::I32(v) => ints(v),
            Buffer::I64(v) => ints(v),
            Buffer::U8(v) => ints(v),
            Buffer::U16(v) => ints(v),
            Buffer::U32(v) => ints(v),
            Buffer::U64(v) => ints(v),
            Buffer::F32(v) => v.iter().map(|&x| Num::Float(f64::from(x))).collect(),
            Buffer::F64(v) => v.iter().map(|&x| Num::Float(x)).collect(),
            Buffer::Str(_) | Buffer::ComplexI16(_) | Buffer::ComplexF32(_) => return None,
        };
        Some(nums)
    }

    /// Real and imaginary parts of a complex buffer.
    fn complex_parts(&self) -> Option<(Vec<Num>, Vec<Num>)> {
        let parts = match self {
            Buffer::ComplexI16(v) => v
                .iter()
                .map(|c| (Num::Int(i128::from(c.re)), Num::Int(i128::from(c.im))))
                .unzip(),
            Buffer::ComplexF32(v) => v
                .iter()
                .map(|c| (Num::Float(f64::from(c.re)), Num::Float(f64::from(c.im))))
                .unzip(),
            _ => return None,
        };
        Some(parts)
    }
}

fn zip_parts<T>(re: Vec<T>, im: Vec<T>) -> Vec<Complex<T>> {
    re.into_iter().zip(im).map(|(re, im)| Complex::new(re, im)).collect()
}

#[derive(Clone, Copy)]
enum Num {
    Int(i128),
    Float(f64),
}

fn ints<T: Copy + Into<i128>>(values: &[T]) -> Vec<Num> {
    values.iter().map(|&x| Num::Int(x.into())).collect()
}

macro_rules! saturate {
    ($t:ty, $n:expr) => {
        match $n {
            Num::Int(i) => i.clamp(i128::from(<$t>::MIN), i128::from(<$t>::MAX)) as $t,
            // `as` saturates and maps NaN to zero
            Num::Float(f) => f as $t,
        }
    };
}

macro_rules! round {
    ($t:ty, $n:expr) => {
        match $n {
            Num::Int(i) => i as $t,
            Num::Float(f) => f as $t,
        }
    };
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn from_nums(target: ElementType, nums: &[Num]) -> Option<Buffer> {
    let it = nums.iter().copied();
    let buffer = match target {
        ElementType::Char => Buffer::Char(it.map(|n| Char(saturate!(u8, n))).collect()),
        ElementType::I8 => Buffer::I8(it.map(|n| saturate!(i8, n)).collect()),
        ElementType::I16 => Buffer::I16(it.map(|n| saturate!(i16, n)).collect()),
        ElementType::I32 => Buffer::I32(it.map(|n| saturate!(i32, n)).collect()),
        ElementType::I64 => Buffer::I64(it.map(|n| saturate!(i64, n)).collect()),
        ElementType::U8 => Buffer::U8(it.map(|n| saturate!(u8, n)).collect()),
        ElementType::U16 => Buffer::U16(it.map(|n| saturate!(u16, n)).collect()),
        ElementType::U32 => Buffer::U32(it.map(|n| saturate!(u32, n)).collect()),
        ElementType::U64 => Buffer::U64(it.map(|n| saturate!(u64, n)).collect()),
        ElementType::F32 => Buffer::F32(it.map(|n| round!(f32, n)).collect()),
        ElementType::F64 => Buffer::F64(it.map(|n| round!(f64, n)).collect()),
        ElementType::Str | ElementType::ComplexI16 | ElementType::ComplexF32 => return None,
    };
    Some(buffer)
}

impl<T: Element> From<Vec<T>> for Buffer {
    fn from(values: Vec<T>) -> Self {
        T::into_buffer(values)
    }
}

impl From<&str> for Buffer {
    fn from(value: &str) -> Self {
        Buffer::Str(vec![value.to_string()])
    }
}

impl From<Vec<&str>> for Buffer {
    fn from(values: Vec<&str>) -> Self {
        Buffer::Str(values.into_iter().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_and_len() {
        let buffer = Buffer::zeros(ElementType::F32, 4);
        assert_eq!(buffer, Buffer::F32(vec![0.0; 4]));
        assert_eq!(buffer.len(), 4);

        let strings = Buffer::zeros(ElementType::Str, 2);
        assert_eq!(strings, Buffer::Str(vec![String::new(), String::new()]));
    }

    #[test]
    fn test_integer_narrowing_saturates() {
        let wide = Buffer::I32(vec![-1000, -5, 0, 100, 1000]);
        assert_eq!(
            wide.cast(ElementType::I8),
            Some(Buffer::I8(vec![-128, -5, 0, 100, 127]))
        );
        assert_eq!(
            wide.cast(ElementType::U8),
            Some(Buffer::U8(vec![0, 0, 0, 100, 255]))
        );
        assert_eq!(
            Buffer::U64(vec![u64::MAX]).cast(ElementType::I64),
            Some(Buffer::I64(vec![i64::MAX]))
        );
    }

    #[test]
    fn test_float_to_integer_truncates() {
        let floats = Buffer::F64(vec![1.9, -1.9, f64::NAN, 1e30, -1e30]);
        assert_eq!(
            floats.cast(ElementType::I16),
            Some(Buffer::I16(vec![1, -1, 0, i16::MAX, i16::MIN]))
        );
    }

    #[test]
    fn test_float_narrowing_rounds() {
        let floats = Buffer::F64(vec![0.1, 1e300]);
        let narrowed = floats.cast(ElementType::F32).unwrap();
        assert_eq!(narrowed, Buffer::F32(vec![0.1_f32, f32::INFINITY]));
    }

    #[test]
    fn test_same_type_cast_is_bit_exact() {
        let nan = f64::from_bits(0x7ff8_0000_0000_1234);
        let buffer = Buffer::F64(vec![nan]);
        let copy = buffer.cast(ElementType::F64).unwrap();
        let values = copy.as_slice::<f64>().unwrap();
        assert_eq!(values[0].to_bits(), nan.to_bits());
    }

    #[test]
    fn test_string_casts_rejected() {
        assert!(Buffer::from("x").cast(ElementType::I32).is_none());
        assert!(Buffer::I32(vec![1]).cast(ElementType::Str).is_none());
    }

    #[test]
    fn test_char_behaves_as_u8() {
        let chars = Buffer::Char(vec![Char(b'A')]);
        assert_eq!(chars.cast(ElementType::I32), Some(Buffer::I32(vec![65])));
        assert_eq!(
            Buffer::I32(vec![300]).cast(ElementType::Char),
            Some(Buffer::Char(vec![Char(255)]))
        );
    }

    #[test]
    fn test_complex_casts() {
        let wide = Buffer::ComplexF32(vec![Complex::new(1.9, -40_000.0), Complex::new(f32::NAN, 2.0)]);
        assert_eq!(
            wide.cast(ElementType::ComplexI16),
            Some(Buffer::ComplexI16(vec![Complex::new(1, i16::MIN), Complex::new(0, 2)]))
        );
        let ints = Buffer::ComplexI16(vec![Complex::new(-3, 7)]);
        assert_eq!(
            ints.cast(ElementType::ComplexF32),
            Some(Buffer::ComplexF32(vec![Complex::new(-3.0, 7.0)]))
        );
        // real and complex never mix
        assert!(ints.cast(ElementType::I16).is_none());
        assert!(Buffer::F32(vec![1.0]).cast(ElementType::ComplexF32).is_none());
        assert_eq!(
            Buffer::zeros(ElementType::ComplexI16, 2),
            Buffer::ComplexI16(vec![Complex::new(0, 0); 2])
        );
    }

    #[test]
    fn test_try_zeros_rejects_impossible_sizes() {
        assert!(matches!(
            Buffer::try_zeros(ElementType::I32, usize::MAX / 2),
            Err(Error::InvalidShape(_))
        ));
        assert!(matches!(
            Buffer::try_zeros(ElementType::Str, usize::MAX / 8),
            Err(Error::InvalidShape(_))
        ));
        assert_eq!(
            Buffer::try_zeros(ElementType::U16, 3).unwrap(),
            Buffer::U16(vec![0; 3])
        );
    }

    #[test]
    fn test_gather_and_extend() {
        let column = Buffer::I16(vec![10, 11, 20, 21, 30, 31]);
        assert_eq!(column.gather_blocks(&[0, 2], 2), Buffer::I16(vec![10, 11, 30, 31]));
        assert_eq!(column.gather(&[5, 0]), Buffer::I16(vec![31, 10]));

        let mut a = Buffer::U32(vec![1]);
        assert!(a.extend_from(&Buffer::U32(vec![2, 3])));
        assert!(!a.extend_from(&Buffer::I32(vec![4])));
        assert_eq!(a, Buffer::U32(vec![1, 2, 3]));
    }
}
