//! Hyperslab regions and row-major region copies.

use crate::buffer::{map_vec, Buffer};
use crate::{Error, Result};
use ndarray::{ArrayViewD, ArrayViewMutD, IxDyn, Slice};

/// An offset and extent per dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    pub offset: Vec<usize>,
    pub extent: Vec<usize>,
}

impl Region {
    /// Creates a region.
    ///
    /// # Errors
    /// Returns `InvalidShape` if offset and extent have different ranks.
    pub fn new(offset: Vec<usize>, extent: Vec<usize>) -> Result<Self> {
        if offset.len() != extent.len() {
            return Err(Error::InvalidShape(format!(
                "region offset has rank {}, extent has rank {}",
                offset.len(),
                extent.len()
            )));
        }
        Ok(Self { offset, extent })
    }

    /// The region covering every element of `dims`.
    #[must_use]
    pub fn full(dims: &[usize]) -> Self {
        Self {
            offset: vec![0; dims.len()],
            extent: dims.to_vec(),
        }
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.extent.len()
    }

    /// Number of elements covered, `None` on overflow.
    #[must_use]
    pub fn volume(&self) -> Option<usize> {
        volume(&self.extent)
    }

    /// Exclusive end coordinate per dimension, `None` on overflow.
    #[must_use]
    pub fn end(&self) -> Option<Vec<usize>> {
        self.offset
            .iter()
            .zip(&self.extent)
            .map(|(o, e)| o.checked_add(*e))
            .collect()
    }

    /// Returns true if the region lies inside `dims`.
    #[must_use]
    pub fn fits(&self, dims: &[usize]) -> bool {
        self.rank() == dims.len()
            && self
                .end()
                .is_some_and(|end| end.iter().zip(dims).all(|(e, d)| e <= d))
    }
}

/// Product of `dims`, `None` on overflow.
#[must_use]
pub fn volume(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1_usize, |acc, &d| acc.checked_mul(d))
}

/// Regions of every chunk in row-major chunk order, clipped to `dims`.
#[must_use]
pub fn chunk_regions(dims: &[usize], chunk: &[usize]) -> Vec<Region> {
    let counts: Vec<usize> = dims
        .iter()
        .zip(chunk)
        .map(|(d, c)| d.div_ceil(*c))
        .collect();
    let total = volume(&counts).unwrap_or(0);
    let mut regions = Vec::with_capacity(total);
    let mut index = vec![0_usize; dims.len()];
    for _ in 0..total {
        if let Some(region) = chunk_region(dims, chunk, &index) {
            regions.push(region);
        }
        for axis in (0..index.len()).rev() {
            index[axis] += 1;
            if index[axis] < counts[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    regions
}

/// Region of the chunk at grid position `index`, clipped to `dims`.
///
/// Returns `None` if the position lies outside the chunk grid.
#[must_use]
pub fn chunk_region(dims: &[usize], chunk: &[usize], index: &[usize]) -> Option<Region> {
    if index.len() != dims.len() || chunk.len() != dims.len() {
        return None;
    }
    let mut offset = Vec::with_capacity(dims.len());
    let mut extent = Vec::with_capacity(dims.len());
    for ((&d, &c), &i) in dims.iter().zip(chunk).zip(index) {
        let start = i.checked_mul(c)?;
        if start >= d {
            return None;
        }
        offset.push(start);
        extent.push(c.min(d - start));
    }
    Some(Region { offset, extent })
}

/// Copies `region` out of `data`, laid out row-major with shape `dims`.
///
/// # Errors
/// Returns `OutOfBounds` if the region leaves `dims`, `ShapeMismatch` if
/// `data` does not match `dims`.
pub fn read_region(data: &Buffer, dims: &[usize], region: &Region) -> Result<Buffer> {
    check_fits(dims, region)?;
    Ok(map_vec!(data, v => read_typed(v, dims, region)?))
}

/// Overwrites `region` of `data` with `src`.
///
/// # Errors
/// Returns `OutOfBounds` if the region leaves `dims`, `ShapeMismatch` if
/// `src` does not hold exactly the region's volume, `TypeMismatch` if the
/// buffers differ in element type.
pub fn write_region(data: &mut Buffer, dims: &[usize], region: &Region, src: &Buffer) -> Result<()> {
    check_fits(dims, region)?;
    let expected = region.volume().ok_or_else(|| overflow(dims))?;
    if src.len() != expected {
        return Err(Error::ShapeMismatch {
            expected,
            found: src.len(),
        });
    }
    let expected_type = data.element_type();
    match (data, src) {
        (Buffer::Char(d), Buffer::Char(s)) => write_typed(d, dims, region, s),
        (Buffer::I8(d), Buffer::I8(s)) => write_typed(d, dims, region, s),
        (Buffer::I16(d), Buffer::I16(s)) => write_typed(d, dims, region, s),
        (Buffer::I32(d), Buffer::I32(s)) => write_typed(d, dims, region, s),
        (Buffer::I64(d), Buffer::I64(s)) => write_typed(d, dims, region, s),
        (Buffer::U8(d), Buffer::U8(s)) => write_typed(d, dims, region, s),
        (Buffer::U16(d), Buffer::U16(s)) => write_typed(d, dims, region, s),
        (Buffer::U32(d), Buffer::U32(s)) => write_typed(d, dims, region, s),
        (Buffer::U64(d), Buffer::U64(s)) => write_typed(d, dims, region, s),
        (Buffer::F32(d), Buffer::F32(s)) => write_typed(d, dims, region, s),
        (Buffer::F64(d), Buffer::F64(s)) => write_typed(d, dims, region, s),
        (Buffer::Str(d), Buffer::Str(s)) => write_typed(d, dims, region, s),
        (Buffer::ComplexI16(d), Buffer::ComplexI16(s)) => write_typed(d, dims, region, s),
        (Buffer::ComplexF32(d), Buffer::ComplexF32(s)) => write_typed(d, dims, region, s),
        (_, src) => Err(Error::TypeMismatch {
            name: "region".to_string(),
            expected: expected_type,
            found: src.element_type(),
        }),
    }
}

/// Re-lays `data` from `old_dims` into `new_dims`, padding new cells with
/// default values. Every entry of `new_dims` must be at least `old_dims`.
///
/// # Errors
/// Returns `InvalidShape` on rank change, shrink, overflow or when the grown
/// buffer cannot be allocated.
pub fn grow(data: &Buffer, old_dims: &[usize], new_dims: &[usize]) -> Result<Buffer> {
    if old_dims.len() != new_dims.len() || old_dims.iter().zip(new_dims).any(|(o, n)| n < o) {
        return Err(Error::InvalidShape(format!(
            "cannot grow {old_dims:?} to {new_dims:?}"
        )));
    }
    if old_dims == new_dims {
        return Ok(data.clone());
    }
    let len = volume(new_dims).ok_or_else(|| overflow(new_dims))?;
    let mut grown = Buffer::try_zeros(data.element_type(), len)?;
    write_region(&mut grown, new_dims, &Region::full(old_dims), data)?;
    Ok(grown)
}

fn check_fits(dims: &[usize], region: &Region) -> Result<()> {
    if region.rank() != dims.len() {
        return Err(Error::OutOfBounds(format!(
            "region has rank {}, array has rank {}",
            region.rank(),
            dims.len()
        )));
    }
    if !region.fits(dims) {
        return Err(Error::OutOfBounds(format!(
            "offset {:?} extent {:?} exceeds dims {:?}",
            region.offset, region.extent, dims
        )));
    }
    Ok(())
}

fn overflow(dims: &[usize]) -> Error {
    Error::InvalidShape(format!("element count of {dims:?} overflows"))
}

fn shape_error(dims: &[usize], len: usize) -> Error {
    Error::ShapeMismatch {
        expected: volume(dims).unwrap_or(usize::MAX),
        found: len,
    }
}

fn axis_slice(region: &Region, axis: usize) -> Slice {
    let start = region.offset[axis];
    Slice::from(start..start + region.extent[axis])
}

fn read_typed<T: Clone>(data: &[T], dims: &[usize], region: &Region) -> Result<Vec<T>> {
    let view = ArrayViewD::from_shape(IxDyn(dims), data).map_err(|_| shape_error(dims, data.len()))?;
    let selected = view.slice_each_axis(|ax| axis_slice(region, ax.axis.index()));
    Ok(selected.iter().cloned().collect())
}

fn write_typed<T: Clone>(data: &mut [T], dims: &[usize], region: &Region, src: &[T]) -> Result<()> {
    let len = data.len();
    let mut view = ArrayViewMutD::from_shape(IxDyn(dims), data).map_err(|_| shape_error(dims, len))?;
    let source = ArrayViewD::from_shape(IxDyn(&region.extent), src)
        .map_err(|_| shape_error(&region.extent, src.len()))?;
    view.slice_each_axis_mut(|ax| axis_slice(region, ax.axis.index()))
        .assign(&source);
    Ok(())
}
