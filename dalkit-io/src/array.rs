//! Multi-dimensional arrays.
//!
//! Contents are kept dense and row-major. An array created with chunk
//! dimensions is extensible along every axis: [`Array::extend`] grows it
//! explicitly and writes past the current shape grow it implicitly.

use crate::dataset::Handle;
use crate::Result;
use dalkit_core::region::{self, Region};
use dalkit_core::{AttributeStore, Buffer, Element, ElementType, Error};
use log::debug;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ArrayData {
    pub(crate) attributes: AttributeStore,
    pub(crate) element_type: ElementType,
    pub(crate) dims: Vec<usize>,
    pub(crate) chunk: Option<Vec<usize>>,
    pub(crate) data: Buffer,
}

impl ArrayData {
    pub(crate) fn new(
        dims: &[usize],
        element_type: ElementType,
        chunk: Option<&[usize]>,
    ) -> dalkit_core::Result<Self> {
        check_shape(dims, chunk)?;
        let len = region::volume(dims)
            .ok_or_else(|| Error::InvalidShape(format!("element count of {dims:?} overflows")))?;
        Ok(Self {
            attributes: AttributeStore::new(),
            element_type,
            dims: dims.to_vec(),
            chunk: chunk.map(<[usize]>::to_vec),
            data: Buffer::try_zeros(element_type, len)?,
        })
    }

    /// Rebuilds an array from stored parts, checking the data length.
    pub(crate) fn from_parts(
        dims: Vec<usize>,
        element_type: ElementType,
        chunk: Option<Vec<usize>>,
        data: Buffer,
    ) -> dalkit_core::Result<Self> {
        check_shape(&dims, chunk.as_deref())?;
        if data.element_type() != element_type {
            return Err(Error::TypeMismatch {
                name: "array".to_string(),
                expected: element_type,
                found: data.element_type(),
            });
        }
        if region::volume(&dims) != Some(data.len()) {
            return Err(Error::ShapeMismatch {
                expected: region::volume(&dims).unwrap_or(usize::MAX),
                found: data.len(),
            });
        }
        Ok(Self {
            attributes: AttributeStore::new(),
            element_type,
            dims,
            chunk,
            data,
        })
    }

    pub(crate) fn is_extensible(&self) -> bool {
        self.chunk.is_some()
    }

    pub(crate) fn extend(&mut self, new_dims: &[usize]) -> dalkit_core::Result<()> {
        if !self.is_extensible() {
            return Err(Error::NotExtensible(
                "array was created without chunk dimensions".to_string(),
            ));
        }
        if new_dims.len() != self.dims.len() {
            return Err(Error::NotExtensible(format!(
                "cannot change rank from {} to {}",
                self.dims.len(),
                new_dims.len()
            )));
        }
        if new_dims.iter().zip(&self.dims).any(|(n, d)| n < d) {
            return Err(Error::NotExtensible(format!(
                "cannot shrink {:?} to {new_dims:?}",
                self.dims
            )));
        }
        self.data = region::grow(&self.data, &self.dims, new_dims)?;
        self.dims = new_dims.to_vec();
        Ok(())
    }

    pub(crate) fn write(&mut self, region: &Region, values: &Buffer) -> dalkit_core::Result<()> {
        let values = values.cast(self.element_type).ok_or(Error::TypeMismatch {
            name: "array".to_string(),
            expected: self.element_type,
            found: values.element_type(),
        })?;
        let volume = region
            .volume()
            .ok_or_else(|| Error::OutOfBounds(format!("extent {:?} overflows", region.extent)))?;
        if values.len() != volume {
            return Err(Error::ShapeMismatch {
                expected: volume,
                found: values.len(),
            });
        }
        if self.is_extensible() && region.rank() == self.dims.len() && !region.fits(&self.dims) {
            let end = region
                .end()
                .ok_or_else(|| Error::OutOfBounds(format!("region {region:?} overflows")))?;
            let grown: Vec<usize> = self.dims.iter().zip(&end).map(|(d, e)| *d.max(e)).collect();
            debug!("Growing array from {:?} to {grown:?}", self.dims);
            self.extend(&grown)?;
        }
        region::write_region(&mut self.data, &self.dims, region, &values)
    }

    pub(crate) fn read(&self, region: &Region) -> dalkit_core::Result<Buffer> {
        region::read_region(&self.data, &self.dims, region)
    }

    pub(crate) fn chunk_regions(&self) -> Vec<Region> {
        match &self.chunk {
            Some(chunk) => region::chunk_regions(&self.dims, chunk),
            None => vec![Region::full(&self.dims)],
        }
    }
}

fn check_shape(dims: &[usize], chunk: Option<&[usize]>) -> dalkit_core::Result<()> {
    if dims.is_empty() || dims.contains(&0) {
        return Err(Error::InvalidShape(format!(
            "array dims {dims:?} must have rank >= 1 and positive sizes"
        )));
    }
    if let Some(chunk) = chunk {
        if chunk.len() != dims.len() {
            return Err(Error::ShapeMismatch {
                expected: dims.len(),
                found: chunk.len(),
            });
        }
        if chunk.contains(&0) {
            return Err(Error::InvalidShape(format!(
                "chunk dims {chunk:?} must be positive"
            )));
        }
    }
    Ok(())
}

/// Handle to an array node.
pub struct Array {
    handle: Handle,
}

impl Array {
    pub(crate) fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    fn read<R>(&self, f: impl FnOnce(&ArrayData) -> dalkit_core::Result<R>) -> Result<R> {
        let path = self.handle.segments();
        self.handle.read(|node, _| f(node.as_array(path)?))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    #[must_use]
    pub fn path(&self) -> String {
        self.handle.path()
    }

    /// # Errors
    /// Returns `Closed` after close.
    pub fn element_type(&self) -> Result<ElementType> {
        self.read(|a| Ok(a.element_type))
    }

    /// Current dimension sizes.
    ///
    /// # Errors
    /// Returns `Closed` after close.
    pub fn dims(&self) -> Result<Vec<usize>> {
        self.read(|a| Ok(a.dims.clone()))
    }

    /// # Errors
    /// Returns `Closed` after close.
    pub fn rank(&self) -> Result<usize> {
        self.read(|a| Ok(a.dims.len()))
    }

    /// # Errors
    /// Returns `Closed` after close.
    pub fn chunk_dims(&self) -> Result<Option<Vec<usize>>> {
        self.read(|a| Ok(a.chunk.clone()))
    }

    /// # Errors
    /// Returns `Closed` after close.
    pub fn is_extensible(&self) -> Result<bool> {
        self.read(|a| Ok(a.is_extensible()))
    }

    /// Writes `values` into `region`, converting numeric types to the
    /// array's element type. An extensible array grows to cover the region.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the value count differs from the region
    /// volume, `OutOfBounds` if a fixed array does not contain the region
    /// and `TypeMismatch` for string/numeric mixes.
    pub fn write(&self, region: &Region, values: impl Into<Buffer>) -> Result<()> {
        let values = values.into();
        let path = self.handle.segments();
        self.handle
            .write(|node, _| node.as_array_mut(path)?.write(region, &values))
    }

    /// Overwrites the whole array.
    ///
    /// # Errors
    /// See [`Array::write`].
    pub fn write_all(&self, values: impl Into<Buffer>) -> Result<()> {
        let region = Region::full(&self.dims()?);
        self.write(&region, values)
    }

    /// Grows the array to `new_dims`; new cells are zero.
    ///
    /// # Errors
    /// Returns `NotExtensible` for arrays without chunk dimensions, a rank
    /// change or any shrinking dimension.
    pub fn extend(&self, new_dims: &[usize]) -> Result<()> {
        let path = self.handle.segments();
        self.handle
            .write(|node, _| node.as_array_mut(path)?.extend(new_dims))
    }

    /// Reads every element, row-major.
    ///
    /// # Errors
    /// Returns `Closed` after close.
    pub fn read_all(&self) -> Result<Buffer> {
        self.read(|a| Ok(a.data.clone()))
    }

    /// Reads a region, row-major.
    ///
    /// # Errors
    /// Returns `OutOfBounds` if the region leaves the current dims.
    pub fn read_region(&self, region: &Region) -> Result<Buffer> {
        self.read(|a| a.read(region))
    }

    /// Reads every element converted to `T`.
    ///
    /// # Errors
    /// Returns `TypeMismatch` for string/numeric mixes.
    pub fn read_all_as<T: Element>(&self) -> Result<Vec<T>> {
        self.read(|a| convert(a.data.clone(), a.element_type))
    }

    /// Reads a region converted to `T`.
    ///
    /// # Errors
    /// Returns `OutOfBounds` or `TypeMismatch`.
    pub fn read_region_as<T: Element>(&self, region: &Region) -> Result<Vec<T>> {
        self.read(|a| convert(a.read(region)?, a.element_type))
    }

    /// Regions of the chunk grid in row-major chunk order, clipped to the
    /// current dims. An unchunked array is a single region.
    ///
    /// # Errors
    /// Returns `Closed` after close.
    pub fn chunk_regions(&self) -> Result<Vec<Region>> {
        self.read(|a| Ok(a.chunk_regions()))
    }

    /// Reads the chunk at grid position `index`.
    ///
    /// # Errors
    /// Returns `OutOfBounds` if the position lies outside the chunk grid.
    pub fn read_chunk(&self, index: &[usize]) -> Result<Buffer> {
        self.read(|a| {
            let chunk = a.chunk.clone().unwrap_or_else(|| a.dims.clone());
            let region = region::chunk_region(&a.dims, &chunk, index).ok_or_else(|| {
                Error::OutOfBounds(format!("chunk {index:?} outside grid of {:?}", a.dims))
            })?;
            a.read(&region)
        })
    }

    /// Flushes the dataset and releases this handle.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn close(&self) -> Result<()> {
        self.handle.close()
    }
}

fn convert<T: Element>(data: Buffer, from: ElementType) -> dalkit_core::Result<Vec<T>> {
    data.cast_into(T::TYPE)
        .and_then(Buffer::into_vec::<T>)
        .ok_or(Error::TypeMismatch {
            name: "array".to_string(),
            expected: T::TYPE,
            found: from,
        })
}

impl std::fmt::Debug for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Array").field("path", &self.path()).finish()
    }
}
