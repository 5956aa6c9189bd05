//! Owned, contiguous, row-major storage for fixed-dimension vectors.
//!
//! All batch APIs in the crate take vectors as a flat `&[f32]` in this layout
//! (`n * d` floats, row `i` at `[i * d, (i + 1) * d)`), and [`VectorBuffer`] is
//! the owned form of it.

use serde::{Deserialize, Serialize};

use crate::{Result, VecError};

/// Number of `d`-dimensional rows in `data`.
///
/// Fails with [`VecError::DimensionMismatch`] if `data` does not hold a whole
/// number of rows.
pub fn num_rows(data: &[f32], dimension: usize) -> Result<usize> {
    if dimension == 0 {
        return Err(VecError::InvalidDimension(
            "dimension must be greater than 0".to_string(),
        ));
    }
    let rem = data.len() % dimension;
    if rem != 0 {
        return Err(VecError::DimensionMismatch {
            expected: dimension,
            actual: rem,
        });
    }
    Ok(data.len() / dimension)
}

/// Row `idx` of a flat row-major slice.
#[inline]
pub(crate) fn row(data: &[f32], dimension: usize, idx: usize) -> &[f32] {
    let start = idx * dimension;
    &data[start..start + dimension]
}

/// A growable set of `d`-dimensional vectors stored back to back.
///
/// The dimension is fixed at construction. Rows are only appended, or dropped
/// all at once with [`VectorBuffer::clear`]. The backing allocation is contiguous
/// and its address is stable until the next mutating call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorBuffer {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorBuffer {
    /// Create an empty buffer for `dimension`-dimensional vectors.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VecError::InvalidDimension(
                "dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    /// Take ownership of a flat row-major vector.
    pub fn from_vec(dimension: usize, data: Vec<f32>) -> Result<Self> {
        num_rows(&data, dimension)?;
        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append one or more vectors given as a flat row-major slice.
    ///
    /// Nothing is appended if the slice is not a whole number of rows.
    pub fn extend_from_slice(&mut self, vectors: &[f32]) -> Result<usize> {
        let n = num_rows(vectors, self.dimension)?;
        self.data.extend_from_slice(vectors);
        Ok(n)
    }

    /// Vector at `idx`, if present.
    pub fn get(&self, idx: usize) -> Option<&[f32]> {
        if idx < self.len() {
            Some(row(&self.data, self.dimension, idx))
        } else {
            None
        }
    }

    /// Iterate over rows.
    pub fn iter(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.dimension)
    }

    /// The whole store as one contiguous row-major slice.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Raw pointer to the first element, for zero-copy views.
    pub fn as_ptr(&self) -> *const f32 {
        self.data.as_ptr()
    }

    /// Remove all vectors, keeping the dimension.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

impl AsRef<[f32]> for VectorBuffer {
    fn as_ref(&self) -> &[f32] {
        &self.data
    }
}
