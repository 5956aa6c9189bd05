//! The contract shared by every index variant.

use super::results::SearchResults;
use crate::distance::DistanceMetric;
use crate::{Result, VecError};

/// Unified trait for all index implementations.
///
/// Vectors are passed as flat row-major slices whose length must be a multiple
/// of [`Index::dimension`]. Labels are sequential insertion positions unless the
/// variant supports [`Index::add_with_ids`].
///
/// Not every variant supports every operation. The optional methods default to
/// failing with [`VecError::UnsupportedOperation`], so a caller can probe a
/// capability by calling it.
pub trait Index {
    /// Vector dimension accepted by `add` and `search`.
    fn dimension(&self) -> usize;

    /// Number of indexed vectors.
    fn ntotal(&self) -> usize;

    fn metric(&self) -> DistanceMetric;

    /// Variant name used in stats and error messages.
    fn name(&self) -> &'static str;

    /// Whether `add` can be called yet.
    fn is_trained(&self) -> bool {
        true
    }

    /// Fit whatever model the variant needs. No-op for variants without one.
    fn train(&mut self, _vectors: &[f32]) -> Result<()> {
        Ok(())
    }

    /// Append vectors; labels are assigned sequentially from `ntotal()`.
    fn add(&mut self, vectors: &[f32]) -> Result<()>;

    /// Append vectors under caller-chosen labels.
    fn add_with_ids(&mut self, _vectors: &[f32], _ids: &[i64]) -> Result<()> {
        Err(VecError::unsupported("add_with_ids", self.name()))
    }

    /// `k` nearest neighbors of every query.
    fn search(&self, queries: &[f32], k: usize) -> Result<SearchResults>;

    /// The stored (or decoded) vector for label `id`.
    fn reconstruct(&self, _id: usize) -> Result<Vec<f32>> {
        Err(VecError::unsupported("reconstruct", self.name()))
    }

    /// Drop all indexed vectors. Trained state is kept.
    fn reset(&mut self);

    /// Approximate heap footprint of the indexed data in bytes.
    fn size_bytes(&self) -> usize;

    fn stats(&self) -> IndexStats {
        IndexStats {
            ntotal: self.ntotal(),
            dimension: self.dimension(),
            size_bytes: self.size_bytes(),
            algorithm: self.name().to_string(),
        }
    }
}

/// Statistics about an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub ntotal: usize,
    pub dimension: usize,
    pub size_bytes: usize,
    pub algorithm: String,
}

/// Check an id slice against the number of vectors it labels.
pub(crate) fn check_ids(ids: &[i64], n: usize) -> Result<()> {
    if ids.len() != n {
        return Err(VecError::InvalidParameter(format!(
            "got {} ids for {n} vectors",
            ids.len()
        )));
    }
    if ids.iter().any(|&id| id < 0) {
        return Err(VecError::InvalidParameter(
            "ids must be non-negative".to_string(),
        ));
    }
    Ok(())
}
