//! Exhaustive (flat) index.
//!
//! Stores raw vectors and answers queries by computing the exact score against
//! every stored vector. It is the reference for recall measurements and the
//! coarse quantizer inside IVF indexes.
//!
//! Queries in a batch are searched in parallel; each query scans the store
//! sequentially, so results do not depend on the thread count.

use rayon::prelude::*;

use crate::ann::results::{SearchResults, TopK};
use crate::ann::traits::Index;
use crate::buffer::{num_rows, VectorBuffer};
use crate::distance::DistanceMetric;
use crate::{Result, VecError};

/// Exact search over raw vectors.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    metric: DistanceMetric,
    storage: VectorBuffer,
}

impl FlatIndex {
    pub fn new(dimension: usize, metric: DistanceMetric) -> Result<Self> {
        Ok(Self {
            metric,
            storage: VectorBuffer::new(dimension)?,
        })
    }

    /// Flat index under squared L2 distance.
    pub fn new_l2(dimension: usize) -> Result<Self> {
        Self::new(dimension, DistanceMetric::L2)
    }

    /// Flat index under inner product.
    pub fn new_ip(dimension: usize) -> Result<Self> {
        Self::new(dimension, DistanceMetric::InnerProduct)
    }

    /// All stored vectors, contiguous and row-major.
    ///
    /// The slice (and [`FlatIndex::as_ptr`]) stays valid until the next `add`
    /// or `reset`.
    pub fn vectors(&self) -> &[f32] {
        self.storage.as_slice()
    }

    pub fn as_ptr(&self) -> *const f32 {
        self.storage.as_ptr()
    }

    /// Score of `query` against every stored vector, in storage order.
    pub fn compute_distances(&self, query: &[f32]) -> Result<Vec<f32>> {
        self.check_query(query)?;
        Ok(self
            .storage
            .iter()
            .map(|v| self.metric.distance(query, v))
            .collect())
    }

    /// `count` consecutive stored vectors starting at `start`.
    pub fn reconstruct_n(&self, start: usize, count: usize) -> Result<Vec<f32>> {
        let end = start.saturating_add(count);
        if end > self.storage.len() {
            return Err(VecError::OutOfRange {
                id: end.saturating_sub(1),
                ntotal: self.storage.len(),
            });
        }
        let d = self.storage.dimension();
        Ok(self.storage.as_slice()[start * d..end * d].to_vec())
    }

    /// Best `k` hits for a single query, best first.
    pub(crate) fn search_one(&self, query: &[f32], k: usize) -> Vec<(i64, f32)> {
        let mut top = TopK::new(k, self.metric, self.storage.len());
        for (i, v) in self.storage.iter().enumerate() {
            top.push(i as i64, self.metric.distance(query, v));
        }
        top.into_sorted()
    }

    /// Position of the best stored vector for each input vector.
    pub(crate) fn assign(&self, vectors: &[f32]) -> Result<Vec<usize>> {
        num_rows(vectors, self.dimension())?;
        if self.storage.is_empty() {
            return Err(VecError::InvalidParameter(
                "cannot assign against an empty index".to_string(),
            ));
        }
        Ok(vectors
            .par_chunks_exact(self.dimension())
            .map(|v| self.search_one(v, 1).first().map_or(0, |&(l, _)| l as usize))
            .collect())
    }

    fn check_query(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.dimension() {
            return Err(VecError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        Ok(())
    }
}

impl Index for FlatIndex {
    fn dimension(&self) -> usize {
        self.storage.dimension()
    }

    fn ntotal(&self) -> usize {
        self.storage.len()
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn name(&self) -> &'static str {
        "IndexFlat"
    }

    fn add(&mut self, vectors: &[f32]) -> Result<()> {
        self.storage.extend_from_slice(vectors)?;
        Ok(())
    }

    fn search(&self, queries: &[f32], k: usize) -> Result<SearchResults> {
        num_rows(queries, self.dimension())?;
        let rows: Vec<Vec<(i64, f32)>> = queries
            .par_chunks_exact(self.dimension())
            .map(|q| self.search_one(q, k))
            .collect();
        SearchResults::from_rows(k, rows, self.metric)
    }

    fn reconstruct(&self, id: usize) -> Result<Vec<f32>> {
        self.storage
            .get(id)
            .map(<[f32]>::to_vec)
            .ok_or(VecError::OutOfRange {
                id,
                ntotal: self.storage.len(),
            })
    }

    fn reset(&mut self) {
        self.storage.clear();
    }

    fn size_bytes(&self) -> usize {
        self.storage.as_slice().len() * std::mem::size_of::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize, d: usize) -> Vec<f32> {
        (0..n * d).map(|i| (i / d) as f32 * 10.0 + (i % d) as f32).collect()
    }

    #[test]
    fn state_machine_add_reset() {
        let mut index = FlatIndex::new_l2(4).unwrap();
        assert_eq!(index.ntotal(), 0);
        index.add(&grid(3, 4)).unwrap();
        index.add(&grid(2, 4)).unwrap();
        assert_eq!(index.ntotal(), 5);
        index.reset();
        assert_eq!(index.ntotal(), 0);
        assert!(index.vectors().is_empty());
        index.add(&grid(1, 4)).unwrap();
        assert_eq!(index.ntotal(), 1);
    }

    #[test]
    fn search_finds_exact_match_first() {
        let data = grid(5, 4);
        let mut index = FlatIndex::new_l2(4).unwrap();
        index.add(&data).unwrap();

        let res = index.search(&data[8..12], 2).unwrap();
        assert_eq!(res.labels(), &[2, 1]);
        assert_eq!(res.distances()[0], 0.0);
        assert_eq!(res.distances()[1], 400.0);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let mut index = FlatIndex::new_l2(1).unwrap();
        index.add(&[1.0, -1.0, 1.0, -1.0]).unwrap();
        let res = index.search(&[0.0], 4).unwrap();
        assert_eq!(res.labels(), &[0, 1, 2, 3]);
    }

    #[test]
    fn inner_product_ranks_descending() {
        let mut index = FlatIndex::new_ip(2).unwrap();
        index.add(&[1.0, 0.0, 0.0, 1.0, 2.0, 2.0]).unwrap();
        let res = index.search(&[1.0, 0.5], 3).unwrap();
        assert_eq!(res.labels(), &[2, 0, 1]);
        assert_eq!(res.distances(), &[3.0, 1.0, 0.5]);
    }

    #[test]
    fn empty_index_returns_padding() {
        let index = FlatIndex::new_l2(3).unwrap();
        let res = index.search(&[0.0; 6], 2).unwrap();
        assert_eq!(res.nq(), 2);
        assert!(res.labels().iter().all(|&l| l == -1));
    }

    #[test]
    fn reconstruct_bounds() {
        let mut index = FlatIndex::new_l2(2).unwrap();
        index.add(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(index.reconstruct(1).unwrap(), vec![3.0, 4.0]);
        assert_eq!(
            index.reconstruct(2),
            Err(VecError::OutOfRange { id: 2, ntotal: 2 })
        );
        assert_eq!(index.reconstruct_n(0, 2).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(index.reconstruct_n(1, 2).is_err());
    }

    #[test]
    fn add_with_ids_is_unsupported() {
        let mut index = FlatIndex::new_l2(2).unwrap();
        let err = index.add_with_ids(&[0.0; 4], &[7, 8]).unwrap_err();
        assert!(matches!(err, VecError::UnsupportedOperation(_)));
        assert!(err.to_string().contains("add_with_ids not implemented"));
        assert_eq!(index.ntotal(), 0);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut index = FlatIndex::new_l2(3).unwrap();
        assert!(matches!(
            index.add(&[0.0; 4]),
            Err(VecError::DimensionMismatch { .. })
        ));
        assert!(index.search(&[0.0; 2], 1).is_err());
        assert!(index.compute_distances(&[0.0; 2]).is_err());
    }
}
