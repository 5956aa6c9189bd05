//! Flat scan over product-quantized codes.

use rayon::prelude::*;

use super::pq::ProductQuantizer;
use crate::ann::results::{SearchResults, TopK};
use crate::ann::traits::Index;
use crate::buffer::num_rows;
use crate::distance::DistanceMetric;
use crate::partitioning::ClusteringParams;
use crate::{Result, VecError};

/// Index storing one PQ code per vector, searched with ADC tables.
#[derive(Debug, Clone)]
pub struct PqIndex {
    pq: ProductQuantizer,
    metric: DistanceMetric,
    codes: Vec<u8>,
    ntotal: usize,
}

impl PqIndex {
    pub fn new(
        dimension: usize,
        num_codebooks: usize,
        nbits: usize,
        metric: DistanceMetric,
    ) -> Result<Self> {
        Ok(Self {
            pq: ProductQuantizer::new(dimension, num_codebooks, nbits)?,
            metric,
            codes: Vec::new(),
            ntotal: 0,
        })
    }

    /// Clustering parameters used when training the quantizer.
    #[must_use]
    pub fn with_params(mut self, params: ClusteringParams) -> Self {
        self.pq = self.pq.with_params(params);
        self
    }

    pub fn pq(&self) -> &ProductQuantizer {
        &self.pq
    }

    /// Stored codes, `ntotal * code_size` bytes.
    pub fn codes(&self) -> &[u8] {
        &self.codes
    }

    fn search_one(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>> {
        let table = self.pq.compute_distance_table(query, self.metric)?;
        let mut top = TopK::new(k, self.metric, self.ntotal);
        for (i, code) in self.codes.chunks_exact(self.pq.code_size()).enumerate() {
            top.push(i as i64, self.pq.table_distance(&table, code));
        }
        Ok(top.into_sorted())
    }
}

impl Index for PqIndex {
    fn dimension(&self) -> usize {
        self.pq.dimension()
    }

    fn ntotal(&self) -> usize {
        self.ntotal
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn name(&self) -> &'static str {
        "IndexPQ"
    }

    fn is_trained(&self) -> bool {
        self.pq.is_trained()
    }

    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        self.pq.train(vectors)
    }

    fn add(&mut self, vectors: &[f32]) -> Result<()> {
        let codes = self.pq.compute_codes(vectors)?;
        self.ntotal += codes.len() / self.pq.code_size();
        self.codes.extend_from_slice(&codes);
        Ok(())
    }

    fn search(&self, queries: &[f32], k: usize) -> Result<SearchResults> {
        num_rows(queries, self.dimension())?;
        let rows = queries
            .par_chunks_exact(self.dimension())
            .map(|q| self.search_one(q, k))
            .collect::<Result<Vec<_>>>()?;
        SearchResults::from_rows(k, rows, self.metric)
    }

    /// Decoded (approximate) vector.
    fn reconstruct(&self, id: usize) -> Result<Vec<f32>> {
        if id >= self.ntotal {
            return Err(VecError::OutOfRange {
                id,
                ntotal: self.ntotal,
            });
        }
        let cs = self.pq.code_size();
        self.pq.decode_code(&self.codes[id * cs..(id + 1) * cs])
    }

    fn reset(&mut self) {
        self.codes.clear();
        self.ntotal = 0;
    }

    fn size_bytes(&self) -> usize {
        self.codes.len() + self.pq.codebooks().len() * std::mem::size_of::<f32>()
    }
}
