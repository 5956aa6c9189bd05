//! Exact re-ranking on top of an approximate index.
//!
//! The base index proposes `k * k_factor` candidates per query; their exact
//! scores are then computed against a flat copy of the raw vectors and the best
//! `k` are kept. Compressed encodings gain most from this.

use rayon::prelude::*;
use tracing::debug;

use crate::ann::factory::AnyIndex;
use crate::ann::results::{SearchResults, TopK};
use crate::ann::traits::Index;
use crate::buffer::num_rows;
use crate::distance::DistanceMetric;
use crate::flat::FlatIndex;
use crate::{Result, VecError};

/// An index that re-scores the candidates of `base` with exact distances.
#[derive(Debug, Clone)]
pub struct RefineFlatIndex {
    base: Box<AnyIndex>,
    refine: FlatIndex,
    k_factor: f32,
}

impl RefineFlatIndex {
    /// Wrap `base`; raw vectors are kept under the same metric.
    pub fn new(base: AnyIndex) -> Result<Self> {
        let refine = FlatIndex::new(base.dimension(), base.metric())?;
        if base.ntotal() > 0 {
            return Err(VecError::InvalidParameter(
                "base index of a refine index must be empty".to_string(),
            ));
        }
        Ok(Self {
            base: Box::new(base),
            refine,
            k_factor: 1.0,
        })
    }

    /// Candidates fetched from the base index, as a multiple of `k`.
    pub fn with_k_factor(mut self, k_factor: f32) -> Result<Self> {
        if k_factor.is_nan() || k_factor < 1.0 {
            return Err(VecError::InvalidParameter(format!(
                "k_factor must be at least 1, got {k_factor}"
            )));
        }
        self.k_factor = k_factor;
        Ok(self)
    }

    pub fn k_factor(&self) -> f32 {
        self.k_factor
    }

    pub fn base(&self) -> &AnyIndex {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut AnyIndex {
        &mut self.base
    }

    fn candidates_per_query(&self, k: usize) -> usize {
        ((k as f32 * self.k_factor).ceil() as usize).max(k)
    }
}

impl Index for RefineFlatIndex {
    fn dimension(&self) -> usize {
        self.base.dimension()
    }

    fn ntotal(&self) -> usize {
        self.refine.ntotal()
    }

    fn metric(&self) -> DistanceMetric {
        self.base.metric()
    }

    fn name(&self) -> &'static str {
        "IndexRefineFlat"
    }

    fn is_trained(&self) -> bool {
        self.base.is_trained()
    }

    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        self.base.train(vectors)
    }

    fn add(&mut self, vectors: &[f32]) -> Result<()> {
        num_rows(vectors, self.dimension())?;
        self.base.add(vectors)?;
        self.refine.add(vectors)
    }

    fn search(&self, queries: &[f32], k: usize) -> Result<SearchResults> {
        let kbase = self.candidates_per_query(k);
        let coarse = self.base.search(queries, kbase)?;
        debug!(k, kbase, nq = coarse.nq(), "re-ranking base candidates");

        let metric = self.metric();
        let stored = self.refine.vectors();
        let d = self.dimension();
        let rows: Vec<Vec<(i64, f32)>> = queries
            .par_chunks_exact(d)
            .enumerate()
            .map(|(qi, q)| {
                let mut top = TopK::new(k, metric, kbase);
                for (label, _) in coarse.neighbors(qi) {
                    let start = label as usize * d;
                    if let Some(v) = stored.get(start..start + d) {
                        top.push(label, metric.distance(q, v));
                    }
                }
                top.into_sorted()
            })
            .collect();
        SearchResults::from_rows(k, rows, metric)
    }

    /// Exact stored vector.
    fn reconstruct(&self, id: usize) -> Result<Vec<f32>> {
        self.refine.reconstruct(id)
    }

    fn reset(&mut self) {
        self.base.reset();
        self.refine.reset();
    }

    fn size_bytes(&self) -> usize {
        self.base.size_bytes() + self.refine.size_bytes()
    }
}
