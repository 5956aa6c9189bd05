//! Vector transforms applied before indexing.
//!
//! A [`VectorTransform`] maps `d_in`-dimensional vectors to `d_out` dimensions.
//! [`PreTransformIndex`] chains one in front of another index so that training,
//! insertion and queries all see transformed vectors.

pub mod pca;

pub use pca::PcaMatrix;

use tracing::debug;

use crate::ann::factory::AnyIndex;
use crate::ann::results::SearchResults;
use crate::ann::traits::Index;
use crate::distance::DistanceMetric;
use crate::{Result, VecError};

/// A trainable linear map between vector spaces.
pub trait VectorTransform {
    /// Input dimension.
    fn d_in(&self) -> usize;

    /// Output dimension.
    fn d_out(&self) -> usize;

    fn is_trained(&self) -> bool;

    /// Fit the transform on `n x d_in` row-major vectors.
    fn train(&mut self, vectors: &[f32]) -> Result<()>;

    /// Map `n x d_in` vectors to `n x d_out`.
    fn apply(&self, vectors: &[f32]) -> Result<Vec<f32>>;

    /// Map `n x d_out` vectors back to `n x d_in` (approximate when
    /// `d_out < d_in`).
    fn reverse_transform(&self, projected: &[f32]) -> Result<Vec<f32>>;
}

/// An index whose inputs pass through a PCA projection first.
#[derive(Debug, Clone)]
pub struct PreTransformIndex {
    transform: PcaMatrix,
    index: Box<AnyIndex>,
}

impl PreTransformIndex {
    /// Chain `transform` in front of `index`; `index` must accept the
    /// transform's output dimension.
    pub fn new(transform: PcaMatrix, index: AnyIndex) -> Result<Self> {
        if index.dimension() != transform.d_out() {
            return Err(VecError::DimensionMismatch {
                expected: transform.d_out(),
                actual: index.dimension(),
            });
        }
        Ok(Self {
            transform,
            index: Box::new(index),
        })
    }

    pub fn transform(&self) -> &PcaMatrix {
        &self.transform
    }

    /// The wrapped index, which sees transformed vectors.
    pub fn inner(&self) -> &AnyIndex {
        &self.index
    }

    pub fn inner_mut(&mut self) -> &mut AnyIndex {
        &mut self.index
    }
}

impl Index for PreTransformIndex {
    fn dimension(&self) -> usize {
        self.transform.d_in()
    }

    fn ntotal(&self) -> usize {
        self.index.ntotal()
    }

    fn metric(&self) -> DistanceMetric {
        self.index.metric()
    }

    fn name(&self) -> &'static str {
        "IndexPreTransform"
    }

    fn is_trained(&self) -> bool {
        self.transform.is_trained() && self.index.is_trained()
    }

    /// Train the projection (if not already trained), then the wrapped index
    /// on projected vectors. Nothing changes unless both steps succeed.
    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        let mut transform = self.transform.clone();
        if !transform.is_trained() {
            transform.train(vectors)?;
        }
        let projected = transform.apply(vectors)?;

        let mut index = self.index.clone();
        index.train(&projected)?;
        debug!(
            d_in = transform.d_in(),
            d_out = transform.d_out(),
            inner = index.name(),
            "trained pre-transform chain"
        );

        self.transform = transform;
        self.index = index;
        Ok(())
    }

    fn add(&mut self, vectors: &[f32]) -> Result<()> {
        let projected = self.transform.apply(vectors)?;
        self.index.add(&projected)
    }

    fn add_with_ids(&mut self, vectors: &[f32], ids: &[i64]) -> Result<()> {
        let projected = self.transform.apply(vectors)?;
        self.index.add_with_ids(&projected, ids)
    }

    fn search(&self, queries: &[f32], k: usize) -> Result<SearchResults> {
        let projected = self.transform.apply(queries)?;
        self.index.search(&projected, k)
    }

    /// Stored vector mapped back to the input space.
    fn reconstruct(&self, id: usize) -> Result<Vec<f32>> {
        let projected = self.index.reconstruct(id)?;
        self.transform.reverse_transform(&projected)
    }

    fn reset(&mut self) {
        self.index.reset();
    }

    fn size_bytes(&self) -> usize {
        self.index.size_bytes()
            + (self.transform.components().len() + self.transform.mean().len())
                * std::mem::size_of::<f32>()
    }
}
