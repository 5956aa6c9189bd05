//! Product Quantization (PQ) implementation.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::{num_rows, row};
use crate::distance::DistanceMetric;
use crate::partitioning::{kmeans_clustering, nearest_centroid, ClusteringParams};
use crate::{Result, VecError};

/// Largest supported bits per sub-quantizer index.
pub const MAX_NBITS: usize = 16;

/// Product Quantizer.
///
/// Decomposes vectors into `num_codebooks` contiguous subvectors and quantizes
/// each against its own codebook of `2^nbits` centroids. A code is the tuple of
/// centroid indices, packed little-endian at `nbits` bits each into
/// `code_size()` bytes (exactly one byte per subvector when `nbits == 8`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductQuantizer {
    dimension: usize,
    num_codebooks: usize,
    nbits: usize,
    codebook_size: usize,
    subvector_dim: usize,
    code_size: usize,
    params: ClusteringParams,
    /// `[codebook][codeword][subvector_dim]`, flattened.
    codebooks: Vec<f32>,
    trained: bool,
}

impl ProductQuantizer {
    /// Create a new product quantizer with `2^nbits` codewords per codebook.
    pub fn new(dimension: usize, num_codebooks: usize, nbits: usize) -> Result<Self> {
        if num_codebooks == 0 {
            return Err(VecError::InvalidParameter(
                "num_codebooks must be greater than 0".to_string(),
            ));
        }
        if nbits == 0 || nbits > MAX_NBITS {
            return Err(VecError::InvalidParameter(format!(
                "nbits must be in 1..={MAX_NBITS}, got {nbits}"
            )));
        }
        if dimension == 0 || dimension % num_codebooks != 0 {
            return Err(VecError::InvalidDimension(format!(
                "dimension {dimension} is not divisible into {num_codebooks} subvectors"
            )));
        }

        Ok(Self {
            dimension,
            num_codebooks,
            nbits,
            codebook_size: 1 << nbits,
            subvector_dim: dimension / num_codebooks,
            code_size: (num_codebooks * nbits).div_ceil(8),
            params: ClusteringParams::default(),
            codebooks: Vec::new(),
            trained: false,
        })
    }

    /// Clustering parameters for the per-subspace k-means. Subspace `q` is
    /// trained with seed `params.seed + q`.
    #[must_use]
    pub fn with_params(mut self, params: ClusteringParams) -> Self {
        self.params = params;
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn num_codebooks(&self) -> usize {
        self.num_codebooks
    }

    pub fn nbits(&self) -> usize {
        self.nbits
    }

    pub fn codebook_size(&self) -> usize {
        self.codebook_size
    }

    /// Bytes per encoded vector.
    pub fn code_size(&self) -> usize {
        self.code_size
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Train one codebook per subspace. Subspaces are trained in parallel.
    pub fn train(&mut self, vectors: &[f32]) -> Result<()> {
        let n = num_rows(vectors, self.dimension)?;
        if n == 0 {
            return Err(VecError::InvalidParameter(
                "product quantizer needs at least one training vector".to_string(),
            ));
        }

        let dimension = self.dimension;
        let dsub = self.subvector_dim;
        let ksub = self.codebook_size;
        let base = &self.params;
        let codebooks: Vec<Vec<f32>> = (0..self.num_codebooks)
            .into_par_iter()
            .map(|q| {
                let mut subvectors = Vec::with_capacity(n * dsub);
                for v in vectors.chunks_exact(dimension) {
                    subvectors.extend_from_slice(&v[q * dsub..(q + 1) * dsub]);
                }
                let params = base.clone().with_seed(base.seed.wrapping_add(q as u64));
                let (centroids, objective) = kmeans_clustering(dsub, ksub, &subvectors, params)?;
                debug!(subquantizer = q, objective, "trained PQ codebook");
                Ok(centroids)
            })
            .collect::<Result<_>>()?;

        self.codebooks = codebooks.concat();
        self.trained = true;
        Ok(())
    }

    /// Codeword `idx` of codebook `q`.
    #[inline]
    pub fn centroid(&self, q: usize, idx: usize) -> &[f32] {
        let start = (q * self.codebook_size + idx) * self.subvector_dim;
        &self.codebooks[start..start + self.subvector_dim]
    }

    fn codebook(&self, q: usize) -> &[f32] {
        let len = self.codebook_size * self.subvector_dim;
        &self.codebooks[q * len..(q + 1) * len]
    }

    /// All codebooks, `[codebook][codeword][subvector_dim]` flattened.
    pub fn codebooks(&self) -> &[f32] {
        &self.codebooks
    }

    /// Encode one vector into `code` (`code_size()` bytes).
    fn encode_into(&self, vector: &[f32], code: &mut [u8]) {
        code.iter_mut().for_each(|b| *b = 0);
        let dsub = self.subvector_dim;
        for q in 0..self.num_codebooks {
            let sub = &vector[q * dsub..(q + 1) * dsub];
            let (idx, _) = nearest_centroid(sub, self.codebook(q), dsub);
            pack_index(code, q, self.nbits, idx);
        }
    }

    fn check_trained(&self) -> Result<()> {
        if !self.trained {
            return Err(VecError::NotTrained("ProductQuantizer"));
        }
        Ok(())
    }

    /// Encode a single vector.
    pub fn compute_code(&self, vector: &[f32]) -> Result<Vec<u8>> {
        self.check_trained()?;
        if vector.len() != self.dimension {
            return Err(VecError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let mut code = vec![0u8; self.code_size];
        self.encode_into(vector, &mut code);
        Ok(code)
    }

    /// Encode a batch of vectors; returns `n * code_size()` bytes.
    pub fn compute_codes(&self, vectors: &[f32]) -> Result<Vec<u8>> {
        self.check_trained()?;
        let n = num_rows(vectors, self.dimension)?;
        let mut codes = vec![0u8; n * self.code_size];
        codes
            .par_chunks_exact_mut(self.code_size)
            .zip(vectors.par_chunks_exact(self.dimension))
            .for_each(|(code, v)| self.encode_into(v, code));
        Ok(codes)
    }

    /// Codebook indices stored in one code.
    pub fn code_indices<'a>(&'a self, code: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
        (0..self.num_codebooks).map(move |q| unpack_index(code, q, self.nbits))
    }

    fn decode_into(&self, code: &[u8], out: &mut Vec<f32>) {
        for (q, idx) in self.code_indices(code).enumerate() {
            out.extend_from_slice(self.centroid(q, idx));
        }
    }

    /// Reconstruct a single vector.
    pub fn decode_code(&self, code: &[u8]) -> Result<Vec<f32>> {
        self.check_trained()?;
        if code.len() != self.code_size {
            return Err(VecError::DimensionMismatch {
                expected: self.code_size,
                actual: code.len(),
            });
        }
        let mut out = Vec::with_capacity(self.dimension);
        self.decode_into(code, &mut out);
        Ok(out)
    }

    /// Reconstruct a batch of codes; returns `n * dimension()` floats.
    pub fn decode(&self, codes: &[u8]) -> Result<Vec<f32>> {
        self.check_trained()?;
        let rem = codes.len() % self.code_size;
        if rem != 0 {
            return Err(VecError::DimensionMismatch {
                expected: self.code_size,
                actual: rem,
            });
        }
        let mut out = Vec::with_capacity(codes.len() / self.code_size * self.dimension);
        for code in codes.chunks_exact(self.code_size) {
            self.decode_into(code, &mut out);
        }
        Ok(out)
    }

    /// Compute the ADC (Asymmetric Distance Computation) lookup table.
    ///
    /// Entry `q * codebook_size() + i` holds the score between subvector `q` of
    /// the query and codeword `i` of codebook `q`: squared L2 distance or inner
    /// product depending on `metric`. Summing one entry per codebook gives the
    /// score between the query and a decoded vector.
    pub fn compute_distance_table(
        &self,
        query: &[f32],
        metric: DistanceMetric,
    ) -> Result<Vec<f32>> {
        self.check_trained()?;
        if query.len() != self.dimension {
            return Err(VecError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let dsub = self.subvector_dim;
        let mut table = Vec::with_capacity(self.num_codebooks * self.codebook_size);
        for q in 0..self.num_codebooks {
            let query_sub = row(query, dsub, q);
            for codeword in self.codebook(q).chunks_exact(dsub) {
                table.push(metric.distance(query_sub, codeword));
            }
        }
        Ok(table)
    }

    /// Score of a code using a table from [`ProductQuantizer::compute_distance_table`].
    #[inline]
    pub fn table_distance(&self, table: &[f32], code: &[u8]) -> f32 {
        if self.nbits == 8 {
            return code
                .iter()
                .enumerate()
                .map(|(q, &c)| table[q * self.codebook_size + c as usize])
                .sum();
        }
        self.code_indices(code)
            .enumerate()
            .map(|(q, idx)| table[q * self.codebook_size + idx])
            .sum()
    }
}

/// Write index `value` at position `pos` of a code with `nbits`-bit fields.
/// The target bits must be zero.
#[inline]
fn pack_index(code: &mut [u8], pos: usize, nbits: usize, value: usize) {
    if nbits == 8 {
        code[pos] = value as u8;
        return;
    }
    let mut bit = pos * nbits;
    for b in 0..nbits {
        if (value >> b) & 1 == 1 {
            code[bit / 8] |= 1 << (bit % 8);
        }
        bit += 1;
    }
}

#[inline]
fn unpack_index(code: &[u8], pos: usize, nbits: usize) -> usize {
    if nbits == 8 {
        return code[pos] as usize;
    }
    let mut value = 0usize;
    let mut bit = pos * nbits;
    for b in 0..nbits {
        if (code[bit / 8] >> (bit % 8)) & 1 == 1 {
            value |= 1 << b;
        }
        bit += 1;
    }
    value
}
