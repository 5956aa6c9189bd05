//! IVF search implementation.

use std::borrow::Cow;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::pq::ProductQuantizer;
use crate::ann::results::{SearchResults, TopK};
use crate::ann::traits::{check_ids, Index};
use crate::buffer::{num_rows, row};
use crate::distance::DistanceMetric;
use crate::flat::FlatIndex;
use crate::partitioning::{ClusteringParams, KMeans};
use crate::{Result, VecError};

/// How vectors are stored inside the inverted lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IvfEncoding {
    /// Raw `f32` vectors.
    Flat,
    /// PQ codes of the residual to the list centroid.
    Pq { num_codebooks: usize, nbits: usize },
}

/// IVF parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IvfParams {
    /// Number of inverted lists (coarse centroids).
    pub nlist: usize,
    /// Number of lists scanned per query.
    pub nprobe: usize,
    /// Training parameters for the coarse k-means.
    pub clustering: ClusteringParams,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self {
            nlist: 1024,
            nprobe: 1,
            clustering: ClusteringParams::default().with_niter(10),
        }
    }
}

impl IvfParams {
    #[must_use]
    pub fn with_nlist(mut self, nlist: usize) -> Self {
        self.nlist = nlist;
        self
    }

    #[must_use]
    pub fn with_nprobe(mut self, nprobe: usize) -> Self {
        self.nprobe = nprobe;
        self
    }

    #[must_use]
    pub fn with_clustering(mut self, clustering: ClusteringParams) -> Self {
        self.clustering = clustering;
        self
    }
}

/// Quantizer strategy for list contents.
#[derive(Debug, Clone)]
enum Encoder {
    Flat,
    Product(ProductQuantizer),
}

impl Encoder {
    fn code_size(&self, dimension: usize) -> usize {
        match self {
            Self::Flat => dimension * std::mem::size_of::<f32>(),
            Self::Product(pq) => pq.code_size(),
        }
    }
}

/// Inverted list: labels and their codes, `code_size` bytes each.
#[derive(Debug, Clone, Default)]
struct InvertedList {
    ids: Vec<i64>,
    codes: Vec<u8>,
}

/// Inverted-file index: a coarse quantizer partitions the space into `nlist`
/// cells and only the `nprobe` cells nearest to a query are scanned.
#[derive(Debug, Clone)]
pub struct IvfIndex {
    dimension: usize,
    metric: DistanceMetric,
    params: IvfParams,
    /// Coarse centroids; position in this index is the list number.
    quantizer: FlatIndex,
    encoder: Encoder,
    lists: Vec<InvertedList>,
    ntotal: usize,
    trained: bool,
}

impl IvfIndex {
    /// Create a new, untrained IVF index.
    pub fn new(
        dimension: usize,
        metric: DistanceMetric,
        params: IvfParams,
        encoding: IvfEncoding,
    ) -> Result<Self> {
        if params.nlist == 0 {
            return Err(VecError::InvalidParameter(
                "nlist must be greater than 0".to_string(),
            ));
        }
        let encoder = match encoding {
            IvfEncoding::Flat => Encoder::Flat,
            IvfEncoding::Pq {
                num_codebooks,
                nbits,
            } => Encoder::Product(
                ProductQuantizer::new(dimension, num_codebooks, nbits)?
                    .with_params(params.clustering.clone().with_niter(25)),
            ),
        };

        Ok(Self {
            dimension,
            metric,
            quantizer: FlatIndex::new(dimension, metric)?,
            lists: vec![InvertedList::default(); params.nlist],
            params,
            encoder,
            ntotal: 0,
            trained: false,
        })
    }

    pub fn nlist(&self) -> usize {
        self.params.nlist
    }

    pub fn nprobe(&self) -> usize {
        self.params.nprobe
    }

    /// Number of lists scanned per query (clamped to `1..=nlist`).
    pub fn set_nprobe(&mut self, nprobe: usize) {
        self.params.nprobe = nprobe.clamp(1, self.params.nlist);
    }

    /// Number of vectors in list `list_no`.
    pub fn list_len(&self, list_no: usize) -> usize {
        self.lists.get(list_no).map_or(0, |l| l.ids.len())
    }

    /// Coarse centroids, `nlist x dimension` row-major (empty before training).
    pub fn centroids(&self) -> &[f32] {
        self.quantizer.vectors()
    }

    fn residual(&self, vector: &[f32], list_no: usize) -> Vec<f32> {
        let centroid = row(self.quantizer.vectors(), self.dimension, list_no);
        vector.iter().zip(centroid).map(|(x, c)| x - c).collect()
    }

    fn encode(&self, vector: &[f32], list_no: usize) -> Result<Vec<u8>> {
        match &self.encoder {
            Encoder::Flat => Ok(vector.iter().flat_map(|x| x.to_le_bytes()).collect()),
            Encoder::Product(pq) => pq.compute_code(&self.residual(vector, list_no)),
        }
    }

    fn add_core(&mut self, vectors: &[f32], ids: &[i64]) -> Result<()> {
        if !self.trained {
            return Err(VecError::NotTrained("IvfIndex"));
        }
        let assignments = self.quantizer.assign(vectors)?;

        let codes = vectors
            .par_chunks_exact(self.dimension)
            .zip(assignments.par_iter())
            .map(|(v, &list_no)| self.encode(v, list_no))
            .collect::<Result<Vec<_>>>()?;

        for ((code, &list_no), &id) in codes.iter().zip(&assignments).zip(ids) {
            let list = &mut self.lists[list_no];
            list.ids.push(id);
            list.codes.extend_from_slice(code);
        }
        self.ntotal += ids.len();
        Ok(())
    }

    fn search_one(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>> {
        let probes = self.quantizer.search_one(query, self.params.nprobe.max(1));
        let code_size = self.encoder.code_size(self.dimension);
        let mut top = TopK::new(k, self.metric, self.ntotal);

        match &self.encoder {
            Encoder::Flat => {
                let mut scratch = vec![0.0f32; self.dimension];
                for &(list_no, _) in &probes {
                    let list = &self.lists[list_no as usize];
                    for (&id, code) in list.ids.iter().zip(list.codes.chunks_exact(code_size)) {
                        for (x, b) in scratch.iter_mut().zip(code.chunks_exact(4)) {
                            *x = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                        }
                        top.push(id, self.metric.distance(query, &scratch));
                    }
                }
            }
            Encoder::Product(pq) => {
                // Inner product does not depend on the centroid through the
                // table, so one table serves every probed list.
                let shared = match self.metric {
                    DistanceMetric::InnerProduct => {
                        Some(pq.compute_distance_table(query, DistanceMetric::InnerProduct)?)
                    }
                    DistanceMetric::L2 => None,
                };
                for &(list_no, coarse_score) in &probes {
                    let list_no = list_no as usize;
                    let list = &self.lists[list_no];
                    if list.ids.is_empty() {
                        continue;
                    }
                    let (table, base) = match &shared {
                        Some(t) => (Cow::Borrowed(t.as_slice()), coarse_score),
                        None => (
                            Cow::Owned(pq.compute_distance_table(
                                &self.residual(query, list_no),
                                DistanceMetric::L2,
                            )?),
                            0.0,
                        ),
                    };
                    for (&id, code) in list.ids.iter().zip(list.codes.chunks_exact(code_size)) {
                        top.push(id, base + pq.table_distance(&table, code));
                    }
                }
            }
        }

        Ok(top.into_sorted())
    }
}

impl Index for IvfIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn ntotal(&self) -> usize {
        self.ntotal
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn name(&self) -> &'static str {
        match self.encoder {
            Encoder::Flat => "IndexIVFFlat",
            Encoder::Product(_) => "IndexIVFPQ",
        }
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    /// Train the coarse quantizer, then the residual PQ if any.
    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        let mut kmeans = KMeans::new(self.dimension, self.params.nlist)?
            .with_params(self.params.clustering.clone());
        kmeans.train(vectors)?;

        let mut quantizer = FlatIndex::new(self.dimension, self.metric)?;
        quantizer.add(kmeans.centroids())?;

        let encoder = match &self.encoder {
            Encoder::Flat => Encoder::Flat,
            Encoder::Product(pq) => {
                let assignments = quantizer.assign(vectors)?;
                let mut residuals = Vec::with_capacity(vectors.len());
                for (v, &list_no) in vectors.chunks_exact(self.dimension).zip(&assignments) {
                    let centroid = row(quantizer.vectors(), self.dimension, list_no);
                    residuals.extend(v.iter().zip(centroid).map(|(x, c)| x - c));
                }
                let mut pq = pq.clone();
                pq.train(&residuals)?;
                Encoder::Product(pq)
            }
        };

        debug!(
            nlist = self.params.nlist,
            objective = kmeans.final_objective().unwrap_or(0.0),
            "trained IVF coarse quantizer"
        );

        self.quantizer = quantizer;
        self.encoder = encoder;
        self.lists = vec![InvertedList::default(); self.params.nlist];
        self.ntotal = 0;
        self.trained = true;
        Ok(())
    }

    fn add(&mut self, vectors: &[f32]) -> Result<()> {
        let n = num_rows(vectors, self.dimension)?;
        let start = self.ntotal as i64;
        let ids: Vec<i64> = (start..start + n as i64).collect();
        self.add_core(vectors, &ids)
    }

    fn add_with_ids(&mut self, vectors: &[f32], ids: &[i64]) -> Result<()> {
        let n = num_rows(vectors, self.dimension)?;
        check_ids(ids, n)?;
        self.add_core(vectors, ids)
    }

    fn search(&self, queries: &[f32], k: usize) -> Result<SearchResults> {
        if !self.trained {
            return Err(VecError::NotTrained("IvfIndex"));
        }
        num_rows(queries, self.dimension)?;
        let rows = queries
            .par_chunks_exact(self.dimension)
            .map(|q| self.search_one(q, k))
            .collect::<Result<Vec<_>>>()?;
        SearchResults::from_rows(k, rows, self.metric)
    }

    fn reset(&mut self) {
        self.lists.iter_mut().for_each(|l| {
            l.ids.clear();
            l.codes.clear();
        });
        self.ntotal = 0;
    }

    fn size_bytes(&self) -> usize {
        self.lists
            .iter()
            .map(|l| l.codes.len() + l.ids.len() * std::mem::size_of::<i64>())
            .sum::<usize>()
            + self.quantizer.size_bytes()
    }
}
