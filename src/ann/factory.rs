//! Build indexes from compact descriptor strings.
//!
//! A descriptor is a comma-separated chain of stages, outermost last:
//!
//! ```text
//! descriptor := [transform ","] [coarse ","] encoding ["," refine]
//! transform  := "PCA" INT
//! coarse     := "IVF" INT
//! encoding   := "Flat" | "PQ" INT ["x" INT]
//! refine     := "RFlat"
//! ```
//!
//! `"PCA32,IVF256,PQ8x4,RFlat"` projects to 32 dimensions, partitions into 256
//! inverted lists, stores 8 sub-quantizer codes of 4 bits each and re-ranks the
//! candidates exactly.
//!
//! ```
//! use vecquant::ann::{index_factory, Index};
//!
//! let index = index_factory(64, "IVF16,PQ8").unwrap();
//! assert_eq!(index.name(), "IndexIVFPQ");
//! assert!(index_factory(64, "IVF16,Flat,PQ8").is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::results::SearchResults;
use super::traits::Index;
use crate::distance::DistanceMetric;
use crate::flat::FlatIndex;
use crate::ivf_pq::pq::MAX_NBITS;
use crate::ivf_pq::{IvfEncoding, IvfIndex, IvfParams, PqIndex};
use crate::refine::RefineFlatIndex;
use crate::transform::{PcaMatrix, PreTransformIndex};
use crate::{Result, VecError};

/// Bits per PQ index when the descriptor does not say.
const DEFAULT_PQ_NBITS: usize = 8;

/// Dimensionality reduction applied before everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformStage {
    Pca { d_out: usize },
}

/// Coarse partitioning of the (transformed) space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoarseStage {
    Ivf { nlist: usize },
}

/// How vectors are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Flat,
    Pq { num_codebooks: usize, nbits: usize },
}

/// Parsed form of a descriptor string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub transform: Option<TransformStage>,
    pub coarse: Option<CoarseStage>,
    pub encoding: Encoding,
    pub refine: bool,
}

/// Parser position: each stage may only follow the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Start,
    Transform,
    Coarse,
    Encoding,
    Refine,
}

fn parse_error(descriptor: &str, reason: impl fmt::Display) -> VecError {
    VecError::DescriptorParse(format!("\"{descriptor}\": {reason}"))
}

/// Strictly positive decimal integer, digits only.
fn parse_count(text: &str) -> Option<usize> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok().filter(|&n| n > 0)
}

fn parse_pq(params: &str) -> Option<Encoding> {
    let (m, nbits) = match params.split_once('x') {
        Some((m, nbits)) => (parse_count(m)?, parse_count(nbits)?),
        None => (parse_count(params)?, DEFAULT_PQ_NBITS),
    };
    Some(Encoding::Pq {
        num_codebooks: m,
        nbits,
    })
}

impl FromStr for IndexDescriptor {
    type Err = VecError;

    fn from_str(descriptor: &str) -> Result<Self> {
        if descriptor.trim().is_empty() {
            return Err(parse_error(descriptor, "empty descriptor"));
        }

        let mut phase = Phase::Start;
        let mut transform = None;
        let mut coarse = None;
        let mut encoding = None;
        let mut refine = false;

        for token in descriptor.split(',').map(str::trim) {
            let (stage, next) = if let Some(rest) = token.strip_prefix("PCA") {
                let d_out = parse_count(rest)
                    .ok_or_else(|| parse_error(descriptor, format!("bad PCA stage \"{token}\"")))?;
                transform = Some(TransformStage::Pca { d_out });
                ("transform", Phase::Transform)
            } else if let Some(rest) = token.strip_prefix("IVF") {
                let nlist = parse_count(rest)
                    .ok_or_else(|| parse_error(descriptor, format!("bad IVF stage \"{token}\"")))?;
                coarse = Some(CoarseStage::Ivf { nlist });
                ("coarse quantizer", Phase::Coarse)
            } else if token == "Flat" {
                encoding = Some(Encoding::Flat);
                ("encoding", Phase::Encoding)
            } else if let Some(rest) = token.strip_prefix("PQ") {
                encoding = Some(parse_pq(rest).ok_or_else(|| {
                    parse_error(descriptor, format!("bad PQ stage \"{token}\""))
                })?);
                ("encoding", Phase::Encoding)
            } else if token == "RFlat" {
                refine = true;
                ("refine", Phase::Refine)
            } else {
                return Err(parse_error(descriptor, format!("unknown stage \"{token}\"")));
            };

            if next <= phase {
                return Err(parse_error(
                    descriptor,
                    format!("unexpected {stage} stage \"{token}\""),
                ));
            }
            if next == Phase::Refine && phase != Phase::Encoding {
                return Err(parse_error(descriptor, "RFlat must follow an encoding"));
            }
            phase = next;
        }

        let encoding = encoding.ok_or_else(|| parse_error(descriptor, "missing encoding stage"))?;
        Ok(Self {
            transform,
            coarse,
            encoding,
            refine,
        })
    }
}

impl fmt::Display for IndexDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(TransformStage::Pca { d_out }) = self.transform {
            write!(f, "PCA{d_out},")?;
        }
        if let Some(CoarseStage::Ivf { nlist }) = self.coarse {
            write!(f, "IVF{nlist},")?;
        }
        match self.encoding {
            Encoding::Flat => f.write_str("Flat")?,
            Encoding::Pq {
                num_codebooks,
                nbits: DEFAULT_PQ_NBITS,
            } => write!(f, "PQ{num_codebooks}")?,
            Encoding::Pq {
                num_codebooks,
                nbits,
            } => write!(f, "PQ{num_codebooks}x{nbits}")?,
        }
        if self.refine {
            f.write_str(",RFlat")?;
        }
        Ok(())
    }
}

impl IndexDescriptor {
    /// Dimension seen by the encoding stage for `dimension`-sized inputs.
    pub fn encoded_dimension(&self, dimension: usize) -> usize {
        match self.transform {
            Some(TransformStage::Pca { d_out }) => d_out,
            None => dimension,
        }
    }

    /// Check the descriptor against the input dimension.
    pub fn validate(&self, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(parse_error(&self.to_string(), "dimension must be positive"));
        }
        if let Some(TransformStage::Pca { d_out }) = self.transform {
            if d_out > dimension {
                return Err(parse_error(
                    &self.to_string(),
                    format!("PCA output {d_out} exceeds input dimension {dimension}"),
                ));
            }
        }
        if let Encoding::Pq {
            num_codebooks,
            nbits,
        } = self.encoding
        {
            let d = self.encoded_dimension(dimension);
            if d % num_codebooks != 0 {
                return Err(parse_error(
                    &self.to_string(),
                    format!("{num_codebooks} sub-quantizers do not divide dimension {d}"),
                ));
            }
            if !(1..=MAX_NBITS).contains(&nbits) {
                return Err(parse_error(
                    &self.to_string(),
                    format!("PQ needs 1..={MAX_NBITS} bits, got {nbits}"),
                ));
            }
        }
        Ok(())
    }

    /// Construct the described (untrained) index.
    pub fn build(&self, dimension: usize, metric: DistanceMetric) -> Result<AnyIndex> {
        self.validate(dimension)?;
        let d = self.encoded_dimension(dimension);

        let mut index: AnyIndex = match (self.coarse, self.encoding) {
            (None, Encoding::Flat) => FlatIndex::new(d, metric)?.into(),
            (
                None,
                Encoding::Pq {
                    num_codebooks,
                    nbits,
                },
            ) => PqIndex::new(d, num_codebooks, nbits, metric)?.into(),
            (Some(CoarseStage::Ivf { nlist }), encoding) => {
                let encoding = match encoding {
                    Encoding::Flat => IvfEncoding::Flat,
                    Encoding::Pq {
                        num_codebooks,
                        nbits,
                    } => IvfEncoding::Pq {
                        num_codebooks,
                        nbits,
                    },
                };
                let params = IvfParams::default().with_nlist(nlist);
                IvfIndex::new(d, metric, params, encoding)?.into()
            }
        };

        if let Some(TransformStage::Pca { d_out }) = self.transform {
            index = PreTransformIndex::new(PcaMatrix::new(dimension, d_out)?, index)?.into();
        }
        if self.refine {
            index = RefineFlatIndex::new(index)?.into();
        }
        Ok(index)
    }
}

/// Parse `descriptor` and build an untrained index under squared L2.
pub fn index_factory(dimension: usize, descriptor: &str) -> Result<AnyIndex> {
    index_factory_with_metric(dimension, descriptor, DistanceMetric::L2)
}

/// Parse `descriptor` and build an untrained index under `metric`.
pub fn index_factory_with_metric(
    dimension: usize,
    descriptor: &str,
    metric: DistanceMetric,
) -> Result<AnyIndex> {
    let parsed: IndexDescriptor = descriptor.parse()?;
    let index = parsed.build(dimension, metric)?;
    debug!(
        dimension,
        descriptor = %parsed,
        ?metric,
        index = index.name(),
        "built index from descriptor"
    );
    Ok(index)
}

/// Any index the factory can build.
#[derive(Debug, Clone)]
pub enum AnyIndex {
    Flat(FlatIndex),
    Pq(PqIndex),
    Ivf(IvfIndex),
    PreTransform(PreTransformIndex),
    Refine(RefineFlatIndex),
}

macro_rules! dispatch {
    ($self:ident, $index:ident => $body:expr) => {
        match $self {
            AnyIndex::Flat($index) => $body,
            AnyIndex::Pq($index) => $body,
            AnyIndex::Ivf($index) => $body,
            AnyIndex::PreTransform($index) => $body,
            AnyIndex::Refine($index) => $body,
        }
    };
}

impl Index for AnyIndex {
    fn dimension(&self) -> usize {
        dispatch!(self, i => i.dimension())
    }

    fn ntotal(&self) -> usize {
        dispatch!(self, i => i.ntotal())
    }

    fn metric(&self) -> DistanceMetric {
        dispatch!(self, i => i.metric())
    }

    fn name(&self) -> &'static str {
        dispatch!(self, i => i.name())
    }

    fn is_trained(&self) -> bool {
        dispatch!(self, i => i.is_trained())
    }

    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        dispatch!(self, i => i.train(vectors))
    }

    fn add(&mut self, vectors: &[f32]) -> Result<()> {
        dispatch!(self, i => i.add(vectors))
    }

    fn add_with_ids(&mut self, vectors: &[f32], ids: &[i64]) -> Result<()> {
        dispatch!(self, i => i.add_with_ids(vectors, ids))
    }

    fn search(&self, queries: &[f32], k: usize) -> Result<SearchResults> {
        dispatch!(self, i => i.search(queries, k))
    }

    fn reconstruct(&self, id: usize) -> Result<Vec<f32>> {
        dispatch!(self, i => i.reconstruct(id))
    }

    fn reset(&mut self) {
        dispatch!(self, i => i.reset())
    }

    fn size_bytes(&self) -> usize {
        dispatch!(self, i => i.size_bytes())
    }
}

impl From<FlatIndex> for AnyIndex {
    fn from(index: FlatIndex) -> Self {
        Self::Flat(index)
    }
}

impl From<PqIndex> for AnyIndex {
    fn from(index: PqIndex) -> Self {
        Self::Pq(index)
    }
}

impl From<IvfIndex> for AnyIndex {
    fn from(index: IvfIndex) -> Self {
        Self::Ivf(index)
    }
}

impl From<PreTransformIndex> for AnyIndex {
    fn from(index: PreTransformIndex) -> Self {
        Self::PreTransform(index)
    }
}

impl From<RefineFlatIndex> for AnyIndex {
    fn from(index: RefineFlatIndex) -> Self {
        Self::Refine(index)
    }
}
