//! vecquant: vector quantization and similarity-search building blocks.
//!
//! Standalone, deterministic implementations of the primitives that large-scale
//! vector search is assembled from:
//!
//! - `partitioning/`: k-means clustering (the codebook trainer for everything else)
//! - `transform/`: PCA projection and the pre-transform index wrapper
//! - `ivf_pq/`: product quantization, PQ index, inverted-file index
//! - `flat`: exact brute-force index
//! - `refine`: exact re-ranking of approximate candidates
//! - `ann/`: the [`Index`] trait and the descriptor-driven [`index_factory`]
//!
//! ```
//! use vecquant::{index_factory, Index};
//!
//! let d = 8;
//! let data: Vec<f32> = (0..64 * d).map(|i| (i % 17) as f32).collect();
//!
//! let mut index = index_factory(d, "IVF4,Flat").unwrap();
//! index.train(&data).unwrap();
//! index.add(&data).unwrap();
//! let res = index.search(&data[..d], 3).unwrap();
//! assert_eq!(res.distances()[0], 0.0);
//! ```
//!
//! # Critical Nuances
//!
//! ## Determinism
//!
//! Every randomized step (k-means initialization, training-set subsampling)
//! draws from a seed in [`ClusteringParams`]. Parallel stages run on rayon but
//! collect results in input order and reduce sequentially, so the same inputs
//! and seed give bit-identical models on any thread count.
//!
//! ## Squared distances
//!
//! [`DistanceMetric::L2`] scores are squared Euclidean distances. Quantization
//! errors and k-means objectives are reported on the same scale.
//!
//! ## Training before use
//!
//! PQ, IVF and PCA must be trained before vectors are added. Training data
//! should come from the same distribution as the indexed data; a codebook
//! trained on too few points (under ~39 per centroid) still works but quantizes
//! poorly, and k-means logs a warning.

pub mod ann;
pub mod buffer;
pub mod distance;
pub mod error;
pub mod flat;
pub mod ivf_pq;
pub mod partitioning;
pub mod refine;
pub mod simd;
pub mod transform;

// Re-exports
pub use ann::{
    index_factory, index_factory_with_metric, AnyIndex, Index, IndexDescriptor, SearchResults,
};
pub use buffer::VectorBuffer;
pub use distance::DistanceMetric;
pub use error::{Result, VecError};
pub use flat::FlatIndex;
pub use ivf_pq::{IvfEncoding, IvfIndex, IvfParams, PqIndex, ProductQuantizer};
pub use partitioning::{kmeans_clustering, ClusteringParams, KMeans};
pub use refine::RefineFlatIndex;
pub use transform::{PcaMatrix, PreTransformIndex, VectorTransform};
