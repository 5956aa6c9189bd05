//! Partition-based primitives.
//!
//! [`kmeans::KMeans`] is shared by everything that needs a codebook: the IVF
//! coarse quantizer trains `nlist` centroids over full vectors, and the product
//! quantizer trains one small codebook per sub-space.

pub mod kmeans;

pub use kmeans::{kmeans_clustering, nearest_centroid, ClusteringParams, KMeans};
