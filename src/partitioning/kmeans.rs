//! k-means clustering implementation.
//!
//! Lloyd iterations over squared Euclidean distance with an explicit seed, an
//! objective trace (one value per iteration) and deterministic repair of empty
//! clusters.
//!
//! Each iteration:
//!
//! 1. assigns every vector to its nearest centroid (lowest index wins ties) and
//!    records the total squared distance of that assignment;
//! 2. moves every non-empty centroid to the mean of its members;
//! 3. splits the largest cluster into every empty one (see [`KMeans::train`]).
//!
//! Step 2 cannot increase the objective for a fixed assignment, and step 3 only
//! adds centroids that own no vectors yet, so the next assignment can only do
//! better. The trace is therefore non-increasing (up to `f32` rounding of the
//! means), unless `spherical` renormalizes centroids.
//!
//! Assignment runs on the rayon pool. Per-vector results are collected in input
//! order and summed sequentially in `f64`, so centroids and trace do not depend
//! on the number of threads.

use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::buffer::{num_rows, row};
use crate::distance::normalize_in_place;
use crate::simd;
use crate::{Result, VecError};

/// Relative step used to separate a split centroid from its donor.
const SPLIT_EPS: f32 = 1.0 / 1024.0;

/// Training parameters for [`KMeans`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringParams {
    /// Lloyd iterations per run.
    pub niter: usize,
    /// Independent runs; the one with the lowest final objective is kept.
    pub nredo: usize,
    /// Seed for initialization and subsampling.
    pub seed: u64,
    /// Log every iteration at `info` instead of `debug`.
    pub verbose: bool,
    /// L2-normalize centroids after every update.
    pub spherical: bool,
    /// Training sets larger than `k * max_points_per_centroid` are subsampled.
    pub max_points_per_centroid: usize,
    /// Below `k * min_points_per_centroid` vectors a warning is logged.
    pub min_points_per_centroid: usize,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            niter: 25,
            nredo: 1,
            seed: 1234,
            verbose: false,
            spherical: false,
            max_points_per_centroid: 256,
            min_points_per_centroid: 39,
        }
    }
}

impl ClusteringParams {
    #[must_use]
    pub fn with_niter(mut self, niter: usize) -> Self {
        self.niter = niter;
        self
    }

    #[must_use]
    pub fn with_nredo(mut self, nredo: usize) -> Self {
        self.nredo = nredo;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub fn with_spherical(mut self, spherical: bool) -> Self {
        self.spherical = spherical;
        self
    }

    #[must_use]
    pub fn with_max_points_per_centroid(mut self, max: usize) -> Self {
        self.max_points_per_centroid = max;
        self
    }

    #[must_use]
    pub fn with_min_points_per_centroid(mut self, min: usize) -> Self {
        self.min_points_per_centroid = min;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.niter == 0 || self.nredo == 0 {
            return Err(VecError::InvalidParameter(
                "niter and nredo must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Nearest centroid to `v` by squared L2 distance, lowest index on ties.
///
/// `centroids` is a flat row-major slice of `dimension`-sized rows.
#[inline]
pub fn nearest_centroid(v: &[f32], centroids: &[f32], dimension: usize) -> (usize, f32) {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (idx, c) in centroids.chunks_exact(dimension).enumerate() {
        let dist = simd::l2_distance_squared(v, c);
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        }
    }
    (best, best_dist)
}

/// k-means clustering for partitioning vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    dimension: usize,
    k: usize,
    params: ClusteringParams,
    /// Centroids (k x dimension), row-major.
    centroids: Vec<f32>,
    /// Objective per iteration of the retained run.
    objective: Vec<f32>,
    trained: bool,
}

/// Result of a single clustering run.
struct Run {
    centroids: Vec<f32>,
    objective: Vec<f32>,
}

impl Run {
    fn final_objective(&self) -> f32 {
        self.objective.last().copied().unwrap_or(f32::INFINITY)
    }
}

impl KMeans {
    /// Create new k-means with k clusters.
    pub fn new(dimension: usize, k: usize) -> Result<Self> {
        if dimension == 0 || k == 0 {
            return Err(VecError::InvalidParameter(
                "dimension and k must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            dimension,
            k,
            params: ClusteringParams::default(),
            centroids: Vec::new(),
            objective: Vec::new(),
            trained: false,
        })
    }

    #[must_use]
    pub fn with_params(mut self, params: ClusteringParams) -> Self {
        self.params = params;
        self
    }

    /// Configure the seed; repeated `train(...)` calls on the same inputs
    /// then produce identical results.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.params.seed = seed;
        self
    }

    pub fn params(&self) -> &ClusteringParams {
        &self.params
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Train on `vectors` (flat, row-major) and return the objective trace.
    ///
    /// Initial centroids are drawn from a seeded permutation of the training
    /// set; with fewer vectors than clusters the permutation wraps around and
    /// the duplicates are separated by the empty-cluster repair.
    ///
    /// Empty-cluster repair: empty clusters are visited in index order. Each
    /// takes a copy of the centroid of the cluster with the most members (lowest
    /// index on ties) and nudges every coordinate by `SPLIT_EPS` relative to its
    /// magnitude (absolute for zeros), times the number of repairs already made
    /// this iteration plus one, with a sign alternating over
    /// `coordinate + cluster`. The donor keeps its centroid; half of its member
    /// count is credited to the new cluster for the purpose of choosing later
    /// donors.
    ///
    /// On error the previous model is left unchanged.
    pub fn train(&mut self, vectors: &[f32]) -> Result<&[f32]> {
        self.params.validate()?;
        let n = num_rows(vectors, self.dimension)?;
        if n == 0 {
            return Err(VecError::InvalidParameter(
                "k-means needs at least one training vector".to_string(),
            ));
        }

        let (sample, n) = self.sample_training_set(vectors, n);
        if n < self.k * self.params.min_points_per_centroid {
            warn!(
                n,
                k = self.k,
                "too few training points for the requested number of centroids"
            );
        }

        let mut best: Option<Run> = None;
        for redo in 0..self.params.nredo {
            let run = self.run_once(&sample, n, self.params.seed.wrapping_add(redo as u64));
            if self.params.nredo > 1 {
                debug!(redo, objective = run.final_objective(), "k-means run finished");
            }
            let better = best
                .as_ref()
                .map_or(true, |b| run.final_objective() < b.final_objective());
            if better {
                best = Some(run);
            }
        }

        if let Some(run) = best {
            self.centroids = run.centroids;
            self.objective = run.objective;
            self.trained = true;
        }
        Ok(&self.objective)
    }

    /// Reduce oversized training sets to `k * max_points_per_centroid` rows.
    fn sample_training_set<'a>(&self, vectors: &'a [f32], n: usize) -> (Cow<'a, [f32]>, usize) {
        let max = self.k.saturating_mul(self.params.max_points_per_centroid);
        if max == 0 || n <= max {
            return (Cow::Borrowed(vectors), n);
        }

        warn!(n, sampled = max, "subsampling k-means training set");
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut perm: Vec<usize> = (0..n).collect();
        perm.shuffle(&mut rng);

        let mut sample = Vec::with_capacity(max * self.dimension);
        for &i in &perm[..max] {
            sample.extend_from_slice(row(vectors, self.dimension, i));
        }
        (Cow::Owned(sample), max)
    }

    fn run_once(&self, vectors: &[f32], n: usize, seed: u64) -> Run {
        let d = self.dimension;
        let k = self.k;

        let mut rng = StdRng::seed_from_u64(seed);
        let mut perm: Vec<usize> = (0..n).collect();
        perm.shuffle(&mut rng);

        let mut centroids = Vec::with_capacity(k * d);
        for j in 0..k {
            centroids.extend_from_slice(row(vectors, d, perm[j % n]));
        }
        if self.params.spherical {
            centroids.chunks_exact_mut(d).for_each(normalize_in_place);
        }

        let mut objective = Vec::with_capacity(self.params.niter);
        let mut sums = vec![0.0f64; k * d];
        let mut counts = vec![0usize; k];

        for iteration in 0..self.params.niter {
            let assignments: Vec<(usize, f32)> = vectors
                .par_chunks_exact(d)
                .map(|v| nearest_centroid(v, &centroids, d))
                .collect();

            let obj: f64 = assignments.iter().map(|&(_, dist)| f64::from(dist)).sum();
            objective.push(obj as f32);

            sums.iter_mut().for_each(|s| *s = 0.0);
            counts.iter_mut().for_each(|c| *c = 0);
            for (v, &(cluster, _)) in vectors.chunks_exact(d).zip(&assignments) {
                counts[cluster] += 1;
                let acc = &mut sums[cluster * d..(cluster + 1) * d];
                for (s, &x) in acc.iter_mut().zip(v) {
                    *s += f64::from(x);
                }
            }

            for (cluster, &count) in counts.iter().enumerate() {
                if count == 0 {
                    continue;
                }
                let inv = 1.0 / count as f64;
                let acc = &sums[cluster * d..(cluster + 1) * d];
                for (c, &s) in centroids[cluster * d..(cluster + 1) * d]
                    .iter_mut()
                    .zip(acc)
                {
                    *c = (s * inv) as f32;
                }
            }

            let repaired = split_empty_clusters(&mut centroids, &counts, d);
            if self.params.spherical {
                centroids.chunks_exact_mut(d).for_each(normalize_in_place);
            }

            if self.params.verbose {
                info!(iteration, objective = obj, repaired, "k-means iteration");
            } else {
                debug!(iteration, objective = obj, repaired, "k-means iteration");
            }
        }

        Run {
            centroids,
            objective,
        }
    }

    /// Nearest centroid and its squared distance for each vector.
    pub fn assign(&self, vectors: &[f32]) -> Result<Vec<(usize, f32)>> {
        if !self.trained {
            return Err(VecError::NotTrained("KMeans"));
        }
        num_rows(vectors, self.dimension)?;
        Ok(vectors
            .par_chunks_exact(self.dimension)
            .map(|v| nearest_centroid(v, &self.centroids, self.dimension))
            .collect())
    }

    /// Centroids (k x dimension), row-major. Empty before training.
    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    /// Centroid `idx`, if trained and in range.
    pub fn centroid(&self, idx: usize) -> Option<&[f32]> {
        if self.trained && idx < self.k {
            Some(row(&self.centroids, self.dimension, idx))
        } else {
            None
        }
    }

    /// Objective (total squared distance) per iteration of the last training.
    pub fn objective(&self) -> &[f32] {
        &self.objective
    }

    /// Objective of the final iteration.
    pub fn final_objective(&self) -> Option<f32> {
        self.objective.last().copied()
    }
}

/// Re-seed every cluster with `counts[c] == 0`; returns how many were repaired.
///
/// Donors come from a max-heap on (weight, lowest index), so a repair costs
/// `O(log k)` instead of a scan over all clusters.
fn split_empty_clusters(centroids: &mut [f32], counts: &[usize], dimension: usize) -> usize {
    let mut donors: BinaryHeap<(usize, Reverse<usize>)> = counts
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count > 0)
        .map(|(c, &count)| (count, Reverse(c)))
        .collect();
    let mut repaired = 0;

    for (empty, _) in counts.iter().enumerate().filter(|&(_, &count)| count == 0) {
        let Some((weight, Reverse(donor))) = donors.pop() else {
            break;
        };

        let step = SPLIT_EPS * (repaired + 1) as f32;
        for j in 0..dimension {
            let c = centroids[donor * dimension + j];
            let delta = if c == 0.0 { step } else { c.abs() * step };
            let sign = if (j + empty) % 2 == 0 { 1.0 } else { -1.0 };
            centroids[empty * dimension + j] = c + sign * delta;
        }

        let moved = weight / 2;
        donors.push((weight - moved, Reverse(donor)));
        donors.push((moved, Reverse(empty)));
        repaired += 1;
    }

    repaired
}

/// Cluster `vectors` into `k` centroids; returns the centroids and the final
/// objective.
pub fn kmeans_clustering(
    dimension: usize,
    k: usize,
    vectors: &[f32],
    params: ClusteringParams,
) -> Result<(Vec<f32>, f32)> {
    let mut km = KMeans::new(dimension, k)?.with_params(params);
    km.train(vectors)?;
    let obj = km.final_objective().unwrap_or(0.0);
    Ok((km.centroids, obj))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::Rng;

    fn random_vectors(n: usize, dimension: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * dimension).map(|_| rng.random::<f32>()).collect()
    }

    #[test]
    fn objective_trace_has_one_entry_per_iteration() {
        let x = random_vectors(200, 8, 1);
        let mut km = KMeans::new(8, 4)
            .unwrap()
            .with_params(ClusteringParams::default().with_niter(7));
        let trace = km.train(&x).unwrap().to_vec();
        assert_eq!(trace.len(), 7);
        assert_eq!(km.final_objective(), trace.last().copied());
        assert_eq!(km.centroids().len(), 4 * 8);
    }

    #[test]
    fn fewer_vectors_than_clusters_is_repaired() {
        let x = vec![0.0, 0.0, 1.0, 1.0, 2.0, 0.5];
        let mut km = KMeans::new(2, 5).unwrap();
        km.train(&x).unwrap();
        assert_eq!(km.centroids().len(), 10);
        assert!(km.centroids().iter().all(|c| c.is_finite()));
        assert_eq!(km.final_objective(), Some(0.0));
    }

    #[test]
    fn split_leaves_donor_untouched() {
        let mut centroids = vec![1.0, 2.0, 9.0, 9.0, 0.0, 0.0];
        let counts = [5, 0, 1];
        let repaired = split_empty_clusters(&mut centroids, &counts, 2);
        assert_eq!(repaired, 1);
        assert_eq!(&centroids[0..2], &[1.0, 2.0]);
        assert_eq!(&centroids[4..6], &[0.0, 0.0]);
        assert_eq!(centroids[2], 1.0 - SPLIT_EPS);
        assert_eq!(centroids[3], 2.0 + 2.0 * SPLIT_EPS);
    }

    /// Donor choice by full scan: largest weight, lowest index on ties.
    fn split_by_scan(centroids: &mut [f32], counts: &[usize], dimension: usize) -> usize {
        let mut weight = counts.to_vec();
        let mut repaired = 0;
        for empty in (0..counts.len()).filter(|&c| counts[c] == 0) {
            let donor = (0..weight.len())
                .fold(0, |best, c| if weight[c] > weight[best] { c } else { best });
            let step = SPLIT_EPS * (repaired + 1) as f32;
            for j in 0..dimension {
                let c = centroids[donor * dimension + j];
                let delta = if c == 0.0 { step } else { c.abs() * step };
                let sign = if (j + empty) % 2 == 0 { 1.0 } else { -1.0 };
                centroids[empty * dimension + j] = c + sign * delta;
            }
            let moved = weight[donor] / 2;
            weight[donor] -= moved;
            weight[empty] = moved;
            repaired += 1;
        }
        repaired
    }

    #[test]
    fn heap_donors_match_largest_cluster_scan() {
        let mut rng = StdRng::seed_from_u64(11);
        let k = 500;
        let dimension = 3;
        let counts: Vec<usize> = (0..k)
            .map(|_| if rng.random_bool(0.7) { 0 } else { rng.random_range(1..20) })
            .collect();
        let start: Vec<f32> = (0..k * dimension).map(|_| rng.random::<f32>() - 0.5).collect();

        let mut by_heap = start.clone();
        let mut by_scan = start;
        let repaired = split_empty_clusters(&mut by_heap, &counts, dimension);
        assert_eq!(repaired, split_by_scan(&mut by_scan, &counts, dimension));
        assert_eq!(repaired, counts.iter().filter(|&&c| c == 0).count());
        assert_eq!(by_heap, by_scan);
    }

    #[test]
    fn large_codebook_on_few_points_stays_finite() {
        let x = random_vectors(1000, 2, 12);
        let mut km = KMeans::new(2, 1 << 16)
            .unwrap()
            .with_params(ClusteringParams::default().with_niter(1));
        km.train(&x).unwrap();
        assert_eq!(km.centroids().len(), 2 << 16);
        assert!(km.centroids().iter().all(|c| c.is_finite()));
        assert_eq!(km.objective().len(), 1);
    }

    #[test]
    fn builders_set_every_field() {
        let params = ClusteringParams::default()
            .with_niter(3)
            .with_nredo(2)
            .with_seed(7)
            .with_verbose(true)
            .with_spherical(true)
            .with_max_points_per_centroid(100)
            .with_min_points_per_centroid(5);
        assert_eq!(
            params,
            ClusteringParams {
                niter: 3,
                nredo: 2,
                seed: 7,
                verbose: true,
                spherical: true,
                max_points_per_centroid: 100,
                min_points_per_centroid: 5,
            }
        );
    }

    #[test]
    fn consecutive_splits_produce_distinct_centroids() {
        let mut centroids = vec![0.0; 4 * 3];
        centroids[..3].copy_from_slice(&[1.0, 1.0, 1.0]);
        let counts = [10, 0, 0, 0];
        assert_eq!(split_empty_clusters(&mut centroids, &counts, 3), 3);
        let rows: Vec<&[f32]> = centroids.chunks_exact(3).collect();
        for i in 0..4 {
            for j in (i + 1)..4 {
                assert_ne!(rows[i], rows[j]);
            }
        }
    }

    #[test]
    fn nearest_centroid_prefers_lowest_index_on_ties() {
        let centroids = [1.0, 0.0, -1.0, 0.0];
        assert_eq!(nearest_centroid(&[0.0, 0.0], &centroids, 2), (0, 1.0));
        assert_eq!(nearest_centroid(&[-0.5, 0.0], &centroids, 2).0, 1);
    }

    #[test]
    fn more_redos_never_hurt() {
        let x = random_vectors(300, 4, 9);
        let params = ClusteringParams::default().with_niter(5);
        let (_, one) = kmeans_clustering(4, 8, &x, params.clone()).unwrap();
        let (_, three) = kmeans_clustering(4, 8, &x, params.with_nredo(3)).unwrap();
        assert!(three <= one);
    }

    #[test]
    fn subsampling_caps_training_set() {
        let x = random_vectors(500, 2, 3);
        let params = ClusteringParams::default()
            .with_niter(3)
            .with_max_points_per_centroid(10);
        let mut km = KMeans::new(2, 4).unwrap().with_params(params);
        km.train(&x).unwrap();
        // 40 sampled points cannot accumulate the error of all 500.
        let full: f32 = km.assign(&x).unwrap().iter().map(|a| a.1).sum();
        assert!(km.final_objective().unwrap() < full);
    }

    #[test]
    fn failed_train_keeps_previous_model() {
        let x = random_vectors(50, 3, 4);
        let mut km = KMeans::new(3, 2).unwrap();
        km.train(&x).unwrap();
        let before = km.centroids().to_vec();

        assert!(matches!(
            km.train(&x[..10]),
            Err(VecError::DimensionMismatch { .. })
        ));
        assert!(matches!(km.train(&[]), Err(VecError::InvalidParameter(_))));
        assert_eq!(km.centroids(), &before[..]);
        assert!(km.is_trained());
    }

    #[test]
    fn assign_before_train_fails() {
        let km = KMeans::new(2, 2).unwrap();
        assert_eq!(km.assign(&[0.0, 0.0]), Err(VecError::NotTrained("KMeans")));
        assert!(km.centroid(0).is_none());
    }

    #[test]
    fn spherical_centroids_are_unit_norm() {
        let x = random_vectors(100, 4, 5);
        let mut km = KMeans::new(4, 3)
            .unwrap()
            .with_params(ClusteringParams::default().with_spherical(true).with_niter(4));
        km.train(&x).unwrap();
        for c in km.centroids().chunks_exact(4) {
            assert!((simd::norm(c) - 1.0).abs() < 1e-4);
        }
    }

    proptest! {
        #[test]
        fn prop_kmeans_train_is_deterministic_given_seed(
            seed in any::<u64>(),
            dimension in 1usize..8,
            num_vectors in 1usize..48,
            k in 1usize..12,
            raw in proptest::collection::vec(-1.0f32..1.0f32, 8usize * 48),
        ) {
            let vectors = &raw[..num_vectors * dimension];
            let params = ClusteringParams::default().with_niter(5).with_seed(seed);

            let mut km1 = KMeans::new(dimension, k).unwrap().with_params(params.clone());
            let mut km2 = KMeans::new(dimension, k).unwrap().with_params(params);
            let t1 = km1.train(vectors).unwrap().to_vec();
            let t2 = km2.train(vectors).unwrap().to_vec();

            prop_assert_eq!(t1, t2);
            prop_assert_eq!(km1.centroids(), km2.centroids());
            prop_assert!(km1.centroids().iter().all(|c| c.is_finite()));
        }

        #[test]
        fn prop_objective_never_increases(
            seed in any::<u64>(),
            k in 1usize..10,
            raw in proptest::collection::vec(-10.0f32..10.0f32, 3usize * 64),
        ) {
            let params = ClusteringParams::default().with_niter(8).with_seed(seed);
            let mut km = KMeans::new(3, k).unwrap().with_params(params);
            let trace = km.train(&raw).unwrap();
            for w in trace.windows(2) {
                prop_assert!(w[1] <= w[0] * (1.0 + 1e-5), "objective rose: {:?}", w);
            }
        }
    }
}
