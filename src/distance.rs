//! Distance metrics for dense vectors.
//!
//! Every index in this crate is parameterized by a [`DistanceMetric`]. The two
//! metrics rank in opposite directions: squared L2 is a *distance* (smaller is
//! better) while inner product is a *similarity* (larger is better). Search
//! results report the raw value for either metric; use [`DistanceMetric::is_better`]
//! rather than comparing scores directly.
//!
//! ## Important nuance
//!
//! [`DistanceMetric::L2`] returns the **squared** Euclidean distance. Nothing in
//! the crate takes square roots, since ranking is unaffected and quantization
//! error is defined on squared distances.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::simd;

/// Distance metric for dense vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Squared Euclidean distance (smaller is closer).
    #[default]
    L2,
    /// Inner product (larger is closer), for maximum inner product search.
    InnerProduct,
}

impl DistanceMetric {
    /// Score between two vectors under this metric.
    ///
    /// If dimensions mismatch, this returns the worst possible score (so it is
    /// never selected as a nearest neighbor).
    #[inline]
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return self.worst();
        }
        match self {
            DistanceMetric::L2 => simd::l2_distance_squared(a, b),
            DistanceMetric::InnerProduct => simd::dot(a, b),
        }
    }

    /// The score no real neighbor can lose to; used to pad result slots.
    #[inline]
    #[must_use]
    pub fn worst(self) -> f32 {
        match self {
            DistanceMetric::L2 => f32::INFINITY,
            DistanceMetric::InnerProduct => f32::NEG_INFINITY,
        }
    }

    /// True if score `a` ranks strictly ahead of score `b`.
    #[inline]
    #[must_use]
    pub fn is_better(self, a: f32, b: f32) -> bool {
        self.rank(a, b) == Ordering::Less
    }

    /// Total order on scores, best first.
    #[inline]
    #[must_use]
    pub fn rank(self, a: f32, b: f32) -> Ordering {
        match self {
            DistanceMetric::L2 => a.total_cmp(&b),
            DistanceMetric::InnerProduct => b.total_cmp(&a),
        }
    }
}

/// Squared L2 distance.
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    DistanceMetric::L2.distance(a, b)
}

/// Inner product.
#[inline]
#[must_use]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    DistanceMetric::InnerProduct.distance(a, b)
}

/// Normalize a vector to unit L2 norm in place. Zero vectors are left untouched.
#[inline]
pub fn normalize_in_place(v: &mut [f32]) {
    let n = simd::norm(v);
    if n > 1e-10 {
        for x in v.iter_mut() {
            *x /= n;
        }
    }
}
