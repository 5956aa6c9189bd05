//! Search results and bounded top-k selection.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, TryReserveError};

use crate::distance::DistanceMetric;
use crate::{Result, VecError};

/// k-NN results for a batch of queries, `nq x k` row-major.
///
/// Rows with fewer than `k` hits are padded with label `-1` and the metric's
/// worst score.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    k: usize,
    labels: Vec<i64>,
    distances: Vec<f32>,
}

impl SearchResults {
    /// Pack per-query hit lists (best first, at most `k` each).
    ///
    /// Fails with [`VecError::InvalidParameter`] if the padded `nq x k` output
    /// cannot be allocated.
    pub(crate) fn from_rows(
        k: usize,
        rows: Vec<Vec<(i64, f32)>>,
        metric: DistanceMetric,
    ) -> Result<Self> {
        let len = rows.len().checked_mul(k).ok_or_else(|| {
            VecError::InvalidParameter(format!("{} queries x k = {k} overflows", rows.len()))
        })?;
        let too_large =
            |_: TryReserveError| VecError::InvalidParameter(format!("k = {k} is too large"));
        let mut labels: Vec<i64> = Vec::new();
        labels.try_reserve_exact(len).map_err(too_large)?;
        let mut distances: Vec<f32> = Vec::new();
        distances.try_reserve_exact(len).map_err(too_large)?;
        for hits in rows {
            let filled = hits.len().min(k);
            for &(label, score) in hits.iter().take(k) {
                labels.push(label);
                distances.push(score);
            }
            for _ in filled..k {
                labels.push(-1);
                distances.push(metric.worst());
            }
        }
        Ok(Self {
            k,
            labels,
            distances,
        })
    }

    /// Number of queries.
    pub fn nq(&self) -> usize {
        if self.k == 0 {
            0
        } else {
            self.labels.len() / self.k
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn distances(&self) -> &[f32] {
        &self.distances
    }

    /// Labels and scores of query `i`, padding included.
    pub fn query(&self, i: usize) -> Option<(&[i64], &[f32])> {
        if i >= self.nq() {
            return None;
        }
        let range = i * self.k..(i + 1) * self.k;
        Some((&self.labels[range.clone()], &self.distances[range]))
    }

    /// Real hits of query `i`, best first.
    pub fn neighbors(&self, i: usize) -> Vec<(i64, f32)> {
        self.query(i)
            .map(|(labels, distances)| {
                labels
                    .iter()
                    .zip(distances)
                    .filter(|&(&l, _)| l >= 0)
                    .map(|(&l, &d)| (l, d))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Heap entry ordered so that the *worst* candidate sits on top.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    /// Score mapped so that smaller is better for every metric.
    key: f32,
    score: f32,
    label: i64,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .total_cmp(&other.key)
            .then(self.label.cmp(&other.label))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Keeps the `k` best `(label, score)` pairs seen so far.
///
/// Ties on score go to the lower label, independent of insertion order.
pub(crate) struct TopK {
    k: usize,
    metric: DistanceMetric,
    heap: BinaryHeap<Candidate>,
}

impl TopK {
    /// Selector for the best `k` out of at most `candidates` pushes.
    pub(crate) fn new(k: usize, metric: DistanceMetric, candidates: usize) -> Self {
        Self {
            k,
            metric,
            heap: BinaryHeap::with_capacity(k.min(candidates)),
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, label: i64, score: f32) {
        if self.k == 0 {
            return;
        }
        let key = match self.metric {
            DistanceMetric::L2 => score,
            DistanceMetric::InnerProduct => -score,
        };
        let candidate = Candidate { key, score, label };
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    /// Hits ordered best first.
    pub(crate) fn into_sorted(self) -> Vec<(i64, f32)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| (c.label, c.score))
            .collect()
    }
}
