//! Principal component projection.
//!
//! Training computes the mean and covariance of the training set (in `f64`),
//! diagonalizes the covariance with cyclic Jacobi rotations and keeps the
//! `d_out` eigenvectors with the largest eigenvalues. Projected training data
//! therefore has per-component energy `n * eigenvalue_i`, non-increasing in
//! component rank.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::VectorTransform;
use crate::buffer::num_rows;
use crate::{Result, VecError};

/// Sweep limit for the Jacobi eigensolver; well-conditioned inputs converge in
/// fewer than 15.
const MAX_SWEEPS: usize = 64;

/// Linear projection onto the leading principal components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaMatrix {
    d_in: usize,
    d_out: usize,
    /// Output component `i` is scaled by `eigenvalue_i ^ eigen_power`.
    eigen_power: f32,
    mean: Vec<f32>,
    /// Descending, length `d_out`.
    eigenvalues: Vec<f32>,
    /// `d_out x d_in`, row-major, orthonormal rows.
    components: Vec<f32>,
    trained: bool,
}

impl PcaMatrix {
    /// Create an untrained projection from `d_in` to `d_out` dimensions.
    pub fn new(d_in: usize, d_out: usize) -> Result<Self> {
        if d_out == 0 || d_out > d_in {
            return Err(VecError::InvalidDimension(format!(
                "PCA output dimension {d_out} must be in 1..={d_in}"
            )));
        }
        Ok(Self {
            d_in,
            d_out,
            eigen_power: 0.0,
            mean: Vec::new(),
            eigenvalues: Vec::new(),
            components: Vec::new(),
            trained: false,
        })
    }

    /// Scale outputs by `eigenvalue ^ power`; `-0.5` whitens.
    #[must_use]
    pub fn with_eigen_power(mut self, power: f32) -> Self {
        self.eigen_power = power;
        self
    }

    pub fn eigenvalues(&self) -> &[f32] {
        &self.eigenvalues
    }

    /// Principal axes, `d_out x d_in` row-major, strongest first.
    pub fn components(&self) -> &[f32] {
        &self.components
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    fn scale(&self, component: usize) -> f32 {
        if self.eigen_power == 0.0 {
            1.0
        } else {
            self.eigenvalues[component]
                .max(f32::MIN_POSITIVE)
                .powf(self.eigen_power)
        }
    }
}

impl VectorTransform for PcaMatrix {
    fn d_in(&self) -> usize {
        self.d_in
    }

    fn d_out(&self) -> usize {
        self.d_out
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        let d = self.d_in;
        let n = num_rows(vectors, d)?;
        if n == 0 {
            return Err(VecError::InvalidParameter(
                "PCA needs at least one training vector".to_string(),
            ));
        }

        let mut mean = vec![0.0f64; d];
        for v in vectors.chunks_exact(d) {
            for (m, &x) in mean.iter_mut().zip(v) {
                *m += f64::from(x);
            }
        }
        mean.iter_mut().for_each(|m| *m /= n as f64);

        let mut cov = vec![0.0f64; d * d];
        let mut centered = vec![0.0f64; d];
        for v in vectors.chunks_exact(d) {
            for ((c, &x), &m) in centered.iter_mut().zip(v).zip(&mean) {
                *c = f64::from(x) - m;
            }
            for i in 0..d {
                let ci = centered[i];
                if ci == 0.0 {
                    continue;
                }
                let row = &mut cov[i * d..(i + 1) * d];
                for j in i..d {
                    row[j] += ci * centered[j];
                }
            }
        }
        for i in 0..d {
            for j in i..d {
                let c = cov[i * d + j] / n as f64;
                cov[i * d + j] = c;
                cov[j * d + i] = c;
            }
        }

        let (values, vectors_t, sweeps) = symmetric_eigen(cov, d);

        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));

        let mut eigenvalues = Vec::with_capacity(self.d_out);
        let mut components = Vec::with_capacity(self.d_out * d);
        for &col in order.iter().take(self.d_out) {
            eigenvalues.push(values[col] as f32);
            let axis: Vec<f64> = (0..d).map(|r| vectors_t[r * d + col]).collect();
            // Sign convention: largest-magnitude coordinate positive.
            let pivot = axis
                .iter()
                .copied()
                .fold(0.0f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
            let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
            components.extend(axis.iter().map(|&x| (sign * x) as f32));
        }

        debug!(
            d_in = d,
            d_out = self.d_out,
            sweeps,
            leading_eigenvalue = eigenvalues.first().copied().unwrap_or(0.0),
            "trained PCA"
        );

        self.mean = mean.into_iter().map(|m| m as f32).collect();
        self.eigenvalues = eigenvalues;
        self.components = components;
        self.trained = true;
        Ok(())
    }

    fn apply(&self, vectors: &[f32]) -> Result<Vec<f32>> {
        if !self.trained {
            return Err(VecError::NotTrained("PcaMatrix"));
        }
        let n = num_rows(vectors, self.d_in)?;
        let mut out = Vec::with_capacity(n * self.d_out);
        let mut centered = vec![0.0f32; self.d_in];
        for v in vectors.chunks_exact(self.d_in) {
            for ((c, &x), &m) in centered.iter_mut().zip(v).zip(&self.mean) {
                *c = x - m;
            }
            for (i, axis) in self.components.chunks_exact(self.d_in).enumerate() {
                out.push(crate::simd::dot(axis, &centered) * self.scale(i));
            }
        }
        Ok(out)
    }

    fn reverse_transform(&self, projected: &[f32]) -> Result<Vec<f32>> {
        if !self.trained {
            return Err(VecError::NotTrained("PcaMatrix"));
        }
        let n = num_rows(projected, self.d_out)?;
        let mut out = Vec::with_capacity(n * self.d_in);
        for y in projected.chunks_exact(self.d_out) {
            let mut x = self.mean.clone();
            for (i, axis) in self.components.chunks_exact(self.d_in).enumerate() {
                crate::simd::axpy(y[i] / self.scale(i), axis, &mut x);
            }
            out.extend_from_slice(&x);
        }
        Ok(out)
    }
}

/// Eigen-decomposition of a symmetric `n x n` matrix by cyclic Jacobi rotations.
///
/// Returns unsorted eigenvalues, the eigenvectors as the columns of a row-major
/// `n x n` matrix, and the number of sweeps performed.
fn symmetric_eigen(mut a: Vec<f64>, n: usize) -> (Vec<f64>, Vec<f64>, usize) {
    let mut v = vec![0.0f64; n * n];
    for i in 0..n {
        v[i * n + i] = 1.0;
    }

    let total: f64 = a.iter().map(|x| x * x).sum();
    let mut sweeps = 0;
    while sweeps < MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
            .map(|(p, q)| a[p * n + q] * a[p * n + q])
            .sum();
        if off <= total * 1e-24 || off == 0.0 {
            break;
        }
        sweeps += 1;

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p * n + q];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[q * n + q] - a[p * n + p]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[k * n + p];
                    let akq = a[k * n + q];
                    a[k * n + p] = c * akp - s * akq;
                    a[k * n + q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[p * n + k];
                    let aqk = a[q * n + k];
                    a[p * n + k] = c * apk - s * aqk;
                    a[q * n + k] = s * apk + c * aqk;
                }
                a[p * n + q] = 0.0;
                a[q * n + p] = 0.0;

                for k in 0..n {
                    let vkp = v[k * n + p];
                    let vkq = v[k * n + q];
                    v[k * n + p] = c * vkp - s * vkq;
                    v[k * n + q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let values = (0..n).map(|i| a[i * n + i]).collect();
    (values, v, sweeps)
}
