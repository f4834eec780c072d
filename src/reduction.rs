//! # Random projection ahead of clustering
//!
//! Density clustering in a 384-dimensional embedding space suffers from
//! distance concentration and quadratic cost in the dimension. Embeddings
//! are therefore projected to a handful of dimensions first.
//!
//! A Gaussian random projection is linear and parameter-light, and by the
//! Johnson–Lindenstrauss lemma keeps pairwise distances within `(1 ± ε)`
//! for `r = O(log n / ε²)` target dimensions, which is what the
//! neighbourhood-based clustering downstream relies on. The projection
//! matrix is never stored: it is regenerated from a seed, so a fixed seed
//! gives identical reductions across runs.
//!
//! Small inputs are left alone: below [`MIN_ROWS_FOR_REDUCTION`] rows or at
//! or below [`MAX_DIM_WITHOUT_REDUCTION`] features the data is passed
//! through unchanged.

use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

pub const MIN_ROWS_FOR_REDUCTION: usize = 5;
pub const MAX_DIM_WITHOUT_REDUCTION: usize = 50;

/// Fixed seed so clustering input is reproducible.
pub const PROJECTION_SEED: u64 = 42;

/// Gaussian projection regenerated from its seed on every call.
#[derive(Clone, Debug)]
pub struct ImplicitProjection {
    pub(crate) original_dim: usize,
    pub(crate) reduced_dim: usize,
    pub(crate) seed: u64,
}

impl ImplicitProjection {
    pub fn new(original_dim: usize, reduced_dim: usize) -> Self {
        Self::with_seed(original_dim, reduced_dim, PROJECTION_SEED)
    }

    pub fn with_seed(original_dim: usize, reduced_dim: usize, seed: u64) -> Self {
        Self {
            original_dim,
            reduced_dim,
            seed,
        }
    }

    pub fn reduced_dim(&self) -> usize {
        self.reduced_dim
    }

    /// Project one row without materialising the matrix.
    pub fn project(&self, row: &[f64]) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let scale = 1.0 / (self.reduced_dim as f64).sqrt();

        let mut result = vec![0.0; self.reduced_dim];
        for value in row.iter().take(self.original_dim) {
            for r in result.iter_mut() {
                let sample: f64 = StandardNormal.sample(&mut rng);
                *r += value * sample * scale;
            }
        }
        result
    }

    pub fn project_rows(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        debug!(
            "Projecting {} rows: {} -> {} dims (seed {})",
            rows.len(),
            self.original_dim,
            self.reduced_dim,
            self.seed
        );
        rows.par_iter().map(|row| self.project(row)).collect()
    }
}

/// Reduce embeddings ahead of density clustering when worthwhile.
///
/// The target dimension is capped at `n - 2` (and floored at 2) so tiny
/// datasets never get more axes than points can span.
pub fn reduce_for_clustering(rows: &[Vec<f64>], target_dim: usize) -> Vec<Vec<f64>> {
    let n = rows.len();
    let dim = rows.first().map(|r| r.len()).unwrap_or(0);

    if n < MIN_ROWS_FOR_REDUCTION {
        info!("Dataset too small ({} items), skipping projection", n);
        return rows.to_vec();
    }
    if dim <= MAX_DIM_WITHOUT_REDUCTION {
        debug!("{} dims is low enough, skipping projection", dim);
        return rows.to_vec();
    }

    let target = target_dim.min(n - 2).max(2);
    info!("Reducing dimensions from {} to {}", dim, target);
    ImplicitProjection::new(dim, target).project_rows(rows)
}
