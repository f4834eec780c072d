//! Fixed-k partition clustering and the search for a good `k`.
//!
//! K-Means comes from smartcore (Lloyd iterations, k-means++ seeding).
//! Every run gets a seed derived from a fixed base, so the selected `k`
//! and the final assignment are reproducible.

use log::{debug, info};
use rayon::prelude::*;
use smartcore::cluster::kmeans::{KMeans, KMeansParameters};
use smartcore::linalg::basic::arrays::Array2;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::clustering::DistanceMatrix;
use crate::core::euclidean_dist;
use crate::error::{GraphError, Result};
use crate::quality::{centroids_and_counts, QualityScore};

/// Fixed seed for deterministic clustering
const CLUSTERING_SEED: u64 = 128;
const MAX_ITER: usize = 300;
/// Restarts per candidate `k`; the best-scoring run wins.
const TRIALS: usize = 3;

/// Perform K-Means clustering using Lloyd's algorithm
///
/// # Arguments
/// * `rows` - Input data as Vec<Vec<f64>> where each inner vec is a sample
/// * `k` - Number of clusters (capped at the number of rows)
/// * `max_iter` - Maximum iterations for convergence
/// * `seed` - Random seed for reproducibility
///
/// # Returns
/// Vector of cluster assignments (0-indexed)
pub fn kmeans_lloyd(rows: &[Vec<f64>], k: usize, max_iter: usize, seed: u64) -> Result<Vec<usize>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let (n, f) = (rows.len(), rows[0].len());
    let k = k.min(n);

    let x: DenseMatrix<f64> =
        DenseMatrix::from_iterator(rows.iter().flatten().copied(), n, f, 0);

    let params = KMeansParameters {
        k,
        max_iter,
        seed: Some(seed),
    };

    let km: KMeans<f64, usize, DenseMatrix<f64>, Vec<usize>> = KMeans::fit(&x, params)
        .map_err(|e| GraphError::Clustering(format!("k-means fit failed: {}", e)))?;
    km.predict(&x)
        .map_err(|e| GraphError::Clustering(format!("k-means predict failed: {}", e)))
}

/// Relabel so labels are `0..c` in order of first appearance, dropping
/// empty clusters. Returns the relabelled assignment and `c`.
pub fn compact_labels(assignments: &[usize]) -> (Vec<usize>, usize) {
    let mut map: Vec<Option<usize>> = Vec::new();
    let mut next = 0;
    let relabelled: Vec<usize> = assignments
        .iter()
        .map(|&a| {
            if a >= map.len() {
                map.resize(a + 1, None);
            }
            *map[a].get_or_insert_with(|| {
                next += 1;
                next - 1
            })
        })
        .collect();
    (relabelled, next)
}

/// Outcome of a partition run.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionResult {
    pub labels: Vec<usize>,
    pub n_clusters: usize,
    /// Quality score of the chosen `k` (0 when `k` was given).
    pub score: f64,
    /// Pseudo-confidence: `1 - d / d_max` to the own centroid.
    pub probabilities: Vec<f64>,
}

#[derive(Clone, Copy, Debug)]
pub struct PartitionClusterer {
    k_range: (usize, usize),
    quality: QualityScore,
}

impl PartitionClusterer {
    pub fn new(k_range: (usize, usize), quality: QualityScore) -> Self {
        Self { k_range, quality }
    }

    /// Candidate range scaled to dataset size, capped at `n - 1`.
    pub fn k_range_for(n: usize) -> (usize, usize) {
        let (lo, hi) = if n < 50 {
            (2, 6)
        } else if n < 200 {
            (3, 12)
        } else if n < 1000 {
            (4, 20)
        } else {
            (6, 30)
        };
        let hi = hi.min(n.saturating_sub(1)).max(2);
        (lo.min(hi), hi)
    }

    /// Run with a given `k`.
    pub fn fit_k(&self, rows: &[Vec<f64>], k: usize) -> Result<PartitionResult> {
        info!("Running k-means with k={}", k);
        let raw = kmeans_lloyd(rows, k, MAX_ITER, CLUSTERING_SEED)?;
        let (labels, n_clusters) = compact_labels(&raw);
        let probabilities = centroid_confidence(rows, &labels, n_clusters);
        Ok(PartitionResult {
            labels,
            n_clusters,
            score: 0.0,
            probabilities,
        })
    }

    /// Search `k` over the configured range and keep the best-separated
    /// partition. Ties prefer the smaller `k`.
    pub fn fit(&self, rows: &[Vec<f64>], distances: &DistanceMatrix) -> Result<PartitionResult> {
        let (k_min, k_max) = self.k_range;
        info!(
            "Searching k in [{}, {}] by {:?} over {} points",
            k_min,
            k_max,
            self.quality,
            rows.len()
        );

        let scored: Vec<(usize, Vec<usize>, f64)> = (k_min..=k_max)
            .into_par_iter()
            .map(|k| -> Result<Option<(usize, Vec<usize>, f64)>> {
                let mut best: Option<(Vec<usize>, f64)> = None;
                for trial in 0..TRIALS {
                    // base + k*1000 + trial
                    let seed = CLUSTERING_SEED
                        .wrapping_add((k as u64) * 1000)
                        .wrapping_add(trial as u64);
                    let raw = kmeans_lloyd(rows, k, MAX_ITER, seed)?;
                    let (labels, found) = compact_labels(&raw);
                    if found < 2 {
                        continue;
                    }
                    let score = self.quality.score(rows, distances, &labels, found);
                    if best.as_ref().map_or(true, |(_, s)| score > *s) {
                        best = Some((labels, score));
                    }
                }
                Ok(best.map(|(labels, score)| {
                    debug!("k={}: {:?}={:.4}", k, self.quality, score);
                    (k, labels, score)
                }))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        // sequential pick keeps the choice independent of thread scheduling
        let mut chosen: Option<(usize, Vec<usize>, f64)> = None;
        for candidate in scored {
            if chosen.as_ref().map_or(true, |(_, _, s)| candidate.2 > *s) {
                chosen = Some(candidate);
            }
        }

        match chosen {
            Some((k, labels, score)) => {
                let (labels, n_clusters) = compact_labels(&labels);
                info!(
                    "Optimal k determined: {} ({:?}={:.3})",
                    k, self.quality, score
                );
                let probabilities = centroid_confidence(rows, &labels, n_clusters);
                Ok(PartitionResult {
                    labels,
                    n_clusters,
                    score,
                    probabilities,
                })
            }
            None => {
                // degenerate data: no k produced two non-empty clusters
                self.fit_k(rows, k_min)
            }
        }
    }
}

fn centroid_confidence(rows: &[Vec<f64>], labels: &[usize], k: usize) -> Vec<f64> {
    let centroids = centroids_and_counts(rows, labels, k);
    let dists: Vec<f64> = labels
        .iter()
        .enumerate()
        .map(|(i, &c)| euclidean_dist(&rows[i], &centroids[c].0))
        .collect();
    let max_dist = dists.iter().fold(0.0f64, |a, &b| a.max(b)) + 1e-10;
    dists.iter().map(|d| 1.0 - d / max_dist).collect()
}
