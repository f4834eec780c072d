//! Cluster discovery with a density-first, partition-fallback policy.
//!
//! This module provides:
//! - `DistanceMatrix`: pairwise euclidean distances shared by both strategies
//!   and by the silhouette score
//! - `ClusterStrategy` trait with two swappable implementations,
//!   `DensityStrategy` (no fixed k, may leave noise) and `PartitionStrategy`
//!   (k-means with a k search, never leaves noise)
//! - `ClusterEngine`: projects the vectors, runs the primary strategy,
//!   evaluates the pure predicate [`needs_fallback`] and conditionally runs
//!   the fallback
//!
//! The minimum group size scales with the dataset ([`effective_min_cluster_size`])
//! and so does the accepted noise ratio ([`noise_tolerance`]).
//!
//! **DETERMINISTIC**: projection and k-means use fixed seeds, density
//! clustering has no randomness, so identical input gives identical labels.

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{ClusteringMode, ClusteringParams};
use crate::core::euclidean_dist;
use crate::density::DensityClusterer;
use crate::error::{GraphError, Result};
use crate::partition::PartitionClusterer;
use crate::quality::QualityScore;
use crate::reduction::reduce_for_clustering;

/// Below this many items clustering is skipped altogether.
pub const MIN_ITEMS_FOR_CLUSTERING: usize = 3;

/// Datasets above this size get a proportional minimum group size.
const SCALING_THRESHOLD: usize = 100;
const SCALING_FRACTION: f64 = 0.02;
const SCALED_MIN: usize = 5;
const SCALED_MAX: usize = 40;

/// Dense symmetric matrix of pairwise euclidean distances.
#[derive(Clone, Debug)]
pub struct DistanceMatrix {
    n: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    pub fn from_rows(rows: &[Vec<f64>]) -> Self {
        let n = rows.len();
        let data: Vec<f64> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| (0..n).map(move |j| euclidean_dist(&rows[i], &rows[j])))
            .collect();
        debug!("Distance matrix computed: {}x{}", n, n);
        Self { n, data }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn max(&self) -> f64 {
        self.data.iter().fold(0.0f64, |a, &b| a.max(b))
    }
}

/// Strategy that actually produced the reported assignment.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringMethod {
    /// Density clustering (primary).
    Density,
    /// Partition clustering (fallback or explicitly requested).
    Partition,
    /// Too few or indistinguishable items: one implicit cluster.
    Single,
}

/// Why the primary result was discarded.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "trigger")]
pub enum FallbackReason {
    TooFewClusters { found: usize },
    TooMuchNoise { ratio: f64, tolerance: f64 },
}

/// Input shared by every strategy of one run.
pub struct ClusterInput<'a> {
    /// Possibly projected vectors.
    pub rows: &'a [Vec<f64>],
    pub distances: &'a DistanceMatrix,
    /// Minimum group size after scaling.
    pub min_cluster_size: usize,
}

/// Raw result of one strategy.
#[derive(Clone, Debug, PartialEq)]
pub struct StrategyOutput {
    pub labels: Vec<Option<usize>>,
    pub probabilities: Vec<f64>,
    pub n_clusters: usize,
}

impl StrategyOutput {
    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_none()).count()
    }

    pub fn noise_ratio(&self) -> f64 {
        if self.labels.is_empty() {
            0.0
        } else {
            self.noise_count() as f64 / self.labels.len() as f64
        }
    }
}

/// One way of grouping items; the engine composes two of them.
pub trait ClusterStrategy: Send + Sync {
    fn method(&self) -> ClusteringMethod;

    fn cluster(&self, input: &ClusterInput<'_>) -> Result<StrategyOutput>;
}

/// Density clustering without a fixed cluster count.
#[derive(Clone, Copy, Debug, Default)]
pub struct DensityStrategy {
    pub min_samples: Option<usize>,
}

impl ClusterStrategy for DensityStrategy {
    fn method(&self) -> ClusteringMethod {
        ClusteringMethod::Density
    }

    fn cluster(&self, input: &ClusterInput<'_>) -> Result<StrategyOutput> {
        let min_samples = self.min_samples.map(|s| s.min(input.rows.len()));
        let result =
            DensityClusterer::new(input.min_cluster_size, min_samples).fit(input.distances);
        Ok(StrategyOutput {
            labels: result.labels,
            probabilities: result.probabilities,
            n_clusters: result.n_clusters,
        })
    }
}

/// K-Means with either a fixed `k` or a size-scaled k search.
#[derive(Clone, Copy, Debug, Default)]
pub struct PartitionStrategy {
    pub k: Option<usize>,
    pub quality: QualityScore,
}

impl ClusterStrategy for PartitionStrategy {
    fn method(&self) -> ClusteringMethod {
        ClusteringMethod::Partition
    }

    fn cluster(&self, input: &ClusterInput<'_>) -> Result<StrategyOutput> {
        let n = input.rows.len();
        let k_range = PartitionClusterer::k_range_for(n);
        let clusterer = PartitionClusterer::new(k_range, self.quality);
        let result = match self.k {
            Some(k) => clusterer.fit_k(input.rows, k.min(n))?,
            None => clusterer.fit(input.rows, input.distances)?,
        };
        Ok(StrategyOutput {
            labels: result.labels.into_iter().map(Some).collect(),
            probabilities: result.probabilities,
            n_clusters: result.n_clusters,
        })
    }
}

/// Final per-item assignment plus how it was obtained.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterAssignment {
    /// Cluster per item, `None` for noise.
    pub labels: Vec<Option<usize>>,
    /// Membership confidence in [0, 1].
    pub probabilities: Vec<f64>,
    pub n_clusters: usize,
    pub method: ClusteringMethod,
    pub fallback_reason: Option<FallbackReason>,
    pub min_cluster_size_used: usize,
}

impl ClusterAssignment {
    /// Everything in cluster 0 (or nothing for an empty input).
    pub fn single(n: usize, min_cluster_size: usize) -> Self {
        Self {
            labels: vec![Some(0); n],
            probabilities: vec![1.0; n],
            n_clusters: usize::from(n > 0),
            method: ClusteringMethod::Single,
            fallback_reason: None,
            min_cluster_size_used: min_cluster_size,
        }
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_none()).count()
    }

    pub fn noise_ratio(&self) -> f64 {
        if self.labels.is_empty() {
            0.0
        } else {
            self.noise_count() as f64 / self.labels.len() as f64
        }
    }

    /// Item indices of cluster `c`.
    pub fn members(&self, c: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == Some(c))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for c in self.labels.iter().flatten() {
            sizes[*c] += 1;
        }
        sizes
    }
}

/// Minimum group size after scaling to `n` items.
///
/// Above 100 items `m` grows to 2% of `n` clamped to [5, 40]; when `n`
/// cannot hold two groups of `m`, `m` shrinks to `max(2, n / 2)`.
pub fn effective_min_cluster_size(n: usize, requested: usize) -> usize {
    let mut m = requested.max(2);
    if n > SCALING_THRESHOLD {
        let scaled = ((SCALING_FRACTION * n as f64).round() as usize).clamp(SCALED_MIN, SCALED_MAX);
        m = m.max(scaled);
    }
    if n < 2 * m {
        m = (n / 2).max(2);
    }
    m
}

/// Largest acceptable noise ratio of a density result over `n` items.
pub fn noise_tolerance(n: usize) -> f64 {
    if n < 100 {
        0.5
    } else if n < 1000 {
        0.4
    } else {
        0.3
    }
}

/// Pure fallback predicate over a primary result.
pub fn needs_fallback(output: &StrategyOutput) -> Option<FallbackReason> {
    if output.n_clusters < 2 {
        return Some(FallbackReason::TooFewClusters {
            found: output.n_clusters,
        });
    }
    let ratio = output.noise_ratio();
    let tolerance = noise_tolerance(output.labels.len());
    if ratio > tolerance {
        return Some(FallbackReason::TooMuchNoise { ratio, tolerance });
    }
    None
}

/// Two-stage clustering: primary strategy, quality predicate, fallback.
pub struct ClusterEngine {
    params: ClusteringParams,
    primary: Box<dyn ClusterStrategy>,
    fallback: Box<dyn ClusterStrategy>,
}

impl ClusterEngine {
    pub fn new(params: ClusteringParams) -> Self {
        let primary = Box::new(DensityStrategy {
            min_samples: params.min_samples,
        });
        let fallback = Box::new(PartitionStrategy {
            k: params.k,
            quality: params.quality,
        });
        Self {
            params,
            primary,
            fallback,
        }
    }

    pub fn with_primary(mut self, primary: Box<dyn ClusterStrategy>) -> Self {
        self.primary = primary;
        self
    }

    pub fn with_fallback(mut self, fallback: Box<dyn ClusterStrategy>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn params(&self) -> &ClusteringParams {
        &self.params
    }

    pub fn cluster(&self, vectors: &[Vec<f64>]) -> Result<ClusterAssignment> {
        let n = vectors.len();
        let m = effective_min_cluster_size(n, self.params.min_cluster_size);
        info!(
            "Clustering {} items: mode={:?}, min_cluster_size={} (requested {})",
            n, self.params.mode, m, self.params.min_cluster_size
        );

        if n < MIN_ITEMS_FOR_CLUSTERING {
            info!("Only {} items, using a single implicit cluster", n);
            return Ok(ClusterAssignment::single(n, m));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != vectors[0].len()) {
            return Err(GraphError::DimensionMismatch {
                expected: vectors[0].len(),
                got: bad.len(),
            });
        }

        let rows = reduce_for_clustering(vectors, self.params.reduced_dimension);
        let distances = DistanceMatrix::from_rows(&rows);
        if distances.max() < 1e-12 {
            warn!("All {} items coincide, using a single implicit cluster", n);
            return Ok(ClusterAssignment::single(n, m));
        }

        let input = ClusterInput {
            rows: &rows,
            distances: &distances,
            min_cluster_size: m,
        };

        let skip_primary = match self.params.mode {
            ClusteringMode::Partition => true,
            ClusteringMode::Auto => self.params.k.is_some(),
            ClusteringMode::Density => false,
        };
        if skip_primary {
            let output = self.fallback.cluster(&input)?;
            return Ok(self.finish(output, self.fallback.method(), None, m));
        }

        let primary = self.primary.cluster(&input)?;
        info!(
            "{:?} clustering: {} clusters, noise ratio {:.2}",
            self.primary.method(),
            primary.n_clusters,
            primary.noise_ratio()
        );

        if self.params.mode == ClusteringMode::Density {
            return Ok(self.finish(primary, self.primary.method(), None, m));
        }

        match needs_fallback(&primary) {
            None => Ok(self.finish(primary, self.primary.method(), None, m)),
            Some(reason) => {
                warn!(
                    "{:?} clustering unusable ({:?}), falling back to {:?}",
                    self.primary.method(),
                    reason,
                    self.fallback.method()
                );
                let output = self.fallback.cluster(&input)?;
                if output.noise_count() > 0 {
                    return Err(GraphError::Clustering(format!(
                        "fallback strategy left {} noise points",
                        output.noise_count()
                    )));
                }
                Ok(self.finish(output, self.fallback.method(), Some(reason), m))
            }
        }
    }

    fn finish(
        &self,
        output: StrategyOutput,
        method: ClusteringMethod,
        fallback_reason: Option<FallbackReason>,
        min_cluster_size_used: usize,
    ) -> ClusterAssignment {
        let assignment = ClusterAssignment {
            labels: output.labels,
            probabilities: output.probabilities,
            n_clusters: output.n_clusters,
            method,
            fallback_reason,
            min_cluster_size_used,
        };
        info!(
            "Clustering done with {:?}: {} clusters, {} noise points",
            assignment.method,
            assignment.n_clusters,
            assignment.noise_count()
        );
        assignment
    }
}

/// Mean embedding of every cluster; noise is ignored.
pub fn cluster_centroids(
    vectors: &[Vec<f64>],
    labels: &[Option<usize>],
    n_clusters: usize,
) -> Vec<Vec<f64>> {
    let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
    let mut sums = vec![vec![0.0; dim]; n_clusters];
    let mut counts = vec![0usize; n_clusters];
    for (v, label) in vectors.iter().zip(labels) {
        if let Some(c) = *label {
            for (acc, x) in sums[c].iter_mut().zip(v) {
                *acc += x;
            }
            counts[c] += 1;
        }
    }
    for (sum, count) in sums.iter_mut().zip(&counts) {
        if *count > 0 {
            sum.iter_mut().for_each(|x| *x /= *count as f64);
        }
    }
    sums
}
