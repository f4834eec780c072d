//! ClusterEngine: size scaling, the fallback predicate and the two-stage
//! strategy selection.

use approx::assert_relative_eq;
use log::info;

use crate::clustering::{
    cluster_centroids, effective_min_cluster_size, needs_fallback, noise_tolerance,
    ClusterEngine, ClusterInput, ClusterStrategy, ClusteringMethod, DistanceMatrix,
    FallbackReason, StrategyOutput,
};
use crate::config::{ClusteringMode, ClusteringParams};
use crate::error::Result;
use crate::tests::init;
use crate::tests::test_data::make_blobs_on_sphere;

/// Primary stand-in returning a fixed cluster count and noise share.
struct FixedOutcome {
    clusters: usize,
    noise_ratio: f64,
}

impl ClusterStrategy for FixedOutcome {
    fn method(&self) -> ClusteringMethod {
        ClusteringMethod::Density
    }

    fn cluster(&self, input: &ClusterInput<'_>) -> Result<StrategyOutput> {
        let n = input.rows.len();
        let noisy = (self.noise_ratio * n as f64).round() as usize;
        let labels = (0..n)
            .map(|i| if i < n - noisy { Some(i % self.clusters) } else { None })
            .collect();
        Ok(StrategyOutput {
            labels,
            probabilities: vec![0.5; n],
            n_clusters: self.clusters,
        })
    }
}

fn output(labels: Vec<Option<usize>>, n_clusters: usize) -> StrategyOutput {
    let n = labels.len();
    StrategyOutput {
        labels,
        probabilities: vec![1.0; n],
        n_clusters,
    }
}

#[test]
fn test_min_cluster_size_scales_with_dataset() {
    assert_eq!(effective_min_cluster_size(10, 3), 3);
    assert_eq!(effective_min_cluster_size(100, 3), 3);
    // 2% of 289 rounds to 6
    assert_eq!(effective_min_cluster_size(289, 3), 6);
    assert_eq!(effective_min_cluster_size(150, 10), 10);
    // clamped to the upper band
    assert_eq!(effective_min_cluster_size(5000, 3), 40);
    // clamped to the lower band
    assert_eq!(effective_min_cluster_size(120, 2), 5);
    // shrinks when two groups cannot fit
    assert_eq!(effective_min_cluster_size(5, 3), 2);
    assert_eq!(effective_min_cluster_size(12, 10), 6);
}

#[test]
fn test_noise_tolerance_tightens_with_size() {
    assert_relative_eq!(noise_tolerance(50), 0.5);
    assert_relative_eq!(noise_tolerance(289), 0.4);
    assert_relative_eq!(noise_tolerance(5000), 0.3);
}

#[test]
fn test_fallback_predicate() {
    let one = output(vec![Some(0), Some(0), None, None], 1);
    assert_eq!(needs_fallback(&one), Some(FallbackReason::TooFewClusters { found: 1 }));

    let none = output(vec![None; 6], 0);
    assert_eq!(needs_fallback(&none), Some(FallbackReason::TooFewClusters { found: 0 }));

    // 6 of 10 noise > 0.5
    let mut labels = vec![Some(0), Some(0), Some(1), Some(1)];
    labels.extend(vec![None; 6]);
    match needs_fallback(&output(labels, 2)) {
        Some(FallbackReason::TooMuchNoise { ratio, tolerance }) => {
            assert_relative_eq!(ratio, 0.6);
            assert_relative_eq!(tolerance, 0.5);
        }
        other => panic!("expected noise trigger, got {:?}", other),
    }

    // 5 of 10 noise sits exactly on the tolerance
    let mut labels = vec![Some(0), Some(0), Some(1), Some(1), Some(1)];
    labels.extend(vec![None; 5]);
    assert_eq!(needs_fallback(&output(labels, 2)), None);
}

#[test]
fn test_fallback_replaces_single_noisy_cluster() {
    init();
    let (rows, _) = make_blobs_on_sphere(&[73, 72, 72, 72], 16, 0.4, 289);
    assert_eq!(rows.len(), 289);

    let engine = ClusterEngine::new(ClusteringParams::default()).with_primary(Box::new(
        FixedOutcome {
            clusters: 1,
            noise_ratio: 0.7,
        },
    ));
    let result = engine.cluster(&rows).unwrap();
    info!(
        "fallback result: {} clusters, {} noise",
        result.n_clusters,
        result.noise_count()
    );

    assert_eq!(result.method, ClusteringMethod::Partition);
    assert_eq!(
        result.fallback_reason,
        Some(FallbackReason::TooFewClusters { found: 1 })
    );
    assert!(result.n_clusters >= 2);
    assert_eq!(result.noise_count(), 0);
    assert!(result.labels.iter().all(|l| l.is_some()));
    assert!(result.sizes().iter().all(|&s| s > 0));
}

#[test]
fn test_fallback_on_excess_noise() {
    init();
    let (rows, _) = make_blobs_on_sphere(&[40, 40, 40], 16, 0.4, 17);
    let engine = ClusterEngine::new(ClusteringParams::default()).with_primary(Box::new(
        FixedOutcome {
            clusters: 3,
            noise_ratio: 0.7,
        },
    ));
    let result = engine.cluster(&rows).unwrap();
    assert_eq!(result.method, ClusteringMethod::Partition);
    assert!(matches!(
        result.fallback_reason,
        Some(FallbackReason::TooMuchNoise { .. })
    ));
    assert_eq!(result.noise_count(), 0);
}

#[test]
fn test_usable_primary_is_kept() {
    let (rows, _) = make_blobs_on_sphere(&[20, 20], 8, 0.3, 4);
    let engine = ClusterEngine::new(ClusteringParams::default()).with_primary(Box::new(
        FixedOutcome {
            clusters: 2,
            noise_ratio: 0.1,
        },
    ));
    let result = engine.cluster(&rows).unwrap();
    assert_eq!(result.method, ClusteringMethod::Density);
    assert_eq!(result.fallback_reason, None);
    assert_eq!(result.noise_count(), 4);
}

#[test]
fn test_density_mode_never_falls_back() {
    let (rows, _) = make_blobs_on_sphere(&[20, 20], 8, 0.3, 4);
    let params = ClusteringParams {
        mode: ClusteringMode::Density,
        ..Default::default()
    };
    let engine = ClusterEngine::new(params).with_primary(Box::new(FixedOutcome {
        clusters: 1,
        noise_ratio: 0.9,
    }));
    let result = engine.cluster(&rows).unwrap();
    assert_eq!(result.method, ClusteringMethod::Density);
    assert_eq!(result.n_clusters, 1);
    assert!(result.fallback_reason.is_none());
}

#[test]
fn test_density_finds_separated_blobs() {
    init();
    let (rows, _) = make_blobs_on_sphere(&[25, 25, 25], 8, 0.15, 99);
    let params = ClusteringParams {
        min_cluster_size: 8,
        ..Default::default()
    };
    let result = ClusterEngine::new(params)
        .cluster(&rows)
        .unwrap();
    info!(
        "density result: {} clusters, noise ratio {:.2}",
        result.n_clusters,
        result.noise_ratio()
    );
    assert_eq!(result.method, ClusteringMethod::Density);
    assert!(result.n_clusters >= 2);
    assert!(result.noise_ratio() <= noise_tolerance(rows.len()));
}

#[test]
fn test_explicit_partition_with_k() {
    let (rows, _) = make_blobs_on_sphere(&[15, 15, 15], 8, 0.2, 8);
    let params = ClusteringParams {
        mode: ClusteringMode::Partition,
        k: Some(3),
        ..Default::default()
    };
    let result = ClusterEngine::new(params).cluster(&rows).unwrap();
    assert_eq!(result.method, ClusteringMethod::Partition);
    assert_eq!(result.n_clusters, 3);
    assert_eq!(result.noise_count(), 0);
    assert!(result.fallback_reason.is_none());
}

#[test]
fn test_auto_with_k_skips_density() {
    let (rows, _) = make_blobs_on_sphere(&[15, 15], 8, 0.2, 8);
    let params = ClusteringParams {
        k: Some(2),
        ..Default::default()
    };
    let engine = ClusterEngine::new(params).with_primary(Box::new(FixedOutcome {
        clusters: 5,
        noise_ratio: 0.0,
    }));
    let result = engine.cluster(&rows).unwrap();
    assert_eq!(result.method, ClusteringMethod::Partition);
    assert_eq!(result.n_clusters, 2);
}

#[test]
fn test_single_item_is_one_cluster() {
    let result = ClusterEngine::new(ClusteringParams::default())
        .cluster(&[vec![0.6, 0.8]])
        .unwrap();
    assert_eq!(result.method, ClusteringMethod::Single);
    assert_eq!(result.n_clusters, 1);
    assert_eq!(result.labels, vec![Some(0)]);
    assert_eq!(result.noise_count(), 0);
}

#[test]
fn test_empty_input() {
    let result = ClusterEngine::new(ClusteringParams::default())
        .cluster(&[])
        .unwrap();
    assert_eq!(result.n_clusters, 0);
    assert!(result.labels.is_empty());
}

#[test]
fn test_identical_vectors_collapse_to_one_cluster() {
    let rows = vec![vec![0.0; 6]; 12];
    let result = ClusterEngine::new(ClusteringParams::default())
        .cluster(&rows)
        .unwrap();
    assert_eq!(result.method, ClusteringMethod::Single);
    assert_eq!(result.n_clusters, 1);
}

#[test]
fn test_clustering_is_deterministic() {
    let (rows, _) = make_blobs_on_sphere(&[30, 30, 30], 64, 0.5, 123);
    let engine = ClusterEngine::new(ClusteringParams::default());
    let a = engine.cluster(&rows).unwrap();
    let b = engine.cluster(&rows).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_distance_matrix() {
    let rows = vec![vec![0.0, 0.0], vec![3.0, 4.0], vec![6.0, 8.0]];
    let d = DistanceMatrix::from_rows(&rows);
    assert_eq!(d.len(), 3);
    assert_relative_eq!(d.get(0, 1), 5.0);
    assert_relative_eq!(d.get(2, 0), 10.0);
    assert_relative_eq!(d.get(1, 1), 0.0);
    assert_eq!(d.row(1), &[5.0, 0.0, 5.0]);
    assert_relative_eq!(d.max(), 10.0);
}

#[test]
fn test_centroids_ignore_noise() {
    let rows = vec![vec![0.0, 0.0], vec![2.0, 0.0], vec![10.0, 10.0], vec![0.0, 4.0]];
    let labels = vec![Some(0), Some(0), None, Some(1)];
    let c = cluster_centroids(&rows, &labels, 2);
    assert_eq!(c, vec![vec![1.0, 0.0], vec![0.0, 4.0]]);
}
