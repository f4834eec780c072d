//! Internal separation scores used to choose `k` for partition clustering.
//!
//! Both scores are "higher is better". Silhouette works on the shared
//! pairwise distance matrix; Calinski-Harabasz only needs the rows.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::clustering::DistanceMatrix;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QualityScore {
    /// Mean silhouette coefficient, in [-1, 1].
    #[default]
    Silhouette,
    /// Between/within dispersion ratio.
    CalinskiHarabasz,
}

impl QualityScore {
    pub fn score(
        &self,
        rows: &[Vec<f64>],
        distances: &DistanceMatrix,
        assignments: &[usize],
        k: usize,
    ) -> f64 {
        match self {
            QualityScore::Silhouette => silhouette_score(distances, assignments, k),
            QualityScore::CalinskiHarabasz => calinski_harabasz_score(rows, assignments, k),
        }
    }
}

/// Mean silhouette coefficient. Points alone in their cluster score 0.
pub fn silhouette_score(distances: &DistanceMatrix, assignments: &[usize], k: usize) -> f64 {
    let n = assignments.len();
    if k < 2 || n <= k {
        return 0.0;
    }

    let mut sizes = vec![0usize; k];
    for &c in assignments {
        if c < k {
            sizes[c] += 1;
        }
    }
    if sizes.iter().filter(|s| **s > 0).count() < 2 {
        return 0.0;
    }

    let total: f64 = (0..n)
        .into_par_iter()
        .map(|i| {
            let own = assignments[i];
            if sizes[own] <= 1 {
                return 0.0;
            }
            let mut sums = vec![0.0; k];
            for (j, &c) in assignments.iter().enumerate() {
                if j != i {
                    sums[c] += distances.get(i, j);
                }
            }
            let a = sums[own] / (sizes[own] - 1) as f64;
            let b = (0..k)
                .filter(|&c| c != own && sizes[c] > 0)
                .map(|c| sums[c] / sizes[c] as f64)
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0.0 && b.is_finite() {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .sum();

    total / n as f64
}

/// Calinski-Harabasz index, `(B / (k - 1)) / (W / (n - k))`.
///
/// `B` is the size-weighted spread of the group centroids around the grand
/// mean, `W` the spread of every row around its own centroid.
pub fn calinski_harabasz_score(rows: &[Vec<f64>], assignments: &[usize], k: usize) -> f64 {
    let n = rows.len();
    if k <= 1 || k >= n {
        return 0.0;
    }
    let groups = centroids_and_counts(rows, assignments, k);
    let members: usize = groups.iter().map(|(_, count)| count).sum();
    if members == 0 {
        return 0.0;
    }

    let mut grand = vec![0.0; rows[0].len()];
    for (centroid, count) in &groups {
        let share = *count as f64 / members as f64;
        for (g, c) in grand.iter_mut().zip(centroid) {
            *g += c * share;
        }
    }

    let between: f64 = groups
        .iter()
        .map(|(centroid, count)| *count as f64 * squared_dist(centroid, &grand))
        .sum();
    let within: f64 = rows
        .par_iter()
        .zip(assignments.par_iter())
        .filter_map(|(row, &c)| groups.get(c).map(|(centroid, _)| squared_dist(row, centroid)))
        .sum();
    if within < 1e-10 {
        return 0.0;
    }
    between * (n - k) as f64 / (within * (k - 1) as f64)
}

/// Mean row and member count per cluster label `0..k`; labels outside
/// the range are ignored.
pub fn centroids_and_counts(
    rows: &[Vec<f64>],
    assignments: &[usize],
    k: usize,
) -> Vec<(Vec<f64>, usize)> {
    let f = rows.first().map_or(0, Vec::len);
    let mut groups = vec![(vec![0.0; f], 0usize); k];
    for (row, &c) in rows.iter().zip(assignments) {
        if let Some((sum, count)) = groups.get_mut(c) {
            for (acc, v) in sum.iter_mut().zip(row) {
                *acc += v;
            }
            *count += 1;
        }
    }
    for (sum, count) in groups.iter_mut() {
        if *count > 0 {
            let count = *count as f64;
            sum.iter_mut().for_each(|v| *v /= count);
        }
    }
    groups
}

fn squared_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}
