//! # Similarity graph from unit-norm embeddings
//!
//! ## Algorithm
//!
//! 1. **Similarity rows**: cosine similarity of every item against all
//!    others (dot product of unit vectors), computed row-parallel.
//! 2. **Candidates**: each item proposes its `k` most similar neighbours
//!    whose similarity exceeds the threshold `τ`.
//! 3. **Canonicalisation**: every proposal `(i, j)` is stored under the key
//!    `(min(i, j), max(i, j))` in an ordered set, so a pair proposed from
//!    both sides is materialised once and a pair proposed only from the
//!    higher index survives just like one proposed from the lower index.
//! 4. **Degree cap**: candidates are accepted by descending weight while both
//!    endpoints have capacity left.
//!
//! Step 4 never drops a mutual top-`k` pair: if `i`'s capacity were
//! exhausted before `(i, j)` was reached, `i` would have `k` neighbours more
//! similar than `j`, so `j` could not be in `i`'s top-`k`.
//!
//! ## Complexity
//!
//! `O(N² · d)` for the similarity rows plus `O(N · k · log(N · k))` for the
//! acceptance pass. Exact search is fine up to a few thousand items.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::{debug, info, trace};
use rayon::prelude::*;
use sprs::{CsMat, TriMat};

use crate::core::{dot, SimilarityEdge};
use crate::error::{GraphError, Result};

/// Threshold and degree cap of the similarity graph.
#[derive(Clone, Copy, Debug)]
pub struct SimilarityGraphBuilder {
    threshold: f64,
    cap: usize,
}

impl SimilarityGraphBuilder {
    pub fn new(threshold: f64, cap: usize) -> Self {
        Self { threshold, cap }
    }

    /// Build the deduplicated, degree-bounded edge set.
    pub fn build(&self, vectors: &[Vec<f64>]) -> Result<Vec<SimilarityEdge>> {
        let n = vectors.len();
        check_dimensions(vectors)?;
        info!(
            "Building similarity graph for {} items: threshold={}, k={}",
            n, self.threshold, self.cap
        );
        if n < 2 || self.cap == 0 {
            return Ok(Vec::new());
        }

        let proposals = self.top_k_candidates(vectors);
        let candidates = canonical_candidates(&proposals);
        debug!(
            "{} proposals collapsed into {} canonical candidate pairs",
            proposals.iter().map(|p| p.len()).sum::<usize>(),
            candidates.len()
        );

        let edges = self.accept_within_cap(candidates, n);
        info!("Similarity graph: {} edges", edges.len());
        Ok(edges)
    }

    /// Each node's `k` most similar neighbours above the threshold, best
    /// first; ties prefer the lower index.
    pub fn top_k_candidates(&self, vectors: &[Vec<f64>]) -> Vec<Vec<(usize, f64)>> {
        let n = vectors.len();
        (0..n)
            .into_par_iter()
            .map(|i| {
                let mut row: Vec<(usize, f64)> = (0..n)
                    .filter(|&j| j != i)
                    .map(|j| (j, dot(&vectors[i], &vectors[j])))
                    .filter(|(_, s)| *s > self.threshold)
                    .collect();
                row.sort_by(|a, b| by_weight_desc(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
                row.truncate(self.cap);
                trace!("node {}: {} candidates", i, row.len());
                row
            })
            .collect()
    }

    fn accept_within_cap(
        &self,
        candidates: BTreeMap<(usize, usize), f64>,
        n: usize,
    ) -> Vec<SimilarityEdge> {
        let mut ordered: Vec<SimilarityEdge> = candidates
            .into_iter()
            .map(|((a, b), w)| SimilarityEdge::canonical(a, b, w))
            .collect();
        ordered.sort_by(|a, b| {
            by_weight_desc(a.weight, b.weight).then_with(|| a.key().cmp(&b.key()))
        });

        let mut degree = vec![0usize; n];
        let mut accepted = Vec::with_capacity(ordered.len());
        for edge in ordered {
            if degree[edge.source] < self.cap && degree[edge.target] < self.cap {
                degree[edge.source] += 1;
                degree[edge.target] += 1;
                accepted.push(edge);
            } else {
                trace!(
                    "dropping ({}, {}) w={:.4}: endpoint capacity exhausted",
                    edge.source,
                    edge.target,
                    edge.weight
                );
            }
        }
        accepted.sort_by_key(|e| e.key());
        accepted
    }
}

/// Merge per-node proposals under canonical `(lower, higher)` keys.
pub fn canonical_candidates(proposals: &[Vec<(usize, f64)>]) -> BTreeMap<(usize, usize), f64> {
    let mut candidates = BTreeMap::new();
    for (i, row) in proposals.iter().enumerate() {
        for &(j, w) in row {
            let edge = SimilarityEdge::canonical(i, j, w);
            candidates.entry(edge.key()).or_insert(w);
        }
    }
    candidates
}

fn by_weight_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn check_dimensions(vectors: &[Vec<f64>]) -> Result<()> {
    if let Some(first) = vectors.first() {
        let expected = first.len();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(GraphError::DimensionMismatch {
                expected,
                got: bad.len(),
            });
        }
    }
    Ok(())
}

/// Full N×N cosine similarity matrix of unit vectors.
pub fn similarity_matrix(vectors: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    check_dimensions(vectors)?;
    Ok(vectors
        .par_iter()
        .map(|a| vectors.iter().map(|b| dot(a, b)).collect())
        .collect())
}

/// Per-node degree of an edge set.
pub fn degrees(edges: &[SimilarityEdge], n: usize) -> Vec<usize> {
    let mut degree = vec![0usize; n];
    for e in edges {
        degree[e.source] += 1;
        degree[e.target] += 1;
    }
    degree
}

/// Symmetric sparse adjacency over `n` nodes.
pub fn adjacency(edges: &[(usize, usize, f64)], n: usize) -> CsMat<f64> {
    let mut tri = TriMat::with_capacity((n, n), edges.len() * 2);
    for &(a, b, w) in edges {
        if a != b {
            tri.add_triplet(a, b, w);
            tri.add_triplet(b, a, w);
        }
    }
    tri.to_csr()
}
