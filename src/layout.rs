//! # Initial 2-D layout
//!
//! The layout graph holds every item plus one synthetic anchor per
//! cluster. Similarity edges keep their cosine weight, membership edges
//! (item -> own anchor) weigh [`MEMBERSHIP_LAYOUT_WEIGHT`], so clusters
//! gather loosely around their anchor while similar items still pull on
//! each other across cluster borders.
//!
//! Positions come from a Fruchterman-Reingold spring embedding:
//! - optimal distance `k = scaling_ratio * 3 / sqrt(|V|)`
//! - repulsion `k² / d` between all pairs, attraction `w * d² / k` along edges
//! - a pull toward the centre scaled by `gravity`
//! - displacement capped by a temperature that cools linearly to zero
//!   over exactly `iterations` steps, so the run always terminates
//!
//! The result is centred on the canvas and rescaled to `min(w, h) * 0.4`.
//! A final pass pushes items that ended up on top of their anchor out to
//! `anchor_min_distance`.
//!
//! [`ProjectionLayout`] is a cheaper alternative, selected with
//! `LayoutMethod::Projection`, that places items directly from a seeded
//! 2-D projection of their embeddings.

use log::{debug, info, trace};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use crate::config::LayoutParams;
use crate::core::SimilarityEdge;
use crate::reduction::ImplicitProjection;
use crate::similarity::adjacency;

pub const LAYOUT_SEED: u64 = 42;
pub const MEMBERSHIP_LAYOUT_WEIGHT: f64 = 0.1;

/// Golden angle in radians, spreads items pushed off a shared anchor.
const GOLDEN_ANGLE: f64 = 2.39996;
const MIN_PAIR_DISTANCE: f64 = 0.01;
const JITTER: f64 = 100.0;

/// Positions of items and anchors on the canvas.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InitialLayout {
    pub items: Vec<(f64, f64)>,
    /// Indexed by cluster id.
    pub anchors: Vec<(f64, f64)>,
}

#[derive(Clone, Debug)]
pub struct InitialLayoutEngine {
    params: LayoutParams,
    seed: u64,
}

impl InitialLayoutEngine {
    pub fn new(params: LayoutParams) -> Self {
        Self {
            params,
            seed: LAYOUT_SEED,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn center(&self) -> (f64, f64) {
        (self.params.width / 2.0, self.params.height / 2.0)
    }

    /// Lay out `labels.len()` items and `n_clusters` anchors.
    pub fn compute(
        &self,
        labels: &[Option<usize>],
        n_clusters: usize,
        similarity: &[SimilarityEdge],
    ) -> InitialLayout {
        let n_items = labels.len();
        let total = n_items + n_clusters;
        info!(
            "Computing layout for {} items, {} edges, {} clusters",
            n_items,
            similarity.len(),
            n_clusters
        );
        if n_items == 0 {
            return InitialLayout::default();
        }

        let mut edges: Vec<(usize, usize, f64)> = similarity
            .iter()
            .map(|e| (e.source, e.target, e.weight))
            .collect();
        for (i, label) in labels.iter().enumerate() {
            if let Some(c) = label {
                edges.push((i, n_items + c, MEMBERSHIP_LAYOUT_WEIGHT));
            }
        }

        let raw = self.spring(&edges, total);
        let mut positions = self.rescale(raw);

        let anchors = positions.split_off(n_items);
        let mut layout = InitialLayout {
            items: positions,
            anchors,
        };
        self.push_off_anchors(&mut layout, labels);
        layout
    }

    fn spring(&self, edges: &[(usize, usize, f64)], total: usize) -> Vec<[f64; 2]> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut pos: Vec<[f64; 2]> = (0..total)
            .map(|_| [rng.random::<f64>(), rng.random::<f64>()])
            .collect();
        if total < 2 {
            return pos;
        }

        let adj = adjacency(edges, total);
        let k = self.params.scaling_ratio * 3.0 / (total as f64).sqrt();
        let span = |axis: usize| {
            let (lo, hi) = pos.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p[axis]), hi.max(p[axis]))
            });
            hi - lo
        };
        let mut temperature = span(0).max(span(1)) * 0.1;
        let cooling = temperature / (self.params.iterations as f64 + 1.0);
        debug!(
            "Spring layout: k={:.4}, t0={:.4}, iterations={}, gravity={}",
            k, temperature, self.params.iterations, self.params.gravity
        );

        for iter in 0..self.params.iterations {
            let centroid = mean(&pos);
            let displacement: Vec<[f64; 2]> = (0..total)
                .into_par_iter()
                .map(|i| {
                    let mut d = [0.0, 0.0];
                    for (j, pj) in pos.iter().enumerate() {
                        if j == i {
                            continue;
                        }
                        let delta = [pos[i][0] - pj[0], pos[i][1] - pj[1]];
                        let dist = (delta[0] * delta[0] + delta[1] * delta[1])
                            .sqrt()
                            .max(MIN_PAIR_DISTANCE);
                        let f = k * k / (dist * dist);
                        d[0] += delta[0] * f;
                        d[1] += delta[1] * f;
                    }
                    if let Some(row) = adj.outer_view(i) {
                        for (j, &w) in row.iter() {
                            let delta = [pos[i][0] - pos[j][0], pos[i][1] - pos[j][1]];
                            let dist = (delta[0] * delta[0] + delta[1] * delta[1])
                                .sqrt()
                                .max(MIN_PAIR_DISTANCE);
                            let f = w * dist / k;
                            d[0] -= delta[0] * f;
                            d[1] -= delta[1] * f;
                        }
                    }
                    d[0] -= self.params.gravity * k * (pos[i][0] - centroid[0]);
                    d[1] -= self.params.gravity * k * (pos[i][1] - centroid[1]);
                    d
                })
                .collect();

            for (p, d) in pos.iter_mut().zip(&displacement) {
                let mut len = (d[0] * d[0] + d[1] * d[1]).sqrt();
                if len < 0.01 {
                    len = 0.1;
                }
                let step = temperature / len;
                p[0] += d[0] * step;
                p[1] += d[1] * step;
            }
            temperature -= cooling;
            trace!("spring iteration {}: temperature {:.5}", iter, temperature);
        }
        pos
    }

    /// Centre on the canvas and scale the largest extent to `min(w, h) * 0.4`.
    fn rescale(&self, mut pos: Vec<[f64; 2]>) -> Vec<(f64, f64)> {
        let (cx, cy) = self.center();
        let scale = self.params.width.min(self.params.height) * 0.4;
        let m = mean(&pos);
        for p in pos.iter_mut() {
            p[0] -= m[0];
            p[1] -= m[1];
        }
        let lim = pos
            .iter()
            .flat_map(|p| [p[0].abs(), p[1].abs()])
            .fold(0.0f64, f64::max);
        let factor = if lim > 1e-12 { scale / lim } else { 0.0 };
        pos.iter()
            .map(|p| (p[0] * factor + cx, p[1] * factor + cy))
            .collect()
    }

    fn push_off_anchors(&self, layout: &mut InitialLayout, labels: &[Option<usize>]) {
        let min_distance = self.params.anchor_min_distance;
        let mut pushed = 0;
        for (i, label) in labels.iter().enumerate() {
            let Some(c) = *label else { continue };
            let Some(&(ax, ay)) = layout.anchors.get(c) else {
                continue;
            };
            let (x, y) = layout.items[i];
            let (mut dx, mut dy) = (x - ax, y - ay);
            let mut dist = (dx * dx + dy * dy).sqrt();
            if dist >= min_distance {
                continue;
            }
            if dist < 0.1 {
                let angle = i as f64 * GOLDEN_ANGLE;
                dx = angle.cos();
                dy = angle.sin();
                dist = 1.0;
            }
            let scale = min_distance / dist;
            layout.items[i] = (ax + dx * scale, ay + dy * scale);
            pushed += 1;
        }
        debug!("{} items pushed out to {} from their anchor", pushed, min_distance);
    }
}

fn mean(pos: &[[f64; 2]]) -> [f64; 2] {
    if pos.is_empty() {
        return [0.0, 0.0];
    }
    let n = pos.len() as f64;
    let (sx, sy) = pos.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    [sx / n, sy / n]
}

/// Anchor positions recomputed as member centroids, for clusters whose
/// anchor is missing.
pub fn member_centroids(
    items: &[(f64, f64)],
    labels: &[Option<usize>],
    n_clusters: usize,
) -> Vec<Option<(f64, f64)>> {
    let mut sums = vec![(0.0, 0.0, 0usize); n_clusters];
    for (p, label) in items.iter().zip(labels) {
        if let Some(c) = *label {
            sums[c].0 += p.0;
            sums[c].1 += p.1;
            sums[c].2 += 1;
        }
    }
    sums.into_iter()
        .map(|(x, y, count)| (count > 0).then(|| (x / count as f64, y / count as f64)))
        .collect()
}

/// Direct placement from a seeded 2-D projection of the embeddings.
#[derive(Clone, Debug)]
pub struct ProjectionLayout {
    width: f64,
    height: f64,
    padding: f64,
    seed: u64,
}

impl ProjectionLayout {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            padding: 0.1,
            seed: LAYOUT_SEED,
        }
    }

    /// Item positions from the projection, each anchor at its members'
    /// centroid (canvas centre for an empty cluster).
    pub fn layout(
        &self,
        vectors: &[Vec<f64>],
        labels: &[Option<usize>],
        n_clusters: usize,
    ) -> InitialLayout {
        let items = self.compute(vectors);
        let centre = (self.width / 2.0, self.height / 2.0);
        let anchors = member_centroids(&items, labels, n_clusters)
            .into_iter()
            .map(|c| c.unwrap_or(centre))
            .collect();
        info!("Projection layout: {} items, {} anchors", items.len(), n_clusters);
        InitialLayout { items, anchors }
    }

    pub fn compute(&self, vectors: &[Vec<f64>]) -> Vec<(f64, f64)> {
        let n = vectors.len();
        let (cx, cy) = (self.width / 2.0, self.height / 2.0);
        if n < 4 {
            debug!("{} items, placing with jitter around the centre", n);
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
            return (0..n)
                .map(|_| {
                    let dx: f64 = StandardNormal.sample(&mut rng);
                    let dy: f64 = StandardNormal.sample(&mut rng);
                    (cx + dx * JITTER, cy + dy * JITTER)
                })
                .collect();
        }

        let dim = vectors[0].len();
        let coords = ImplicitProjection::with_seed(dim, 2, self.seed).project_rows(vectors);
        let (mut lo, mut hi) = ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]);
        for c in &coords {
            for a in 0..2 {
                lo[a] = lo[a].min(c[a]);
                hi[a] = hi[a].max(c[a]);
            }
        }

        let p = self.padding;
        coords
            .iter()
            .map(|c| {
                let x = (c[0] - lo[0]) / (hi[0] - lo[0] + 1e-10);
                let y = (c[1] - lo[1]) / (hi[1] - lo[1] + 1e-10);
                (
                    x * self.width * (1.0 - 2.0 * p) + self.width * p,
                    y * self.height * (1.0 - 2.0 * p) + self.height * p,
                )
            })
            .collect()
    }
}
