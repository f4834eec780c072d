//! Seeded synthetic data for the test suite.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::core::{normalise, ItemRecord};

fn gaussian(rng: &mut ChaCha8Rng, dim: usize) -> Vec<f64> {
    (0..dim).map(|_| StandardNormal.sample(rng)).collect()
}

/// Gaussian blobs projected onto the unit sphere.
///
/// Returns the vectors and the blob each one was drawn from.
pub fn make_blobs_on_sphere(
    sizes: &[usize],
    dim: usize,
    spread: f64,
    seed: u64,
) -> (Vec<Vec<f64>>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rows = Vec::new();
    let mut truth = Vec::new();
    for (b, &size) in sizes.iter().enumerate() {
        let mut centre = gaussian(&mut rng, dim);
        normalise(&mut centre);
        for _ in 0..size {
            let noise = gaussian(&mut rng, dim);
            let mut v: Vec<f64> = centre
                .iter()
                .zip(&noise)
                .map(|(c, e)| c + spread * e / (dim as f64).sqrt())
                .collect();
            normalise(&mut v);
            rows.push(v);
            truth.push(b);
        }
    }
    (rows, truth)
}

/// Uniformly random unit vectors.
pub fn make_unit_noise(n: usize, dim: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let mut v = gaussian(&mut rng, dim);
            normalise(&mut v);
            v
        })
        .collect()
}

/// Well separated 2-D blobs with uniform jitter, for the partition tests.
pub fn make_planar_blobs(
    centres: &[(f64, f64)],
    per_blob: usize,
    jitter: f64,
    seed: u64,
) -> Vec<Vec<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(centres.len() * per_blob);
    for &(cx, cy) in centres {
        for _ in 0..per_blob {
            let dx = (rng.random::<f64>() - 0.5) * 2.0 * jitter;
            let dy = (rng.random::<f64>() - 0.5) * 2.0 * jitter;
            rows.push(vec![cx + dx, cy + dy]);
        }
    }
    rows
}

pub const TOPICS: &[&[&str]] = &[
    &["steel", "supplier", "delivery", "shipment", "beams", "late", "logistics", "vendor"],
    &["permit", "council", "approval", "planning", "zoning", "authority", "licence", "hearing"],
    &["budget", "funding", "overrun", "inflation", "invoice", "contingency", "currency", "costs"],
    &["crane", "injury", "accident", "scaffold", "safety", "helmet", "hazard", "inspection"],
];

/// Records whose text is drawn from one topic vocabulary each, topic
/// `i % TOPICS.len()` for record `i`.
pub fn make_records(n: usize, seed: u64) -> Vec<ItemRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let topic = TOPICS[i % TOPICS.len()];
            let words: Vec<&str> = (0..6)
                .map(|_| topic[rng.random_range(0..topic.len())])
                .collect();
            let title: Vec<&str> = (0..2)
                .map(|_| topic[rng.random_range(0..topic.len())])
                .collect();
            ItemRecord::new(format!("R-{:03}", i), words.join(" ")).with_title(title.join(" "))
        })
        .collect()
}
