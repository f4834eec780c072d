//! Parameter blocks for the analysis pipeline and the force model.
//!
//! Every block is serde-deserialisable with per-field defaults so a
//! partial JSON document is a valid configuration. Validation runs once,
//! at the boundary (`AnalysisParams::validate`); the algorithms behind it
//! assume validated input. The simulator is the exception: it clamps
//! damping, energies and the summed link stiffness so that no parameter
//! set can make positions non-finite.
//!
//! Parameters fall in two groups:
//! - similarity, clustering and layout parameters shape the graph itself,
//!   changing any of them requires a full rebuild;
//! - force parameters only affect the live simulation, changing them
//!   reseeds the simulator from the current positions.

use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::quality::QualityScore;

/// Edge construction parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityParams {
    /// Cosine similarity an edge must exceed, in (0, 1).
    pub threshold: f64,
    /// Per-node degree cap `k`.
    pub max_edges_per_node: usize,
}

impl Default for SimilarityParams {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            max_edges_per_node: 5,
        }
    }
}

impl PartialEq for SimilarityParams {
    fn eq(&self, other: &Self) -> bool {
        self.max_edges_per_node == other.max_edges_per_node
            && approx::relative_eq!(self.threshold, other.threshold)
    }
}

/// Which clustering path the engine takes.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringMode {
    /// Density clustering, falling back to partition clustering when the
    /// result is unusable.
    #[default]
    Auto,
    /// Density clustering only; the result is kept even when poor.
    Density,
    /// Partition clustering only.
    Partition,
}

/// Group discovery parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusteringParams {
    /// Requested minimum group size `m` (scaled with dataset size).
    pub min_cluster_size: usize,
    /// Neighbourhood size for core distances, defaults to `m`.
    pub min_samples: Option<usize>,
    pub mode: ClusteringMode,
    /// Fixed cluster count for partition clustering. With `Auto` a given
    /// `k` skips density clustering.
    pub k: Option<usize>,
    /// Score used to pick `k` in partition clustering.
    pub quality: QualityScore,
    /// Target dimension of the neighbourhood-preserving projection.
    pub reduced_dimension: usize,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 3,
            min_samples: None,
            mode: ClusteringMode::Auto,
            k: None,
            quality: QualityScore::Silhouette,
            reduced_dimension: 15,
        }
    }
}

/// How initial positions are computed.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMethod {
    /// Spring embedding of items and cluster anchors.
    #[default]
    Spring,
    /// Seeded 2-D projection of the embeddings, anchors at member centroids.
    Projection,
}

/// Initial layout parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    pub method: LayoutMethod,
    /// Fixed iteration cap of the spring layout.
    pub iterations: usize,
    /// Pull of every node toward the layout centre.
    pub gravity: f64,
    /// Scales the optimal pairwise distance.
    pub scaling_ratio: f64,
    pub width: f64,
    pub height: f64,
    /// Items closer than this to their anchor are pushed out to it.
    pub anchor_min_distance: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            method: LayoutMethod::Spring,
            iterations: 100,
            gravity: 1.0,
            scaling_ratio: 2.0,
            width: 1000.0,
            height: 800.0,
            anchor_min_distance: 40.0,
        }
    }
}

impl PartialEq for LayoutParams {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
            && self.iterations == other.iterations
            && approx::relative_eq!(self.gravity, other.gravity)
            && approx::relative_eq!(self.scaling_ratio, other.scaling_ratio)
            && approx::relative_eq!(self.width, other.width)
            && approx::relative_eq!(self.height, other.height)
            && approx::relative_eq!(self.anchor_min_distance, other.anchor_min_distance)
    }
}

/// Force model constants of the live simulation.
///
/// `damping` is the fraction of velocity kept per tick. It is clamped by
/// the simulator into `[DAMPING_MIN, DAMPING_MAX]` rather than rejected:
/// a retention of 1 or more would never dissipate energy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceParams {
    /// Global charge; every node repels every other with this strength.
    pub repulsion: f64,
    /// Anchors repel this many times harder than items.
    pub anchor_repulsion_factor: f64,
    pub membership_strength: f64,
    pub membership_distance: f64,
    /// Similarity links pull with `similarity_strength * weight`.
    pub similarity_strength: f64,
    /// Rest length of a similarity link of weight 0; shrinks linearly
    /// toward `min_link_distance` as the weight approaches 1.
    pub similarity_distance: f64,
    pub min_link_distance: f64,
    pub center_strength: f64,
    pub damping: f64,
    pub collision_padding: f64,
    pub item_radius: f64,
    pub anchor_radius: f64,
    /// Pairs further apart than this do not repel.
    pub max_repulsion_distance: f64,
    pub alpha_decay: f64,
    /// Energy floor marking the settled state.
    pub alpha_min: f64,
    /// Energy after a resume or a parameter change.
    pub reheat_alpha: f64,
    /// Energy target while a node is dragged.
    pub drag_alpha_target: f64,
    /// Wall-clock auto-stop after each (re)start, in milliseconds.
    pub timeout_ms: u64,
}

pub const DAMPING_MIN: f64 = 0.01;
pub const DAMPING_MAX: f64 = 0.99;
/// Upper bound of item charge.
pub const MAX_REPULSION: f64 = 10_000.0;
pub const MAX_ANCHOR_REPULSION_FACTOR: f64 = 100.0;

impl Default for ForceParams {
    fn default() -> Self {
        Self {
            repulsion: 120.0,
            anchor_repulsion_factor: 12.0,
            membership_strength: 0.3,
            membership_distance: 60.0,
            similarity_strength: 0.4,
            similarity_distance: 140.0,
            min_link_distance: 30.0,
            center_strength: 0.02,
            damping: 0.6,
            collision_padding: 4.0,
            item_radius: 8.0,
            anchor_radius: 22.0,
            max_repulsion_distance: 600.0,
            alpha_decay: 0.0228,
            alpha_min: 0.001,
            reheat_alpha: 0.3,
            drag_alpha_target: 0.3,
            timeout_ms: 4000,
        }
    }
}

impl ForceParams {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Damping forced into the numerically stable range.
    pub fn clamped_damping(&self) -> f64 {
        if self.damping.is_finite() {
            self.damping.clamp(DAMPING_MIN, DAMPING_MAX)
        } else {
            DAMPING_MAX
        }
    }

    /// Strengths and energies are unit-bounded: with per-node link
    /// stiffness, centering and `alpha` all at most 1 the damped update
    /// cannot overshoot.
    pub fn validate(&self) -> Result<()> {
        let bounded = [
            ("repulsion", self.repulsion, MAX_REPULSION, "must be in 0..=10000"),
            (
                "anchor_repulsion_factor",
                self.anchor_repulsion_factor,
                MAX_ANCHOR_REPULSION_FACTOR,
                "must be in 0..=100",
            ),
            ("membership_strength", self.membership_strength, 1.0, "must be in 0..=1"),
            ("similarity_strength", self.similarity_strength, 1.0, "must be in 0..=1"),
            ("center_strength", self.center_strength, 1.0, "must be in 0..=1"),
            ("reheat_alpha", self.reheat_alpha, 1.0, "must be in 0..=1"),
            ("drag_alpha_target", self.drag_alpha_target, 1.0, "must be in 0..=1"),
        ];
        for (name, value, max, reason) in bounded {
            if !(0.0..=max).contains(&value) {
                return Err(GraphError::invalid(name, value, reason));
            }
        }
        let non_negative = [
            ("membership_distance", self.membership_distance),
            ("similarity_distance", self.similarity_distance),
            ("min_link_distance", self.min_link_distance),
            ("collision_padding", self.collision_padding),
            ("item_radius", self.item_radius),
            ("anchor_radius", self.anchor_radius),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(GraphError::invalid(name, value, "must be finite and >= 0"));
            }
        }
        if !(self.max_repulsion_distance.is_finite() && self.max_repulsion_distance > 0.0) {
            return Err(GraphError::invalid(
                "max_repulsion_distance",
                self.max_repulsion_distance,
                "must be finite and > 0",
            ));
        }
        if !(self.alpha_decay > 0.0 && self.alpha_decay < 1.0) {
            return Err(GraphError::invalid("alpha_decay", self.alpha_decay, "must be in (0, 1)"));
        }
        if !(self.alpha_min > 0.0 && self.alpha_min < 1.0) {
            return Err(GraphError::invalid("alpha_min", self.alpha_min, "must be in (0, 1)"));
        }
        if self.timeout_ms == 0 {
            return Err(GraphError::invalid("timeout_ms", self.timeout_ms, "must be > 0"));
        }
        Ok(())
    }
}

impl PartialEq for ForceParams {
    fn eq(&self, other: &Self) -> bool {
        let pairs = [
            (self.repulsion, other.repulsion),
            (self.anchor_repulsion_factor, other.anchor_repulsion_factor),
            (self.membership_strength, other.membership_strength),
            (self.membership_distance, other.membership_distance),
            (self.similarity_strength, other.similarity_strength),
            (self.similarity_distance, other.similarity_distance),
            (self.min_link_distance, other.min_link_distance),
            (self.center_strength, other.center_strength),
            (self.damping, other.damping),
            (self.collision_padding, other.collision_padding),
            (self.item_radius, other.item_radius),
            (self.anchor_radius, other.anchor_radius),
            (self.max_repulsion_distance, other.max_repulsion_distance),
            (self.alpha_decay, other.alpha_decay),
            (self.alpha_min, other.alpha_min),
            (self.reheat_alpha, other.reheat_alpha),
            (self.drag_alpha_target, other.drag_alpha_target),
        ];
        self.timeout_ms == other.timeout_ms
            && pairs.iter().all(|(a, b)| approx::relative_eq!(*a, *b))
    }
}

/// Full control surface of one analysis.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisParams {
    pub similarity: SimilarityParams,
    pub clustering: ClusteringParams,
    pub layout: LayoutParams,
    pub forces: ForceParams,
}

impl AnalysisParams {
    /// Parse a (possibly partial) JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: AnalysisParams = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Reject out-of-range values before they reach the core.
    pub fn validate(&self) -> Result<()> {
        debug!("Validating analysis parameters: {:?}", self);
        let s = &self.similarity;
        if !(s.threshold > 0.0 && s.threshold < 1.0) {
            return Err(GraphError::invalid("threshold", s.threshold, "must be in (0, 1)"));
        }
        if !(1..=20).contains(&s.max_edges_per_node) {
            return Err(GraphError::invalid(
                "max_edges_per_node",
                s.max_edges_per_node,
                "must be in 1..=20",
            ));
        }

        let c = &self.clustering;
        if !(2..=50).contains(&c.min_cluster_size) {
            return Err(GraphError::invalid(
                "min_cluster_size",
                c.min_cluster_size,
                "must be in 2..=50",
            ));
        }
        if let Some(s) = c.min_samples {
            if s == 0 {
                return Err(GraphError::invalid("min_samples", s, "must be >= 1"));
            }
        }
        if let Some(k) = c.k {
            if k < 2 {
                return Err(GraphError::invalid("k", k, "must be >= 2"));
            }
        }
        if c.reduced_dimension < 2 {
            return Err(GraphError::invalid(
                "reduced_dimension",
                c.reduced_dimension,
                "must be >= 2",
            ));
        }

        let l = &self.layout;
        if !(10..=500).contains(&l.iterations) {
            return Err(GraphError::invalid("iterations", l.iterations, "must be in 10..=500"));
        }
        if !(0.1..=10.0).contains(&l.gravity) {
            return Err(GraphError::invalid("gravity", l.gravity, "must be in 0.1..=10"));
        }
        if !(0.1..=10.0).contains(&l.scaling_ratio) {
            return Err(GraphError::invalid(
                "scaling_ratio",
                l.scaling_ratio,
                "must be in 0.1..=10",
            ));
        }
        for (name, value) in [("width", l.width), ("height", l.height)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(GraphError::invalid(name, value, "must be finite and > 0"));
            }
        }
        if !(l.anchor_min_distance.is_finite() && l.anchor_min_distance >= 0.0) {
            return Err(GraphError::invalid(
                "anchor_min_distance",
                l.anchor_min_distance,
                "must be finite and >= 0",
            ));
        }

        self.forces.validate()
    }

    /// True when switching to `other` changes edges, clusters or the
    /// initial layout.
    pub fn requires_rebuild(&self, other: &AnalysisParams) -> bool {
        self.similarity != other.similarity
            || self.clustering != other.clustering
            || self.layout != other.layout
    }

    /// True when only the force model differs.
    pub fn requires_reseed(&self, other: &AnalysisParams) -> bool {
        !self.requires_rebuild(other) && self.forces != other.forces
    }
}
