//! Data model: input records, graph edges, clusters and the payload
//! handed to the rendering layer.
//!
//! Items are addressed by their index in the input slice everywhere in
//! the core; string identifiers only appear at the edges of the system
//! (records in, payload out).
//!
//! # Examples
//!
//! ```
//! use simgraph::core::{ItemRecord, SimilarityEdge};
//!
//! let record = ItemRecord::new("R-1", "Supplier delay")
//!     .with_title("Late steel delivery");
//! assert_eq!(
//!     record.combined_text(),
//!     "Late steel delivery Late steel delivery Supplier delay"
//! );
//!
//! let edge = SimilarityEdge::canonical(7, 2, 0.8);
//! assert_eq!((edge.source, edge.target), (2, 7));
//! ```

use serde::{Deserialize, Serialize};

use crate::clustering::{ClusteringMethod, FallbackReason};
use crate::error::Result;

/// A validated record coming from ingestion.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemRecord {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub likelihood: Option<f64>,
    #[serde(default)]
    pub impact: Option<f64>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ItemRecord {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Text submitted to the embedding provider: the title counts twice,
    /// followed by the cause and the description.
    pub fn combined_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(4);
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            parts.push(title);
            parts.push(title);
        }
        if let Some(cause) = self.cause.as_deref().filter(|c| !c.is_empty()) {
            parts.push(cause);
        }
        if !self.description.is_empty() {
            parts.push(&self.description);
        }
        parts.join(" ").trim().to_string()
    }
}

/// True when nothing embeddable survives cleaning.
pub fn is_blank_text(text: &str) -> bool {
    !text.chars().any(char::is_alphanumeric)
}

/// Similarity edge between two item indices, always stored with
/// `source < target`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimilarityEdge {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
}

impl SimilarityEdge {
    /// Build an edge in its canonical (lower, higher) orientation.
    #[inline]
    pub fn canonical(a: usize, b: usize, weight: f64) -> Self {
        let (source, target) = if a <= b { (a, b) } else { (b, a) };
        Self {
            source,
            target,
            weight,
        }
    }

    #[inline]
    pub fn key(&self) -> (usize, usize) {
        (self.source, self.target)
    }
}

/// Item -> anchor of its cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MembershipEdge {
    pub item: usize,
    pub cluster: usize,
}

/// One membership edge per non-noise item.
pub fn membership_edges(assignments: &[Option<usize>]) -> Vec<MembershipEdge> {
    assignments
        .iter()
        .enumerate()
        .filter_map(|(item, a)| a.map(|cluster| MembershipEdge { item, cluster }))
        .collect()
}

/// Identifier of the synthetic anchor node of a cluster.
pub fn anchor_id(cluster: usize) -> String {
    format!("cluster_{}", cluster)
}

/// Weight reported for membership edges in the payload.
pub const MEMBERSHIP_EDGE_WEIGHT: f64 = 0.3;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Similarity,
    Membership,
}

/// Edge as seen by the rendering layer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

/// Item as seen by the rendering layer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ItemNode {
    pub id: String,
    pub title: Option<String>,
    pub description: String,
    pub cause: Option<String>,
    pub url: Option<String>,
    pub cost: Option<f64>,
    pub likelihood: Option<f64>,
    pub impact: Option<f64>,
    pub phase: Option<String>,
    pub status: Option<String>,
    /// Cluster id, `None` for noise (serialised as -1).
    #[serde(with = "noise_label")]
    pub cluster: Option<usize>,
    pub x: f64,
    pub y: f64,
    /// The record had no embeddable text and got a zero vector.
    pub empty_text: bool,
}

impl ItemNode {
    pub fn from_record(record: &ItemRecord, cluster: Option<usize>, (x, y): (f64, f64)) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            cause: record.cause.clone(),
            url: record.url.clone(),
            cost: record.cost,
            likelihood: record.likelihood,
            impact: record.impact,
            phase: record.phase.clone(),
            status: record.status.clone(),
            cluster,
            x,
            y,
            empty_text: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClusterInfo {
    pub id: usize,
    pub label: String,
    pub keywords: Vec<String>,
    /// Member count.
    pub size: usize,
    /// Anchor position.
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RunMetadata {
    pub clustering_method: ClusteringMethod,
    pub fallback_reason: Option<FallbackReason>,
    pub n_clusters: usize,
    pub noise_points: usize,
    pub empty_text_items: usize,
    pub embedding_dimension: usize,
    pub min_cluster_size_used: usize,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            clustering_method: ClusteringMethod::Single,
            fallback_reason: None,
            n_clusters: 0,
            noise_points: 0,
            empty_text_items: 0,
            embedding_dimension: 0,
            min_cluster_size_used: 0,
        }
    }
}

/// Everything one analysis run produces.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphPayload {
    pub items: Vec<ItemNode>,
    pub edges: Vec<GraphEdge>,
    pub clusters: Vec<ClusterInfo>,
    pub metadata: RunMetadata,
}

impl GraphPayload {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn similarity_edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(|e| e.kind == EdgeKind::Similarity)
    }

    pub fn membership_edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(|e| e.kind == EdgeKind::Membership)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// -------------------- vector helpers --------------------

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Scale to unit L2 norm; zero vectors are left untouched.
pub fn normalise(v: &mut [f64]) {
    let n = norm(v);
    if n > 1e-12 {
        v.iter_mut().for_each(|x| *x /= n);
    }
}

#[inline]
pub fn euclidean_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Serialises a cluster assignment with -1 standing for noise.
mod noise_label {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<usize>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(c) => s.serialize_i64(*c as i64),
            None => s.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        let raw = i64::deserialize(d)?;
        Ok(if raw < 0 { None } else { Some(raw as usize) })
    }
}
