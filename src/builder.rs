use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info, trace, warn};

use crate::clustering::{cluster_centroids, ClusterAssignment, ClusterEngine};
use crate::config::{
    AnalysisParams, ClusteringParams, ForceParams, LayoutMethod, LayoutParams, SimilarityParams,
};
use crate::core::{
    anchor_id, ClusterInfo, EdgeKind, GraphEdge, GraphPayload, ItemNode, ItemRecord, RunMetadata,
    SimilarityEdge, MEMBERSHIP_EDGE_WEIGHT,
};
use crate::embedding::{embed_texts, global_embedder, EmbeddingProvider, Embeddings};
use crate::error::{GraphError, Result};
use crate::keywords::{cluster_label, extract_keywords, KEYWORDS_PER_CLUSTER};
use crate::layout::{member_centroids, InitialLayout, InitialLayoutEngine, ProjectionLayout};
use crate::similarity::SimilarityGraphBuilder;

/// Everything an analysis run computes, before it is flattened into the
/// payload.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub payload: GraphPayload,
    pub embeddings: Embeddings,
    pub similarity: Vec<SimilarityEdge>,
    pub assignment: ClusterAssignment,
    pub layout: InitialLayout,
    /// Mean embedding per cluster.
    pub centroids: Vec<Vec<f64>>,
}

/// Runs the analysis pipeline: embed, cluster and connect, lay out, label.
#[derive(Clone, Default)]
pub struct GraphBuilder {
    params: AnalysisParams,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        info!("Initializing new GraphBuilder");
        Self::default()
    }

    // -------------------- Configuration --------------------

    pub fn with_params(mut self, params: AnalysisParams) -> Self {
        self.params = params;
        self
    }

    /// Edge threshold and per-node cap.
    pub fn with_similarity(mut self, threshold: f64, max_edges_per_node: usize) -> Self {
        info!(
            "Configuring similarity graph: threshold={}, k={}",
            threshold, max_edges_per_node
        );
        self.params.similarity = SimilarityParams {
            threshold,
            max_edges_per_node,
        };
        self
    }

    pub fn with_clustering(mut self, clustering: ClusteringParams) -> Self {
        info!("Configuring clustering: {:?}", clustering);
        self.params.clustering = clustering;
        self
    }

    pub fn with_layout(mut self, layout: LayoutParams) -> Self {
        info!(
            "Configuring layout: iterations={}, gravity={}, scaling_ratio={}",
            layout.iterations, layout.gravity, layout.scaling_ratio
        );
        self.params.layout = layout;
        self
    }

    pub fn with_forces(mut self, forces: ForceParams) -> Self {
        self.params.forces = forces;
        self
    }

    /// Use a specific provider instead of the process-wide one.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        info!("Using embedding provider `{}`", embedder.name());
        self.embedder = Some(embedder);
        self
    }

    pub fn params(&self) -> &AnalysisParams {
        &self.params
    }

    // -------------------- Build --------------------

    pub fn build(&self, records: &[ItemRecord]) -> Result<GraphPayload> {
        Ok(self.analyse(records)?.payload)
    }

    /// Run the whole pipeline.
    ///
    /// Parameters and record ids are checked before any work is done.
    /// Similarity edges and clusters are independent consumers of the same
    /// vectors and are computed in parallel.
    pub fn analyse(&self, records: &[ItemRecord]) -> Result<Analysis> {
        self.params.validate()?;
        check_unique_ids(records)?;
        info!("Building graph from {} records", records.len());

        // 1) Embeddings
        let texts: Vec<String> = records.iter().map(ItemRecord::combined_text).collect();
        let provider: &dyn EmbeddingProvider = match &self.embedder {
            Some(p) => p.as_ref(),
            None => global_embedder(),
        };
        let embeddings = embed_texts(provider, &texts)?;

        // 2) Similarity graph and clusters
        let sim_builder = SimilarityGraphBuilder::new(
            self.params.similarity.threshold,
            self.params.similarity.max_edges_per_node,
        );
        let engine = ClusterEngine::new(self.params.clustering.clone());
        let (similarity, assignment) = rayon::join(
            || sim_builder.build(&embeddings.vectors),
            || engine.cluster(&embeddings.vectors),
        );
        let (similarity, assignment) = (similarity?, assignment?);
        debug!(
            "{} similarity edges, {} clusters ({:?})",
            similarity.len(),
            assignment.n_clusters,
            assignment.method
        );

        // 3) Initial layout
        let layout = match self.params.layout.method {
            LayoutMethod::Spring => InitialLayoutEngine::new(self.params.layout.clone()).compute(
                &assignment.labels,
                assignment.n_clusters,
                &similarity,
            ),
            LayoutMethod::Projection => {
                ProjectionLayout::new(self.params.layout.width, self.params.layout.height).layout(
                    &embeddings.vectors,
                    &assignment.labels,
                    assignment.n_clusters,
                )
            }
        };

        // 4) Labels
        let keywords = extract_keywords(
            &texts,
            &assignment.labels,
            assignment.n_clusters,
            KEYWORDS_PER_CLUSTER,
        );
        let centroids = cluster_centroids(
            &embeddings.vectors,
            &assignment.labels,
            assignment.n_clusters,
        );

        let payload = assemble(records, &embeddings, &similarity, &assignment, &layout, keywords);
        info!(
            "Graph built: {} items, {} edges, {} clusters, {} noise points",
            payload.items.len(),
            payload.edges.len(),
            payload.clusters.len(),
            payload.metadata.noise_points
        );

        Ok(Analysis {
            payload,
            embeddings,
            similarity,
            assignment,
            layout,
            centroids,
        })
    }
}

fn check_unique_ids(records: &[ItemRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.id.as_str()) {
            return Err(GraphError::DuplicateItemId(record.id.clone()));
        }
    }
    Ok(())
}

fn assemble(
    records: &[ItemRecord],
    embeddings: &Embeddings,
    similarity: &[SimilarityEdge],
    assignment: &ClusterAssignment,
    layout: &InitialLayout,
    keywords: Vec<Vec<String>>,
) -> GraphPayload {
    let items: Vec<ItemNode> = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let mut node = ItemNode::from_record(record, assignment.labels[i], layout.items[i]);
            node.empty_text = embeddings.empty[i];
            node
        })
        .collect();

    let mut edges: Vec<GraphEdge> = similarity
        .iter()
        .map(|e| GraphEdge {
            source: records[e.source].id.clone(),
            target: records[e.target].id.clone(),
            weight: e.weight,
            kind: EdgeKind::Similarity,
        })
        .collect();
    edges.extend(
        crate::core::membership_edges(&assignment.labels)
            .into_iter()
            .map(|m| GraphEdge {
                source: anchor_id(m.cluster),
                target: records[m.item].id.clone(),
                weight: MEMBERSHIP_EDGE_WEIGHT,
                kind: EdgeKind::Membership,
            }),
    );

    let sizes = assignment.sizes();
    let fallback_positions =
        member_centroids(&layout.items, &assignment.labels, assignment.n_clusters);
    let clusters: Vec<ClusterInfo> = keywords
        .into_iter()
        .enumerate()
        .map(|(c, keywords)| {
            let (x, y) = match layout.anchors.get(c) {
                Some(&p) => p,
                None => {
                    warn!("Cluster {} has no anchor, using its member centroid", c);
                    fallback_positions[c].unwrap_or_default()
                }
            };
            let label = cluster_label(c, &keywords);
            trace!("Cluster {}: '{}' ({} members)", c, label, sizes[c]);
            ClusterInfo {
                id: c,
                label,
                keywords,
                size: sizes[c],
                x,
                y,
            }
        })
        .collect();

    let metadata = RunMetadata {
        clustering_method: assignment.method,
        fallback_reason: assignment.fallback_reason.clone(),
        n_clusters: assignment.n_clusters,
        noise_points: assignment.noise_count(),
        empty_text_items: embeddings.empty_count(),
        embedding_dimension: embeddings.dimension,
        min_cluster_size_used: assignment.min_cluster_size_used,
    };

    GraphPayload {
        items,
        edges,
        clusters,
        metadata,
    }
}
