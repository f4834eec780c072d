use std::collections::HashSet;
use std::sync::Arc;

use log::info;

use crate::builder::GraphBuilder;
use crate::clustering::ClusteringMethod;
use crate::config::{LayoutMethod, LayoutParams};
use crate::core::{anchor_id, GraphPayload, ItemRecord, MEMBERSHIP_EDGE_WEIGHT};
use crate::embedding::HashingEmbedder;
use crate::error::GraphError;
use crate::tests::init;
use crate::tests::test_data::make_records;

fn builder() -> GraphBuilder {
    GraphBuilder::new().with_embedder(Arc::new(HashingEmbedder::new(128)))
}

#[test]
fn test_payload_invariants() {
    init();
    let records = make_records(40, 3);
    let payload = builder().with_similarity(0.3, 4).build(&records).unwrap();
    info!(
        "{} items, {} edges, {} clusters via {:?}",
        payload.items.len(),
        payload.edges.len(),
        payload.clusters.len(),
        payload.metadata.clustering_method
    );

    assert_eq!(payload.items.len(), 40);
    assert_eq!(payload.clusters.len(), payload.metadata.n_clusters);
    assert!(payload.metadata.n_clusters >= 2);

    let ids: HashSet<&str> = payload.items.iter().map(|i| i.id.as_str()).collect();
    let mut pairs = HashSet::new();
    for edge in payload.similarity_edges() {
        assert!(edge.weight > 0.3);
        assert!(ids.contains(edge.source.as_str()) && ids.contains(edge.target.as_str()));
        let key = if edge.source < edge.target {
            (edge.source.clone(), edge.target.clone())
        } else {
            (edge.target.clone(), edge.source.clone())
        };
        assert!(pairs.insert(key), "duplicate edge {:?}", edge);
    }

    let members = payload.items.iter().filter(|i| i.cluster.is_some()).count();
    assert_eq!(payload.membership_edges().count(), members);
    for edge in payload.membership_edges() {
        let item = payload.items.iter().find(|i| i.id == edge.target).unwrap();
        assert_eq!(edge.source, anchor_id(item.cluster.unwrap()));
        assert_eq!(edge.weight, MEMBERSHIP_EDGE_WEIGHT);
    }

    let sizes: usize = payload.clusters.iter().map(|c| c.size).sum();
    assert_eq!(sizes, members);
    assert_eq!(payload.metadata.noise_points, 40 - members);
    assert!(payload.clusters.iter().all(|c| !c.label.is_empty()));
    assert_eq!(payload.metadata.embedding_dimension, 128);
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let records = vec![
        ItemRecord::new("R-1", "steel delivery"),
        ItemRecord::new("R-1", "permit hearing"),
    ];
    match builder().build(&records) {
        Err(GraphError::DuplicateItemId(id)) => assert_eq!(id, "R-1"),
        other => panic!("expected a duplicate id error, got {:?}", other),
    }
}

#[test]
fn test_invalid_params_are_rejected_before_work() {
    let records = make_records(5, 1);
    assert!(matches!(
        builder().with_similarity(0.0, 5).build(&records),
        Err(GraphError::InvalidParameter { name: "threshold", .. })
    ));
}

#[test]
fn test_single_item() {
    init();
    let records = vec![ItemRecord::new("R-1", "Crane collapsed on site").with_title("Crane")];
    let payload = builder().build(&records).unwrap();

    assert_eq!(payload.items.len(), 1);
    assert_eq!(payload.similarity_edges().count(), 0);
    assert_eq!(payload.membership_edges().count(), 1);
    assert_eq!(payload.clusters.len(), 1);
    assert_eq!(payload.clusters[0].label, "Cluster 1");
    assert_eq!(payload.metadata.clustering_method, ClusteringMethod::Single);
    assert_eq!(payload.items[0].cluster, Some(0));
}

#[test]
fn test_no_records() {
    let payload = builder().build(&[]).unwrap();
    assert!(payload.is_empty());
    assert!(payload.edges.is_empty());
    assert!(payload.clusters.is_empty());
}

#[test]
fn test_blank_text_is_flagged_and_isolated() {
    let mut records = make_records(12, 9);
    records.push(ItemRecord::new("R-blank", "  "));
    let payload = builder().with_similarity(0.1, 5).build(&records).unwrap();

    let blank = payload.items.iter().find(|i| i.id == "R-blank").unwrap();
    assert!(blank.empty_text);
    assert_eq!(payload.metadata.empty_text_items, 1);
    assert!(payload
        .similarity_edges()
        .all(|e| e.source != "R-blank" && e.target != "R-blank"));
    assert_eq!(payload.items.iter().filter(|i| i.empty_text).count(), 1);
}

#[test]
fn test_build_is_deterministic() {
    let records = make_records(30, 4);
    let a = builder().build(&records).unwrap();
    let b = builder().build(&records).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_payload_survives_json() {
    let payload = builder().build(&make_records(16, 8)).unwrap();
    let back = GraphPayload::from_json(&payload.to_json().unwrap()).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn test_analysis_exposes_intermediate_results() {
    let records = make_records(20, 6);
    let analysis = builder().analyse(&records).unwrap();
    assert_eq!(analysis.embeddings.len(), 20);
    assert_eq!(analysis.centroids.len(), analysis.assignment.n_clusters);
    assert_eq!(analysis.layout.items.len(), 20);
    assert_eq!(analysis.layout.anchors.len(), analysis.assignment.n_clusters);
    assert_eq!(
        analysis.payload.similarity_edges().count(),
        analysis.similarity.len()
    );
}

#[test]
fn test_projection_layout_method() {
    let records = make_records(24, 12);
    let layout = LayoutParams {
        method: LayoutMethod::Projection,
        ..Default::default()
    };
    let projected = builder().with_layout(layout).analyse(&records).unwrap();
    let spring = builder().analyse(&records).unwrap();
    assert_eq!(projected.assignment, spring.assignment);
    assert_ne!(projected.layout.items, spring.layout.items);

    // padded canvas, anchors at their members' centroid
    for item in &projected.payload.items {
        assert!((100.0 - 1e-6..=900.0 + 1e-6).contains(&item.x));
        assert!((80.0 - 1e-6..=720.0 + 1e-6).contains(&item.y));
    }
    for cluster in &projected.payload.clusters {
        let members: Vec<_> = projected
            .payload
            .items
            .iter()
            .filter(|i| i.cluster == Some(cluster.id))
            .collect();
        let mean_x = members.iter().map(|i| i.x).sum::<f64>() / members.len() as f64;
        assert!((cluster.x - mean_x).abs() < 1e-9);
    }
}
