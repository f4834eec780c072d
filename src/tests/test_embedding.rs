use approx::assert_relative_eq;

use crate::core::{dot, norm};
use crate::embedding::{
    embed_texts, global_embedder, EmbeddingProvider, HashingEmbedder, DEFAULT_EMBEDDING_DIM,
};
use crate::error::{GraphError, Result};
use crate::tests::init;

/// Provider returning a fixed batch regardless of input.
struct Broken {
    dim: usize,
    returned: Vec<Vec<f64>>,
}

impl EmbeddingProvider for Broken {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f64>>> {
        Ok(self.returned.clone())
    }
}

fn texts(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_hashing_embedder_is_deterministic_and_unit_norm() {
    let embedder = HashingEmbedder::new(64);
    let a = embedder.embed_one("Steel beams delivered late by the supplier");
    let b = embedder.embed_one("Steel beams delivered late by the supplier");
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert_relative_eq!(norm(&a), 1.0, epsilon = 1e-12);
}

#[test]
fn test_parallel_batch_matches_single_embeds() {
    let embedder = HashingEmbedder::new(32);
    let batch = texts(&["steel beams late", "beams late again", "crane hazard"]);
    let embedded = embedder.embed_batch(&batch).unwrap();

    // "again" is a stop word: 5 unigrams and 3 bigrams
    assert_eq!(embedder.cached_tokens(), 8);

    let fresh = HashingEmbedder::new(32);
    for (text, v) in batch.iter().zip(&embedded) {
        assert_eq!(&fresh.embed_one(text), v);
    }
}

#[test]
fn test_shared_vocabulary_means_higher_similarity() {
    let embedder = HashingEmbedder::new(256);
    let steel = embedder.embed_one("steel supplier delivery late");
    let steel2 = embedder.embed_one("late steel delivery from supplier");
    let permit = embedder.embed_one("council permit approval hearing");
    assert!(dot(&steel, &steel2) > dot(&steel, &permit) + 0.3);
}

#[test]
fn test_blank_texts_get_flagged_zero_vectors() {
    init();
    let embedder = HashingEmbedder::new(32);
    let batch = texts(&["crane accident", "  ", "--", "budget overrun"]);
    let result = embed_texts(&embedder, &batch).unwrap();

    assert_eq!(result.len(), 4);
    assert_eq!(result.dimension, 32);
    assert_eq!(result.empty, vec![false, true, true, false]);
    assert_eq!(result.empty_count(), 2);
    assert_eq!(result.vectors[1], vec![0.0; 32]);
    assert_relative_eq!(norm(&result.vectors[0]), 1.0, epsilon = 1e-12);
}

#[test]
fn test_all_blank_skips_the_provider() {
    let broken = Broken {
        dim: 8,
        returned: Vec::new(),
    };
    let result = embed_texts(&broken, &texts(&["", " "])).unwrap();
    assert_eq!(result.empty_count(), 2);
    assert!(result.vectors.iter().all(|v| v == &vec![0.0; 8]));
}

#[test]
fn test_provider_errors_are_reported() {
    let short = Broken {
        dim: 4,
        returned: vec![vec![1.0, 0.0, 0.0, 0.0]],
    };
    assert!(matches!(
        embed_texts(&short, &texts(&["one", "two"])),
        Err(GraphError::Embedding(_))
    ));

    let wrong_dim = Broken {
        dim: 4,
        returned: vec![vec![1.0, 0.0]],
    };
    assert!(matches!(
        embed_texts(&wrong_dim, &texts(&["one"])),
        Err(GraphError::DimensionMismatch { expected: 4, got: 2 })
    ));
}

#[test]
fn test_provider_output_is_normalised() {
    let raw = Broken {
        dim: 2,
        returned: vec![vec![3.0, 4.0]],
    };
    let result = embed_texts(&raw, &texts(&["anything"])).unwrap();
    assert_eq!(result.vectors[0], vec![0.6, 0.8]);
}

#[test]
fn test_global_embedder_is_initialised_once() {
    let handles: Vec<_> = (0..4)
        .map(|_| {
            std::thread::spawn(|| {
                let provider: *const dyn EmbeddingProvider = global_embedder();
                provider as *const () as usize
            })
        })
        .collect();
    let addresses: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(global_embedder().dimension(), DEFAULT_EMBEDDING_DIM);
    assert_eq!(global_embedder().name(), "hashing");
}
