//! Text -> vector boundary.
//!
//! The embedding model is an external collaborator: anything implementing
//! [`EmbeddingProvider`] can be plugged into the builder. The crate ships
//! [`HashingEmbedder`], a deterministic random-indexing embedder (every
//! unigram and bigram owns a fixed gaussian direction, a text is the
//! normalised sum of its token directions), so the pipeline runs without
//! a model download.
//!
//! A process-wide provider is available through [`global_embedder`]. It is
//! initialised once behind a `OnceLock`: concurrent first callers block on
//! the single initialisation, later reads are lock-free.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use crate::core::{is_blank_text, normalise};
use crate::error::{GraphError, Result};
use crate::keywords::{is_stop_word, tokenize};

pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Batch text -> unit-norm vector function.
pub trait EmbeddingProvider: Send + Sync {
    /// Fixed output dimensionality.
    fn dimension(&self) -> usize;

    /// Embed a batch; must return one L2-normalised vector per text and be
    /// deterministic for identical input.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;

    fn name(&self) -> &str {
        "custom"
    }
}

/// Deterministic random-indexing embedder.
///
/// Token directions are cached in a concurrent map shared by the rayon
/// workers of [`EmbeddingProvider::embed_batch`].
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dim: usize,
    bigram_weight: f64,
    directions: DashMap<String, Arc<[f64]>>,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim: dim.max(2),
            bigram_weight: 0.5,
            directions: DashMap::new(),
        }
    }

    /// Gaussian direction owned by `token`, identical across runs.
    fn token_direction(&self, token: &str) -> Arc<[f64]> {
        if let Some(d) = self.directions.get(token) {
            return Arc::clone(d.value());
        }
        let entry = self.directions.entry(token.to_string()).or_insert_with(|| {
            let mut rng = ChaCha8Rng::seed_from_u64(fnv1a(token.as_bytes()));
            (0..self.dim)
                .map(|_| StandardNormal.sample(&mut rng))
                .collect()
        });
        Arc::clone(entry.value())
    }

    /// Distinct tokens seen so far.
    pub fn cached_tokens(&self) -> usize {
        self.directions.len()
    }

    pub fn embed_one(&self, text: &str) -> Vec<f64> {
        let words: Vec<String> = tokenize(text)
            .into_iter()
            .filter(|t| !is_stop_word(t))
            .collect();

        let mut weights: HashMap<String, f64> = HashMap::new();
        for w in &words {
            *weights.entry(w.clone()).or_insert(0.0) += 1.0;
        }
        for pair in words.windows(2) {
            *weights.entry(format!("{} {}", pair[0], pair[1])).or_insert(0.0) +=
                self.bigram_weight;
        }

        // sorted so the float summation order never depends on the map
        let mut tokens: Vec<(String, f64)> = weights.into_iter().collect();
        tokens.sort_by(|a, b| a.0.cmp(&b.0));

        let mut v = vec![0.0; self.dim];
        for (token, count) in tokens {
            // sublinear term frequency; lone bigrams keep their reduced weight
            let w = if count > 1.0 { 1.0 + count.ln() } else { count };
            let direction = self.token_direction(&token);
            for (acc, d) in v.iter_mut().zip(direction.iter()) {
                *acc += w * d;
            }
        }
        normalise(&mut v);
        v
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        Ok(texts.par_iter().map(|t| self.embed_one(t)).collect())
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

static GLOBAL_EMBEDDER: OnceLock<Box<dyn EmbeddingProvider>> = OnceLock::new();

/// Process-wide provider, created on first use.
pub fn global_embedder() -> &'static dyn EmbeddingProvider {
    GLOBAL_EMBEDDER
        .get_or_init(|| {
            info!(
                "Loading embedding provider: hashing (dim={})",
                DEFAULT_EMBEDDING_DIM
            );
            Box::new(HashingEmbedder::default())
        })
        .as_ref()
}

/// Per-item vectors plus the empty-text flags.
#[derive(Clone, Debug)]
pub struct Embeddings {
    pub vectors: Vec<Vec<f64>>,
    /// `empty[i]` marks a zero vector produced for blank text.
    pub empty: Vec<bool>,
    pub dimension: usize,
}

impl Embeddings {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn empty_count(&self) -> usize {
        self.empty.iter().filter(|e| **e).count()
    }
}

/// Embed all texts; blank ones get a zero vector and a flag instead of
/// being sent to the provider.
pub fn embed_texts(provider: &dyn EmbeddingProvider, texts: &[String]) -> Result<Embeddings> {
    let dim = provider.dimension();
    let empty: Vec<bool> = texts.iter().map(|t| is_blank_text(t)).collect();
    let valid: Vec<usize> = (0..texts.len()).filter(|&i| !empty[i]).collect();

    let mut vectors = vec![vec![0.0; dim]; texts.len()];
    if valid.len() < texts.len() {
        warn!(
            "{} of {} items have no embeddable text; using zero vectors",
            texts.len() - valid.len(),
            texts.len()
        );
    }
    if valid.is_empty() {
        return Ok(Embeddings {
            vectors,
            empty,
            dimension: dim,
        });
    }

    info!(
        "Generating embeddings for {} items with provider `{}`",
        valid.len(),
        provider.name()
    );
    let batch: Vec<String> = valid.iter().map(|&i| texts[i].clone()).collect();
    let embedded = provider.embed_batch(&batch)?;
    if embedded.len() != batch.len() {
        return Err(GraphError::Embedding(format!(
            "provider returned {} vectors for {} texts",
            embedded.len(),
            batch.len()
        )));
    }

    for (&idx, mut v) in valid.iter().zip(embedded) {
        if v.len() != dim {
            return Err(GraphError::DimensionMismatch {
                expected: dim,
                got: v.len(),
            });
        }
        normalise(&mut v);
        vectors[idx] = v;
    }
    debug!("Embeddings ready: {}x{}", vectors.len(), dim);

    Ok(Embeddings {
        vectors,
        empty,
        dimension: dim,
    })
}
