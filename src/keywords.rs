//! TF-IDF keyword extraction and cluster labels.
//!
//! The vectoriser mirrors the usual document-term setup: lower-cased
//! alphanumeric tokens of at least two characters, English stop words
//! removed, unigrams plus bigrams, terms present in more than 95% of the
//! documents dropped, the 1000 most frequent terms kept, smooth idf and
//! L2-normalised rows. A cluster's score for a term is the mean of its
//! members' rows; only terms scoring above their corpus-wide mean are
//! considered distinctive.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, trace};
use rayon::prelude::*;

pub const KEYWORDS_PER_CLUSTER: usize = 4;
pub const LABEL_KEYWORDS: usize = 3;

const MAX_FEATURES: usize = 1000;
const MAX_DF: f64 = 0.95;

pub(crate) const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "due", "during", "each",
    "either", "else", "etc", "ever", "every", "few", "for", "from", "further", "had", "has",
    "have", "having", "he", "her", "here", "hers", "him", "his", "how", "however", "i", "if",
    "in", "into", "is", "it", "its", "itself", "just", "may", "me", "might", "more", "most",
    "must", "my", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other",
    "our", "ours", "out", "over", "own", "per", "same", "shall", "she", "should", "so", "some",
    "such", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "through", "thus", "to", "too", "under", "until", "up", "upon", "us", "very",
    "via", "was", "we", "were", "what", "when", "where", "whether", "which", "while", "who",
    "whom", "why", "will", "with", "within", "without", "would", "yet", "you", "your",
];

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Lower-cased alphanumeric runs of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Unigram and bigram terms of one document; bigrams are built over the
/// stop-word-filtered sequence.
fn terms(text: &str) -> Vec<String> {
    let words: Vec<String> = tokenize(text)
        .into_iter()
        .filter(|t| !is_stop_word(t))
        .collect();
    let mut out = words.clone();
    out.extend(words.windows(2).map(|w| format!("{} {}", w[0], w[1])));
    out
}

/// Fitted document-term matrix.
#[derive(Debug, Clone)]
pub struct TfIdf {
    pub vocabulary: Vec<String>,
    /// Sparse L2-normalised rows: (term index, weight).
    pub rows: Vec<Vec<(usize, f64)>>,
}

impl TfIdf {
    pub fn fit(texts: &[String]) -> Self {
        let n_docs = texts.len();
        let docs: Vec<Vec<String>> = texts.par_iter().map(|t| terms(t)).collect();

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        let mut corpus_freq: HashMap<&str, usize> = HashMap::new();
        for doc in &docs {
            let mut seen: HashSet<&str> = HashSet::new();
            for term in doc {
                *corpus_freq.entry(term.as_str()).or_insert(0) += 1;
                if seen.insert(term.as_str()) {
                    *doc_freq.entry(term.as_str()).or_insert(0) += 1;
                }
            }
        }

        let max_doc_count = MAX_DF * n_docs as f64;
        let mut kept: Vec<(&str, usize)> = corpus_freq
            .iter()
            .filter(|(term, _)| doc_freq[*term] as f64 <= max_doc_count)
            .map(|(term, count)| (*term, *count))
            .collect();
        kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        kept.truncate(MAX_FEATURES);
        // alphabetical vocabulary keeps term indices independent of hashing
        let mut vocabulary: Vec<String> = kept.iter().map(|(t, _)| t.to_string()).collect();
        vocabulary.sort();

        let index: HashMap<&str, usize> = vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();
        let idf: Vec<f64> = vocabulary
            .iter()
            .map(|t| ((1.0 + n_docs as f64) / (1.0 + doc_freq[t.as_str()] as f64)).ln() + 1.0)
            .collect();

        let rows: Vec<Vec<(usize, f64)>> = docs
            .par_iter()
            .map(|doc| {
                let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
                for term in doc {
                    if let Some(&j) = index.get(term.as_str()) {
                        *counts.entry(j).or_insert(0.0) += 1.0;
                    }
                }
                let mut row: Vec<(usize, f64)> =
                    counts.into_iter().map(|(j, tf)| (j, tf * idf[j])).collect();
                let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    row.iter_mut().for_each(|(_, w)| *w /= norm);
                }
                row
            })
            .collect();

        debug!(
            "TF-IDF fitted: {} documents, {} terms",
            n_docs,
            vocabulary.len()
        );
        Self { vocabulary, rows }
    }

    /// Dense mean row over `members`.
    fn mean_row(&self, members: &[usize]) -> Vec<f64> {
        let mut mean = vec![0.0; self.vocabulary.len()];
        if members.is_empty() {
            return mean;
        }
        for &i in members {
            for &(j, w) in &self.rows[i] {
                mean[j] += w;
            }
        }
        let n = members.len() as f64;
        mean.iter_mut().for_each(|v| *v /= n);
        mean
    }
}

/// Top keywords per non-noise cluster, indexed by cluster id.
pub fn extract_keywords(
    texts: &[String],
    assignments: &[Option<usize>],
    n_clusters: usize,
    top_n: usize,
) -> Vec<Vec<String>> {
    if texts.is_empty() || n_clusters == 0 {
        return vec![Vec::new(); n_clusters];
    }
    let tfidf = TfIdf::fit(texts);
    let all: Vec<usize> = (0..texts.len()).collect();
    let corpus_mean = tfidf.mean_row(&all);

    (0..n_clusters)
        .into_par_iter()
        .map(|c| {
            let members: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|(_, a)| **a == Some(c))
                .map(|(i, _)| i)
                .collect();
            let mean = tfidf.mean_row(&members);

            let mut scored: Vec<(usize, f64)> = mean
                .iter()
                .enumerate()
                .filter(|(j, s)| **s > 0.0 && **s > corpus_mean[*j])
                .map(|(j, s)| (j, *s))
                .collect();
            if scored.is_empty() {
                // every term is as common here as anywhere else
                scored = mean
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| **s > 0.0)
                    .map(|(j, s)| (j, *s))
                    .collect();
            }
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });

            let keywords: Vec<String> = scored
                .into_iter()
                .take(top_n)
                .map(|(j, _)| tfidf.vocabulary[j].clone())
                .collect();
            trace!("Cluster {} keywords: {:?}", c, keywords);
            keywords
        })
        .collect()
}

/// Human-readable cluster label from its keywords.
pub fn cluster_label(cluster: usize, keywords: &[String]) -> String {
    if keywords.is_empty() {
        format!("Cluster {}", cluster + 1)
    } else {
        keywords
            .iter()
            .take(LABEL_KEYWORDS)
            .cloned()
            .collect::<Vec<_>>()
            .join(" / ")
    }
}
