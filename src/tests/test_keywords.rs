use log::info;

use crate::keywords::{
    cluster_label, extract_keywords, is_stop_word, tokenize, TfIdf, KEYWORDS_PER_CLUSTER,
    STOP_WORDS,
};
use crate::tests::init;
use crate::tests::test_data::{make_records, TOPICS};

#[test]
fn test_stop_words_are_sorted_for_lookup() {
    assert!(STOP_WORDS.windows(2).all(|w| w[0] < w[1]));
    assert!(is_stop_word("the"));
    assert!(is_stop_word("without"));
    assert!(!is_stop_word("steel"));
}

#[test]
fn test_tokenize() {
    assert_eq!(
        tokenize("Late-steel, a B2 x DELIVERY"),
        vec!["late", "steel", "b2", "delivery"]
    );
    assert!(tokenize(" .. ").is_empty());
}

#[test]
fn test_terms_in_every_document_are_dropped() {
    let docs: Vec<String> = ["project steel", "project permit", "project budget"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let tfidf = TfIdf::fit(&docs);
    assert!(!tfidf.vocabulary.contains(&"project".to_string()));
    assert!(tfidf.vocabulary.contains(&"project steel".to_string()));
    assert!(tfidf.vocabulary.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(tfidf.rows.len(), 3);
}

#[test]
fn test_keywords_follow_cluster_topics() {
    init();
    let records = make_records(40, 5);
    let texts: Vec<String> = records.iter().map(|r| r.combined_text()).collect();
    let labels: Vec<Option<usize>> = (0..40).map(|i| Some(i % TOPICS.len())).collect();

    let keywords = extract_keywords(&texts, &labels, TOPICS.len(), KEYWORDS_PER_CLUSTER);
    assert_eq!(keywords.len(), TOPICS.len());
    for (c, words) in keywords.iter().enumerate() {
        info!("cluster {}: {:?}", c, words);
        assert_eq!(words.len(), KEYWORDS_PER_CLUSTER);
        for keyword in words {
            assert!(
                keyword.split(' ').all(|w| TOPICS[c].contains(&w)),
                "keyword {:?} is off-topic for cluster {}",
                keyword,
                c
            );
        }
    }
}

#[test]
fn test_noise_and_empty_clusters() {
    let texts: Vec<String> = vec!["steel beams".into(), "permit council".into()];
    let keywords = extract_keywords(&texts, &[Some(0), None], 2, 4);
    assert_eq!(keywords.len(), 2);
    assert!(!keywords[0].is_empty());
    assert!(keywords[1].is_empty());

    assert!(extract_keywords(&[], &[], 0, 4).is_empty());
}

#[test]
fn test_single_document_gets_a_numbered_label() {
    let keywords = extract_keywords(&["steel beams".to_string()], &[Some(0)], 1, 4);
    assert!(keywords[0].is_empty());
    assert_eq!(cluster_label(0, &keywords[0]), "Cluster 1");
}

#[test]
fn test_label_joins_top_keywords() {
    let keywords: Vec<String> = ["steel", "supplier", "late", "beams"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(cluster_label(2, &keywords), "steel / supplier / late");
}
