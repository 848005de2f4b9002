//! Sparse term-frequency scoring for the router's lexical fallback.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Stop words dropped from term vectors.
const STOP_WORDS: [&str; 45] = [
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "may", "might", "can", "this", "that", "these", "those", "i",
    "you", "he", "she", "it", "we", "they", "them",
];

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w+\b").unwrap_or_else(|_| unreachable!()))
}

/// Normalised term frequencies of `text`, stop words and short tokens
/// removed.
#[must_use]
pub fn term_frequencies(text: &str) -> HashMap<String, f32> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = word_re()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .collect();

    let mut tf: HashMap<String, f32> = HashMap::new();
    for word in &words {
        *tf.entry((*word).to_string()).or_insert(0.0) += 1.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let total = words.len() as f32;
    if total > 0.0 {
        for value in tf.values_mut() {
            *value /= total;
        }
    }
    tf
}

/// Cosine similarity between two sparse term vectors.
#[must_use]
pub fn sparse_cosine(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot: f32 = a
        .iter()
        .filter_map(|(term, weight)| b.get(term).map(|other| weight * other))
        .sum();
    let mag_a: f32 = a.values().map(|w| w * w).sum::<f32>().sqrt();
    let mag_b: f32 = b.values().map(|w| w * w).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_frequencies_drop_stop_words() {
        let tf = term_frequencies("the pace of the work");
        assert!(tf.contains_key("pace"));
        assert!(tf.contains_key("work"));
        assert!(!tf.contains_key("the"));
        assert!(!tf.contains_key("of"));
    }

    #[test]
    fn test_term_frequencies_normalised() {
        let tf = term_frequencies("pace pace work");
        assert!((tf["pace"] - 2.0 / 3.0).abs() < 1e-6);
        assert!((tf["work"] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_cosine_identical() {
        let tf = term_frequencies("slowing the pace of work");
        assert!((sparse_cosine(&tf, &tf) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_cosine_disjoint() {
        let a = term_frequencies("entirely different words");
        let b = term_frequencies("nothing shared here");
        assert!(sparse_cosine(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_cosine_empty() {
        let a = term_frequencies("");
        let b = term_frequencies("pace");
        assert_eq!(sparse_cosine(&a, &b), 0.0);
    }
}
