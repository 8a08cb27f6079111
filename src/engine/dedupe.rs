// ── Mnemo Engine: Duplicate Detection ──────────────────────────────────────
// Score-based duplicate detection against vector-search neighbours, plus
// text-only utilities (normalisation, word-set Jaccard) for callers that
// have no embeddings at hand.

use crate::atoms::memory_types::ScoredPoint;
use std::collections::HashSet;

/// Default cosine-score threshold above which a neighbour counts as a
/// duplicate of the new text.
pub const DUPLICATE_SCORE_THRESHOLD: f32 = 0.95;

/// Return the first candidate whose vector score reaches the threshold,
/// in iteration order. Candidates are expected to be the k-NN results of
/// the new text's embedding.
pub fn find_duplicate(candidates: &[ScoredPoint], threshold: f32) -> Option<&ScoredPoint> {
    candidates.iter().find(|c| c.score >= threshold)
}

/// Lowercase and collapse all whitespace runs to single spaces.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Word-set Jaccard similarity of the normalised texts.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a_norm = normalize_text(a);
    let b_norm = normalize_text(b);
    let a_words: HashSet<&str> = a_norm.split_whitespace().collect();
    let b_words: HashSet<&str> = b_norm.split_whitespace().collect();
    if a_words.is_empty() && b_words.is_empty() {
        return 1.0;
    }
    let union = a_words.union(&b_words).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a_words.intersection(&b_words).count();
    intersection as f64 / union as f64
}
