//! Token-frequency vectorization and cosine similarity.
//!
//! This is the whole retrieval model of the semantic store: no embedding
//! backend, just bag-of-words cosine over lowercase whitespace tokens.  Pure
//! functions, no state.

use std::collections::BTreeMap;

/// Sparse term-frequency vector keyed by lowercase token.
pub type TermVector = BTreeMap<String, f32>;

/// Lowercase whitespace tokenization into a frequency map.
pub fn vectorize(text: &str) -> TermVector {
    let mut vector = TermVector::new();
    for token in text.split_whitespace() {
        *vector.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    vector
}

/// Cosine similarity over the shared vocabulary, in `[0, 1]`.
///
/// Returns `0.0` when either vector is empty or the dot product is zero,
/// which also guards the divide-by-zero on the magnitudes.
pub fn cosine(a: &TermVector, b: &TermVector) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot: f32 = a
        .iter()
        .filter_map(|(term, weight)| b.get(term).map(|other| weight * other))
        .sum();
    if dot == 0.0 {
        return 0.0;
    }

    let mag_a: f32 = a.values().map(|v| v * v).sum::<f32>().sqrt();
    let mag_b: f32 = b.values().map(|v| v * v).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    (dot / (mag_a * mag_b)).clamp(0.0, 1.0)
}
