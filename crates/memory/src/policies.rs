//! Normalization and retention policies for memory candidates.
//!
//! Raw candidates arrive from upstream producers as loosely-typed data.
//! Before ranking they pass through here exactly once: content is redacted
//! and truncated, the kind string resolves to a [`CandidateKind`], and score
//! values are coerced to floats — non-numeric values fail fast rather than
//! silently scoring zero.

use std::collections::BTreeMap;

use mentor_config::ScoringConfig;
use thiserror::Error;

use crate::schema::{CandidateKind, MemoryCandidate, RawCandidate};

/// Literal substrings scrubbed from candidate content before storage.
pub const SENSITIVE_TOKENS: &[&str] = &["password", "secret", "token"];

/// Replacement marker for redacted tokens.
pub const REDACTION_PLACEHOLDER: &str = "[redacted]";

/// The four dimensions contributing to the composite score.  Any other key
/// in a candidate's score map is ignored.
pub const SCORE_DIMENSIONS: &[&str] = &["usefulness", "generality", "recency", "stability"];

/// Validation failures surfaced at propose time.  These are caller errors —
/// the controller never retries them.
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("non-numeric score value for `{dimension}` on {kind} candidate \"{snippet}\"")]
    NonNumericScore {
        dimension: String,
        kind: String,
        snippet: String,
    },
}

/// Weighted composite over the four named dimensions, each clamped to
/// `[0, 1]` first.  With weights summing to 1.0 the result is in `[0, 1]`
/// for arbitrary out-of-range inputs.
pub fn composite_score(scores: &BTreeMap<String, f64>, scoring: &ScoringConfig) -> f64 {
    let weights = [
        ("usefulness", scoring.usefulness_weight),
        ("generality", scoring.generality_weight),
        ("recency", scoring.recency_weight),
        ("stability", scoring.stability_weight),
    ];

    weights
        .iter()
        .map(|(dimension, weight)| {
            let value = scores.get(*dimension).copied().unwrap_or(0.0);
            weight * value.clamp(0.0, 1.0)
        })
        .sum()
}

/// Redact sensitive tokens, then truncate to `max_chars` Unicode characters,
/// keeping a trailing `...` marker when truncation happened.
pub fn sanitize_content(content: &str, max_chars: usize) -> String {
    let mut sanitized = content.to_string();
    for tok in SENSITIVE_TOKENS {
        sanitized = sanitized.replace(tok, REDACTION_PLACEHOLDER);
    }

    if sanitized.chars().count() <= max_chars {
        return sanitized;
    }
    let kept: String = sanitized
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect();
    format!("{kept}...")
}

/// Normalize one raw candidate.  Fails fast on the first non-numeric score
/// value, reporting the dimension and a content snippet for the orchestrator.
pub fn normalize(raw: &RawCandidate, scoring: &ScoringConfig) -> Result<MemoryCandidate, CandidateError> {
    let kind = CandidateKind::from_label(&raw.kind);
    let content = sanitize_content(&raw.content, scoring.max_content_chars);

    let mut scores = BTreeMap::new();
    for (dimension, value) in &raw.scores {
        let number = value.as_f64().ok_or_else(|| CandidateError::NonNumericScore {
            dimension: dimension.clone(),
            kind: kind.label().to_string(),
            snippet: raw.content.chars().take(40).collect(),
        })?;
        scores.insert(dimension.clone(), number);
    }

    Ok(MemoryCandidate {
        kind,
        content,
        metadata: raw.metadata.clone(),
        scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scoring() -> ScoringConfig {
        ScoringConfig::default()
    }

    fn score_map(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn composite_clamps_out_of_range_dimensions() {
        let scores = score_map(&[
            ("usefulness", 2.0),
            ("generality", -1.0),
            ("recency", 0.5),
            ("stability", 0.75),
        ]);
        let score = composite_score(&scores, &scoring());
        let expected = 0.45 * 1.0 + 0.25 * 0.0 + 0.15 * 0.5 + 0.15 * 0.75;
        assert!((score - expected).abs() < 1e-9, "score = {score}");
        assert!((score - 0.5625).abs() < 1e-9);
    }

    #[test]
    fn composite_stays_in_unit_interval() {
        let extremes = score_map(&[
            ("usefulness", 100.0),
            ("generality", 100.0),
            ("recency", 100.0),
            ("stability", 100.0),
        ]);
        assert!((composite_score(&extremes, &scoring()) - 1.0).abs() < 1e-9);

        let negatives = score_map(&[("usefulness", -5.0), ("stability", -0.1)]);
        assert_eq!(composite_score(&negatives, &scoring()), 0.0);
    }

    #[test]
    fn unknown_dimensions_are_ignored() {
        let scores = score_map(&[("usefulness", 1.0), ("charisma", 1.0)]);
        assert!((composite_score(&scores, &scoring()) - 0.45).abs() < 1e-9);
    }

    #[test]
    fn missing_dimensions_contribute_zero() {
        assert_eq!(composite_score(&BTreeMap::new(), &scoring()), 0.0);
    }

    #[test]
    fn sanitize_redacts_sensitive_tokens() {
        let out = sanitize_content("the password and secret token", 240);
        assert!(!out.contains("password"));
        assert!(!out.contains("secret"));
        assert!(!out.contains("token"));
        assert!(out.contains(REDACTION_PLACEHOLDER));
    }

    #[test]
    fn sanitize_truncates_with_ellipsis() {
        let long = "x".repeat(300);
        let out = sanitize_content(&long, 240);
        assert_eq!(out.chars().count(), 240);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn sanitize_leaves_short_content_untouched() {
        assert_eq!(sanitize_content("short note", 240), "short note");
    }

    #[test]
    fn sanitize_truncation_is_char_aware() {
        let long = "é".repeat(300);
        let out = sanitize_content(&long, 240);
        assert_eq!(out.chars().count(), 240);
    }

    #[test]
    fn normalize_coerces_integer_scores() {
        let raw = RawCandidate {
            kind: "anchor_fact".to_string(),
            content: "a fact".to_string(),
            scores: [("usefulness".to_string(), json!(1))].into_iter().collect(),
            ..RawCandidate::default()
        };
        let candidate = normalize(&raw, &scoring()).unwrap();
        assert_eq!(candidate.kind, CandidateKind::AnchorFact);
        assert_eq!(candidate.scores["usefulness"], 1.0);
    }

    #[test]
    fn normalize_rejects_non_numeric_scores() {
        let raw = RawCandidate {
            kind: "anchor_fact".to_string(),
            content: "a fact with a bad score".to_string(),
            scores: [("usefulness".to_string(), json!("high"))]
                .into_iter()
                .collect(),
            ..RawCandidate::default()
        };
        let err = normalize(&raw, &scoring()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("usefulness"), "message = {message}");
        assert!(message.contains("anchor_fact"), "message = {message}");
    }

    #[test]
    fn normalize_defaults_unrecognised_kind_to_unknown() {
        let raw = RawCandidate {
            kind: "mystery".to_string(),
            content: "who knows".to_string(),
            ..RawCandidate::default()
        };
        let candidate = normalize(&raw, &scoring()).unwrap();
        assert_eq!(candidate.kind, CandidateKind::Unknown);
    }
}
