use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Candidate categories routed differently at commit time.
///
/// | Kind           | Destination      | Purpose                                |
/// |----------------|------------------|----------------------------------------|
/// | `Preference`   | preference store | Learner style/format choices           |
/// | `AnchorFact`   | semantic store   | Distilled facts worth re-surfacing     |
/// | `FixRecipe`    | semantic store   | Remediation steps for weak skills      |
/// | `GapSignature` | semantic store   | Fingerprints of recurring knowledge gaps |
/// | `Unknown`      | semantic store   | Anything upstream failed to classify   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Preference,
    AnchorFact,
    FixRecipe,
    GapSignature,
    Unknown,
}

impl CandidateKind {
    /// Canonical snake_case label used in metadata and event payloads.
    pub fn label(self) -> &'static str {
        match self {
            Self::Preference => "preference",
            Self::AnchorFact => "anchor_fact",
            Self::FixRecipe => "fix_recipe",
            Self::GapSignature => "gap_signature",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a kind from its label.  Unrecognised strings map to `Unknown`
    /// rather than erroring — upstream producers are free-form.
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "preference" => Self::Preference,
            "anchor_fact" => Self::AnchorFact,
            "fix_recipe" => Self::FixRecipe,
            "gap_signature" => Self::GapSignature,
            _ => Self::Unknown,
        }
    }
}

/// Raw candidate as supplied by upstream producers — untyped scores, free-form
/// kind string.  This is the plain-data boundary of the consolidation core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCandidate {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub scores: BTreeMap<String, Value>,
}

/// Normalized candidate: sanitized content, numeric scores, resolved kind.
/// Immutable after normalization — it is either committed or discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCandidate {
    pub kind: CandidateKind,
    pub content: String,
    pub metadata: Map<String, Value>,
    pub scores: BTreeMap<String, f64>,
}

impl MemoryCandidate {
    /// First characters of the content, used in log lines and error messages.
    pub fn snippet(&self) -> String {
        self.content.chars().take(40).collect()
    }
}
