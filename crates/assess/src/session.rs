//! Typed session state threaded between pipeline stages.
//!
//! Upstream stages (scraping, planning, report rendering) exchange this
//! structure as plain data — every field is optional-ish and serde-defaulted
//! so partially-populated states deserialize cleanly at stage boundaries.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use mentor_memory::RawCandidate;

use crate::priors::PriorSeed;
use crate::reflection::ReflectionState;

/// One evaluated question/answer pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QaResult {
    pub question: String,
    pub answer: String,
    pub skill: String,
    pub score: f64,
    /// Learner's self-reported confidence, 1–5.
    pub confidence: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Default for QaResult {
    fn default() -> Self {
        Self {
            question: String::new(),
            answer: String::new(),
            skill: String::new(),
            score: 0.0,
            confidence: 3,
            rationale: None,
        }
    }
}

/// Canonical state exchanged between pipeline stages, one per session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub session_id: String,
    pub topic: String,
    pub goal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_budget: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Skill priors carried across sessions; rehydrated into a
    /// [`crate::priors::PriorsRepository`] at planning time.
    pub priors: BTreeMap<String, PriorSeed>,
    pub questions: Vec<String>,
    pub qa: Vec<QaResult>,
    /// Raw candidates accumulated for the next consolidation cycle.
    pub mem_candidates: Vec<RawCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflection: Option<ReflectionState>,
}

impl SessionState {
    /// Fresh session for `topic` with a generated id.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// The session's deterministic RNG.
    pub fn rng(&self) -> ChaCha8Rng {
        session_rng(&self.session_id, &self.topic)
    }
}

/// Deterministic per-session RNG, seeded from a SHA-256 of session id and
/// topic.  Same inputs, same question ordering — reproducible in tests and
/// across reruns, with no process-global generator involved.
pub fn session_rng(session_id: &str, topic: &str) -> ChaCha8Rng {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(topic.as_bytes());
    let seed: [u8; 32] = hasher.finalize().into();
    ChaCha8Rng::from_seed(seed)
}
