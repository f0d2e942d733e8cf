//! Propose → review → commit controller for one consolidation cycle.
//!
//! One controller instance per session, constructed explicitly and passed by
//! handle — there is no ambient/static instance.  The controller owns the
//! transient candidate queue and is the only writer of the three stores.

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use mentor_config::{ScoringConfig, Settings};

use crate::event_log::EpisodicLog;
use crate::policies::{self, CandidateError};
use crate::prefs::PreferenceStore;
use crate::schema::{CandidateKind, MemoryCandidate, RawCandidate};
use crate::semantic::SemanticStore;

/// Phase stamped on every commit event in the episodic log.
const COMMIT_PHASE: &str = "memorize";

/// A document handed back from [`MemoryController::retrieve`].
#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    pub id: String,
    pub content: String,
    pub metadata: Map<String, Value>,
}

pub struct MemoryController {
    event_log: EpisodicLog,
    semantic: SemanticStore,
    prefs: PreferenceStore,
    scoring: ScoringConfig,
    /// Candidates accumulated by `propose`, replaced by the reviewed set
    /// after `review`, cleared by a successful `commit`.
    pending: Vec<MemoryCandidate>,
}

impl MemoryController {
    pub fn new(
        event_log: EpisodicLog,
        semantic: SemanticStore,
        prefs: PreferenceStore,
        scoring: ScoringConfig,
    ) -> Self {
        Self {
            event_log,
            semantic,
            prefs,
            scoring,
            pending: Vec::new(),
        }
    }

    /// Open all three stores at their configured paths.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let event_log = EpisodicLog::open(&settings.stores.events_path)?;
        let prefs = PreferenceStore::open(&settings.stores.preferences_path)?;
        let semantic = match &settings.stores.semantic_path {
            Some(path) => SemanticStore::open(path)?,
            None => SemanticStore::new(),
        };
        Ok(Self::new(event_log, semantic, prefs, settings.scoring.clone()))
    }

    /// Normalize raw candidates and append them to the pending queue.
    ///
    /// Fails fast on the first malformed score value; candidates normalized
    /// before the failure stay queued, matching the best-effort cycle model.
    pub fn propose(
        &mut self,
        candidates: impl IntoIterator<Item = RawCandidate>,
    ) -> Result<usize, CandidateError> {
        let mut appended = 0;
        for raw in candidates {
            let candidate = policies::normalize(&raw, &self.scoring)?;
            debug!(kind = candidate.kind.label(), snippet = %candidate.snippet(), "candidate proposed");
            self.pending.push(candidate);
            appended += 1;
        }
        Ok(appended)
    }

    /// Rank the pending queue by composite score (stable on ties) and keep
    /// only the best `limit` candidates.  Destructive: the pending queue
    /// becomes the reviewed set.  Returns a copy of that set.
    pub fn review(&mut self, limit: usize) -> Vec<MemoryCandidate> {
        let mut ranked: Vec<(f64, MemoryCandidate)> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|candidate| {
                let score = policies::composite_score(&candidate.scores, &self.scoring);
                (score, candidate)
            })
            .collect();
        // Stable sort: equal scores keep proposal order.
        ranked.sort_by(|(left, _), (right, _)| right.total_cmp(left));

        self.pending = ranked
            .into_iter()
            .take(limit)
            .map(|(_, candidate)| candidate)
            .collect();
        self.pending.clone()
    }

    /// Persist every reviewed candidate and emit one episodic event each.
    ///
    /// Returns committed ids in review order: `pref:<key>` for preferences,
    /// the semantic `doc_<n>` id for everything else.  A failure midway
    /// leaves earlier commits durable and the queue intact; the semantic
    /// store's fingerprint dedup and the preference store's keyed overwrite
    /// make a wholesale retry idempotent.
    pub fn commit(&mut self, session_id: &str) -> Result<Vec<String>> {
        let mut committed = Vec::with_capacity(self.pending.len());

        for candidate in &self.pending {
            let score = policies::composite_score(&candidate.scores, &self.scoring);

            let committed_id = match candidate.kind {
                CandidateKind::Preference => {
                    let key = match candidate.metadata.get("key").and_then(Value::as_str) {
                        Some(key) => key.to_string(),
                        None => format!("pref_{}", self.prefs.len() + 1),
                    };
                    self.prefs
                        .set(&key, Value::String(candidate.content.clone()))
                        .with_context(|| format!("committing preference `{key}`"))?;
                    format!("pref:{key}")
                }
                _ => {
                    let mut metadata = Map::new();
                    metadata.insert(
                        "type".to_string(),
                        Value::String(candidate.kind.label().to_string()),
                    );
                    metadata.extend(candidate.metadata.clone());
                    self.semantic
                        .add(&candidate.content, metadata)
                        .with_context(|| {
                            format!(
                                "committing {} candidate \"{}\"",
                                candidate.kind.label(),
                                candidate.snippet()
                            )
                        })?
                }
            };

            self.event_log.record(
                session_id,
                COMMIT_PHASE,
                json!({
                    "type": candidate.kind.label(),
                    "score": score,
                    "metadata": candidate.metadata,
                }),
            )?;
            committed.push(committed_id);
        }

        info!(
            session = session_id,
            committed = committed.len(),
            "memory commit cycle finished"
        );
        self.pending.clear();
        Ok(committed)
    }

    /// Read-only retrieval: similarity search when a query is given,
    /// otherwise the first `limit` documents in insertion order.
    pub fn retrieve(&self, limit: usize, query: Option<&str>) -> Vec<RetrievedMemory> {
        match query {
            Some(query) => self
                .semantic
                .similarity_search(query, limit)
                .into_iter()
                .map(|hit| RetrievedMemory {
                    id: hit.document.doc_id,
                    content: hit.document.content,
                    metadata: hit.document.metadata,
                })
                .collect(),
            None => self
                .semantic
                .all()
                .iter()
                .take(limit)
                .map(|document| RetrievedMemory {
                    id: document.doc_id.clone(),
                    content: document.content.clone(),
                    metadata: document.metadata.clone(),
                })
                .collect(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn event_log(&self) -> &EpisodicLog {
        &self.event_log
    }

    pub fn semantic(&self) -> &SemanticStore {
        &self.semantic
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.prefs
    }
}
