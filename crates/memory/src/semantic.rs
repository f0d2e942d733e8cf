//! Content-addressed semantic store with bag-of-words retrieval.
//!
//! Documents are deduplicated by a SHA-256 fingerprint of their trimmed
//! content: re-inserting known text returns the existing id instead of
//! creating a duplicate, which makes commit retries idempotent.  When a
//! persist path is configured the store snapshots itself to JSON after every
//! insert (`{next_id, documents: [...]}`).

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::similarity::{self, TermVector};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticDocument {
    #[serde(rename = "id")]
    pub doc_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A document paired with its similarity score for one query.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: SemanticDocument,
    pub score: f32,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    documents: Vec<SemanticDocument>,
}

#[derive(Debug)]
pub struct SemanticStore {
    persist_path: Option<PathBuf>,
    documents: Vec<SemanticDocument>,
    /// Term-frequency vectors, parallel to `documents`.
    index: Vec<TermVector>,
    /// Content fingerprint (SHA-256 hex) → doc id.
    fingerprints: HashMap<String, String>,
    next_id: u64,
}

impl Default for SemanticStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticStore {
    /// In-memory store with no persistence.
    pub fn new() -> Self {
        Self {
            persist_path: None,
            documents: Vec::new(),
            index: Vec::new(),
            fingerprints: HashMap::new(),
            next_id: 1,
        }
    }

    /// Open a persistent store, loading the snapshot at `path` when present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = Self::new();

        if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading semantic store at {}", path.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&raw)
                .with_context(|| format!("parsing semantic store at {}", path.display()))?;
            store.next_id = snapshot.next_id;
            for document in snapshot.documents {
                store.index.push(similarity::vectorize(&document.content));
                store
                    .fingerprints
                    .insert(fingerprint(&document.content), document.doc_id.clone());
                store.documents.push(document);
            }
        }

        store.persist_path = Some(path);
        Ok(store)
    }

    /// Insert `content`, returning its document id.
    ///
    /// The content is trimmed first.  If a document with the same fingerprint
    /// already exists its id is returned and nothing is written.
    pub fn add(&mut self, content: &str, metadata: Map<String, Value>) -> Result<String> {
        let cleaned = content.trim();
        let print = fingerprint(cleaned);
        if let Some(existing) = self.fingerprints.get(&print) {
            debug!(doc_id = %existing, "semantic insert deduplicated by fingerprint");
            return Ok(existing.clone());
        }

        let doc_id = format!("doc_{}", self.next_id);
        self.next_id += 1;
        self.index.push(similarity::vectorize(cleaned));
        self.fingerprints.insert(print, doc_id.clone());
        self.documents.push(SemanticDocument {
            doc_id: doc_id.clone(),
            content: cleaned.to_string(),
            metadata,
        });

        self.persist()?;
        Ok(doc_id)
    }

    /// Score every stored document against `query` and return the best
    /// `top_k`, ties broken by insertion order.  An empty store yields an
    /// empty list; an empty query scores everything 0.0, still capped.
    pub fn similarity_search(&self, query: &str, top_k: usize) -> Vec<ScoredDocument> {
        let query_vector = similarity::vectorize(query);

        let mut scored: Vec<ScoredDocument> = self
            .documents
            .iter()
            .zip(self.index.iter())
            .map(|(document, vector)| ScoredDocument {
                document: document.clone(),
                score: similarity::cosine(&query_vector, vector),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        scored
    }

    /// All documents in insertion order.
    pub fn all(&self) -> &[SemanticDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let snapshot = Snapshot {
            next_id: self.next_id,
            documents: self.documents.clone(),
        };
        let rendered = serde_json::to_string_pretty(&snapshot)?;
        fs::write(path, rendered)
            .with_context(|| format!("writing semantic store at {}", path.display()))?;
        Ok(())
    }
}

fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn add_allocates_sequential_ids() {
        let mut store = SemanticStore::new();
        let first = store.add("graphs are sets of vertices", Map::new()).unwrap();
        let second = store.add("edges connect vertices", Map::new()).unwrap();
        assert_eq!(first, "doc_1");
        assert_eq!(second, "doc_2");
    }

    #[test]
    fn identical_content_is_deduplicated() {
        let mut store = SemanticStore::new();
        let first = store.add("the same fact", Map::new()).unwrap();
        let second = store.add("the same fact", Map::new()).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn dedup_applies_after_trimming() {
        let mut store = SemanticStore::new();
        let first = store.add("a trimmed fact", Map::new()).unwrap();
        let second = store.add("  a trimmed fact  \n", Map::new()).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn similarity_search_ranks_relevant_first() {
        let mut store = SemanticStore::new();
        store
            .add("thompson sampling balances exploration", Map::new())
            .unwrap();
        store.add("markdown rendering of reports", Map::new()).unwrap();

        let hits = store.similarity_search("thompson sampling", 2);
        assert_eq!(hits[0].document.doc_id, "doc_1");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn similarity_search_on_empty_store_returns_empty() {
        let store = SemanticStore::new();
        assert!(store.similarity_search("anything", 3).is_empty());
    }

    #[test]
    fn empty_query_scores_all_zero_and_caps_at_top_k() {
        let mut store = SemanticStore::new();
        for i in 0..4 {
            store.add(&format!("fact number {i}"), Map::new()).unwrap();
        }
        let hits = store.similarity_search("", 2);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.score == 0.0));
        // Ties at 0.0 keep insertion order.
        assert_eq!(hits[0].document.doc_id, "doc_1");
        assert_eq!(hits[1].document.doc_id, "doc_2");
    }

    #[test]
    fn snapshot_round_trip_preserves_dedup_and_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("semantic.json");

        {
            let mut store = SemanticStore::open(&path).unwrap();
            store
                .add("beta priors encode uncertainty", meta(&[("skill", "Foundations")]))
                .unwrap();
            store.add("cosine compares token bags", Map::new()).unwrap();
        }

        let mut reopened = SemanticStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.all()[0].metadata["skill"], "Foundations");

        // Known content still deduplicates after reload.
        let id = reopened
            .add("beta priors encode uncertainty", Map::new())
            .unwrap();
        assert_eq!(id, "doc_1");
        assert_eq!(reopened.len(), 2);

        // New content continues the id sequence.
        let id = reopened.add("a fresh fact", Map::new()).unwrap();
        assert_eq!(id, "doc_3");
    }
}
