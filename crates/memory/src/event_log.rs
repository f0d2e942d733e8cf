//! Append-only episodic log backed by [`redb`].
//!
//! One ordered table (`id → JSON record`) is the audit trail of every memory
//! commit.  Ids are gapless and strictly increasing within a store instance;
//! the redb commit at the end of [`EpisodicLog::record`] is fsync-durable, so
//! an event is on disk before the call returns.  The log is never compacted
//! or rewritten.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Event table: `event id (u64) → JSON-serialised StoredEvent`.
const EVENTS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("events");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicEvent {
    /// Monotonic id assigned by the store; commit order.
    pub id: u64,
    pub ts: String,
    pub session: String,
    pub phase: String,
    pub payload: Value,
}

/// On-disk record — the id lives in the table key.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEvent {
    ts: String,
    session: String,
    phase: String,
    payload: Value,
}

pub struct EpisodicLog {
    db: Database,
    path: PathBuf,
}

impl EpisodicLog {
    /// Open or create the log database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(&path)
            .with_context(|| format!("opening episodic log at {}", path.display()))?;

        // Ensure the table exists so read transactions never fail on a
        // freshly-created database.
        {
            let tx = db.begin_write()?;
            tx.open_table(EVENTS_TABLE)?;
            tx.commit()?;
        }

        Ok(Self { db, path })
    }

    /// Append one event and return its assigned id.
    ///
    /// The write transaction is committed (and flushed) before this returns:
    /// downstream accounting relies on recorded events surviving a crash.
    pub fn record(&self, session: &str, phase: &str, payload: Value) -> Result<u64> {
        let stored = StoredEvent {
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            session: session.to_string(),
            phase: phase.to_string(),
            payload,
        };
        let bytes = serde_json::to_vec(&stored)?;

        let tx = self.db.begin_write()?;
        let id = {
            let mut tbl = tx.open_table(EVENTS_TABLE)?;
            let id = tbl.last()?.map(|(key, _)| key.value() + 1).unwrap_or(1);
            tbl.insert(id, bytes.as_slice())?;
            id
        };
        tx.commit()
            .with_context(|| format!("committing event to {}", self.path.display()))?;

        debug!(id, session, phase, "episodic event recorded");
        Ok(id)
    }

    /// All events ordered by id ascending.
    pub fn fetch_all(&self) -> Result<Vec<EpisodicEvent>> {
        let tx = self.db.begin_read()?;
        let tbl = tx.open_table(EVENTS_TABLE)?;

        let mut events = Vec::new();
        for row in tbl.iter()? {
            let (key, value) = row?;
            let stored: StoredEvent = serde_json::from_slice(value.value())
                .with_context(|| format!("corrupt event record id={}", key.value()))?;
            events.push(EpisodicEvent {
                id: key.value(),
                ts: stored.ts,
                session: stored.session,
                phase: stored.phase,
                payload: stored.payload,
            });
        }
        Ok(events)
    }

    /// Number of recorded events.
    pub fn len(&self) -> Result<usize> {
        let tx = self.db.begin_read()?;
        let tbl = tx.open_table(EVENTS_TABLE)?;
        Ok(tbl.len()? as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
