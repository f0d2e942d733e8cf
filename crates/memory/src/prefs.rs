//! Durable key/value preference store.
//!
//! Last-write-wins semantics; the whole map is re-written as a JSON snapshot
//! (sorted keys) after every mutation.  Single-threaded by contract — one
//! controller instance per session, never shared.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

pub struct PreferenceStore {
    path: PathBuf,
    cache: BTreeMap<String, Value>,
}

impl PreferenceStore {
    /// Open the store, loading the snapshot at `path` when present.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cache = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading preferences at {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing preferences at {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, cache })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.cache.get(key)
    }

    /// Lookup with a fallback value for absent keys.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.cache.get(key).unwrap_or(default)
    }

    /// Overwrite `key` and persist the full map immediately.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.cache.insert(key.to_string(), value);
        self.flush()
    }

    /// Batch overwrite with a single persist at the end.
    pub fn update(&mut self, pairs: impl IntoIterator<Item = (String, Value)>) -> Result<()> {
        for (key, value) in pairs {
            self.cache.insert(key, value);
        }
        self.flush()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.cache
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // BTreeMap keys serialize in sorted order.
        let rendered = serde_json::to_string_pretty(&self.cache)?;
        fs::write(&self.path, rendered)
            .with_context(|| format!("writing preferences at {}", self.path.display()))?;
        Ok(())
    }
}
