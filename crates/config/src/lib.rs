use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ── Candidate scoring ─────────────────────────────────────────────────────────

/// Weights and limits applied when ranking memory candidates.
///
/// The four dimension weights sum to 1.0 so that a fully-saturated candidate
/// scores exactly 1.0.  They are configurable, but the defaults are the values
/// the review policy was tuned against — change them deliberately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub usefulness_weight: f64,
    pub generality_weight: f64,
    pub recency_weight: f64,
    pub stability_weight: f64,
    /// Maximum number of candidates surviving a review pass.
    pub review_limit: usize,
    /// Candidate content is truncated to this many characters before storage.
    pub max_content_chars: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            usefulness_weight: 0.45,
            generality_weight: 0.25,
            recency_weight: 0.15,
            stability_weight: 0.15,
            review_limit: 5,
            max_content_chars: 240,
        }
    }
}

// ── Reflection thresholds ─────────────────────────────────────────────────────

/// Quality gates the reflection controller checks after each assessment batch.
///
/// | Gate       | Passes when                                      |
/// |------------|--------------------------------------------------|
/// | coverage   | distinct skills ≥ `min_unique_skills`            |
/// | score      | avg ≥ `target_score` and min ≥ `min_score_floor` |
/// | confidence | avg self-reported confidence ≥ `min_confidence`  |
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    pub target_score: f64,
    pub min_score_floor: f64,
    pub min_confidence: f64,
    pub min_unique_skills: usize,
    /// Extra assessment attempts the repair loop may spend before proceeding
    /// regardless of outstanding issues.
    pub max_repairs: usize,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            target_score: 0.7,
            min_score_floor: 0.5,
            min_confidence: 2.5,
            min_unique_skills: 4,
            max_repairs: 1,
        }
    }
}

// ── Question planning ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// Number of skills selected per assessment round.
    pub question_count: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self { question_count: 5 }
    }
}

// ── Store locations ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Episodic log database (redb).
    pub events_path: PathBuf,
    /// Preference store snapshot (JSON object, sorted keys).
    pub preferences_path: PathBuf,
    /// Semantic store snapshot.  `None` keeps the store in memory only.
    pub semantic_path: Option<PathBuf>,
    /// Optional notes template consumed by the reflection controller.  When
    /// absent or unreadable the built-in template is used instead.
    pub notes_template_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            events_path: PathBuf::from("memory/events.redb"),
            preferences_path: PathBuf::from("memory/preferences.json"),
            semantic_path: None,
            notes_template_path: None,
        }
    }
}

impl StoreConfig {
    /// Re-root every relative path under `dir`.  Absolute paths are kept.
    pub fn rooted_at(&self, dir: &Path) -> Self {
        let root = |p: &PathBuf| -> PathBuf {
            if p.is_absolute() { p.clone() } else { dir.join(p) }
        };
        Self {
            events_path: root(&self.events_path),
            preferences_path: root(&self.preferences_path),
            semantic_path: self.semantic_path.as_ref().map(root),
            notes_template_path: self.notes_template_path.as_ref().map(root),
        }
    }
}

// ── Aggregate settings ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scoring: ScoringConfig,
    pub reflection: ReflectionConfig,
    pub planning: PlanningConfig,
    pub stores: StoreConfig,
}

impl Settings {
    /// Load settings from a TOML file, falling back to defaults when the file
    /// does not exist.  Invalid TOML is an error, not a silent fallback.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut settings = Self::default();
        match fs::read_to_string(path.as_ref()) {
            Ok(raw) => settings = toml::from_str(&raw)?,
            // Only absence falls back to defaults; permission errors and the
            // like must surface.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("reading settings at {}", path.as_ref().display())
                });
            }
        }

        // MENTOR_MEMORY_DIR re-roots the relative store paths, letting tests
        // and multi-profile setups relocate everything with one variable.
        if let Ok(dir) = env::var("MENTOR_MEMORY_DIR") {
            if !dir.is_empty() {
                settings.stores = settings.stores.rooted_at(Path::new(&dir));
            }
        }

        Ok(settings)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
