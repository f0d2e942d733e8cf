//! Reflection controller: decides whether an assessment batch needs repair.
//!
//! [`evaluate`] is a pure function over one batch of question/answer results
//! — no memory between calls.  The bounded retry policy around it lives in
//! [`run_with_repair`]: rerun the assessment while repair is requested, up to
//! a configured number of extra attempts, then proceed regardless.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use mentor_config::ReflectionConfig;
use mentor_memory::RawCandidate;

use crate::session::QaResult;

/// Decision recomputed fresh on every reflection pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReflectionState {
    pub needs_repair: bool,
    pub notes: String,
}

/// Inputs to one reflection pass, extracted from a QA batch.
#[derive(Debug, Clone, Default)]
pub struct AssessmentBatch {
    pub scores: Vec<f64>,
    pub skills: BTreeSet<String>,
    pub confidences: Vec<u8>,
}

impl AssessmentBatch {
    pub fn from_qa(qa: &[QaResult]) -> Self {
        Self {
            scores: qa.iter().map(|entry| entry.score).collect(),
            skills: qa
                .iter()
                .filter(|entry| !entry.skill.is_empty())
                .map(|entry| entry.skill.clone())
                .collect(),
            confidences: qa.iter().map(|entry| entry.confidence).collect(),
        }
    }
}

// ── Notes template ────────────────────────────────────────────────────────────

/// Fallback line used when no template file is configured or readable.
const BUILTIN_NOTES_LINE: &str =
    "Assessment review: avg score {average}, coverage {coverage} skills, \
     avg confidence {confidence} -> {decision}";

/// Where the active notes template came from.  Surfacing this (instead of
/// silently substituting the builtin) keeps the fallback path observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateSource {
    File,
    Builtin,
}

/// One-line template rendering the reflection decision for humans.
/// Placeholders: `{average}`, `{coverage}`, `{confidence}`, `{decision}`.
#[derive(Debug, Clone)]
pub struct NotesTemplate {
    line: String,
    source: TemplateSource,
}

impl NotesTemplate {
    pub fn builtin() -> Self {
        Self {
            line: BUILTIN_NOTES_LINE.to_string(),
            source: TemplateSource::Builtin,
        }
    }

    /// Load the first non-empty line of the template file at `path`.  A
    /// missing or unreadable file falls back to the builtin template, with a
    /// warning — never silently.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::builtin();
        };

        match fs::read_to_string(path) {
            Ok(raw) => match raw.lines().map(str::trim).find(|line| !line.is_empty()) {
                Some(line) => Self {
                    line: line.to_string(),
                    source: TemplateSource::File,
                },
                None => {
                    warn!(path = %path.display(), "notes template file is empty; using builtin");
                    Self::builtin()
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "notes template unreadable; using builtin");
                Self::builtin()
            }
        }
    }

    pub fn source(&self) -> TemplateSource {
        self.source
    }

    fn render(&self, average: f64, coverage: usize, confidence: f64, decision: &str) -> String {
        self.line
            .replace("{average}", &format!("{average:.2}"))
            .replace("{coverage}", &coverage.to_string())
            .replace("{confidence}", &format!("{confidence:.2}"))
            .replace("{decision}", decision)
    }
}

// ── Decision ──────────────────────────────────────────────────────────────────

/// Evaluate one batch against the quality gates.
///
/// An empty batch yields `average_score = 0.0`, which fails the score gate —
/// so no assessment at all *does* request repair.
pub fn evaluate(
    batch: &AssessmentBatch,
    thresholds: &ReflectionConfig,
    template: &NotesTemplate,
) -> ReflectionState {
    let average_score = mean(&batch.scores);
    let average_confidence = mean(
        &batch
            .confidences
            .iter()
            .map(|c| f64::from(*c))
            .collect::<Vec<_>>(),
    );
    // min() of an empty batch defaults to 1.0: the floor gate passes
    // vacuously and the average gate makes the decision.
    let min_score = batch
        .scores
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, score| {
            Some(acc.map_or(score, |current| current.min(score)))
        })
        .unwrap_or(1.0);

    let coverage_ok = batch.skills.len() >= thresholds.min_unique_skills;
    let score_ok =
        average_score >= thresholds.target_score && min_score >= thresholds.min_score_floor;
    let confidence_ok = average_confidence >= thresholds.min_confidence;
    let needs_repair = !(coverage_ok && score_ok && confidence_ok);

    let decision = if needs_repair { "repair" } else { "proceed" };
    let notes = template.render(average_score, batch.skills.len(), average_confidence, decision);

    info!(
        coverage = batch.skills.len(),
        avg_score = average_score,
        avg_confidence = average_confidence,
        needs_repair,
        "reflection outcome"
    );

    ReflectionState { needs_repair, notes }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// The gap-signature candidate appended whenever repair is requested, so the
/// memory pipeline keeps a record of what went wrong and for which skills.
pub fn fix_recipe_candidate(skills: &BTreeSet<String>) -> RawCandidate {
    let skills: Vec<&str> = skills.iter().map(String::as_str).collect();
    RawCandidate {
        kind: "fix_recipe".to_string(),
        content: "Revisit low-scoring skills with targeted scaffolding.".to_string(),
        metadata: [("skills".to_string(), json!(skills))].into_iter().collect(),
        scores: Default::default(),
    }
}

// ── Bounded retry loop ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RepairLoopResult {
    pub state: ReflectionState,
    /// Repair attempts actually spent (re-assessments beyond the first).
    pub attempts: usize,
    /// True when repair was still needed at the attempt cap.
    pub capped: bool,
}

/// Run `assess` (attempt number passed in, starting at 0), reflect on its
/// batch, and rerun while repair is requested — at most
/// `thresholds.max_repairs` extra attempts.  After the cap the pipeline
/// proceeds regardless; there is no infinite loop.
pub fn run_with_repair<F>(
    thresholds: &ReflectionConfig,
    template: &NotesTemplate,
    mut assess: F,
) -> RepairLoopResult
where
    F: FnMut(usize) -> Vec<QaResult>,
{
    let mut attempts = 0;
    let mut qa = assess(0);

    loop {
        let state = evaluate(&AssessmentBatch::from_qa(&qa), thresholds, template);
        if !state.needs_repair {
            return RepairLoopResult {
                state,
                attempts,
                capped: false,
            };
        }
        if attempts >= thresholds.max_repairs {
            warn!(
                attempts,
                "maximum repair attempts reached; continuing despite pending issues"
            );
            return RepairLoopResult {
                state,
                attempts,
                capped: true,
            };
        }
        attempts += 1;
        info!(attempt = attempts, "reflection requested repair; rerunning assessment");
        qa = assess(attempts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn batch(scores: &[f64], skills: &[&str], confidences: &[u8]) -> AssessmentBatch {
        AssessmentBatch {
            scores: scores.to_vec(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            confidences: confidences.to_vec(),
        }
    }

    fn thresholds() -> ReflectionConfig {
        ReflectionConfig::default()
    }

    #[test]
    fn low_scores_and_thin_coverage_request_repair() {
        let state = evaluate(
            &batch(&[0.45, 0.45], &["A", "B"], &[2, 2]),
            &thresholds(),
            &NotesTemplate::builtin(),
        );
        assert!(state.needs_repair);
        assert!(state.notes.contains("repair"), "notes = {}", state.notes);
    }

    #[test]
    fn healthy_batch_proceeds() {
        let state = evaluate(
            &batch(&[0.8, 0.85, 0.9, 0.75], &["A", "B", "C", "D"], &[4, 4, 3, 4]),
            &thresholds(),
            &NotesTemplate::builtin(),
        );
        assert!(!state.needs_repair);
        assert!(state.notes.contains("proceed"), "notes = {}", state.notes);
    }

    #[test]
    fn empty_batch_requests_repair() {
        // avg score of an empty batch is 0.0, which fails the score gate even
        // though min-score vacuously passes.
        let state = evaluate(
            &AssessmentBatch::default(),
            &thresholds(),
            &NotesTemplate::builtin(),
        );
        assert!(state.needs_repair);
    }

    #[test]
    fn single_weak_answer_fails_the_floor() {
        // Average clears the target but one answer sits below the floor.
        let state = evaluate(
            &batch(&[0.95, 0.95, 0.95, 0.3], &["A", "B", "C", "D"], &[4, 4, 4, 4]),
            &thresholds(),
            &NotesTemplate::builtin(),
        );
        assert!(state.needs_repair);
    }

    #[test]
    fn low_confidence_alone_requests_repair() {
        let state = evaluate(
            &batch(&[0.8, 0.8, 0.8, 0.8], &["A", "B", "C", "D"], &[1, 2, 2, 1]),
            &thresholds(),
            &NotesTemplate::builtin(),
        );
        assert!(state.needs_repair);
    }

    #[test]
    fn evaluation_is_stateless_across_calls() {
        let template = NotesTemplate::builtin();
        let bad = batch(&[0.1], &["A"], &[1]);
        let good = batch(&[0.9, 0.9, 0.9, 0.9], &["A", "B", "C", "D"], &[5, 5, 5, 5]);

        let first = evaluate(&good, &thresholds(), &template);
        evaluate(&bad, &thresholds(), &template);
        let second = evaluate(&good, &thresholds(), &template);
        assert_eq!(first, second);
    }

    #[test]
    fn template_file_is_used_when_present() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reflection.md");
        fs::write(&path, "Coverage {coverage}: {decision}\nsecond line ignored\n").unwrap();

        let template = NotesTemplate::load(Some(path.as_path()));
        assert_eq!(template.source(), TemplateSource::File);

        let state = evaluate(&batch(&[0.2], &["A"], &[1]), &thresholds(), &template);
        assert_eq!(state.notes, "Coverage 1: repair");
    }

    #[test]
    fn missing_template_falls_back_to_builtin_observably() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.md");
        let template = NotesTemplate::load(Some(missing.as_path()));
        assert_eq!(template.source(), TemplateSource::Builtin);
    }

    #[test]
    fn fix_recipe_candidate_lists_skills() {
        let skills: BTreeSet<String> = ["B".to_string(), "A".to_string()].into();
        let raw = fix_recipe_candidate(&skills);
        assert_eq!(raw.kind, "fix_recipe");
        assert_eq!(raw.metadata["skills"], json!(["A", "B"]));
    }

    #[test]
    fn repair_loop_stops_when_batch_recovers() {
        let template = NotesTemplate::builtin();
        let result = run_with_repair(&thresholds(), &template, |attempt| {
            let score = if attempt == 0 { 0.3 } else { 0.9 };
            ["A", "B", "C", "D"]
                .iter()
                .map(|skill| QaResult {
                    question: format!("q about {skill}"),
                    answer: "a".to_string(),
                    skill: skill.to_string(),
                    score,
                    confidence: 4,
                    rationale: None,
                })
                .collect()
        });

        assert!(!result.state.needs_repair);
        assert_eq!(result.attempts, 1);
        assert!(!result.capped);
    }

    #[test]
    fn repair_outcome_flows_into_memory_commit() {
        use mentor_config::ScoringConfig;
        use mentor_memory::{EpisodicLog, MemoryController, PreferenceStore, SemanticStore};

        let dir = TempDir::new().unwrap();
        let mut controller = MemoryController::new(
            EpisodicLog::open(dir.path().join("events.redb")).unwrap(),
            SemanticStore::new(),
            PreferenceStore::open(dir.path().join("prefs.json")).unwrap(),
            ScoringConfig::default(),
        );

        let state = evaluate(
            &batch(&[0.2, 0.3], &["Recursion", "Closures"], &[2, 2]),
            &thresholds(),
            &NotesTemplate::builtin(),
        );
        assert!(state.needs_repair);

        let skills: BTreeSet<String> =
            ["Recursion".to_string(), "Closures".to_string()].into();
        controller.propose(vec![fix_recipe_candidate(&skills)]).unwrap();
        controller.review(5);
        let committed = controller.commit("session-e2e").unwrap();

        assert_eq!(committed, vec!["doc_1"]);
        let doc = &controller.semantic().all()[0];
        assert_eq!(doc.metadata["type"], "fix_recipe");
        assert_eq!(doc.metadata["skills"], json!(["Closures", "Recursion"]));
        assert_eq!(controller.event_log().len().unwrap(), 1);
    }

    #[test]
    fn repair_loop_proceeds_after_attempt_cap() {
        let template = NotesTemplate::builtin();
        let mut calls = 0;
        let result = run_with_repair(&thresholds(), &template, |_| {
            calls += 1;
            // An empty batch always requests repair.
            Vec::new()
        });

        assert!(result.state.needs_repair);
        assert!(result.capped);
        assert_eq!(result.attempts, ReflectionConfig::default().max_repairs);
        // Initial assessment plus max_repairs reruns.
        assert_eq!(calls, 1 + ReflectionConfig::default().max_repairs);
    }
}
