//! Per-skill Beta priors and Thompson-sampling question selection.
//!
//! Each skill carries a Beta(α, β) belief about learner competence.  Ranking
//! skills by one random draw each (instead of by posterior mean) lets skills
//! with few observations surface ahead of well-measured ones: wide posteriors
//! sample variably, so under-assessed skills keep getting chances while
//! known-weak skills are still exploited.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Beta-distributed belief about one skill.  A fresh skill starts at
/// Beta(1, 1), the uniform prior, and evidence only ever adds non-negative
/// mass.  Seeds rehydrated from session state are taken as-is, so `mean` and
/// `sample` guard the degenerate all-zero case instead of assuming positivity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillPrior {
    pub name: String,
    pub alpha: f64,
    pub beta: f64,
}

impl SkillPrior {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alpha: 1.0,
            beta: 1.0,
        }
    }

    /// Posterior mean, the point estimate of competence.  A degenerate
    /// all-zero prior reads as 0.0 rather than NaN.
    pub fn mean(&self) -> f64 {
        let total = self.alpha + self.beta;
        if total == 0.0 { 0.0 } else { self.alpha / total }
    }

    /// Fold in one assessment outcome.  `evidence` is a score in `[0, 1]`
    /// (clamped to keep the Beta support valid): full credit grows α, the
    /// shortfall grows β.
    pub fn update(&mut self, evidence: f64) {
        let evidence = evidence.clamp(0.0, 1.0);
        self.alpha += evidence;
        self.beta += (1.0 - evidence).max(0.0);
    }

    /// One random draw from Beta(α, β).  Degenerate parameters (possible via
    /// a bad seed) fall back to the mean rather than panicking.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match Beta::new(self.alpha, self.beta) {
            Ok(dist) => dist.sample(rng),
            Err(_) => self.mean(),
        }
    }
}

/// Seed payload accepted from upstream session state: either
/// `{"alpha": a, "beta": b}` or a two-element `[a, b]` list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PriorSeed {
    Params { alpha: f64, beta: f64 },
    Pair(Vec<f64>),
}

impl PriorSeed {
    /// Resolve to (α, β).  Lists with fewer than two elements fall back to
    /// the uniform prior.
    pub fn alpha_beta(&self) -> (f64, f64) {
        match self {
            Self::Params { alpha, beta } => (*alpha, *beta),
            Self::Pair(values) if values.len() >= 2 => (values[0], values[1]),
            Self::Pair(_) => (1.0, 1.0),
        }
    }
}

/// All skill priors for one session.  Skills are created lazily on first
/// reference and never deleted within a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriorsRepository {
    priors: BTreeMap<String, SkillPrior>,
}

impl PriorsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate priors carried in upstream session state.
    pub fn seed(&mut self, seeds: &BTreeMap<String, PriorSeed>) {
        for (name, seed) in seeds {
            let (alpha, beta) = seed.alpha_beta();
            self.priors.insert(
                name.clone(),
                SkillPrior {
                    name: name.clone(),
                    alpha,
                    beta,
                },
            );
        }
    }

    /// Fetch the prior for `name`, creating the uniform Beta(1, 1) on first
    /// reference.
    pub fn ensure(&mut self, name: &str) -> &mut SkillPrior {
        self.priors
            .entry(name.to_string())
            .or_insert_with(|| SkillPrior::new(name))
    }

    /// Point estimate of competence; unseen skills sit at the uniform 0.5.
    pub fn mean(&self, name: &str) -> f64 {
        self.priors.get(name).map(SkillPrior::mean).unwrap_or(0.5)
    }

    pub fn update(&mut self, name: &str, evidence: f64) {
        self.ensure(name).update(evidence);
    }

    /// Fold a batch of per-skill assessment scores into the priors.
    pub fn update_from_scores(&mut self, scores: &BTreeMap<String, f64>) {
        for (skill, score) in scores {
            self.update(skill, *score);
        }
    }

    /// Serializable view for carrying priors back into session state.
    pub fn snapshot(&self) -> BTreeMap<String, PriorSeed> {
        self.priors
            .iter()
            .map(|(name, prior)| {
                (
                    name.clone(),
                    PriorSeed::Params {
                        alpha: prior.alpha,
                        beta: prior.beta,
                    },
                )
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.priors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priors.is_empty()
    }
}

/// Rank `skills` descending by one Beta draw each — the exploration policy.
/// Deterministic for a fixed RNG; ties (possible only in theory) keep input
/// order via the stable sort.
pub fn thompson_sample<R: Rng + ?Sized>(
    skills: &[String],
    repo: &mut PriorsRepository,
    rng: &mut R,
) -> Vec<String> {
    let mut drawn: Vec<(f64, String)> = skills
        .iter()
        .map(|skill| {
            let draw = repo.ensure(skill).sample(rng);
            trace!(skill = %skill, draw, "thompson draw");
            (draw, skill.clone())
        })
        .collect();
    drawn.sort_by(|(left, _), (right, _)| right.total_cmp(left));
    drawn.into_iter().map(|(_, skill)| skill).collect()
}

/// Select up to `count` skills to question, by Thompson sampling.
pub fn plan_questions<R: Rng + ?Sized>(
    skills: &[String],
    repo: &mut PriorsRepository,
    count: usize,
    rng: &mut R,
) -> Vec<String> {
    let mut ranked = thompson_sample(skills, repo, rng);
    ranked.truncate(count);
    ranked
}

/// One entry of a spaced-repetition review plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSlot {
    pub skill: String,
    /// Stability in `[0, 1]`, rounded to two decimals for the plan.
    pub stability: f64,
    /// Review timestamp, second precision (`%Y-%m-%dT%H:%M:%S`).
    pub review_at: String,
}

/// Review plan for `skills` (skill, stability pairs in priority order),
/// anchored at now.  Shakier skills come up sooner; later positions are
/// pushed out by one day each so reviews do not pile onto one date.
pub fn spaced_repetition_schedule(skills: &[(String, f64)]) -> Vec<ReviewSlot> {
    schedule_from(Utc::now(), skills)
}

/// Same plan anchored at an explicit `base` time.
/// `days = max(1, ceil((1 - stability) * 5) + position)` with zero-based
/// position, so a fully stable first skill still gets a one-day interval.
pub fn schedule_from(base: DateTime<Utc>, skills: &[(String, f64)]) -> Vec<ReviewSlot> {
    skills
        .iter()
        .enumerate()
        .map(|(position, (skill, stability))| {
            let days = (((1.0 - stability) * 5.0).ceil() as i64 + position as i64).max(1);
            ReviewSlot {
                skill: skill.clone(),
                stability: (stability * 100.0).round() / 100.0,
                review_at: (base + Duration::days(days))
                    .format("%Y-%m-%dT%H:%M:%S")
                    .to_string(),
            }
        })
        .collect()
}
