pub mod priors;
pub mod reflection;
pub mod session;

pub use priors::{
    PriorSeed, PriorsRepository, ReviewSlot, SkillPrior, plan_questions, schedule_from,
    spaced_repetition_schedule, thompson_sample,
};
pub use reflection::{
    AssessmentBatch, NotesTemplate, ReflectionState, RepairLoopResult, TemplateSource, evaluate,
    fix_recipe_candidate, run_with_repair,
};
pub use session::{QaResult, SessionState, session_rng};
