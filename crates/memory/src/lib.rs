pub mod controller;
pub mod event_log;
pub mod policies;
pub mod prefs;
pub mod schema;
pub mod semantic;
pub mod similarity;

pub use controller::{MemoryController, RetrievedMemory};
pub use event_log::{EpisodicEvent, EpisodicLog};
pub use policies::CandidateError;
pub use prefs::PreferenceStore;
pub use schema::{CandidateKind, MemoryCandidate, RawCandidate};
pub use semantic::{ScoredDocument, SemanticDocument, SemanticStore};
