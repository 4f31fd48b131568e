//! Learning progress and gating engine.
//!
//! A learner's progress is one document per user. Every read or write first syncs the
//! document with the current course definition, then recomputes which levels and topics
//! are open before applying gate results or charging hints.

pub mod catalog;
pub mod domain;
pub mod gating;
pub mod generator;
pub mod hints;
pub mod ledger;
pub(crate) mod materializer;
pub mod memory;
pub mod progress;
pub mod repository;
pub mod router;
pub mod service;
pub(crate) mod totals;
pub mod views;

#[cfg(test)]
mod tests;

pub use catalog::{
    CatalogError, CatalogFile, ChallengeDefinition, ChallengeKind, CourseDefinition,
    LevelDefinition, TopicDefinition,
};
pub use domain::{
    AttemptId, ChallengeId, Clock, CourseId, InvalidIdentifier, LevelId, ManualClock,
    ProgressStatus, SystemClock, TopicId, UserId,
};
pub use gating::{GateDenial, MissingNode};
pub use generator::HttpHintGenerator;
pub use hints::{HintDenial, HintPolicy, HintPolicyView, HintRequest, HintSource};
pub use ledger::{AttemptDenial, ChallengeNotInTopic, GateSubmission};
pub use memory::{CannedHintGenerator, InMemoryAttempts, InMemoryCourseCatalog, InMemoryProgressStore};
pub use progress::{LearningProgressState, ProgressTotals};
pub use repository::{
    AttemptLookup, AttemptLookupError, AttemptOutput, CourseCatalog, GeneratedHint,
    HintGenerationRequest, HintGenerator, HintGeneratorError, JudgeAttempt, ProgressStore,
    StoreError, StoredProgress,
};
pub use router::learning_router;
pub use service::{ErrorClass, LearningService, LearningServiceError, Missing};
pub use views::{CourseLearningView, HintResponse, TopicLearningView};
