//! Collaborator seams: progress persistence, the course catalog, judge attempts,
//! and the external hint generator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::catalog::{CatalogError, ChallengeKind, CourseDefinition};
use super::domain::{AttemptId, ChallengeId, CourseId, TopicId, UserId};
use super::progress::LearningProgressState;

/// Progress document together with the revision it was read at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredProgress {
    pub revision: u64,
    pub state: LearningProgressState,
}

/// Whole-document store keyed by user. Writes are compare-and-swap on the revision.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// `None` means the user has no profile at all.
    async fn load(&self, user_id: &UserId) -> Result<Option<StoredProgress>, StoreError>;

    /// Replace the document if it is still at `expected_revision`; returns the new revision.
    async fn save(
        &self,
        user_id: &UserId,
        state: &LearningProgressState,
        expected_revision: u64,
    ) -> Result<u64, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("progress for {user} changed concurrently (expected revision {expected}, found {actual})")]
    RevisionConflict {
        user: UserId,
        expected: u64,
        actual: u64,
    },
    #[error("profile {0} not found")]
    ProfileNotFound(UserId),
    #[error("progress store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to course definitions.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    async fn course(&self, course_id: &CourseId) -> Result<Option<CourseDefinition>, CatalogError>;
}

/// Output captured by the judge for an attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOutput {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
}

/// Judge-side record of a code submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeAttempt {
    pub id: AttemptId,
    pub user_id: UserId,
    #[serde(default)]
    pub challenge_id: Option<ChallengeId>,
    pub source_code: String,
    #[serde(default)]
    pub result: AttemptOutput,
}

#[async_trait]
pub trait AttemptLookup: Send + Sync {
    async fn find_attempt(
        &self,
        attempt_id: &AttemptId,
    ) -> Result<Option<JudgeAttempt>, AttemptLookupError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AttemptLookupError {
    #[error("attempt service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintCourseContext {
    pub id: CourseId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintTopicContext {
    pub id: TopicId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintChallengeContext {
    pub id: ChallengeId,
    pub title: String,
    pub kind: ChallengeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintAttemptContext {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl From<&JudgeAttempt> for HintAttemptContext {
    fn from(attempt: &JudgeAttempt) -> Self {
        Self {
            code: attempt.source_code.clone(),
            stdout: attempt.result.stdout.clone(),
            stderr: attempt.result.stderr.clone(),
        }
    }
}

/// Payload sent to the hint generator once static hints are exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintGenerationRequest {
    pub course: HintCourseContext,
    pub topic: HintTopicContext,
    pub challenge: HintChallengeContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<HintAttemptContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedHint {
    pub hint: String,
    #[serde(default)]
    pub follow_ups: Vec<String>,
}

#[async_trait]
pub trait HintGenerator: Send + Sync {
    async fn generate(
        &self,
        request: HintGenerationRequest,
    ) -> Result<GeneratedHint, HintGeneratorError>;
}

/// Terminal failure of the external generator. No fallback text is ever substituted.
#[derive(Debug, thiserror::Error)]
pub enum HintGeneratorError {
    #[error("hint generator request failed: {0}")]
    Transport(String),
    #[error("hint generator responded with status {0}")]
    Status(u16),
    #[error("hint generator returned an empty hint")]
    EmptyHint,
}
