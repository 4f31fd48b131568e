//! In-process adapters for the collaborator seams. Back the demo, local serving, and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::catalog::{CatalogError, CourseDefinition};
use super::domain::{AttemptId, CourseId, UserId};
use super::progress::LearningProgressState;
use super::repository::{
    AttemptLookup, AttemptLookupError, CourseCatalog, GeneratedHint, HintGenerationRequest,
    HintGenerator, HintGeneratorError, JudgeAttempt, ProgressStore, StoreError, StoredProgress,
};

#[derive(Default, Clone)]
pub struct InMemoryProgressStore {
    records: Arc<RwLock<HashMap<UserId, StoredProgress>>>,
}

impl InMemoryProgressStore {
    /// Create an empty profile so progress can be stored for the user.
    pub async fn register_profile(&self, user_id: UserId) {
        self.records.write().await.entry(user_id).or_default();
    }

    pub async fn snapshot(&self, user_id: &UserId) -> Option<StoredProgress> {
        self.records.read().await.get(user_id).cloned()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn load(&self, user_id: &UserId) -> Result<Option<StoredProgress>, StoreError> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn save(
        &self,
        user_id: &UserId,
        state: &LearningProgressState,
        expected_revision: u64,
    ) -> Result<u64, StoreError> {
        let mut guard = self.records.write().await;
        let record = guard
            .get_mut(user_id)
            .ok_or_else(|| StoreError::ProfileNotFound(user_id.clone()))?;

        if record.revision != expected_revision {
            return Err(StoreError::RevisionConflict {
                user: user_id.clone(),
                expected: expected_revision,
                actual: record.revision,
            });
        }

        record.revision += 1;
        record.state = state.clone();
        Ok(record.revision)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryCourseCatalog {
    courses: Arc<RwLock<HashMap<CourseId, CourseDefinition>>>,
}

impl InMemoryCourseCatalog {
    /// Build a catalog from definitions, validating each one.
    pub fn from_courses(
        courses: impl IntoIterator<Item = CourseDefinition>,
    ) -> Result<Self, CatalogError> {
        let mut map = HashMap::new();
        for course in courses {
            course.validate()?;
            if map.contains_key(&course.id) {
                return Err(CatalogError::DuplicateCourse(course.id));
            }
            map.insert(course.id.clone(), course);
        }
        Ok(Self {
            courses: Arc::new(RwLock::new(map)),
        })
    }

    /// Add or replace a course definition after validating it.
    pub async fn publish(&self, course: CourseDefinition) -> Result<(), CatalogError> {
        course.validate()?;
        self.courses.write().await.insert(course.id.clone(), course);
        Ok(())
    }
}

#[async_trait]
impl CourseCatalog for InMemoryCourseCatalog {
    async fn course(&self, course_id: &CourseId) -> Result<Option<CourseDefinition>, CatalogError> {
        Ok(self.courses.read().await.get(course_id).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryAttempts {
    attempts: Arc<RwLock<HashMap<AttemptId, JudgeAttempt>>>,
}

impl InMemoryAttempts {
    pub async fn record(&self, attempt: JudgeAttempt) {
        self.attempts
            .write()
            .await
            .insert(attempt.id.clone(), attempt);
    }
}

#[async_trait]
impl AttemptLookup for InMemoryAttempts {
    async fn find_attempt(
        &self,
        attempt_id: &AttemptId,
    ) -> Result<Option<JudgeAttempt>, AttemptLookupError> {
        Ok(self.attempts.read().await.get(attempt_id).cloned())
    }
}

/// Offline generator that answers from the request context alone.
#[derive(Default, Clone)]
pub struct CannedHintGenerator {
    requests: Arc<RwLock<Vec<HintGenerationRequest>>>,
}

impl CannedHintGenerator {
    pub async fn requests(&self) -> Vec<HintGenerationRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl HintGenerator for CannedHintGenerator {
    async fn generate(
        &self,
        request: HintGenerationRequest,
    ) -> Result<GeneratedHint, HintGeneratorError> {
        let hint = match request.attempt.as_ref().and_then(|attempt| attempt.stderr.as_deref()) {
            Some(stderr) if !stderr.trim().is_empty() => format!(
                "Your last run of \"{}\" failed with: {}. Start from the first error line.",
                request.challenge.title,
                stderr.lines().next().unwrap_or_default().trim()
            ),
            _ => format!(
                "Break \"{}\" into smaller steps and check each against the {} notes.",
                request.challenge.title, request.topic.title
            ),
        };
        let follow_ups = vec![
            format!("Which part of {} is unclear?", request.topic.title),
            "Would a worked example help?".to_string(),
        ];

        self.requests.write().await.push(request);
        Ok(GeneratedHint { hint, follow_ups })
    }
}
