use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::catalog::{CatalogError, CourseDefinition, TopicDefinition};
use super::domain::{
    AttemptId, ChallengeId, Clock, CourseId, InvalidIdentifier, SystemClock, TopicId, UserId,
};
use super::gating::{enforce, ensure_open, GateDenial, GatingReport, MissingNode};
use super::hints::{next_static_hint, record_hint, HintDenial, HintPolicy, HintRequest, HintSource};
use super::ledger::{
    record_gate_result, resolve_gate_challenge, verify_attempt, verify_hint_attempt,
    AttemptDenial, ChallengeNotInTopic, GateSubmission,
};
use super::materializer::materialize;
use super::progress::{CourseProgressState, LearningProgressState, ProgressTotals};
use super::repository::{
    AttemptLookup, AttemptLookupError, CourseCatalog, HintAttemptContext, HintChallengeContext,
    HintCourseContext, HintGenerationRequest, HintGenerator, HintGeneratorError,
    HintTopicContext, JudgeAttempt, ProgressStore, StoreError,
};
use super::totals;
use super::views::{course_view, topic_view, CourseLearningView, HintResponse, TopicLearningView};

/// Orchestrates the progress engine over its collaborators.
///
/// Every operation runs the same pipeline: load the document and course, materialize,
/// enforce gating, apply the operation, re-aggregate totals, and write back with a
/// revision check. Validation failures abort before anything is written.
pub struct LearningService {
    store: Arc<dyn ProgressStore>,
    catalog: Arc<dyn CourseCatalog>,
    attempts: Arc<dyn AttemptLookup>,
    hints: Arc<dyn HintGenerator>,
    clock: Arc<dyn Clock>,
    policy: HintPolicy,
}

/// Working copy of one user's progress for the duration of a request.
struct Session {
    revision: u64,
    state: LearningProgressState,
    course: CourseDefinition,
    gating: GatingReport,
    dirty: bool,
    now: DateTime<Utc>,
}

impl Session {
    fn progress(&self) -> Result<&CourseProgressState, MissingNode> {
        self.state
            .courses
            .get(&self.course.id)
            .ok_or_else(|| MissingNode::Course(self.course.id.clone()))
    }

    /// Topic definitions are cloned out so the progress document can be borrowed mutably.
    fn topic_definition(&self, topic_id: &TopicId) -> Result<TopicDefinition, LearningServiceError> {
        match (self.course.topic(topic_id), self.course.level_of(topic_id)) {
            (Some(topic), Some(_)) => Ok(topic.clone()),
            _ => Err(LearningServiceError::NotFound(Missing::Topic(topic_id.clone()))),
        }
    }
}

fn course_progress_mut<'a>(
    state: &'a mut LearningProgressState,
    course_id: &CourseId,
) -> Result<&'a mut CourseProgressState, MissingNode> {
    state
        .courses
        .get_mut(course_id)
        .ok_or_else(|| MissingNode::Course(course_id.clone()))
}

impl LearningService {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        catalog: Arc<dyn CourseCatalog>,
        attempts: Arc<dyn AttemptLookup>,
        hints: Arc<dyn HintGenerator>,
        policy: HintPolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            attempts,
            hints,
            clock: Arc::new(SystemClock),
            policy,
        }
    }

    /// Replace the wall clock, e.g. with a manual clock in tests and demos.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &HintPolicy {
        &self.policy
    }

    /// Full course view with per-level and per-topic progress.
    pub async fn get_course_learning_view(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<CourseLearningView, LearningServiceError> {
        let mut session = self.open(user_id, course_id).await?;
        let totals = self.settle_read(user_id, &mut session).await?;
        let view = course_view(&session.course, session.progress()?, totals, &self.policy)?;
        Ok(view)
    }

    /// Single-topic view including the gate challenge, prerequisites, and locked reason.
    pub async fn get_topic_learning_view(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        topic_id: &TopicId,
    ) -> Result<TopicLearningView, LearningServiceError> {
        let mut session = self.open(user_id, course_id).await?;
        let topic = session.topic_definition(topic_id)?;
        let totals = self.settle_read(user_id, &mut session).await?;
        let view = topic_view(
            &session.course,
            &topic,
            session.progress()?,
            &session.gating,
            totals,
            &self.policy,
        )?;
        Ok(view)
    }

    /// Record a gate-challenge result for a topic and return the refreshed course view.
    pub async fn record_topic_gate_result(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        topic_id: &TopicId,
        submission: GateSubmission,
    ) -> Result<CourseLearningView, LearningServiceError> {
        let mut session = self.open(user_id, course_id).await?;
        let topic = session.topic_definition(topic_id)?;
        let gate = resolve_gate_challenge(&topic, submission.challenge_id.as_ref())?
            .map(|challenge| challenge.id.clone());

        let status = session
            .progress()?
            .topic(topic_id)
            .map(|node| node.status)
            .ok_or_else(|| MissingNode::Topic(topic_id.clone()))?;
        if let Err(denial) = ensure_open(topic_id, status, session.gating.gate(topic_id)) {
            warn!(user = %user_id, course = %course_id, topic = %topic_id, reason = %denial, "gate submission denied");
            return Err(denial.into());
        }

        if let Some(attempt_id) = submission.attempt_id.as_ref() {
            let attempt = self.find_attempt(attempt_id).await?;
            if let Err(denial) = verify_attempt(&attempt, user_id, gate.as_ref()) {
                warn!(user = %user_id, attempt = %attempt_id, reason = %denial, "attempt rejected");
                return Err(denial.into());
            }
        }

        let now = session.now;
        let progress = course_progress_mut(&mut session.state, course_id)?;
        let entry = record_gate_result(progress, &topic, gate.as_ref(), submission.passed, now)?;
        session.gating = enforce(&session.course, progress, now)?;

        info!(
            user = %user_id,
            course = %course_id,
            topic = %topic_id,
            passed = submission.passed,
            attempts = entry.attempts,
            newly_completed = entry.newly_completed,
            xp_awarded = entry.xp_awarded,
            "gate result recorded"
        );

        let totals = self.commit(user_id, &mut session).await?;
        let view = course_view(&session.course, session.progress()?, totals, &self.policy)?;
        Ok(view)
    }

    /// Issue the next hint for a challenge: static hints first, then the generator.
    pub async fn request_hint_for_challenge(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        topic_id: &TopicId,
        challenge_id: &ChallengeId,
        request: HintRequest,
    ) -> Result<HintResponse, LearningServiceError> {
        let mut session = self.open(user_id, course_id).await?;
        let topic = session.topic_definition(topic_id)?;
        let challenge = topic
            .challenge(challenge_id)
            .cloned()
            .ok_or_else(|| LearningServiceError::NotFound(Missing::Challenge(challenge_id.clone())))?;

        let node = session
            .progress()?
            .topic(topic_id)
            .ok_or_else(|| MissingNode::Topic(topic_id.clone()))?;
        if node.status.is_locked() {
            warn!(user = %user_id, course = %course_id, topic = %topic_id, "hint denied for locked topic");
            return Err(GateDenial::TopicLocked {
                topic: topic_id.clone(),
            }
            .into());
        }

        let usage = node.hints.get(challenge_id).cloned();
        if let Err(denial) = self.policy.check(challenge_id, usage.as_ref(), session.now) {
            warn!(user = %user_id, topic = %topic_id, challenge = %challenge_id, reason = %denial, "hint denied");
            return Err(denial.into());
        }

        let (hint, source, follow_ups) = match next_static_hint(&challenge, usage.as_ref()) {
            Some(text) => (text.to_string(), HintSource::Static, Vec::new()),
            None => {
                let attempt = match request.attempt_id.as_ref() {
                    Some(attempt_id) => {
                        let attempt = self.find_attempt(attempt_id).await?;
                        if let Err(denial) = verify_hint_attempt(&attempt, user_id, challenge_id) {
                            warn!(user = %user_id, attempt = %attempt_id, reason = %denial, "attempt rejected");
                            return Err(denial.into());
                        }
                        Some(HintAttemptContext::from(&attempt))
                    }
                    None => None,
                };

                let generated = self
                    .hints
                    .generate(HintGenerationRequest {
                        course: HintCourseContext {
                            id: session.course.id.clone(),
                            title: session.course.title.clone(),
                        },
                        topic: HintTopicContext {
                            id: topic.id.clone(),
                            title: topic.title.clone(),
                        },
                        challenge: HintChallengeContext {
                            id: challenge.id.clone(),
                            title: challenge.title.clone(),
                            kind: challenge.kind,
                        },
                        attempt,
                        message: request.message.clone(),
                    })
                    .await
                    .map_err(|err| {
                        warn!(user = %user_id, challenge = %challenge_id, error = %err, "hint generation failed");
                        err
                    })?;
                (generated.hint, HintSource::Ai, generated.follow_ups)
            }
        };

        let penalty = self.policy.penalty_for(source);
        let now = session.now;
        let progress = course_progress_mut(&mut session.state, course_id)?;
        let usage = record_hint(progress, topic_id, challenge_id, source, penalty, now)?;
        let topic_hint_penalty = progress
            .topic(topic_id)
            .map(|node| node.hint_penalty)
            .unwrap_or_default();

        info!(
            user = %user_id,
            course = %course_id,
            topic = %topic_id,
            challenge = %challenge_id,
            source = source.label(),
            penalty,
            hints_used = usage.count,
            "hint issued"
        );

        let totals = self.commit(user_id, &mut session).await?;
        let remaining_hints = self.policy.remaining(usage.count);
        Ok(HintResponse {
            hint,
            source,
            follow_ups,
            penalty_applied: penalty,
            hints_used: usage.count,
            remaining_hints,
            topic_hint_penalty,
            next_available_at: if remaining_hints > 0 {
                self.policy.next_available_at(&usage)
            } else {
                None
            },
            totals,
        })
    }

    /// Load, materialize, and enforce. Profile and course are fetched concurrently.
    async fn open(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Session, LearningServiceError> {
        let (stored, course) =
            tokio::join!(self.store.load(user_id), self.catalog.course(course_id));
        let stored = stored?.ok_or_else(|| LearningServiceError::NotFound(Missing::Profile(user_id.clone())))?;
        let course = course?.ok_or_else(|| LearningServiceError::NotFound(Missing::Course(course_id.clone())))?;

        let now = self.clock.now();
        let mut state = stored.state;
        let materialized = materialize(&mut state, &course, now);
        let progress = course_progress_mut(&mut state, course_id)?;
        let gating = enforce(&course, progress, now)?;

        let dirty = materialized.dirty() || gating.dirty;
        if dirty {
            debug!(
                user = %user_id,
                course = %course_id,
                created = materialized.created_nodes,
                relocated = materialized.relocated_topics,
                pruned = materialized.pruned_topics,
                gating_changed = gating.dirty,
                "progress resynchronised with course definition"
            );
        }

        Ok(Session {
            revision: stored.revision,
            state,
            course,
            gating,
            dirty,
            now,
        })
    }

    /// Reads only write back when the resync changed something.
    async fn settle_read(
        &self,
        user_id: &UserId,
        session: &mut Session,
    ) -> Result<ProgressTotals, LearningServiceError> {
        if session.dirty {
            self.commit(user_id, session).await
        } else {
            Ok(totals::aggregate(&session.state))
        }
    }

    async fn commit(
        &self,
        user_id: &UserId,
        session: &mut Session,
    ) -> Result<ProgressTotals, LearningServiceError> {
        let totals = totals::refresh(&mut session.state);
        session.state.last_updated = Some(session.now);
        session.revision = self
            .store
            .save(user_id, &session.state, session.revision)
            .await
            .map_err(|err| {
                warn!(user = %user_id, error = %err, "progress write failed");
                err
            })?;
        session.dirty = false;
        Ok(totals)
    }

    async fn find_attempt(&self, attempt_id: &AttemptId) -> Result<JudgeAttempt, LearningServiceError> {
        self.attempts
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| LearningServiceError::NotFound(Missing::Attempt(attempt_id.clone())))
    }
}

/// Resource named by a request that does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Profile(UserId),
    Course(CourseId),
    Topic(TopicId),
    Challenge(ChallengeId),
    Attempt(AttemptId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Profile(id) => write!(f, "profile {}", id),
            Missing::Course(id) => write!(f, "course {}", id),
            Missing::Topic(id) => write!(f, "topic {}", id),
            Missing::Challenge(id) => write!(f, "challenge {}", id),
            Missing::Attempt(id) => write!(f, "attempt {}", id),
        }
    }
}

/// Coarse outcome class used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Forbidden,
    BadRequest,
    Conflict,
    Upstream,
    Internal,
}

/// Error raised by the learning service.
#[derive(Debug, thiserror::Error)]
pub enum LearningServiceError {
    #[error("{0} not found")]
    NotFound(Missing),
    #[error(transparent)]
    MissingProgress(#[from] MissingNode),
    #[error(transparent)]
    Gate(#[from] GateDenial),
    #[error(transparent)]
    Hint(#[from] HintDenial),
    #[error(transparent)]
    Attempt(#[from] AttemptDenial),
    #[error(transparent)]
    InvalidChallenge(#[from] ChallengeNotInTopic),
    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    AttemptLookup(#[from] AttemptLookupError),
    #[error(transparent)]
    Generator(#[from] HintGeneratorError),
}

impl LearningServiceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) | Self::MissingProgress(_) => ErrorClass::NotFound,
            Self::Store(StoreError::ProfileNotFound(_)) => ErrorClass::NotFound,
            Self::Gate(_) | Self::Hint(_) | Self::Attempt(_) => ErrorClass::Forbidden,
            Self::InvalidChallenge(_) | Self::InvalidIdentifier(_) => ErrorClass::BadRequest,
            Self::Store(StoreError::RevisionConflict { .. }) => ErrorClass::Conflict,
            Self::AttemptLookup(_) | Self::Generator(_) => ErrorClass::Upstream,
            Self::Store(StoreError::Unavailable(_)) | Self::Catalog(_) => ErrorClass::Internal,
        }
    }

    /// Seconds until a cooldown-denied hint may be retried.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::Hint(HintDenial::CooldownActive {
                retry_after_seconds,
                ..
            }) => Some(*retry_after_seconds),
            _ => None,
        }
    }
}
