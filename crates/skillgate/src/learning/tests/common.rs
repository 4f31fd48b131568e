use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::learning::catalog::{
    ChallengeDefinition, ChallengeKind, CourseDefinition, LevelDefinition, TopicDefinition,
    DEFAULT_TOPIC_XP,
};
use crate::learning::domain::{
    AttemptId, ChallengeId, CourseId, LevelId, ManualClock, ProgressStatus, TopicId, UserId,
};
use crate::learning::hints::HintPolicy;
use crate::learning::ledger::GateSubmission;
use crate::learning::memory::{
    CannedHintGenerator, InMemoryAttempts, InMemoryCourseCatalog, InMemoryProgressStore,
};
use crate::learning::progress::LearningProgressState;
use crate::learning::repository::{
    AttemptOutput, GeneratedHint, HintGenerationRequest, HintGenerator, HintGeneratorError,
    JudgeAttempt, ProgressStore, StoreError, StoredProgress,
};
use crate::learning::service::{LearningService, LearningServiceError};
use crate::learning::views::CourseLearningView;

pub(super) const LEARNER: &str = "learner-1";
pub(super) const COURSE: &str = "rust-101";

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

pub(super) fn learner() -> UserId {
    UserId::from(LEARNER)
}

pub(super) fn course_id() -> CourseId {
    CourseId::from(COURSE)
}

pub(super) fn topic_id(id: &str) -> TopicId {
    TopicId::from(id)
}

pub(super) fn challenge(id: &str, kind: ChallengeKind, hints: &[&str]) -> ChallengeDefinition {
    ChallengeDefinition {
        id: ChallengeId::from(id),
        title: format!("Challenge {id}"),
        kind,
        hints: hints.iter().map(|hint| hint.to_string()).collect(),
    }
}

pub(super) fn topic(
    id: &str,
    prerequisites: &[&str],
    challenges: Vec<ChallengeDefinition>,
) -> TopicDefinition {
    TopicDefinition {
        id: TopicId::from(id),
        title: format!("Topic {id}"),
        prerequisites: prerequisites.iter().map(|p| TopicId::from(*p)).collect(),
        xp: DEFAULT_TOPIC_XP,
        challenges,
    }
}

pub(super) fn course(
    id: &str,
    levels: &[(&str, &[&str])],
    topics: Vec<TopicDefinition>,
) -> CourseDefinition {
    CourseDefinition {
        id: CourseId::from(id),
        title: format!("Course {id}"),
        levels: levels
            .iter()
            .map(|(level, topic_ids)| LevelDefinition {
                id: LevelId::from(*level),
                name: format!("Level {level}"),
                topic_ids: topic_ids.iter().map(|t| TopicId::from(*t)).collect(),
            })
            .collect(),
        topics: topics
            .into_iter()
            .map(|topic| (topic.id.clone(), topic))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Level 1 = {A, B}; Level 2 = {C requires A}. C's gate carries two static hints.
pub(super) fn scenario_course() -> CourseDefinition {
    course(
        COURSE,
        &[("level-1", &["topic-a", "topic-b"]), ("level-2", &["topic-c"])],
        vec![
            topic(
                "topic-a",
                &[],
                vec![
                    challenge("a-read", ChallengeKind::Reading, &[]),
                    challenge("a-gate", ChallengeKind::Coding, &[]),
                ],
            ),
            topic("topic-b", &[], vec![challenge("b-gate", ChallengeKind::Debug, &[])]),
            topic(
                "topic-c",
                &["topic-a"],
                vec![challenge(
                    "c-gate",
                    ChallengeKind::Coding,
                    &["Check the loop bounds.", "Print the intermediate values."],
                )],
            ),
        ],
    )
}

pub(super) struct Harness {
    pub(super) service: Arc<LearningService>,
    pub(super) store: InMemoryProgressStore,
    pub(super) attempts: InMemoryAttempts,
    pub(super) generator: CannedHintGenerator,
    pub(super) clock: Arc<ManualClock>,
}

impl Harness {
    pub(super) async fn new() -> Self {
        Self::build(scenario_course(), None, HintPolicy::default()).await
    }

    pub(super) async fn with_generator(generator: Arc<dyn HintGenerator>) -> Self {
        Self::build(scenario_course(), Some(generator), HintPolicy::default()).await
    }

    pub(super) async fn with_course(course: CourseDefinition) -> Self {
        Self::build(course, None, HintPolicy::default()).await
    }

    pub(super) async fn with_policy(policy: HintPolicy) -> Self {
        Self::build(scenario_course(), None, policy).await
    }

    async fn build(
        course: CourseDefinition,
        generator: Option<Arc<dyn HintGenerator>>,
        policy: HintPolicy,
    ) -> Self {
        let store = InMemoryProgressStore::default();
        store.register_profile(learner()).await;
        let catalog = InMemoryCourseCatalog::from_courses([course]).expect("valid course");
        let attempts = InMemoryAttempts::default();
        let canned = CannedHintGenerator::default();
        let clock = Arc::new(ManualClock::new(start()));

        let hints: Arc<dyn HintGenerator> = match generator {
            Some(generator) => generator,
            None => Arc::new(canned.clone()),
        };
        let service = LearningService::new(
            Arc::new(store.clone()),
            Arc::new(catalog),
            Arc::new(attempts.clone()),
            hints,
            policy,
        )
        .with_clock(clock.clone());

        Self {
            service: Arc::new(service),
            store,
            attempts,
            generator: canned,
            clock,
        }
    }

    pub(super) fn advance_seconds(&self, seconds: i64) {
        self.clock.advance(chrono::Duration::seconds(seconds));
    }

    pub(super) async fn submit(
        &self,
        topic: &str,
        passed: bool,
    ) -> Result<CourseLearningView, LearningServiceError> {
        self.service
            .record_topic_gate_result(
                &learner(),
                &course_id(),
                &topic_id(topic),
                GateSubmission {
                    challenge_id: None,
                    passed,
                    attempt_id: None,
                },
            )
            .await
    }

    pub(super) async fn pass(&self, topic: &str) -> CourseLearningView {
        self.submit(topic, true).await.expect("gate submission accepted")
    }

    pub(super) async fn stored(&self) -> StoredProgress {
        self.store
            .snapshot(&learner())
            .await
            .expect("learner profile registered")
    }
}

pub(super) fn attempt(id: &str, user: &str, challenge: Option<&str>, stderr: Option<&str>) -> JudgeAttempt {
    JudgeAttempt {
        id: AttemptId::from(id),
        user_id: UserId::from(user),
        challenge_id: challenge.map(ChallengeId::from),
        source_code: "fn main() { let v = vec![1]; v[3]; }".to_string(),
        result: AttemptOutput {
            stdout: None,
            stderr: stderr.map(str::to_string),
        },
    }
}

pub(super) fn topic_status(view: &CourseLearningView, topic: &str) -> ProgressStatus {
    view.levels
        .iter()
        .flat_map(|level| level.topics.iter())
        .find(|entry| entry.summary.id.as_str() == topic)
        .map(|entry| entry.progress.status)
        .expect("topic present in view")
}

pub(super) fn level_status(view: &CourseLearningView, level: &str) -> ProgressStatus {
    view.levels
        .iter()
        .find(|entry| entry.id.as_str() == level)
        .map(|entry| entry.status)
        .expect("level present in view")
}

/// Generator whose upstream is down.
pub(super) struct FailingHintGenerator;

#[async_trait]
impl HintGenerator for FailingHintGenerator {
    async fn generate(
        &self,
        _request: HintGenerationRequest,
    ) -> Result<GeneratedHint, HintGeneratorError> {
        Err(HintGeneratorError::Status(503))
    }
}

/// Store where another writer always lands between this request's load and save.
#[derive(Default)]
pub(super) struct RacingStore {
    pub(super) inner: InMemoryProgressStore,
}

#[async_trait]
impl ProgressStore for RacingStore {
    async fn load(&self, user_id: &UserId) -> Result<Option<StoredProgress>, StoreError> {
        self.inner.load(user_id).await
    }

    async fn save(
        &self,
        user_id: &UserId,
        state: &LearningProgressState,
        expected_revision: u64,
    ) -> Result<u64, StoreError> {
        self.inner.save(user_id, state, expected_revision).await?;
        self.inner.save(user_id, state, expected_revision).await
    }
}

pub(super) async fn racing_service() -> Arc<LearningService> {
    let store = RacingStore::default();
    store.inner.register_profile(learner()).await;
    let catalog = InMemoryCourseCatalog::from_courses([scenario_course()]).expect("valid course");
    Arc::new(
        LearningService::new(
            Arc::new(store),
            Arc::new(catalog),
            Arc::new(InMemoryAttempts::default()),
            Arc::new(CannedHintGenerator::default()),
            HintPolicy::default(),
        )
        .with_clock(Arc::new(ManualClock::new(start()))),
    )
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json body")
}
