use super::common::*;
use crate::learning::catalog::{CatalogError, ChallengeKind, CourseDefinition};
use crate::learning::domain::{LevelId, ProgressStatus, TopicId};
use crate::learning::gating::{enforce, ensure_open, GateDenial, TopicGate};
use crate::learning::materializer::materialize;
use crate::learning::progress::{CourseProgressState, LearningProgressState};

fn synced(course: &CourseDefinition) -> LearningProgressState {
    let mut state = LearningProgressState::default();
    materialize(&mut state, course, start());
    let progress = state.courses.get_mut(&course.id).expect("course node");
    enforce(course, progress, start()).expect("nodes materialized");
    state
}

fn complete(progress: &mut CourseProgressState, topic: &str) {
    progress
        .topic_mut(&TopicId::from(topic))
        .expect("topic node")
        .transition(ProgressStatus::Completed, start());
}

fn status(progress: &CourseProgressState, topic: &str) -> ProgressStatus {
    progress
        .topic(&TopicId::from(topic))
        .map(|node| node.status)
        .expect("topic node")
}

fn level(progress: &CourseProgressState, level: &str) -> ProgressStatus {
    progress.levels[&LevelId::from(level)].status
}

/// Every open topic sits in an unlocked level and has all prerequisites completed.
fn assert_prerequisite_safety(course: &CourseDefinition, progress: &CourseProgressState) {
    for definition in &course.levels {
        let level_status = level(progress, definition.id.as_str());
        for topic_id in &definition.topic_ids {
            let node = progress.topic(topic_id).expect("topic node");
            if node.status.is_locked() || node.status.is_completed() {
                continue;
            }
            assert!(!level_status.is_locked(), "{topic_id} open inside locked level");
            for prerequisite in &course.topics[topic_id].prerequisites {
                assert_eq!(
                    progress.topic(prerequisite).map(|p| p.status),
                    Some(ProgressStatus::Completed),
                    "{topic_id} open before prerequisite {prerequisite}"
                );
            }
        }
    }
}

#[test]
fn initial_pass_opens_only_the_first_level() {
    let course = scenario_course();
    let state = synced(&course);
    let progress = &state.courses[&course.id];

    assert_eq!(level(progress, "level-1"), ProgressStatus::Unlocked);
    assert_eq!(level(progress, "level-2"), ProgressStatus::Locked);
    assert_eq!(status(progress, "topic-a"), ProgressStatus::Unlocked);
    assert_eq!(status(progress, "topic-b"), ProgressStatus::Unlocked);
    assert_eq!(status(progress, "topic-c"), ProgressStatus::Locked);
    assert_eq!(progress.status, ProgressStatus::InProgress);
    assert!(progress.topic(&TopicId::from("topic-a")).and_then(|t| t.unlocked_at).is_some());
}

#[test]
fn enforcement_is_idempotent() {
    let course = scenario_course();
    let mut state = synced(&course);
    let progress = state.courses.get_mut(&course.id).expect("course node");
    complete(progress, "topic-a");
    enforce(&course, progress, start()).expect("first pass");

    let before = serde_json::to_vec(&state).expect("serialize");
    let progress = state.courses.get_mut(&course.id).expect("course node");
    let report = enforce(&course, progress, start() + chrono::Duration::minutes(5))
        .expect("second pass");
    let after = serde_json::to_vec(&state).expect("serialize");

    assert!(!report.dirty);
    assert_eq!(before, after);
}

#[test]
fn completing_the_first_level_cascades_into_the_next() {
    let course = scenario_course();
    let mut state = synced(&course);
    let progress = state.courses.get_mut(&course.id).expect("course node");

    complete(progress, "topic-a");
    let report = enforce(&course, progress, start()).expect("pass");
    assert!(report.dirty);
    assert_eq!(level(progress, "level-1"), ProgressStatus::InProgress);
    assert_eq!(status(progress, "topic-c"), ProgressStatus::Locked);
    let gate = report.gate(&TopicId::from("topic-c")).expect("gate for c");
    assert!(!gate.level_unlocked);
    assert!(gate.prerequisites_met);

    complete(progress, "topic-b");
    enforce(&course, progress, start()).expect("pass");
    assert_eq!(level(progress, "level-1"), ProgressStatus::Completed);
    assert_eq!(level(progress, "level-2"), ProgressStatus::Unlocked);
    assert_eq!(status(progress, "topic-c"), ProgressStatus::Unlocked);
    assert_prerequisite_safety(&course, progress);

    complete(progress, "topic-c");
    enforce(&course, progress, start()).expect("pass");
    assert_eq!(progress.status, ProgressStatus::Completed);
    assert!(progress.completed_at.is_some());
}

#[test]
fn cross_level_prerequisites_hold_back_an_unlocked_level() {
    let course = course(
        "chain",
        &[("one", &["intro"]), ("two", &["basics", "advanced"])],
        vec![
            topic("intro", &[], vec![challenge("intro-gate", ChallengeKind::Quiz, &[])]),
            topic("basics", &[], vec![challenge("basics-gate", ChallengeKind::Coding, &[])]),
            topic(
                "advanced",
                &["basics", "intro"],
                vec![challenge("advanced-gate", ChallengeKind::Coding, &[])],
            ),
        ],
    );
    let mut state = synced(&course);
    let progress = state.courses.get_mut(&course.id).expect("course node");
    complete(progress, "intro");
    let report = enforce(&course, progress, start()).expect("pass");

    assert_eq!(status(progress, "basics"), ProgressStatus::Unlocked);
    assert_eq!(status(progress, "advanced"), ProgressStatus::Locked);
    let gate = report.gate(&TopicId::from("advanced")).expect("gate");
    assert!(gate.level_unlocked);
    assert_eq!(gate.unmet_prerequisites, vec![TopicId::from("basics")]);
    assert_eq!(
        gate.locked_reason(&course, &TopicId::from("advanced")).as_deref(),
        Some("Complete the prerequisite topics first: Topic basics.")
    );
    assert_prerequisite_safety(&course, progress);
}

#[test]
fn prerequisite_safety_holds_for_every_completion_order() {
    let course = scenario_course();
    let orders: [[&str; 3]; 4] = [
        ["topic-a", "topic-b", "topic-c"],
        ["topic-b", "topic-a", "topic-c"],
        ["topic-b", "topic-c", "topic-a"],
        ["topic-c", "topic-b", "topic-a"],
    ];

    for order in orders {
        let mut state = synced(&course);
        let progress = state.courses.get_mut(&course.id).expect("course node");
        for topic in order {
            if status(progress, topic).is_locked() {
                continue;
            }
            complete(progress, topic);
            enforce(&course, progress, start()).expect("pass");
            assert_prerequisite_safety(&course, progress);
        }
    }
}

#[test]
fn completed_nodes_survive_a_stricter_course_definition() {
    let course = scenario_course();
    let mut state = synced(&course);
    let progress = state.courses.get_mut(&course.id).expect("course node");
    complete(progress, "topic-a");
    complete(progress, "topic-b");
    enforce(&course, progress, start()).expect("pass");
    assert_eq!(level(progress, "level-1"), ProgressStatus::Completed);

    let mut stricter = scenario_course();
    stricter
        .topics
        .get_mut(&TopicId::from("topic-a"))
        .expect("topic a")
        .prerequisites
        .push(TopicId::from("topic-new"));
    stricter.topics.insert(
        TopicId::from("topic-new"),
        topic("topic-new", &[], vec![challenge("new-gate", ChallengeKind::Coding, &[])]),
    );
    stricter.levels[0].topic_ids.push(TopicId::from("topic-new"));

    materialize(&mut state, &stricter, start());
    let progress = state.courses.get_mut(&stricter.id).expect("course node");
    enforce(&stricter, progress, start()).expect("pass");

    assert_eq!(status(progress, "topic-a"), ProgressStatus::Completed);
    assert_eq!(level(progress, "level-1"), ProgressStatus::Completed);
    assert_eq!(status(progress, "topic-new"), ProgressStatus::Unlocked);
}

#[test]
fn prerequisite_cycles_are_rejected_at_authoring_time_and_stay_locked_otherwise() {
    let cyclic = course(
        "loop",
        &[("only", &["left", "right"])],
        vec![
            topic("left", &["right"], vec![challenge("left-gate", ChallengeKind::Coding, &[])]),
            topic("right", &["left"], vec![challenge("right-gate", ChallengeKind::Coding, &[])]),
        ],
    );

    assert!(matches!(
        cyclic.validate(),
        Err(CatalogError::PrerequisiteCycle { .. })
    ));

    let state = synced(&cyclic);
    let progress = &state.courses[&cyclic.id];
    assert_eq!(status(progress, "left"), ProgressStatus::Locked);
    assert_eq!(status(progress, "right"), ProgressStatus::Locked);
    assert_eq!(level(progress, "only"), ProgressStatus::Unlocked);
}

#[test]
fn ensure_open_rejects_locked_topics_and_unmet_prerequisites() {
    let topic = TopicId::from("topic-c");
    let blocked = TopicGate {
        level_unlocked: true,
        blocking_level: None,
        prerequisites_met: false,
        unmet_prerequisites: vec![TopicId::from("topic-a")],
    };

    assert!(matches!(
        ensure_open(&topic, ProgressStatus::Locked, None),
        Err(GateDenial::TopicLocked { .. })
    ));
    assert!(matches!(
        ensure_open(&topic, ProgressStatus::Unlocked, Some(&blocked)),
        Err(GateDenial::PrerequisitesUnmet { unmet, .. }) if unmet == vec![TopicId::from("topic-a")]
    ));
    assert_eq!(ensure_open(&topic, ProgressStatus::Completed, Some(&blocked)), Ok(()));
    assert_eq!(ensure_open(&topic, ProgressStatus::InProgress, None), Ok(()));
}

#[test]
fn locked_reason_names_the_first_incomplete_level_after_an_edit() {
    fn three_levels(first: &[&str]) -> CourseDefinition {
        let mut topics = vec![
            topic("a", &[], vec![challenge("a-gate", ChallengeKind::Coding, &[])]),
            topic("b", &[], vec![challenge("b-gate", ChallengeKind::Coding, &[])]),
            topic("c", &[], vec![challenge("c-gate", ChallengeKind::Coding, &[])]),
        ];
        if first.contains(&"late") {
            topics.push(topic("late", &[], vec![challenge("late-gate", ChallengeKind::Quiz, &[])]));
        }
        course("edited", &[("one", first), ("two", &["b"]), ("three", &["c"])], topics)
    }

    let original = three_levels(&["a"]);
    let mut state = synced(&original);
    let progress = state.courses.get_mut(&original.id).expect("course node");
    complete(progress, "a");
    enforce(&original, progress, start()).expect("pass");
    complete(progress, "b");
    enforce(&original, progress, start()).expect("pass");
    assert_eq!(level(progress, "two"), ProgressStatus::Completed);

    let edited = three_levels(&["a", "late"]);
    materialize(&mut state, &edited, start());
    let progress = state.courses.get_mut(&edited.id).expect("course node");
    let report = enforce(&edited, progress, start()).expect("pass");

    assert_eq!(level(progress, "two"), ProgressStatus::Completed);
    assert_eq!(status(progress, "c"), ProgressStatus::Locked);
    let gate = report.gate(&TopicId::from("c")).expect("gate for c");
    assert_eq!(gate.blocking_level, Some(LevelId::from("one")));
    assert_eq!(
        gate.locked_reason(&edited, &TopicId::from("c")).as_deref(),
        Some("Complete every topic in \"Level one\" to unlock this level.")
    );
}
