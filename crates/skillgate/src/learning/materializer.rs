use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::catalog::CourseDefinition;
use super::domain::{LevelId, TopicId};
use super::progress::{
    CourseProgressState, LearningProgressState, LevelProgressState, TopicProgressState,
};

/// What the materializer changed while syncing a course node with its definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Materialized {
    pub created_nodes: usize,
    pub relocated_topics: usize,
    pub pruned_topics: usize,
}

impl Materialized {
    pub fn dirty(&self) -> bool {
        self.created_nodes + self.relocated_topics + self.pruned_topics > 0
    }
}

/// Bring the stored course node in line with the current course definition.
///
/// Missing course, level, and topic nodes are created `locked`. Topic nodes whose
/// id left the course are dropped; topic nodes that moved to another level keep
/// their progress and follow the topic. Level nodes are never removed.
pub fn materialize(
    state: &mut LearningProgressState,
    course: &CourseDefinition,
    now: DateTime<Utc>,
) -> Materialized {
    let mut outcome = Materialized::default();

    let progress = state.courses.entry(course.id.clone()).or_insert_with(|| {
        outcome.created_nodes += 1;
        CourseProgressState::new(now)
    });

    let placement: BTreeMap<&TopicId, &LevelId> = course
        .levels
        .iter()
        .flat_map(|level| level.topic_ids.iter().map(move |topic| (topic, &level.id)))
        .collect();

    let mut relocating: BTreeMap<TopicId, TopicProgressState> = BTreeMap::new();
    for (level_id, level) in progress.levels.iter_mut() {
        let misplaced: Vec<TopicId> = level
            .topics
            .keys()
            .filter(|topic_id| placement.get(topic_id) != Some(&level_id))
            .cloned()
            .collect();

        for topic_id in misplaced {
            let Some(node) = level.topics.remove(&topic_id) else {
                continue;
            };
            level.updated_at = now;
            if placement.contains_key(&topic_id) {
                relocating.insert(topic_id, node);
            } else {
                outcome.pruned_topics += 1;
            }
        }
    }

    for definition in &course.levels {
        let level = progress
            .levels
            .entry(definition.id.clone())
            .or_insert_with(|| {
                outcome.created_nodes += 1;
                LevelProgressState::new(now)
            });

        for topic_id in &definition.topic_ids {
            if level.topics.contains_key(topic_id) {
                continue;
            }
            match relocating.remove(topic_id) {
                Some(node) => {
                    outcome.relocated_topics += 1;
                    level.topics.insert(topic_id.clone(), node);
                }
                None => {
                    outcome.created_nodes += 1;
                    level
                        .topics
                        .insert(topic_id.clone(), TopicProgressState::new(now));
                }
            }
        }
    }

    // Leftovers were duplicates of a node already sitting in the right level.
    outcome.pruned_topics += relocating.len();

    if outcome.dirty() {
        progress.updated_at = now;
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::catalog::{LevelDefinition, TopicDefinition, DEFAULT_TOPIC_XP};
    use crate::learning::domain::{CourseId, ProgressStatus};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn course(levels: &[(&str, &[&str])]) -> CourseDefinition {
        let levels: Vec<LevelDefinition> = levels
            .iter()
            .map(|(id, topics)| LevelDefinition {
                id: LevelId::from(*id),
                name: id.to_string(),
                topic_ids: topics.iter().map(|t| TopicId::from(*t)).collect(),
            })
            .collect();
        let topics = levels
            .iter()
            .flat_map(|level| level.topic_ids.iter())
            .map(|id| {
                (
                    id.clone(),
                    TopicDefinition {
                        id: id.clone(),
                        title: id.to_string(),
                        prerequisites: Vec::new(),
                        xp: DEFAULT_TOPIC_XP,
                        challenges: Vec::new(),
                    },
                )
            })
            .collect();
        CourseDefinition {
            id: CourseId::from("rust"),
            title: "Rust".to_string(),
            levels,
            topics,
        }
    }

    #[test]
    fn creates_missing_nodes_locked_then_reports_clean() {
        let course = course(&[("l1", &["a", "b"]), ("l2", &["c"])]);
        let mut state = LearningProgressState::default();

        let first = materialize(&mut state, &course, now());
        assert!(first.dirty());
        assert_eq!(first.created_nodes, 1 + 2 + 3);

        let progress = &state.courses[&CourseId::from("rust")];
        assert!(progress
            .topics()
            .all(|(_, topic)| topic.status == ProgressStatus::Locked));

        let second = materialize(&mut state, &course, now());
        assert!(!second.dirty());
    }

    #[test]
    fn prunes_removed_topics_and_relocates_moved_ones() {
        let original = course(&[("l1", &["a", "b"]), ("l2", &["c"])]);
        let mut state = LearningProgressState::default();
        materialize(&mut state, &original, now());

        let progress = state.courses.get_mut(&CourseId::from("rust")).unwrap();
        let moved = progress.topic_mut(&TopicId::from("b")).unwrap();
        moved.transition(ProgressStatus::Completed, now());
        moved.awarded_xp = Some(DEFAULT_TOPIC_XP);

        let mut revised = course(&[("l1", &["a"]), ("l2", &["c", "b"])]);
        revised.levels[1].topic_ids.retain(|id| id.as_str() != "c");

        let outcome = materialize(&mut state, &revised, now());
        assert_eq!(outcome.pruned_topics, 1);
        assert_eq!(outcome.relocated_topics, 1);
        assert_eq!(outcome.created_nodes, 0);

        let progress = &state.courses[&CourseId::from("rust")];
        let level_two = &progress.levels[&LevelId::from("l2")];
        let relocated = &level_two.topics[&TopicId::from("b")];
        assert_eq!(relocated.status, ProgressStatus::Completed);
        assert_eq!(relocated.awarded_xp, Some(DEFAULT_TOPIC_XP));
        assert!(progress.topic(&TopicId::from("c")).is_none());
    }
}
