use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::catalog::CourseDefinition;
use super::domain::{CourseId, LevelId, ProgressStatus, TopicId};
use super::progress::CourseProgressState;

/// Per-topic gating facts from the last enforcement pass, used for locked-reason messaging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicGate {
    pub level_unlocked: bool,
    /// First earlier level with an incomplete topic, when that is what holds this one back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_level: Option<LevelId>,
    pub prerequisites_met: bool,
    pub unmet_prerequisites: Vec<TopicId>,
}

impl TopicGate {
    /// Human readable explanation for a locked topic, or `None` when nothing blocks it.
    pub fn locked_reason(&self, course: &CourseDefinition, topic_id: &TopicId) -> Option<String> {
        if !self.level_unlocked {
            let blocking = self
                .blocking_level
                .as_ref()
                .and_then(|id| course.levels.iter().find(|level| &level.id == id));
            let previous = match blocking {
                Some(level) => format!("\"{}\"", level.name),
                None => "the previous levels".to_string(),
            };
            return Some(format!(
                "Complete every topic in {previous} to unlock this level."
            ));
        }

        if !self.prerequisites_met {
            let titles: Vec<&str> = self
                .unmet_prerequisites
                .iter()
                .map(|id| {
                    course
                        .topic(id)
                        .map(|topic| topic.title.as_str())
                        .unwrap_or(id.as_str())
                })
                .collect();
            return Some(format!(
                "Complete the prerequisite topics first: {}.",
                titles.join(", ")
            ));
        }

        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatingReport {
    pub dirty: bool,
    pub topics: BTreeMap<TopicId, TopicGate>,
}

impl GatingReport {
    pub fn gate(&self, topic_id: &TopicId) -> Option<&TopicGate> {
        self.topics.get(topic_id)
    }
}

/// A progress node the materializer should have created is absent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MissingNode {
    #[error("progress for course {0} has not been materialized")]
    Course(CourseId),
    #[error("progress for level {0} has not been materialized")]
    Level(LevelId),
    #[error("progress for topic {0} has not been materialized")]
    Topic(TopicId),
}

/// Forbidden outcomes raised by gate checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateDenial {
    #[error("topic {topic} is locked")]
    TopicLocked { topic: TopicId },
    #[error("topic {topic} has unmet prerequisites: {}", join_ids(.unmet))]
    PrerequisitesUnmet { topic: TopicId, unmet: Vec<TopicId> },
}

fn join_ids(ids: &[TopicId]) -> String {
    ids.iter().map(TopicId::as_str).collect::<Vec<_>>().join(", ")
}

/// Recompute locked/unlocked/completed state for every level and topic of a course.
///
/// Levels are walked in declared order. A level is unlocked when every level before
/// it is complete; a topic is unlocked when its level is unlocked and all of its
/// prerequisites (anywhere in the course) are complete. Completed nodes are never
/// touched. Running the pass again without a new completion changes nothing.
///
/// Prerequisite cycles are not detected here; members of a cycle stay locked.
/// Catalog validation rejects such courses before they reach this point.
pub fn enforce(
    course: &CourseDefinition,
    progress: &mut CourseProgressState,
    now: DateTime<Utc>,
) -> Result<GatingReport, MissingNode> {
    let completed: BTreeSet<TopicId> = progress
        .topics()
        .filter(|(_, topic)| topic.status.is_completed())
        .map(|(id, _)| id.clone())
        .collect();

    let mut report = GatingReport::default();
    let mut first_incomplete: Option<&LevelId> = None;

    for definition in &course.levels {
        let level = progress
            .levels
            .get_mut(&definition.id)
            .ok_or_else(|| MissingNode::Level(definition.id.clone()))?;

        let level_unlocked = first_incomplete.is_none();
        let level_completed = definition
            .topic_ids
            .iter()
            .all(|topic_id| completed.contains(topic_id));

        let mut level_started = false;
        for topic_id in &definition.topic_ids {
            let unmet_prerequisites: Vec<TopicId> = course
                .topic(topic_id)
                .map(|topic| topic.prerequisites.as_slice())
                .unwrap_or_default()
                .iter()
                .filter(|prerequisite| !completed.contains(*prerequisite))
                .cloned()
                .collect();
            let gate = TopicGate {
                level_unlocked,
                blocking_level: first_incomplete.cloned(),
                prerequisites_met: unmet_prerequisites.is_empty(),
                unmet_prerequisites,
            };

            let node = level
                .topics
                .get_mut(topic_id)
                .ok_or_else(|| MissingNode::Topic(topic_id.clone()))?;

            if !node.status.is_completed() {
                if gate.level_unlocked && gate.prerequisites_met {
                    if node.status.is_locked() {
                        report.dirty |= node.transition(ProgressStatus::Unlocked, now);
                    }
                } else {
                    report.dirty |= node.transition(ProgressStatus::Locked, now);
                }
            }

            level_started |= matches!(
                node.status,
                ProgressStatus::InProgress | ProgressStatus::Completed
            );
            report.topics.insert(topic_id.clone(), gate);
        }

        let next = if level_completed {
            ProgressStatus::Completed
        } else if level_unlocked && level_started {
            ProgressStatus::InProgress
        } else if level_unlocked {
            ProgressStatus::Unlocked
        } else {
            ProgressStatus::Locked
        };
        report.dirty |= level.transition(next, now);

        if !level_completed && first_incomplete.is_none() {
            first_incomplete = Some(&definition.id);
        }
    }

    let statuses: Vec<ProgressStatus> = course
        .levels
        .iter()
        .filter_map(|definition| progress.levels.get(&definition.id))
        .map(|level| level.status)
        .collect();
    let course_status = if statuses.iter().all(|status| status.is_completed()) {
        ProgressStatus::Completed
    } else if statuses.iter().any(|status| !status.is_locked()) {
        ProgressStatus::InProgress
    } else {
        ProgressStatus::Locked
    };
    report.dirty |= progress.transition(course_status, now);

    Ok(report)
}

/// Reject work on a topic that is locked or whose prerequisites are outstanding.
pub fn ensure_open(
    topic_id: &TopicId,
    status: ProgressStatus,
    gate: Option<&TopicGate>,
) -> Result<(), GateDenial> {
    if status.is_locked() {
        return Err(GateDenial::TopicLocked {
            topic: topic_id.clone(),
        });
    }
    match gate {
        Some(gate) if !gate.prerequisites_met && !status.is_completed() => {
            Err(GateDenial::PrerequisitesUnmet {
                topic: topic_id.clone(),
                unmet: gate.unmet_prerequisites.clone(),
            })
        }
        _ => Ok(()),
    }
}
