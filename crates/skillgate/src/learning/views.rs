use chrono::{DateTime, Utc};
use serde::Serialize;

use super::catalog::{ChallengeDefinition, ChallengeKind, CourseDefinition, TopicDefinition};
use super::domain::{ChallengeId, CourseId, LevelId, ProgressStatus, TopicId};
use super::gating::{GatingReport, MissingNode};
use super::hints::{HintPolicy, HintPolicyView, HintSource};
use super::progress::{CourseProgressState, ProgressTotals, TopicProgressState};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummaryView {
    pub id: CourseId,
    pub title: String,
    pub status: ProgressStatus,
    pub xp: u32,
    pub hint_penalty: u32,
    pub net_xp: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSummaryView {
    pub id: TopicId,
    pub title: String,
    pub xp: u32,
    pub prerequisites: Vec<TopicId>,
    pub challenge_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgressView {
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub hints_used: u32,
    pub hint_penalty: u32,
    pub remaining_hints: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicEntryView {
    pub summary: TopicSummaryView,
    pub progress: TopicProgressView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelView {
    pub id: LevelId,
    pub name: String,
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub topics: Vec<TopicEntryView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseLearningView {
    pub course: CourseSummaryView,
    pub levels: Vec<LevelView>,
    pub totals: ProgressTotals,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelRefView {
    pub id: LevelId,
    pub name: String,
    pub status: ProgressStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeView {
    pub id: ChallengeId,
    pub title: String,
    pub kind: ChallengeKind,
    pub static_hint_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteView {
    pub id: TopicId,
    pub title: String,
    pub status: ProgressStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicLearningView {
    pub course: CourseSummaryView,
    pub level: LevelRefView,
    pub topic: TopicSummaryView,
    pub progress: TopicProgressView,
    pub gate_challenge_id: Option<ChallengeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_challenge: Option<ChallengeView>,
    pub prerequisites: Vec<PrerequisiteView>,
    pub hint_policy: HintPolicyView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_reason: Option<String>,
    pub totals: ProgressTotals,
}

/// Result of a successful hint request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HintResponse {
    pub hint: String,
    pub source: HintSource,
    pub follow_ups: Vec<String>,
    pub penalty_applied: u32,
    pub hints_used: u32,
    pub remaining_hints: u32,
    pub topic_hint_penalty: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_available_at: Option<DateTime<Utc>>,
    pub totals: ProgressTotals,
}

fn course_summary(definition: &CourseDefinition, progress: &CourseProgressState) -> CourseSummaryView {
    CourseSummaryView {
        id: definition.id.clone(),
        title: definition.title.clone(),
        status: progress.status,
        xp: progress.xp,
        hint_penalty: progress.hint_penalty,
        net_xp: progress.net_xp(),
        completed_at: progress.completed_at,
    }
}

fn topic_summary(topic_id: &TopicId, definition: Option<&TopicDefinition>) -> TopicSummaryView {
    match definition {
        Some(topic) => TopicSummaryView {
            id: topic.id.clone(),
            title: topic.title.clone(),
            xp: topic.xp,
            prerequisites: topic.prerequisites.clone(),
            challenge_count: topic.challenges.len(),
        },
        None => TopicSummaryView {
            id: topic_id.clone(),
            title: topic_id.to_string(),
            xp: 0,
            prerequisites: Vec::new(),
            challenge_count: 0,
        },
    }
}

/// Challenge that currently gates the topic: the recorded one if still valid, else the default.
pub fn gate_challenge<'a>(
    definition: &'a TopicDefinition,
    node: &TopicProgressState,
) -> Option<&'a ChallengeDefinition> {
    node.gate_challenge_id
        .as_ref()
        .and_then(|id| definition.challenge(id))
        .or_else(|| definition.default_gate_challenge())
}

fn topic_progress(
    node: &TopicProgressState,
    gate: Option<&ChallengeDefinition>,
    policy: &HintPolicy,
) -> TopicProgressView {
    let hints_used = gate
        .map(|challenge| node.hints_used(&challenge.id))
        .unwrap_or_default();
    TopicProgressView {
        status: node.status,
        unlocked_at: node.unlocked_at,
        completed_at: node.completed_at,
        attempts: node.attempts,
        hints_used,
        hint_penalty: node.hint_penalty,
        remaining_hints: policy.remaining(hints_used),
    }
}

pub fn course_view(
    definition: &CourseDefinition,
    progress: &CourseProgressState,
    totals: ProgressTotals,
    policy: &HintPolicy,
) -> Result<CourseLearningView, MissingNode> {
    let mut levels = Vec::with_capacity(definition.levels.len());
    for level_definition in &definition.levels {
        let level = progress
            .levels
            .get(&level_definition.id)
            .ok_or_else(|| MissingNode::Level(level_definition.id.clone()))?;

        let mut topics = Vec::with_capacity(level_definition.topic_ids.len());
        for topic_id in &level_definition.topic_ids {
            let node = level
                .topics
                .get(topic_id)
                .ok_or_else(|| MissingNode::Topic(topic_id.clone()))?;
            let topic_definition = definition.topic(topic_id);
            let gate = topic_definition.and_then(|topic| gate_challenge(topic, node));
            topics.push(TopicEntryView {
                summary: topic_summary(topic_id, topic_definition),
                progress: topic_progress(node, gate, policy),
            });
        }

        levels.push(LevelView {
            id: level_definition.id.clone(),
            name: level_definition.name.clone(),
            status: level.status,
            unlocked_at: level.unlocked_at,
            completed_at: level.completed_at,
            topics,
        });
    }

    Ok(CourseLearningView {
        course: course_summary(definition, progress),
        levels,
        totals,
    })
}

pub fn topic_view(
    definition: &CourseDefinition,
    topic: &TopicDefinition,
    progress: &CourseProgressState,
    gating: &GatingReport,
    totals: ProgressTotals,
    policy: &HintPolicy,
) -> Result<TopicLearningView, MissingNode> {
    let level_definition = definition
        .level_of(&topic.id)
        .ok_or_else(|| MissingNode::Topic(topic.id.clone()))?;
    let level = progress
        .levels
        .get(&level_definition.id)
        .ok_or_else(|| MissingNode::Level(level_definition.id.clone()))?;
    let node = level
        .topics
        .get(&topic.id)
        .ok_or_else(|| MissingNode::Topic(topic.id.clone()))?;

    let gate = gate_challenge(topic, node);
    let prerequisites = topic
        .prerequisites
        .iter()
        .map(|id| PrerequisiteView {
            id: id.clone(),
            title: definition
                .topic(id)
                .map(|prerequisite| prerequisite.title.clone())
                .unwrap_or_else(|| id.to_string()),
            status: progress
                .topic(id)
                .map(|prerequisite| prerequisite.status)
                .unwrap_or_default(),
        })
        .collect();

    let locked_reason = if node.status.is_locked() {
        gating
            .gate(&topic.id)
            .and_then(|gate| gate.locked_reason(definition, &topic.id))
    } else {
        None
    };

    Ok(TopicLearningView {
        course: course_summary(definition, progress),
        level: LevelRefView {
            id: level_definition.id.clone(),
            name: level_definition.name.clone(),
            status: level.status,
        },
        topic: topic_summary(&topic.id, Some(topic)),
        progress: topic_progress(node, gate, policy),
        gate_challenge_id: gate.map(|challenge| challenge.id.clone()),
        gate_challenge: gate.map(|challenge| ChallengeView {
            id: challenge.id.clone(),
            title: challenge.title.clone(),
            kind: challenge.kind,
            static_hint_count: challenge.hints.len(),
        }),
        prerequisites,
        hint_policy: policy.view(),
        locked_reason,
        totals,
    })
}
