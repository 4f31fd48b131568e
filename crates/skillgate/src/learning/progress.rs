//! Persisted progress document. One blob per user, replaced wholesale on write.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ChallengeId, CourseId, LevelId, ProgressStatus, TopicId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningProgressState {
    #[serde(default)]
    pub courses: BTreeMap<CourseId, CourseProgressState>,
    #[serde(default)]
    pub totals: ProgressTotals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressTotals {
    pub base_xp: u32,
    pub hint_penalty: u32,
    pub net_xp: u32,
    pub completed_topics: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressState {
    #[serde(default)]
    pub status: ProgressStatus,
    #[serde(default)]
    pub levels: BTreeMap<LevelId, LevelProgressState>,
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub hint_penalty: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CourseProgressState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: ProgressStatus::Locked,
            levels: BTreeMap::new(),
            xp: 0,
            hint_penalty: 0,
            started_at: now,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn net_xp(&self) -> u32 {
        self.xp.saturating_sub(self.hint_penalty)
    }

    /// Locate a topic node regardless of which level currently holds it.
    pub fn topic(&self, topic_id: &TopicId) -> Option<&TopicProgressState> {
        self.levels
            .values()
            .find_map(|level| level.topics.get(topic_id))
    }

    pub fn topic_mut(&mut self, topic_id: &TopicId) -> Option<&mut TopicProgressState> {
        self.levels
            .values_mut()
            .find_map(|level| level.topics.get_mut(topic_id))
    }

    pub fn topics(&self) -> impl Iterator<Item = (&TopicId, &TopicProgressState)> {
        self.levels.values().flat_map(|level| level.topics.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgressState {
    #[serde(default)]
    pub status: ProgressStatus,
    #[serde(default)]
    pub topics: BTreeMap<TopicId, TopicProgressState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl LevelProgressState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: ProgressStatus::Locked,
            topics: BTreeMap::new(),
            unlocked_at: None,
            completed_at: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgressState {
    #[serde(default)]
    pub status: ProgressStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub attempts_by_challenge: BTreeMap<ChallengeId, u32>,
    #[serde(default)]
    pub hints: BTreeMap<ChallengeId, HintUsageState>,
    #[serde(default)]
    pub hint_penalty: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awarded_xp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_challenge_id: Option<ChallengeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TopicProgressState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: ProgressStatus::Locked,
            attempts: 0,
            attempts_by_challenge: BTreeMap::new(),
            hints: BTreeMap::new(),
            hint_penalty: 0,
            awarded_xp: None,
            gate_challenge_id: None,
            last_attempt_at: None,
            unlocked_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn hints_used(&self, challenge_id: &ChallengeId) -> u32 {
        self.hints
            .get(challenge_id)
            .map(|usage| usage.count)
            .unwrap_or_default()
    }
}

/// Move a node to `next`, refusing to leave `Completed`. Returns whether anything changed.
fn step_status(
    status: &mut ProgressStatus,
    unlocked_at: &mut Option<DateTime<Utc>>,
    completed_at: &mut Option<DateTime<Utc>>,
    updated_at: &mut DateTime<Utc>,
    next: ProgressStatus,
    now: DateTime<Utc>,
) -> bool {
    if status.is_completed() || *status == next {
        return false;
    }
    if !next.is_locked() && unlocked_at.is_none() {
        *unlocked_at = Some(now);
    }
    if next.is_completed() {
        *completed_at = Some(now);
    }
    *status = next;
    *updated_at = now;
    true
}

impl LevelProgressState {
    pub fn transition(&mut self, next: ProgressStatus, now: DateTime<Utc>) -> bool {
        step_status(
            &mut self.status,
            &mut self.unlocked_at,
            &mut self.completed_at,
            &mut self.updated_at,
            next,
            now,
        )
    }
}

impl TopicProgressState {
    pub fn transition(&mut self, next: ProgressStatus, now: DateTime<Utc>) -> bool {
        step_status(
            &mut self.status,
            &mut self.unlocked_at,
            &mut self.completed_at,
            &mut self.updated_at,
            next,
            now,
        )
    }
}

impl CourseProgressState {
    pub fn transition(&mut self, next: ProgressStatus, now: DateTime<Utc>) -> bool {
        let mut unlocked_at = Some(self.started_at);
        step_status(
            &mut self.status,
            &mut unlocked_at,
            &mut self.completed_at,
            &mut self.updated_at,
            next,
            now,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintUsageState {
    pub count: u32,
    /// Index of the next unseen static hint.
    pub static_cursor: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_requested_at: Option<DateTime<Utc>>,
}
