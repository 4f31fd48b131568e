use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::ChallengeDefinition;
use super::domain::{AttemptId, ChallengeId, TopicId};
use super::gating::MissingNode;
use super::progress::{CourseProgressState, HintUsageState};

pub const DEFAULT_MAX_HINTS_PER_CHALLENGE: u32 = 3;
pub const DEFAULT_HINT_COOLDOWN: Duration = Duration::from_secs(60);
pub const DEFAULT_STATIC_HINT_PENALTY: u32 = 5;
pub const DEFAULT_AI_HINT_PENALTY: u32 = 15;

/// Limits and prices of the hint economy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HintPolicy {
    pub max_per_challenge: u32,
    pub cooldown: Duration,
    pub static_penalty: u32,
    pub ai_penalty: u32,
}

impl Default for HintPolicy {
    fn default() -> Self {
        Self {
            max_per_challenge: DEFAULT_MAX_HINTS_PER_CHALLENGE,
            cooldown: DEFAULT_HINT_COOLDOWN,
            static_penalty: DEFAULT_STATIC_HINT_PENALTY,
            ai_penalty: DEFAULT_AI_HINT_PENALTY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintSource {
    Static,
    Ai,
}

impl HintSource {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Static => "Static",
            Self::Ai => "AI",
        }
    }
}

/// Learner-supplied context for a hint request. Only used when the hint is generated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintRequest {
    #[serde(default)]
    pub attempt_id: Option<AttemptId>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Policy as exposed to learners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HintPolicyView {
    pub max_per_challenge: u32,
    pub cooldown_seconds: u64,
    pub penalty_per_static: u32,
    pub penalty_per_ai: u32,
}

/// Forbidden outcomes of a hint request. A denial never mutates state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HintDenial {
    #[error("hint limit reached for challenge {challenge} ({max} per challenge)")]
    LimitReached { challenge: ChallengeId, max: u32 },
    #[error("hint cooldown active for challenge {challenge}; retry in {retry_after_seconds}s")]
    CooldownActive {
        challenge: ChallengeId,
        retry_after_seconds: u64,
    },
}

impl HintPolicy {
    pub fn view(&self) -> HintPolicyView {
        HintPolicyView {
            max_per_challenge: self.max_per_challenge,
            cooldown_seconds: self.cooldown.as_secs(),
            penalty_per_static: self.static_penalty,
            penalty_per_ai: self.ai_penalty,
        }
    }

    pub fn remaining(&self, used: u32) -> u32 {
        self.max_per_challenge.saturating_sub(used)
    }

    pub fn penalty_for(&self, source: HintSource) -> u32 {
        match source {
            HintSource::Static => self.static_penalty,
            HintSource::Ai => self.ai_penalty,
        }
    }

    fn cooldown_millis(&self) -> i64 {
        i64::try_from(self.cooldown.as_millis()).unwrap_or(i64::MAX)
    }

    /// Earliest instant the next hint may be requested.
    pub fn next_available_at(&self, usage: &HintUsageState) -> Option<DateTime<Utc>> {
        let last = usage.last_requested_at?;
        last.checked_add_signed(chrono::Duration::milliseconds(self.cooldown_millis()))
    }

    /// Limit first, then cooldown.
    pub fn check(
        &self,
        challenge: &ChallengeId,
        usage: Option<&HintUsageState>,
        now: DateTime<Utc>,
    ) -> Result<(), HintDenial> {
        let count = usage.map_or(0, |usage| usage.count);
        if count >= self.max_per_challenge {
            return Err(HintDenial::LimitReached {
                challenge: challenge.clone(),
                max: self.max_per_challenge,
            });
        }

        if let Some(last) = usage.and_then(|usage| usage.last_requested_at) {
            let elapsed = now.signed_duration_since(last).num_milliseconds();
            let cooldown = self.cooldown_millis();
            if elapsed < cooldown {
                let remaining = cooldown.saturating_sub(elapsed.max(0));
                let retry_after_seconds = u64::try_from(remaining.saturating_add(999) / 1000).unwrap_or(0);
                return Err(HintDenial::CooldownActive {
                    challenge: challenge.clone(),
                    retry_after_seconds,
                });
            }
        }

        Ok(())
    }
}

/// The static hint at the usage cursor, or `None` once the authored list is exhausted.
pub fn next_static_hint<'a>(
    challenge: &'a ChallengeDefinition,
    usage: Option<&HintUsageState>,
) -> Option<&'a str> {
    let cursor = usage.map(|usage| usage.static_cursor).unwrap_or_default();
    challenge.hints.get(cursor).map(String::as_str)
}

/// Charge an issued hint against the topic and course. Returns the updated usage.
pub fn record_hint(
    course: &mut CourseProgressState,
    topic_id: &TopicId,
    challenge_id: &ChallengeId,
    source: HintSource,
    penalty: u32,
    now: DateTime<Utc>,
) -> Result<HintUsageState, MissingNode> {
    let topic = course
        .topic_mut(topic_id)
        .ok_or_else(|| MissingNode::Topic(topic_id.clone()))?;

    let usage = topic.hints.entry(challenge_id.clone()).or_default();
    usage.count += 1;
    usage.last_requested_at = Some(now);
    if source == HintSource::Static {
        usage.static_cursor += 1;
    }
    let usage = usage.clone();

    topic.hint_penalty = topic.hint_penalty.saturating_add(penalty);
    topic.updated_at = now;
    course.hint_penalty = course.hint_penalty.saturating_add(penalty);
    course.updated_at = now;

    Ok(usage)
}
