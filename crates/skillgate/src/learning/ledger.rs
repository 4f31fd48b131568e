use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::{ChallengeDefinition, TopicDefinition};
use super::domain::{AttemptId, ChallengeId, ProgressStatus, TopicId, UserId};
use super::gating::MissingNode;
use super::progress::CourseProgressState;
use super::repository::JudgeAttempt;

/// Gate-completion payload submitted after the judge has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateSubmission {
    #[serde(default)]
    pub challenge_id: Option<ChallengeId>,
    pub passed: bool,
    #[serde(default)]
    pub attempt_id: Option<AttemptId>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("challenge {challenge} does not belong to topic {topic}")]
pub struct ChallengeNotInTopic {
    pub topic: TopicId,
    pub challenge: ChallengeId,
}

/// Ownership and targeting failures for a referenced judge attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptDenial {
    #[error("attempt {attempt} belongs to another user")]
    NotOwner { attempt: AttemptId },
    #[error("attempt {attempt} does not target challenge {expected}")]
    ChallengeMismatch {
        attempt: AttemptId,
        expected: ChallengeId,
    },
}

/// Explicit challenge when it belongs to the topic, otherwise the topic's default gate.
pub fn resolve_gate_challenge<'a>(
    topic: &'a TopicDefinition,
    requested: Option<&ChallengeId>,
) -> Result<Option<&'a ChallengeDefinition>, ChallengeNotInTopic> {
    match requested {
        Some(id) => topic
            .challenge(id)
            .map(Some)
            .ok_or_else(|| ChallengeNotInTopic {
                topic: topic.id.clone(),
                challenge: id.clone(),
            }),
        None => Ok(topic.default_gate_challenge()),
    }
}

/// The attempt must belong to the caller and, when a gate challenge is known, target it.
pub fn verify_attempt(
    attempt: &JudgeAttempt,
    user_id: &UserId,
    gate: Option<&ChallengeId>,
) -> Result<(), AttemptDenial> {
    if &attempt.user_id != user_id {
        return Err(AttemptDenial::NotOwner {
            attempt: attempt.id.clone(),
        });
    }
    if let Some(expected) = gate {
        if attempt.challenge_id.as_ref() != Some(expected) {
            return Err(AttemptDenial::ChallengeMismatch {
                attempt: attempt.id.clone(),
                expected: expected.clone(),
            });
        }
    }
    Ok(())
}

/// Hint context only needs an owned attempt. A recorded challenge must still match.
pub fn verify_hint_attempt(
    attempt: &JudgeAttempt,
    user_id: &UserId,
    challenge_id: &ChallengeId,
) -> Result<(), AttemptDenial> {
    verify_attempt(attempt, user_id, None)?;
    match attempt.challenge_id.as_ref() {
        Some(recorded) if recorded != challenge_id => Err(AttemptDenial::ChallengeMismatch {
            attempt: attempt.id.clone(),
            expected: challenge_id.clone(),
        }),
        _ => Ok(()),
    }
}

/// Effect of a single gate submission on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateEntry {
    pub attempts: u32,
    pub newly_completed: bool,
    pub xp_awarded: u32,
}

/// Count the attempt and apply pass/fail to the topic. XP is paid at most once per topic.
pub fn record_gate_result(
    course: &mut CourseProgressState,
    topic: &TopicDefinition,
    gate: Option<&ChallengeId>,
    passed: bool,
    now: DateTime<Utc>,
) -> Result<GateEntry, MissingNode> {
    let node = course
        .topic_mut(&topic.id)
        .ok_or_else(|| MissingNode::Topic(topic.id.clone()))?;

    node.attempts += 1;
    if let Some(challenge_id) = gate {
        *node
            .attempts_by_challenge
            .entry(challenge_id.clone())
            .or_default() += 1;
        node.gate_challenge_id = Some(challenge_id.clone());
    }
    node.last_attempt_at = Some(now);
    node.updated_at = now;

    let mut entry = GateEntry {
        attempts: node.attempts,
        newly_completed: false,
        xp_awarded: 0,
    };

    if passed {
        entry.newly_completed = node.transition(ProgressStatus::Completed, now);
        if node.awarded_xp.is_none() {
            node.awarded_xp = Some(topic.xp);
            entry.xp_awarded = topic.xp;
        }
    } else if !node.status.is_completed() {
        node.transition(ProgressStatus::InProgress, now);
    }

    course.xp = course.xp.saturating_add(entry.xp_awarded);
    course.updated_at = now;

    Ok(entry)
}
