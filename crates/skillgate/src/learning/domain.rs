use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

const MAX_IDENTIFIER_LEN: usize = 128;

/// Raised when an identifier supplied by a caller is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidIdentifier {
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },
    #[error("{kind} exceeds 128 bytes")]
    TooLong { kind: &'static str },
    #[error("{kind} contains unsupported character {found:?}")]
    UnsupportedCharacter { kind: &'static str, found: char },
}

fn validate_identifier(kind: &'static str, raw: &str) -> Result<(), InvalidIdentifier> {
    if raw.is_empty() {
        return Err(InvalidIdentifier::Empty { kind });
    }
    if raw.len() > MAX_IDENTIFIER_LEN {
        return Err(InvalidIdentifier::TooLong { kind });
    }
    if let Some(found) = raw
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.' | ':')))
    {
        return Err(InvalidIdentifier::UnsupportedCharacter { kind, found });
    }
    Ok(())
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }

        impl $name {
            /// Parse a caller-supplied identifier, rejecting malformed input.
            pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
                let trimmed = raw.trim();
                validate_identifier($kind, trimmed)?;
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

identifier!(
    /// Owner of a progress document.
    UserId,
    "user id"
);
identifier!(CourseId, "course id");
identifier!(
    /// Stable level identity; survives level renames.
    LevelId,
    "level id"
);
identifier!(TopicId, "topic id");
identifier!(ChallengeId, "challenge id");
identifier!(
    /// Judge-side attempt identifier.
    AttemptId,
    "attempt id"
);

/// Shared status lattice for courses, levels, and topics. `Completed` is a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    #[default]
    Locked,
    Unlocked,
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Locked => "Locked",
            Self::Unlocked => "Unlocked",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }

    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }

    pub const fn is_locked(self) -> bool {
        matches!(self, Self::Locked)
    }
}

/// Time source for timestamps and cooldown arithmetic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used by demos and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_reject_malformed_input() {
        assert_eq!(
            TopicId::parse("  "),
            Err(InvalidIdentifier::Empty { kind: "topic id" })
        );
        assert!(matches!(
            CourseId::parse("rust/intro"),
            Err(InvalidIdentifier::UnsupportedCharacter { found: '/', .. })
        ));
        assert!(matches!(
            UserId::parse(&"u".repeat(200)),
            Err(InvalidIdentifier::TooLong { .. })
        ));
        assert_eq!(
            ChallengeId::parse(" ch-1.a ").expect("valid id").as_str(),
            "ch-1.a"
        );
    }

    #[test]
    fn identifiers_validate_when_deserialized() {
        let parsed: AttemptId = serde_json::from_str("\"att-42\"").expect("valid id");
        assert_eq!(parsed, AttemptId::from("att-42"));
        assert!(serde_json::from_str::<AttemptId>("\"att 42\"").is_err());
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&ProgressStatus::InProgress).expect("serialize");
        assert_eq!(json, "\"in-progress\"");
        assert_eq!(ProgressStatus::default(), ProgressStatus::Locked);
    }
}
