use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::domain::{ChallengeId, CourseId, LevelId, TopicId};

pub const DEFAULT_TOPIC_XP: u32 = 100;

fn default_topic_xp() -> u32 {
    DEFAULT_TOPIC_XP
}

/// Read-only course definition: ordered levels plus the topics they group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDefinition {
    pub id: CourseId,
    pub title: String,
    pub levels: Vec<LevelDefinition>,
    #[serde(with = "topic_list")]
    pub topics: BTreeMap<TopicId, TopicDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelDefinition {
    pub id: LevelId,
    pub name: String,
    pub topic_ids: Vec<TopicId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDefinition {
    pub id: TopicId,
    pub title: String,
    #[serde(default)]
    pub prerequisites: Vec<TopicId>,
    #[serde(default = "default_topic_xp")]
    pub xp: u32,
    #[serde(default)]
    pub challenges: Vec<ChallengeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeDefinition {
    pub id: ChallengeId,
    pub title: String,
    pub kind: ChallengeKind,
    /// Pre-authored hints, consumed strictly in order.
    #[serde(default)]
    pub hints: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    Coding,
    Debug,
    Quiz,
    Reading,
}

impl ChallengeKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Coding => "Coding",
            Self::Debug => "Debug",
            Self::Quiz => "Quiz",
            Self::Reading => "Reading",
        }
    }

    /// Kinds preferred when a topic's gate challenge is resolved implicitly.
    pub const fn is_gate_candidate(self) -> bool {
        matches!(self, Self::Coding | Self::Debug)
    }
}

impl TopicDefinition {
    pub fn challenge(&self, id: &ChallengeId) -> Option<&ChallengeDefinition> {
        self.challenges.iter().find(|challenge| &challenge.id == id)
    }

    /// First coding/debug challenge, falling back to the first challenge of any kind.
    pub fn default_gate_challenge(&self) -> Option<&ChallengeDefinition> {
        self.challenges
            .iter()
            .find(|challenge| challenge.kind.is_gate_candidate())
            .or_else(|| self.challenges.first())
    }
}

impl CourseDefinition {
    pub fn topic(&self, id: &TopicId) -> Option<&TopicDefinition> {
        self.topics.get(id)
    }

    pub fn level_of(&self, topic_id: &TopicId) -> Option<&LevelDefinition> {
        self.levels
            .iter()
            .find(|level| level.topic_ids.contains(topic_id))
    }

    /// Every topic id placed in some level.
    pub fn topic_ids(&self) -> BTreeSet<&TopicId> {
        self.levels
            .iter()
            .flat_map(|level| level.topic_ids.iter())
            .collect()
    }

    /// Authoring-time structural checks, including prerequisite cycles.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut placed: BTreeMap<&TopicId, &LevelId> = BTreeMap::new();
        let mut level_ids = BTreeSet::new();

        for level in &self.levels {
            if !level_ids.insert(&level.id) {
                return Err(CatalogError::DuplicateLevel {
                    course: self.id.clone(),
                    level: level.id.clone(),
                });
            }
            for topic_id in &level.topic_ids {
                if placed.insert(topic_id, &level.id).is_some() {
                    return Err(CatalogError::DuplicateTopic {
                        course: self.id.clone(),
                        topic: topic_id.clone(),
                    });
                }
                if !self.topics.contains_key(topic_id) {
                    return Err(CatalogError::UndefinedTopic {
                        course: self.id.clone(),
                        level: level.id.clone(),
                        topic: topic_id.clone(),
                    });
                }
            }
        }

        for topic in self.topics.values() {
            for prerequisite in &topic.prerequisites {
                if prerequisite == &topic.id {
                    return Err(CatalogError::PrerequisiteCycle {
                        course: self.id.clone(),
                        cycle: vec![topic.id.clone(), topic.id.clone()],
                    });
                }
                if !placed.contains_key(prerequisite) {
                    return Err(CatalogError::UnknownPrerequisite {
                        course: self.id.clone(),
                        topic: topic.id.clone(),
                        prerequisite: prerequisite.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.find_prerequisite_cycle() {
            return Err(CatalogError::PrerequisiteCycle {
                course: self.id.clone(),
                cycle,
            });
        }

        Ok(())
    }

    fn find_prerequisite_cycle(&self) -> Option<Vec<TopicId>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            course: &'a CourseDefinition,
            topic: &'a TopicId,
            marks: &mut BTreeMap<&'a TopicId, Mark>,
            path: &mut Vec<&'a TopicId>,
        ) -> Option<Vec<TopicId>> {
            match marks.get(topic) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|entry| *entry == topic)?;
                    let mut cycle: Vec<TopicId> =
                        path[start..].iter().map(|id| (*id).clone()).collect();
                    cycle.push(topic.clone());
                    return Some(cycle);
                }
                None => {}
            }

            marks.insert(topic, Mark::Visiting);
            path.push(topic);
            if let Some(definition) = course.topics.get(topic) {
                for prerequisite in &definition.prerequisites {
                    if let Some(cycle) = visit(course, prerequisite, marks, path) {
                        return Some(cycle);
                    }
                }
            }
            path.pop();
            marks.insert(topic, Mark::Done);
            None
        }

        let mut marks = BTreeMap::new();
        let mut path = Vec::new();
        self.topics
            .keys()
            .find_map(|topic| visit(self, topic, &mut marks, &mut path))
    }
}

/// On-disk catalog layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    pub courses: Vec<CourseDefinition>,
}

impl CatalogFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate every course in the document.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        let mut seen = BTreeSet::new();
        for course in &file.courses {
            if !seen.insert(&course.id) {
                return Err(CatalogError::DuplicateCourse(course.id.clone()));
            }
            course.validate()?;
        }
        Ok(file)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unable to read catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("course {0} is defined more than once")]
    DuplicateCourse(CourseId),
    #[error("course {course}: level {level} is defined more than once")]
    DuplicateLevel { course: CourseId, level: LevelId },
    #[error("course {course}: topic {topic} appears in more than one level")]
    DuplicateTopic { course: CourseId, topic: TopicId },
    #[error("course {course}: level {level} references undefined topic {topic}")]
    UndefinedTopic {
        course: CourseId,
        level: LevelId,
        topic: TopicId,
    },
    #[error("course {course}: topic {topic} requires {prerequisite}, which is not in the course")]
    UnknownPrerequisite {
        course: CourseId,
        topic: TopicId,
        prerequisite: TopicId,
    },
    #[error("course {course}: prerequisite cycle {}", format_cycle(.cycle))]
    PrerequisiteCycle { course: CourseId, cycle: Vec<TopicId> },
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

fn format_cycle(cycle: &[TopicId]) -> String {
    cycle
        .iter()
        .map(TopicId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Topics serialize as a list; keyed by id in memory.
mod topic_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::TopicDefinition;
    use crate::learning::domain::TopicId;

    pub(super) fn serialize<S>(
        topics: &BTreeMap<TopicId, TopicDefinition>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let list: Vec<&TopicDefinition> = topics.values().collect();
        list.serialize(serializer)
    }

    pub(super) fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<TopicId, TopicDefinition>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<TopicDefinition>::deserialize(deserializer)?;
        let mut topics = BTreeMap::new();
        for topic in list {
            if topics.contains_key(&topic.id) {
                return Err(serde::de::Error::custom(format!(
                    "topic {} is defined more than once",
                    topic.id
                )));
            }
            topics.insert(topic.id.clone(), topic);
        }
        Ok(topics)
    }
}
