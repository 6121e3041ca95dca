use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::bridge::QuestBridge;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestError {
    #[error("unknown quest: {0}")]
    UnknownQuest(String),
    #[error("quest already active: {0}")]
    AlreadyActive(String),
    #[error("quest is not active: {0}")]
    NotActive(String),
    #[error("quest already completed: {0}")]
    AlreadyCompleted(String),
    /// A bridge-specific failure reported by a host implementation.
    #[error("quest bridge rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuestStatus {
    #[default]
    Inactive,
    Active,
    Completed,
}

/// A quest the dialogue can start or complete, referenced by title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: QuestStatus,
}

impl Quest {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            status: QuestStatus::Inactive,
        }
    }
}

/// Emitted whenever a quest changes status, for the host's quest UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestEvent {
    Started(String),
    Completed(String),
}

/// In-memory quest state keyed by quest title.
#[derive(Debug, Clone, Default)]
pub struct QuestLog {
    quests: FxHashMap<String, Quest>,
    events: Vec<QuestEvent>,
}

impl QuestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, quest: Quest) {
        self.quests.insert(quest.title.clone(), quest);
    }

    pub fn get(&self, title: &str) -> Option<&Quest> {
        self.quests.get(title)
    }

    pub fn status(&self, title: &str) -> Option<QuestStatus> {
        self.quests.get(title).map(|q| q.status)
    }

    /// Every known quest, sorted by title.
    pub fn quests(&self) -> Vec<&Quest> {
        let mut quests: Vec<&Quest> = self.quests.values().collect();
        quests.sort_by(|a, b| a.title.cmp(&b.title));
        quests
    }

    /// Take the events recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<QuestEvent> {
        std::mem::take(&mut self.events)
    }

    /// Load quests from a RON file containing a list of `Quest`s.
    pub fn load_from_ron(&mut self, path: &std::path::Path) -> Result<(), QuestLoadError> {
        let contents = std::fs::read_to_string(path)?;
        self.parse_ron(&contents)
    }

    pub fn parse_ron(&mut self, input: &str) -> Result<(), QuestLoadError> {
        let quests: Vec<Quest> = ron::from_str(input)?;
        for quest in quests {
            self.register(quest);
        }
        Ok(())
    }

    fn quest_mut(&mut self, title: &str) -> Result<&mut Quest, QuestError> {
        self.quests
            .get_mut(title)
            .ok_or_else(|| QuestError::UnknownQuest(title.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum QuestLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

impl QuestBridge for QuestLog {
    fn start_quest(&mut self, title: &str) -> Result<(), QuestError> {
        let quest = self.quest_mut(title)?;
        match quest.status {
            QuestStatus::Active => return Err(QuestError::AlreadyActive(title.to_string())),
            QuestStatus::Completed => {
                return Err(QuestError::AlreadyCompleted(title.to_string()))
            }
            QuestStatus::Inactive => quest.status = QuestStatus::Active,
        }
        tracing::info!(quest = %title, "quest started");
        self.events.push(QuestEvent::Started(title.to_string()));
        Ok(())
    }

    fn complete_quest(&mut self, title: &str) -> Result<(), QuestError> {
        let quest = self.quest_mut(title)?;
        match quest.status {
            QuestStatus::Inactive => return Err(QuestError::NotActive(title.to_string())),
            QuestStatus::Completed => {
                return Err(QuestError::AlreadyCompleted(title.to_string()))
            }
            QuestStatus::Active => quest.status = QuestStatus::Completed,
        }
        tracing::info!(quest = %title, "quest completed");
        self.events.push(QuestEvent::Completed(title.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with_key_quest() -> QuestLog {
        let mut log = QuestLog::new();
        log.register(Quest::new("FindKey", "Find the cellar key."));
        log
    }

    #[test]
    fn start_then_complete() {
        let mut log = log_with_key_quest();
        log.start_quest("FindKey").unwrap();
        assert_eq!(log.status("FindKey"), Some(QuestStatus::Active));
        log.complete_quest("FindKey").unwrap();
        assert_eq!(log.status("FindKey"), Some(QuestStatus::Completed));
        assert_eq!(
            log.drain_events(),
            vec![
                QuestEvent::Started("FindKey".to_string()),
                QuestEvent::Completed("FindKey".to_string()),
            ]
        );
        assert!(log.drain_events().is_empty());
    }

    #[test]
    fn unknown_quest_is_rejected() {
        let mut log = QuestLog::new();
        assert_eq!(
            log.start_quest("Ghost"),
            Err(QuestError::UnknownQuest("Ghost".to_string()))
        );
    }

    #[test]
    fn invalid_transitions_leave_status_alone() {
        let mut log = log_with_key_quest();
        assert_eq!(
            log.complete_quest("FindKey"),
            Err(QuestError::NotActive("FindKey".to_string()))
        );
        log.start_quest("FindKey").unwrap();
        assert_eq!(
            log.start_quest("FindKey"),
            Err(QuestError::AlreadyActive("FindKey".to_string()))
        );
        log.complete_quest("FindKey").unwrap();
        assert_eq!(
            log.start_quest("FindKey"),
            Err(QuestError::AlreadyCompleted("FindKey".to_string()))
        );
        assert_eq!(log.status("FindKey"), Some(QuestStatus::Completed));
        assert_eq!(log.drain_events().len(), 2);
    }
}
