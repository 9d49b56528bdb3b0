use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

// Chat identity = SQLite row id of the `chats` table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl ChatId {
    pub fn room_name(&self) -> String {
        format!("chat_{}", self.0)
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Private chats carry end-to-end encrypted messages, group chats carry
/// plaintext messages and own a task ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
        }
    }
}

impl FromStr for ChatKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(Self::Private),
            "group" => Ok(Self::Group),
            _ => Err(ParseError::UnknownChatKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task status.
///
/// The wire label for an open task is `"In Progress"`. The historical
/// misspelling `"In Progess"` is still accepted when parsing. In storage the
/// status is kept as the internal tags `open` / `finished`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[serde(rename = "In Progress", alias = "In Progess")]
    Open,
    #[serde(rename = "Finished")]
    Finished,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "In Progress",
            Self::Finished => "Finished",
        }
    }

    pub fn storage_tag(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Finished => "finished",
        }
    }

    pub fn from_storage_tag(tag: &str) -> Option<Self> {
        match tag {
            "open" => Some(Self::Open),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "In Progress" | "In Progess" | "Open" | "open" => Ok(Self::Open),
            "Finished" | "finished" => Ok(Self::Finished),
            _ => Err(ParseError::UnknownTaskStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_kind_parse() {
        assert_eq!("group".parse::<ChatKind>().unwrap(), ChatKind::Group);
        assert_eq!("Private".parse::<ChatKind>().unwrap(), ChatKind::Private);
        assert!("channel".parse::<ChatKind>().is_err());
    }

    #[test]
    fn test_task_status_accepts_legacy_spelling() {
        assert_eq!("In Progess".parse::<TaskStatus>().unwrap(), TaskStatus::Open);
        let parsed: TaskStatus = serde_json::from_str("\"In Progess\"").unwrap();
        assert_eq!(parsed, TaskStatus::Open);
        assert_eq!(serde_json::to_string(&TaskStatus::Open).unwrap(), "\"In Progress\"");
    }

    #[test]
    fn test_task_status_storage_tags() {
        for status in [TaskStatus::Open, TaskStatus::Finished] {
            assert_eq!(TaskStatus::from_storage_tag(status.storage_tag()), Some(status));
        }
        assert_eq!(TaskStatus::from_storage_tag("In Progess"), None);
    }
}
