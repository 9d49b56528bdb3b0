//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use huddle_shared::types::{ChatId, ChatKind, TaskId, TaskStatus};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user. The username is the natural key referenced by
/// participants, messages and tasks, so it never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub username: String,
    /// Public key blob supplied by the client; never interpreted here.
    pub public_key: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation (private or group).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub kind: ChatKind,
    /// Stored name. Only authoritative for group chats.
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A group chat together with its member usernames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupSummary {
    pub id: ChatId,
    pub name: Option<String>,
    pub participants: Vec<String>,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A plaintext message. Used for group chats and system notes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlainMessage {
    pub id: i64,
    pub chat_id: ChatId,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// An end-to-end encrypted message. The server stores the three parts of the
/// AEAD output as the client sent them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub id: i64,
    pub chat_id: ChatId,
    pub sender: String,
    pub iv: String,
    pub ct: String,
    pub tag: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// A task owned by a group chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub group_id: ChatId,
    /// Free text; not required to match a participant row.
    pub participant_name: String,
    pub task_name: String,
    pub deadline: NaiveDate,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

/// One element of a task batch before insertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTask {
    pub participant_name: String,
    pub task_name: String,
    pub deadline: NaiveDate,
}

/// A task annotated with the name of the group that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupTask {
    pub task: Task,
    pub group_name: Option<String>,
}

/// Outcome of a committed status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub task_id: TaskId,
    pub group_id: ChatId,
    pub status: TaskStatus,
    /// Set when the update finished the group's last open task: every task of
    /// the group has been deleted and this system note appended.
    pub cascade: Option<PlainMessage>,
}
