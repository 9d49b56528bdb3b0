//! Read path: a chat's ordered history plus the name it is shown under.

use chrono::{DateTime, Utc};
use serde::Serialize;

use huddle_shared::protocol::MessagePayload;
use huddle_shared::types::{ChatId, ChatKind};
use huddle_store::{Chat, Database};

use crate::error::ServerError;
use crate::storage::Storage;

/// One chat as presented to a particular viewer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub chat_id: ChatId,
    /// Display name resolved for the viewer. Can be null for a private chat
    /// with no counterpart and no stored name.
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub participants: Vec<String>,
    pub messages: Vec<TimelineEntry>,
}

/// A message projected for display. Group chats carry `content`, private
/// chats carry the opaque `iv`/`ct`/`tag` triple.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimelineEntry {
    pub sender: String,
    #[serde(flatten)]
    pub payload: MessagePayload,
    pub timestamp: DateTime<Utc>,
}

/// Name a chat is shown under. Groups keep their stored name; a private
/// chat is named after the first participant who is not the viewer.
pub fn display_name(
    kind: ChatKind,
    stored: Option<&str>,
    participants: &[String],
    viewer: &str,
) -> Option<String> {
    match kind {
        ChatKind::Group => stored.map(str::to_string),
        ChatKind::Private => participants
            .iter()
            .find(|p| p.as_str() != viewer)
            .cloned()
            .or_else(|| stored.map(str::to_string)),
    }
}

/// Build the timeline of one chat for `viewer`, oldest message first.
pub fn build_timeline(db: &Database, chat_id: ChatId, viewer: &str) -> Result<ChatView, ServerError> {
    db.read_snapshot(|db| -> Result<ChatView, ServerError> {
        let chat = db.get_chat(chat_id).map_err(|e| match e {
            huddle_store::StoreError::NotFound => {
                ServerError::NotFound(format!("Chat {chat_id} not found"))
            }
            other => other.into(),
        })?;
        view_for(db, chat, viewer)
    })
}

/// Every chat `viewer` participates in, newest chat first. All chats are
/// read from one snapshot.
pub fn list_chats(db: &Database, viewer: &str) -> Result<Vec<ChatView>, ServerError> {
    db.read_snapshot(|db| -> Result<Vec<ChatView>, ServerError> {
        db.require_user(viewer)?;
        db.list_chats_for_user(viewer)?
            .into_iter()
            .map(|chat| view_for(db, chat, viewer))
            .collect()
    })
}

fn view_for(db: &Database, chat: Chat, viewer: &str) -> Result<ChatView, ServerError> {
    let participants = db.chat_participants(chat.id)?;

    let messages = match chat.kind {
        ChatKind::Private => db
            .encrypted_messages_for_chat(chat.id)?
            .into_iter()
            .map(|m| TimelineEntry {
                sender: m.sender,
                payload: MessagePayload::Encrypted {
                    iv: m.iv,
                    ct: m.ct,
                    tag: m.tag,
                },
                timestamp: m.timestamp,
            })
            .collect(),
        ChatKind::Group => db
            .plain_messages_for_chat(chat.id)?
            .into_iter()
            .map(|m| TimelineEntry {
                sender: m.sender,
                payload: MessagePayload::Plain { content: m.content },
                timestamp: m.timestamp,
            })
            .collect(),
    };

    Ok(ChatView {
        chat_id: chat.id,
        name: display_name(chat.kind, chat.name.as_deref(), &participants, viewer),
        kind: chat.kind,
        participants,
        messages,
    })
}

/// Async entry point used by the HTTP layer.
#[derive(Clone)]
pub struct TimelineBuilder {
    storage: Storage,
}

impl TimelineBuilder {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn build_timeline(&self, chat_id: ChatId, viewer: &str) -> Result<ChatView, ServerError> {
        let viewer = viewer.to_string();
        self.storage
            .run(move |db| build_timeline(db, chat_id, &viewer))
            .await
    }

    pub async fn list_chats(&self, viewer: &str) -> Result<Vec<ChatView>, ServerError> {
        let viewer = viewer.to_string();
        self.storage.run(move |db| list_chats(db, &viewer)).await
    }
}
