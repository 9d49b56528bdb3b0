use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::types::ChatId;

/// Events a client sends over the realtime socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Subscribe this connection to a chat's room
    Join {
        #[serde(rename = "chatId", alias = "chat_id")]
        chat_id: ChatId,
    },
    /// Unsubscribe this connection from a chat's room
    Leave {
        #[serde(rename = "chatId", alias = "chat_id")]
        chat_id: ChatId,
    },
}

/// Events the server pushes to subscribed connections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage(MessageEnvelope),
}

/// Payload broadcast to a room when a message has been persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub chat_id: ChatId,
    pub sender: String,
    #[serde(flatten)]
    pub payload: MessagePayload,
    pub timestamp: DateTime<Utc>,
}

/// Kind-specific message body. Encrypted bodies are opaque to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessagePayload {
    Encrypted { iv: String, ct: String, tag: String },
    Plain { content: String },
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, ParseError> {
        serde_json::from_str(text).map_err(|e| ParseError::Event(e.to_string()))
    }
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
