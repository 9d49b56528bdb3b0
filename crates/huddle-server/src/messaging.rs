//! Message write path: validate, persist, then publish to the chat's room.
//!
//! Publishing only happens after the insert commits, so a subscriber never
//! sees a message that a later timeline fetch would not return.

use huddle_shared::protocol::MessageEnvelope;
use huddle_shared::types::ChatId;
use huddle_store::StoreError;

use crate::broadcast::{encrypted_envelope, plain_envelope, Broadcaster};
use crate::error::ServerError;
use crate::storage::Storage;

#[derive(Clone)]
pub struct MessageService {
    storage: Storage,
    broadcaster: Broadcaster,
}

impl MessageService {
    pub fn new(storage: Storage, broadcaster: Broadcaster) -> Self {
        Self {
            storage,
            broadcaster,
        }
    }

    /// Append a plaintext message to a group chat.
    pub async fn send_plain(
        &self,
        chat_id: ChatId,
        sender: &str,
        content: &str,
    ) -> Result<MessageEnvelope, ServerError> {
        require_fields(&[("username", sender), ("message", content)])?;

        let sender = sender.to_string();
        let content = content.to_string();
        let stored = self
            .storage
            .run(move |db| {
                db.insert_plain_message(chat_id, &sender, &content)
                    .map_err(|e| chat_not_found(e, chat_id))
            })
            .await?;

        let envelope = plain_envelope(&stored);
        self.broadcaster.publish(envelope.clone()).await;
        Ok(envelope)
    }

    /// Append an end-to-end encrypted message to a private chat. The three
    /// parts are stored and relayed exactly as received.
    pub async fn send_encrypted(
        &self,
        chat_id: ChatId,
        sender: &str,
        iv: &str,
        ct: &str,
        tag: &str,
    ) -> Result<MessageEnvelope, ServerError> {
        require_fields(&[("username", sender), ("iv", iv), ("ct", ct), ("tag", tag)])?;

        let (sender, iv, ct, tag) = (sender.to_string(), iv.to_string(), ct.to_string(), tag.to_string());
        let stored = self
            .storage
            .run(move |db| {
                db.insert_encrypted_message(chat_id, &sender, &iv, &ct, &tag)
                    .map_err(|e| chat_not_found(e, chat_id))
            })
            .await?;

        let envelope = encrypted_envelope(&stored);
        self.broadcaster.publish(envelope.clone()).await;
        Ok(envelope)
    }
}

fn require_fields(fields: &[(&str, &str)]) -> Result<(), ServerError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServerError::BadRequest(format!("Missing fields: {}", missing.join(", "))))
    }
}

fn chat_not_found(e: StoreError, chat_id: ChatId) -> ServerError {
    match e {
        StoreError::NotFound => ServerError::NotFound(format!("Chat {chat_id} not found")),
        other => other.into(),
    }
}
