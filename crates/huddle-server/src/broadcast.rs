//! Realtime fan-out of persisted messages.
//!
//! Delivery is at-most-once and best-effort. Each subscriber has its own
//! bounded queue and `try_send` never waits, so a slow or dead connection
//! cannot hold up the rest of the room.

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use huddle_shared::protocol::{MessageEnvelope, MessagePayload, ServerEvent};
use huddle_store::{EncryptedMessage, PlainMessage};

use crate::rooms::RoomRegistry;

#[derive(Clone)]
pub struct Broadcaster {
    rooms: RoomRegistry,
}

impl Broadcaster {
    pub fn new(rooms: RoomRegistry) -> Self {
        Self { rooms }
    }

    /// Send `envelope` to every connection currently in its chat's room.
    /// Returns the number of queues the event was placed on.
    pub async fn publish(&self, envelope: MessageEnvelope) -> usize {
        let chat_id = envelope.chat_id;
        let event = ServerEvent::NewMessage(envelope);
        let subscribers = self.rooms.subscribers(chat_id).await;

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (connection, tx) in subscribers {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(
                        room = %chat_id.room_name(),
                        target = %connection,
                        "Dropping event for slow subscriber"
                    );
                }
                Err(TrySendError::Closed(_)) => dead.push(connection),
            }
        }

        for connection in dead {
            warn!(connection = %connection, "Pruning closed subscriber");
            self.rooms.disconnect(connection).await;
        }

        debug!(room = %chat_id.room_name(), delivered, "Published new_message");
        delivered
    }
}

/// Envelope for a committed plaintext row, stamped with the stored timestamp.
pub fn plain_envelope(message: &PlainMessage) -> MessageEnvelope {
    MessageEnvelope {
        chat_id: message.chat_id,
        sender: message.sender.clone(),
        payload: MessagePayload::Plain {
            content: message.content.clone(),
        },
        timestamp: message.timestamp,
    }
}

/// Envelope for a committed encrypted row, stamped with the stored timestamp.
pub fn encrypted_envelope(message: &EncryptedMessage) -> MessageEnvelope {
    MessageEnvelope {
        chat_id: message.chat_id,
        sender: message.sender.clone(),
        payload: MessagePayload::Encrypted {
            iv: message.iv.clone(),
            ct: message.ct.clone(),
            tag: message.tag.clone(),
        },
        timestamp: message.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use huddle_shared::types::ChatId;

    fn envelope(chat: i64, text: &str) -> MessageEnvelope {
        MessageEnvelope {
            chat_id: ChatId(chat),
            sender: "alice".into(),
            payload: MessagePayload::Plain {
                content: text.into(),
            },
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_only_room_members() {
        let rooms = RoomRegistry::new(8);
        let broadcaster = Broadcaster::new(rooms.clone());

        let (member, mut member_rx) = rooms.connect().await;
        let (other, mut other_rx) = rooms.connect().await;
        rooms.join(member, ChatId(1)).await;
        rooms.join(other, ChatId(2)).await;

        assert_eq!(broadcaster.publish(envelope(1, "hello")).await, 1);

        let ServerEvent::NewMessage(received) = member_rx.try_recv().unwrap();
        assert_eq!(received.payload, MessagePayload::Plain { content: "hello".into() });
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_backfill_for_late_joiner() {
        let rooms = RoomRegistry::new(8);
        let broadcaster = Broadcaster::new(rooms.clone());

        broadcaster.publish(envelope(1, "early")).await;

        let (late, mut late_rx) = rooms.connect().await;
        rooms.join(late, ChatId(1)).await;
        assert!(late_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_others() {
        let rooms = RoomRegistry::new(1);
        let broadcaster = Broadcaster::new(rooms.clone());

        let (slow, _slow_rx) = rooms.connect().await;
        let (fast, mut fast_rx) = rooms.connect().await;
        rooms.join(slow, ChatId(1)).await;
        rooms.join(fast, ChatId(1)).await;

        // First event fills the slow queue.
        assert_eq!(broadcaster.publish(envelope(1, "one")).await, 2);
        fast_rx.try_recv().unwrap();

        // Second event is dropped for the slow subscriber only.
        assert_eq!(broadcaster.publish(envelope(1, "two")).await, 1);
        let ServerEvent::NewMessage(received) = fast_rx.try_recv().unwrap();
        assert_eq!(received.payload, MessagePayload::Plain { content: "two".into() });
        assert_eq!(rooms.room_size(ChatId(1)).await, 2);
    }

    #[tokio::test]
    async fn test_closed_subscriber_pruned() {
        let rooms = RoomRegistry::new(8);
        let broadcaster = Broadcaster::new(rooms.clone());

        let (gone, gone_rx) = rooms.connect().await;
        rooms.join(gone, ChatId(1)).await;
        drop(gone_rx);

        assert_eq!(broadcaster.publish(envelope(1, "anyone?")).await, 0);
        assert_eq!(rooms.connection_count().await, 0);
        assert_eq!(rooms.room_count().await, 0);
    }
}
