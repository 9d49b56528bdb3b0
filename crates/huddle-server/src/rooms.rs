//! Room registry: which live realtime connections are subscribed to which
//! chat.
//!
//! Purely in-memory and rebuilt from client `join` events. Joining does not
//! check chat membership; any connection may subscribe to any chat id.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use huddle_shared::protocol::ServerEvent;
use huddle_shared::types::ChatId;

/// Identity of one live realtime connection.
pub type ConnectionId = Uuid;

#[derive(Default)]
struct Registry {
    /// Outbound queue of every live connection.
    connections: HashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
    /// Room membership by chat id.
    rooms: HashMap<ChatId, HashSet<ConnectionId>>,
}

#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RwLock<Registry>>,
    queue_depth: usize,
}

impl RoomRegistry {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Registry::default())),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Register a live connection. Events published to rooms it joins are
    /// queued on the returned receiver.
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let id = Uuid::new_v4();
        self.inner.write().await.connections.insert(id, tx);
        debug!(connection = %id, "realtime connection registered");
        (id, rx)
    }

    /// Subscribe a connection to a chat's room, creating the room if
    /// missing. Returns `false` if the connection is not registered.
    pub async fn join(&self, connection: ConnectionId, chat_id: ChatId) -> bool {
        let mut registry = self.inner.write().await;
        if !registry.connections.contains_key(&connection) {
            return false;
        }

        let room = registry.rooms.entry(chat_id).or_default();
        room.insert(connection);

        info!(
            room = %chat_id.room_name(),
            connection = %connection,
            subscribers = room.len(),
            "Connection joined room"
        );
        true
    }

    /// Unsubscribe a connection from one room. Empty rooms are dropped.
    pub async fn leave(&self, connection: ConnectionId, chat_id: ChatId) {
        let mut registry = self.inner.write().await;
        let should_remove = match registry.rooms.get_mut(&chat_id) {
            Some(room) => {
                room.remove(&connection);
                room.is_empty()
            }
            None => false,
        };

        if should_remove {
            registry.rooms.remove(&chat_id);
            debug!(room = %chat_id.room_name(), "Removed empty room");
        }
    }

    /// Forget a connection entirely, pruning it from every room.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let mut registry = self.inner.write().await;
        if registry.connections.remove(&connection).is_none() {
            return;
        }

        registry.rooms.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });

        info!(connection = %connection, "Connection disconnected");
    }

    /// Snapshot of the senders subscribed to a chat at this instant.
    pub async fn subscribers(&self, chat_id: ChatId) -> Vec<(ConnectionId, mpsc::Sender<ServerEvent>)> {
        let registry = self.inner.read().await;
        registry
            .rooms
            .get(&chat_id)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| registry.connections.get(id).map(|tx| (*id, tx.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn room_size(&self, chat_id: ChatId) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .get(&chat_id)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }
}
