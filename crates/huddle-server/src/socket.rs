//! Realtime WebSocket endpoint.
//!
//! Each socket is registered with the room registry on upgrade. A send task
//! drains the connection's outbound queue into the socket and pings the peer
//! on a fixed interval, while the receive loop applies `join` / `leave`
//! events. A peer that sends nothing (not even a pong) for the idle timeout
//! is treated as gone. Whichever half finishes first tears the other down
//! and the connection is pruned from every room.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use huddle_shared::protocol::ClientEvent;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::rooms::{ConnectionId, RoomRegistry};

/// Liveness settings applied to every realtime connection.
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
}

impl From<&ServerConfig> for Heartbeat {
    fn from(config: &ServerConfig) -> Self {
        Self {
            ping_interval: config.ws_ping_interval,
            idle_timeout: config.ws_idle_timeout,
        }
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.rooms, state.heartbeat))
}

async fn handle_socket(socket: WebSocket, rooms: RoomRegistry, heartbeat: Heartbeat) {
    let (sink, stream) = socket.split();
    run_session(sink, stream, rooms, heartbeat).await;
}

/// Drive one connection until the peer closes, errors or goes idle, then
/// drop it from the registry.
pub(crate) async fn run_session<Si, St, E>(
    mut sink: Si,
    stream: St,
    rooms: RoomRegistry,
    heartbeat: Heartbeat,
) where
    Si: Sink<Message> + Unpin + Send + 'static,
    St: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Send + 'static,
{
    let (connection, mut outbound) = rooms.connect().await;

    let mut send_task = tokio::spawn(async move {
        let period = heartbeat.ping_interval;
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let frame = tokio::select! {
                event = outbound.recv() => {
                    let Some(event) = event else { break };
                    match event.to_json() {
                        Ok(text) => Message::Text(text),
                        Err(e) => {
                            warn!(error = %e, "failed to encode realtime event");
                            continue;
                        }
                    }
                }
                _ = ping.tick() => Message::Ping(Vec::new()),
            };
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    let recv_rooms = rooms.clone();
    let mut recv_task = tokio::spawn(async move {
        receive_loop(stream, &recv_rooms, connection, heartbeat.idle_timeout).await;
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    rooms.disconnect(connection).await;
}

/// Apply incoming frames until the stream ends, a close frame arrives or
/// nothing is received for `idle_timeout`. Any frame resets the timer.
async fn receive_loop<St, E>(
    mut stream: St,
    rooms: &RoomRegistry,
    connection: ConnectionId,
    idle_timeout: Duration,
) where
    St: Stream<Item = Result<Message, E>> + Unpin,
{
    loop {
        match timeout(idle_timeout, stream.next()).await {
            Err(_) => {
                debug!(connection = %connection, "realtime connection idle, closing");
                break;
            }
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Ok(Message::Text(text)))) => apply_client_event(rooms, connection, &text).await,
            Ok(Some(Ok(_))) => {}
        }
    }
}

/// Apply one client text frame to the registry. Malformed frames are logged
/// and ignored; the socket stays open.
pub(crate) async fn apply_client_event(rooms: &RoomRegistry, connection: ConnectionId, text: &str) {
    match ClientEvent::from_json(text) {
        Ok(ClientEvent::Join { chat_id }) => {
            rooms.join(connection, chat_id).await;
        }
        Ok(ClientEvent::Leave { chat_id }) => {
            rooms.leave(connection, chat_id).await;
            debug!(connection = %connection, room = %chat_id.room_name(), "left room");
        }
        Err(e) => {
            debug!(connection = %connection, error = %e, "ignoring malformed client event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures::stream;

    use super::*;
    use huddle_shared::types::ChatId;

    fn heartbeat(ping_ms: u64, idle_ms: u64) -> Heartbeat {
        Heartbeat {
            ping_interval: Duration::from_millis(ping_ms),
            idle_timeout: Duration::from_millis(idle_ms),
        }
    }

    /// A peer that joins chat 5 and then goes silent without closing.
    fn silent_peer() -> impl Stream<Item = Result<Message, Infallible>> + Unpin + Send + 'static {
        stream::iter(vec![Ok(Message::Text(r#"{"event":"join","chatId":5}"#.to_string()))])
            .chain(stream::pending())
    }

    #[tokio::test]
    async fn test_silent_connection_is_pruned() {
        let rooms = RoomRegistry::new(4);
        let (sink, _frames) = futures::channel::mpsc::unbounded::<Message>();

        let session = tokio::spawn(run_session(sink, silent_peer(), rooms.clone(), heartbeat(1_000, 50)));

        tokio::time::timeout(Duration::from_secs(5), session)
            .await
            .expect("idle session should end")
            .unwrap();
        assert_eq!(rooms.connection_count().await, 0);
        assert_eq!(rooms.room_size(ChatId(5)).await, 0);
    }

    #[tokio::test]
    async fn test_idle_peer_is_pinged() {
        let rooms = RoomRegistry::new(4);
        let (sink, frames) = futures::channel::mpsc::unbounded::<Message>();

        run_session(sink, silent_peer(), rooms.clone(), heartbeat(10, 100)).await;

        let frames: Vec<Message> = frames.collect().await;
        assert!(frames.iter().any(|f| matches!(f, Message::Ping(_))));
    }

    #[tokio::test]
    async fn test_closed_stream_ends_session() {
        let rooms = RoomRegistry::new(4);
        let (sink, _frames) = futures::channel::mpsc::unbounded::<Message>();
        let peer = stream::iter(vec![
            Ok::<_, Infallible>(Message::Text(r#"{"event":"join","chatId":5}"#.to_string())),
            Ok(Message::Close(None)),
        ]);

        run_session(sink, peer, rooms.clone(), heartbeat(1_000, 60_000)).await;
        assert_eq!(rooms.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_join_and_leave_frames() {
        let rooms = RoomRegistry::new(4);
        let (conn, _rx) = rooms.connect().await;

        apply_client_event(&rooms, conn, r#"{"event":"join","chatId":3}"#).await;
        assert_eq!(rooms.room_size(ChatId(3)).await, 1);

        apply_client_event(&rooms, conn, r#"{"event":"leave","chat_id":3}"#).await;
        assert_eq!(rooms.room_size(ChatId(3)).await, 0);
    }

    #[tokio::test]
    async fn test_malformed_frame_ignored() {
        let rooms = RoomRegistry::new(4);
        let (conn, _rx) = rooms.connect().await;

        apply_client_event(&rooms, conn, "not json").await;
        apply_client_event(&rooms, conn, r#"{"event":"join"}"#).await;
        assert_eq!(rooms.room_count().await, 0);
        assert_eq!(rooms.connection_count().await, 1);
    }
}
