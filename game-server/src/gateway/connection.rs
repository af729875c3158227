use std::collections::HashMap;
use std::fmt;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use super::rate_limiter::RateLimits;
use game_types::{Room, RoomId, ServerMessage, SessionId};

/// Volatile transport handle; a fresh one is minted per WebSocket upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(Uuid);

impl SocketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SocketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which session and room a socket currently speaks for.
#[derive(Debug, Clone)]
pub struct Binding {
    pub session_id: SessionId,
    pub room_id: RoomId,
}

/// Socket registry and room-scoped fan-out. Holds the socket↔session
/// bindings and the process-global rate-limit buckets; the engine drives
/// fan-out from the roster's stored socket ids.
pub struct Gateway {
    senders: RwLock<HashMap<SocketId, mpsc::UnboundedSender<ServerMessage>>>,
    bindings: RwLock<HashMap<SocketId, Binding>>,
    pub rate_limits: RateLimits,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
            bindings: RwLock::new(HashMap::new()),
            rate_limits: RateLimits::new(),
        }
    }

    pub async fn register(&self, socket_id: SocketId) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders.write().await.insert(socket_id, sender);
        receiver
    }

    pub async fn unregister(&self, socket_id: SocketId) {
        self.senders.write().await.remove(&socket_id);
        self.bindings.write().await.remove(&socket_id);
        self.rate_limits.remove(socket_id);
    }

    pub async fn bind(&self, socket_id: SocketId, session_id: SessionId, room_id: RoomId) {
        self.bindings.write().await.insert(
            socket_id,
            Binding {
                session_id,
                room_id,
            },
        );
    }

    pub async fn binding(&self, socket_id: SocketId) -> Option<Binding> {
        self.bindings.read().await.get(&socket_id).cloned()
    }

    /// Drops every binding pointing at a deleted room, along with the
    /// sockets' rate-limit buckets.
    pub async fn remove_room_bindings(&self, room_id: &RoomId) {
        let mut bindings = self.bindings.write().await;
        let stale: Vec<SocketId> = bindings
            .iter()
            .filter(|(_, b)| &b.room_id == room_id)
            .map(|(s, _)| *s)
            .collect();
        for socket_id in stale {
            bindings.remove(&socket_id);
            self.rate_limits.remove(socket_id);
        }
    }

    pub async fn send(&self, socket_id: SocketId, message: ServerMessage) -> Result<(), String> {
        let senders = self.senders.read().await;
        match senders.get(&socket_id) {
            Some(sender) => sender
                .send(message)
                .map_err(|_| "Connection closed".to_string()),
            None => Err("Connection not found".to_string()),
        }
    }

    async fn send_raw(&self, socket_id: &str, message: ServerMessage) {
        let Ok(parsed) = Uuid::parse_str(socket_id) else {
            return;
        };
        let senders = self.senders.read().await;
        if let Some(sender) = senders.get(&SocketId(parsed)) {
            let _ = sender.send(message);
        }
    }

    /// Fan-out to every connected member of the room.
    pub async fn broadcast(&self, room: &Room, message: ServerMessage) {
        for player in room.players.iter().filter(|p| p.is_connected) {
            if let Some(socket_id) = &player.socket_id {
                self.send_raw(socket_id, message.clone()).await;
            }
        }
    }

    /// Fan-out to everyone except one session (draw frames skip the sender).
    pub async fn broadcast_except(
        &self,
        room: &Room,
        except: &SessionId,
        message: ServerMessage,
    ) {
        for player in room.players.iter().filter(|p| p.is_connected) {
            if &player.session_id == except {
                continue;
            }
            if let Some(socket_id) = &player.socket_id {
                self.send_raw(socket_id, message.clone()).await;
            }
        }
    }

    /// Targets a single member by durable identity (drawer-only and
    /// caller-only events).
    pub async fn send_to_session(&self, room: &Room, session_id: &SessionId, message: ServerMessage) {
        if let Some(player) = room.player(session_id) {
            if let Some(socket_id) = &player.socket_id {
                self.send_raw(socket_id, message).await;
            }
        }
    }

    // Test helper methods
    pub async fn connection_count(&self) -> usize {
        self.senders.read().await.len()
    }

    pub async fn binding_count(&self) -> usize {
        self.bindings.read().await.len()
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_unregister() {
        let gateway = Gateway::new();
        let socket = SocketId::new();

        let _receiver = gateway.register(socket).await;
        assert_eq!(gateway.connection_count().await, 1);

        gateway.unregister(socket).await;
        assert_eq!(gateway.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_send_to_unknown_socket() {
        let gateway = Gateway::new();
        let result = gateway
            .send(
                SocketId::new(),
                ServerMessage::Error {
                    message: "test".to_string(),
                },
            )
            .await;
        assert_eq!(result.unwrap_err(), "Connection not found");
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let gateway = Gateway::new();
        let socket = SocketId::new();
        let receiver = gateway.register(socket).await;
        drop(receiver);

        let result = gateway
            .send(
                socket,
                ServerMessage::Error {
                    message: "test".to_string(),
                },
            )
            .await;
        assert_eq!(result.unwrap_err(), "Connection closed");
    }

    #[tokio::test]
    async fn test_binding_lifecycle() {
        let gateway = Gateway::new();
        let socket = SocketId::new();
        let session = SessionId::generate();
        let room = RoomId::generate();

        let _receiver = gateway.register(socket).await;
        gateway.bind(socket, session.clone(), room.clone()).await;

        let binding = gateway.binding(socket).await.unwrap();
        assert_eq!(binding.session_id, session);
        assert_eq!(binding.room_id, room);

        gateway.unregister(socket).await;
        assert!(gateway.binding(socket).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_room_bindings() {
        let gateway = Gateway::new();
        let room_a = RoomId::generate();
        let room_b = RoomId::generate();

        let s1 = SocketId::new();
        let s2 = SocketId::new();
        let _r1 = gateway.register(s1).await;
        let _r2 = gateway.register(s2).await;
        gateway.bind(s1, SessionId::generate(), room_a.clone()).await;
        gateway.bind(s2, SessionId::generate(), room_b.clone()).await;

        gateway.remove_room_bindings(&room_a).await;
        assert!(gateway.binding(s1).await.is_none());
        assert!(gateway.binding(s2).await.is_some());
    }
}
