use std::sync::Arc;

use crate::engine::Engine;
use crate::gateway::connection::{Gateway, SocketId};
use game_core::validate::{clean_chat, clean_name};
use game_types::{ClientMessage, RejectReason, RoomId, ServerMessage, SessionId};

/// Per-connection dispatcher: binds the caller's session, applies rate
/// limits and input validation, then hands the event to the engine.
#[derive(Clone)]
pub struct MessageHandler {
    socket_id: SocketId,
    gateway: Arc<Gateway>,
    engine: Arc<Engine>,
}

impl MessageHandler {
    pub fn new(socket_id: SocketId, gateway: Arc<Gateway>, engine: Arc<Engine>) -> Self {
        Self {
            socket_id,
            gateway,
            engine,
        }
    }

    pub async fn handle_message(&self, message: ClientMessage) {
        let result = self.dispatch(message).await;
        if let Err(message) = result {
            self.send_error(&message).await;
        }
    }

    async fn dispatch(&self, message: ClientMessage) -> Result<(), String> {
        match message {
            ClientMessage::CreateRoom {
                player_name,
                avatar,
                session_id,
            } => {
                let name = clean_name(&player_name).map_err(|e| e.to_string())?;
                self.engine
                    .create_room(self.socket_id, name, avatar, session_id)
                    .await
            }
            ClientMessage::JoinRoom {
                room_id,
                player_name,
                avatar,
                session_id,
            } => {
                let room_id = parse_room_id(&room_id)?;
                let name = clean_name(&player_name).map_err(|e| e.to_string())?;
                self.engine
                    .join_room(self.socket_id, &room_id, name, avatar, session_id)
                    .await
            }
            ClientMessage::ReconnectToRoom {
                session_id,
                room_id,
            } => {
                let room_id = parse_room_id(&room_id)?;
                self.engine
                    .reconnect(self.socket_id, &room_id, &session_id)
                    .await
            }
            ClientMessage::UpdateSettings { room_id, settings } => {
                let (session_id, room_id) = self.require_member(&room_id).await?;
                self.engine
                    .update_settings(&room_id, &session_id, settings)
                    .await
            }
            ClientMessage::StartGame { room_id } => {
                let (session_id, room_id) = self.require_member(&room_id).await?;
                self.engine.start_game(&room_id, &session_id).await
            }
            ClientMessage::WordSelected { room_id, word } => {
                let (session_id, room_id) = self.require_member(&room_id).await?;
                self.engine.word_selected(&room_id, &session_id, word).await
            }
            ClientMessage::Draw { room_id, lines } => {
                let (session_id, room_id) = self.require_member(&room_id).await?;
                if !self.gateway.rate_limits.allow_draw(self.socket_id) {
                    return Err(RejectReason::RateLimitExceeded.message());
                }
                self.engine.draw(&room_id, &session_id, lines).await
            }
            ClientMessage::ClearCanvas { room_id } => {
                let (session_id, room_id) = self.require_member(&room_id).await?;
                self.engine.clear_canvas(&room_id, &session_id).await
            }
            ClientMessage::Chat { room_id, msg, .. } => {
                let (session_id, room_id) = self.require_member(&room_id).await?;
                if !self.gateway.rate_limits.allow_msg(self.socket_id) {
                    return Err(RejectReason::RateLimitExceeded.message());
                }
                let msg = clean_chat(&msg).map_err(|e| e.to_string())?;
                self.engine.chat(&room_id, &session_id, msg).await
            }
            ClientMessage::Guess { room_id, guess, .. } => {
                let (session_id, room_id) = self.require_member(&room_id).await?;
                if !self.gateway.rate_limits.allow_msg(self.socket_id) {
                    return Err(RejectReason::RateLimitExceeded.message());
                }
                let guess = clean_chat(&guess).map_err(|e| e.to_string())?;
                self.engine.handle_guess(&room_id, &session_id, guess).await
            }
        }
    }

    pub async fn handle_disconnect(&self) {
        if let Some(binding) = self.gateway.binding(self.socket_id).await {
            self.engine
                .disconnect(&binding.room_id, &binding.session_id)
                .await;
        }
    }

    /// Resolves the caller's binding and checks it against the addressed
    /// room. Authorization is by session identity, never socket identity.
    async fn require_member(&self, raw_room_id: &str) -> Result<(SessionId, RoomId), String> {
        let room_id = parse_room_id(raw_room_id)?;
        let binding = self
            .gateway
            .binding(self.socket_id)
            .await
            .ok_or_else(|| RejectReason::NotInRoom.message())?;
        if binding.room_id != room_id {
            return Err(RejectReason::NotInRoom.message());
        }
        Ok((binding.session_id, room_id))
    }

    async fn send_error(&self, message: &str) {
        let _ = self
            .gateway
            .send(
                self.socket_id,
                ServerMessage::Error {
                    message: message.to_string(),
                },
            )
            .await;
    }
}

fn parse_room_id(raw: &str) -> Result<RoomId, String> {
    RoomId::parse(raw).ok_or_else(|| RejectReason::RoomNotFound.message())
}
