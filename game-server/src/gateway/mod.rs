use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};
use warp::ws::{Message, WebSocket};

use crate::engine::Engine;
use game_types::{ClientMessage, ServerMessage};

pub mod connection;
pub mod handlers;
pub mod rate_limiter;

pub use connection::{Binding, Gateway, SocketId};
use handlers::MessageHandler;

pub async fn handle_connection(websocket: WebSocket, gateway: Arc<Gateway>, engine: Arc<Engine>) {
    let socket_id = SocketId::new();
    info!("New WebSocket connection: {}", socket_id);

    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let message_receiver = gateway.register(socket_id).await;
    let handler = MessageHandler::new(socket_id, gateway.clone(), engine.clone());

    // Handle incoming messages
    let incoming_handler = {
        let handler = handler.clone();
        let gateway = gateway.clone();
        async move {
            while let Some(result) = ws_receiver.next().await {
                match result {
                    Ok(msg) => {
                        if msg.is_close() {
                            break;
                        }
                        if !msg.is_text() {
                            continue;
                        }
                        let Ok(text) = msg.to_str() else {
                            continue;
                        };
                        match serde_json::from_str::<ClientMessage>(text) {
                            Ok(client_message) => handler.handle_message(client_message).await,
                            Err(err) => {
                                let _ = gateway
                                    .send(
                                        socket_id,
                                        ServerMessage::Error {
                                            message: format!("Invalid message: {}", err),
                                        },
                                    )
                                    .await;
                            }
                        }
                    }
                    Err(err) => {
                        warn!("WebSocket error for {}: {}", socket_id, err);
                        break;
                    }
                }
            }
        }
    };

    // Handle outgoing messages
    let outgoing_handler = {
        async move {
            let mut receiver = message_receiver;
            while let Some(message) = receiver.recv().await {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(err) => {
                        error!("Failed to serialize message: {:?}", err);
                        continue;
                    }
                };
                if ws_sender.send(Message::text(json)).await.is_err() {
                    break;
                }
            }
        }
    };

    // Run both handlers concurrently
    tokio::select! {
        _ = incoming_handler => {},
        _ = outgoing_handler => {},
    }

    // A dropped transport is not a departure: the session keeps its seat for
    // the grace period and may reconnect.
    info!("Connection {} disconnected", socket_id);
    handler.handle_disconnect().await;
    gateway.unregister(socket_id).await;
}
