use std::sync::Arc;
use warp::Filter;

use crate::engine::Engine;
use crate::gateway::Gateway;
use game_persistence::RoomStore;

pub mod config;
pub mod engine;
pub mod gateway;
pub mod health;

pub fn create_routes(
    gateway: Arc<Gateway>,
    engine: Arc<Engine>,
    store: Arc<RoomStore>,
    allowed_origins: Vec<String>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    // Clone for filters
    let gateway_filter = warp::any().map({
        let gateway = gateway.clone();
        move || gateway.clone()
    });

    let engine_filter = warp::any().map({
        let engine = engine.clone();
        move || engine.clone()
    });

    let store_filter = warp::any().map({
        let store = store.clone();
        move || store.clone()
    });

    // WebSocket endpoint
    let websocket = warp::path("ws")
        .and(warp::ws())
        .and(gateway_filter.clone())
        .and(engine_filter.clone())
        .map(|ws: warp::ws::Ws, gateway, engine| {
            ws.on_upgrade(move |socket| gateway::handle_connection(socket, gateway, engine))
        });

    // Health check endpoint
    let health_route = warp::path("health")
        .and(warp::get())
        .and(store_filter.clone())
        .and(engine_filter.clone())
        .and_then(handle_health_request);

    // CORS configuration; an empty allow-list opens the surface up
    let mut cors = warp::cors()
        .allow_headers(vec!["content-type"])
        .allow_methods(vec!["GET", "POST"]);
    cors = if allowed_origins.is_empty() {
        cors.allow_any_origin()
    } else {
        let mut cors = cors;
        for origin in &allowed_origins {
            cors = cors.allow_origin(origin.as_str());
        }
        cors
    };

    websocket
        .or(health_route)
        .with(cors)
        .with(warp::log("game_server"))
}

async fn handle_health_request(
    store: Arc<RoomStore>,
    engine: Arc<Engine>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (payload, healthy) = health::health_response(&store, &engine).await;
    let status = if healthy {
        warp::http::StatusCode::OK
    } else {
        warp::http::StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok(warp::reply::with_status(warp::reply::json(&payload), status))
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use game_core::WordBank;
    use game_types::{ClientMessage, ServerMessage};
    use migration::MigratorTrait;

    async fn create_test_app()
    -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
        let db = game_persistence::connection::connect_to_memory_database()
            .await
            .unwrap();
        migration::Migrator::up(&db, None).await.unwrap();

        let store = Arc::new(RoomStore::new(db));
        let gateway = Arc::new(Gateway::new());
        let engine = Arc::new(Engine::new(
            store.clone(),
            gateway.clone(),
            WordBank::embedded(),
        ));

        create_routes(gateway, engine, store, Vec::new())
    }

    async fn recv_server_message(ws: &mut warp::test::WsClient) -> ServerMessage {
        let msg = ws.recv().await.expect("Should receive a message");
        let text = msg.to_str().expect("Should be a text message");
        serde_json::from_str(text).expect("Should be a valid ServerMessage")
    }

    /// Reads messages until one matches; ticks and other interleavings are
    /// skipped.
    async fn recv_until(
        ws: &mut warp::test::WsClient,
        matches: impl Fn(&ServerMessage) -> bool,
    ) -> ServerMessage {
        for _ in 0..32 {
            let msg = recv_server_message(ws).await;
            if matches(&msg) {
                return msg;
            }
        }
        panic!("Expected message did not arrive within 32 frames");
    }

    async fn send_client_message(ws: &mut warp::test::WsClient, message: &ClientMessage) {
        let json = serde_json::to_string(message).expect("Should serialize");
        ws.send_text(json).await;
    }

    fn create_room_message(name: &str) -> ClientMessage {
        ClientMessage::CreateRoom {
            player_name: name.to_string(),
            avatar: [1, 2, 3, 4],
            session_id: None,
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app().await;

        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&app)
            .await;

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "connected");
        assert_eq!(body["rooms"]["total"], 0);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_invalid_routes() {
        let app = create_test_app().await;

        let response = warp::test::request()
            .method("GET")
            .path("/invalid")
            .reply(&app)
            .await;

        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_websocket_create_room() {
        let app = create_test_app().await;
        let mut ws = warp::test::ws()
            .path("/ws")
            .handshake(app)
            .await
            .expect("WebSocket handshake should succeed");

        send_client_message(&mut ws, &create_room_message("Alice")).await;

        match recv_server_message(&mut ws).await {
            ServerMessage::RoomCreated {
                room_id,
                session_id,
                players,
                settings,
            } => {
                assert_eq!(room_id.as_str().len(), 6);
                assert!(session_id.as_str().starts_with("session_"));
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].name, "Alice");
                assert_eq!(settings.max_players, 8);
            }
            other => panic!("Expected RoomCreated, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_websocket_invalid_json() {
        let app = create_test_app().await;
        let mut ws = warp::test::ws()
            .path("/ws")
            .handshake(app)
            .await
            .expect("WebSocket handshake should succeed");

        ws.send_text("not json").await;

        match recv_server_message(&mut ws).await {
            ServerMessage::Error { message } => {
                assert!(message.contains("Invalid message"));
            }
            other => panic!("Expected Error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_websocket_unknown_event_rejected() {
        let app = create_test_app().await;
        let mut ws = warp::test::ws()
            .path("/ws")
            .handshake(app)
            .await
            .expect("WebSocket handshake should succeed");

        ws.send_text(r#"{"type":"selfDestruct","roomId":"AB12CD"}"#).await;

        match recv_server_message(&mut ws).await {
            ServerMessage::Error { message } => {
                assert!(message.contains("Invalid message"));
            }
            other => panic!("Expected Error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let app = create_test_app().await;
        let mut ws = warp::test::ws()
            .path("/ws")
            .handshake(app)
            .await
            .expect("WebSocket handshake should succeed");

        send_client_message(
            &mut ws,
            &ClientMessage::JoinRoom {
                room_id: "ZZZZZZ".to_string(),
                player_name: "Bob".to_string(),
                avatar: [0, 0, 0, 0],
                session_id: None,
            },
        )
        .await;

        match recv_server_message(&mut ws).await {
            ServerMessage::Error { message } => assert_eq!(message, "Room not found"),
            other => panic!("Expected Error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blocked_name_rejected() {
        let app = create_test_app().await;
        let mut ws = warp::test::ws()
            .path("/ws")
            .handshake(app)
            .await
            .expect("WebSocket handshake should succeed");

        send_client_message(&mut ws, &create_room_message("the admin")).await;

        match recv_server_message(&mut ws).await {
            ServerMessage::Error { message } => {
                assert!(message.contains("blocked"));
            }
            other => panic!("Expected Error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_game_requires_two_players() {
        let app = create_test_app().await;
        let mut ws = warp::test::ws()
            .path("/ws")
            .handshake(app)
            .await
            .expect("WebSocket handshake should succeed");

        send_client_message(&mut ws, &create_room_message("Alice")).await;
        let ServerMessage::RoomCreated { room_id, .. } = recv_server_message(&mut ws).await else {
            panic!("Expected RoomCreated");
        };

        send_client_message(
            &mut ws,
            &ClientMessage::StartGame {
                room_id: room_id.as_str().to_string(),
            },
        )
        .await;

        match recv_server_message(&mut ws).await {
            ServerMessage::Error { message } => {
                assert_eq!(message, "Need at least 2 players to start");
            }
            other => panic!("Expected Error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_host_cannot_start() {
        let app = create_test_app().await;

        let mut host = warp::test::ws()
            .path("/ws")
            .handshake(app.clone())
            .await
            .expect("handshake");
        let mut other = warp::test::ws()
            .path("/ws")
            .handshake(app)
            .await
            .expect("handshake");

        send_client_message(&mut host, &create_room_message("Alice")).await;
        let ServerMessage::RoomCreated { room_id, .. } = recv_server_message(&mut host).await
        else {
            panic!("Expected RoomCreated");
        };

        send_client_message(
            &mut other,
            &ClientMessage::JoinRoom {
                room_id: room_id.as_str().to_string(),
                player_name: "Bob".to_string(),
                avatar: [0, 0, 0, 0],
                session_id: None,
            },
        )
        .await;
        let _joined = recv_server_message(&mut other).await;

        send_client_message(
            &mut other,
            &ClientMessage::StartGame {
                room_id: room_id.as_str().to_string(),
            },
        )
        .await;

        match recv_server_message(&mut other).await {
            ServerMessage::Error { message } => {
                assert_eq!(message, "Only the host can do that");
            }
            other => panic!("Expected Error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_turn_flow_with_correct_guess() {
        let app = create_test_app().await;

        let mut host = warp::test::ws()
            .path("/ws")
            .handshake(app.clone())
            .await
            .expect("handshake");
        let mut guesser = warp::test::ws()
            .path("/ws")
            .handshake(app)
            .await
            .expect("handshake");

        // Host creates, guesser joins.
        send_client_message(&mut host, &create_room_message("Alice")).await;
        let ServerMessage::RoomCreated { room_id, .. } = recv_server_message(&mut host).await
        else {
            panic!("Expected RoomCreated");
        };
        let raw_room = room_id.as_str().to_string();

        send_client_message(
            &mut guesser,
            &ClientMessage::JoinRoom {
                room_id: raw_room.clone(),
                player_name: "Bob".to_string(),
                avatar: [0, 0, 0, 0],
                session_id: None,
            },
        )
        .await;
        let ServerMessage::RoomJoined { .. } = recv_server_message(&mut guesser).await else {
            panic!("Expected RoomJoined");
        };
        let _player_joined = recv_server_message(&mut host).await;

        // Host starts; host is the first drawer and gets the candidates.
        send_client_message(
            &mut host,
            &ClientMessage::StartGame {
                room_id: raw_room.clone(),
            },
        )
        .await;

        let started = recv_until(&mut host, |m| {
            matches!(m, ServerMessage::GameStarted { .. })
        })
        .await;
        if let ServerMessage::GameStarted { players, round, .. } = started {
            assert_eq!(players.len(), 2);
            assert_eq!(round, 1);
            assert!(players[0].is_drawer);
        }

        let select = recv_until(&mut host, |m| {
            matches!(m, ServerMessage::SelectWord { .. })
        })
        .await;
        let ServerMessage::SelectWord { words, seconds } = select else {
            unreachable!();
        };
        assert_eq!(words.len(), 3);
        assert_eq!(seconds, 8);

        let _selecting = recv_until(&mut guesser, |m| {
            matches!(m, ServerMessage::DrawerSelecting { .. })
        })
        .await;

        // Drawer picks the first candidate.
        let word = words[0].clone();
        send_client_message(
            &mut host,
            &ClientMessage::WordSelected {
                room_id: raw_room.clone(),
                word: word.clone(),
            },
        )
        .await;

        let your_word = recv_until(&mut host, |m| matches!(m, ServerMessage::YourWord { .. })).await;
        if let ServerMessage::YourWord { word: w } = your_word {
            assert_eq!(w, word);
        }

        let hint = recv_until(&mut guesser, |m| {
            matches!(m, ServerMessage::HintUpdate { .. })
        })
        .await;
        if let ServerMessage::HintUpdate { hint, .. } = hint {
            assert_eq!(hint, game_core::mask_word(&word, &[]));
        }

        // Guesser finds the word; broadcast carries the computed points.
        send_client_message(
            &mut guesser,
            &ClientMessage::Guess {
                room_id: raw_room.clone(),
                guess: word.clone(),
                name: "Bob".to_string(),
            },
        )
        .await;

        let correct = recv_until(&mut guesser, |m| {
            matches!(m, ServerMessage::CorrectGuess { .. })
        })
        .await;
        if let ServerMessage::CorrectGuess { name, points, .. } = correct {
            assert_eq!(name, "Bob");
            assert!(points >= 50 && points <= 500);
        }

        // Sole eligible guesser scored, so the turn ends at once.
        let ended = recv_until(&mut guesser, |m| {
            matches!(m, ServerMessage::TurnEnded { .. })
        })
        .await;
        if let ServerMessage::TurnEnded {
            word: ended_word,
            correct_guessers,
            drawer_bonus,
            players,
        } = ended
        {
            assert_eq!(ended_word, word);
            assert_eq!(correct_guessers.len(), 1);
            assert_eq!(drawer_bonus, 50);
            let bob = players.iter().find(|p| p.name == "Bob").unwrap();
            assert!(bob.score >= 50);
        }
    }

    #[tokio::test]
    async fn test_settings_update_clamps_and_broadcasts() {
        let app = create_test_app().await;
        let mut ws = warp::test::ws()
            .path("/ws")
            .handshake(app)
            .await
            .expect("handshake");

        send_client_message(&mut ws, &create_room_message("Alice")).await;
        let ServerMessage::RoomCreated { room_id, .. } = recv_server_message(&mut ws).await else {
            panic!("Expected RoomCreated");
        };

        send_client_message(
            &mut ws,
            &ClientMessage::UpdateSettings {
                room_id: room_id.as_str().to_string(),
                settings: game_types::RoomSettings {
                    max_players: 99,
                    max_rounds: 5,
                    draw_time: 20,
                    word_count: 4,
                    custom_words: vec!["Banana Split".to_string()],
                    custom_word_probability: 250,
                },
            },
        )
        .await;

        match recv_server_message(&mut ws).await {
            ServerMessage::SettingsUpdated { settings } => {
                assert_eq!(settings.max_players, 15);
                assert_eq!(settings.max_rounds, 5);
                assert_eq!(settings.draw_time, 30);
                assert_eq!(settings.word_count, 4);
                assert_eq!(settings.custom_words, vec!["banana split".to_string()]);
                assert_eq!(settings.custom_word_probability, 100);
            }
            other => panic!("Expected SettingsUpdated, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let app = create_test_app().await;
        let mut ws = warp::test::ws()
            .path("/ws")
            .handshake(app)
            .await
            .expect("handshake");

        send_client_message(&mut ws, &create_room_message("Alice")).await;
        let ServerMessage::RoomCreated { room_id, .. } = recv_server_message(&mut ws).await else {
            panic!("Expected RoomCreated");
        };

        send_client_message(
            &mut ws,
            &ClientMessage::Chat {
                room_id: room_id.as_str().to_string(),
                msg: "hello room".to_string(),
                name: "Alice".to_string(),
            },
        )
        .await;

        match recv_server_message(&mut ws).await {
            ServerMessage::Chat { message } => {
                assert_eq!(message.msg, "hello room");
                assert_eq!(message.name, "Alice");
            }
            other => panic!("Expected Chat, got: {:?}", other),
        }
    }
}
