use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{ChatEntry, PlayerView, RoomId, RoomPhase, RoomSettings, SessionId};

/// Inbound events, client → server. Unknown tags fail deserialization and are
/// answered with a single `error` reply; unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        player_name: String,
        avatar: [u8; 4],
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        player_name: String,
        avatar: [u8; 4],
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    #[serde(rename_all = "camelCase")]
    ReconnectToRoom {
        session_id: SessionId,
        room_id: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateSettings {
        room_id: String,
        settings: RoomSettings,
    },
    #[serde(rename_all = "camelCase")]
    StartGame { room_id: String },
    #[serde(rename_all = "camelCase")]
    WordSelected { room_id: String, word: String },
    #[serde(rename_all = "camelCase")]
    Draw {
        room_id: String,
        #[ts(type = "Array<unknown>")]
        lines: Vec<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    ClearCanvas { room_id: String },
    #[serde(rename_all = "camelCase")]
    Chat {
        room_id: String,
        msg: String,
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    Guess {
        room_id: String,
        guess: String,
        name: String,
    },
}

/// Full state snapshot handed to reconnecting players and late joiners.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub room_id: RoomId,
    pub phase: RoomPhase,
    pub game_started: bool,
    pub players: Vec<PlayerView>,
    pub round: u32,
    pub max_rounds: u8,
    pub time_left: u32,
    /// Masked word for guessers while a turn is running.
    pub word_hint: Option<String>,
    /// Unmasked word, present only when the recipient is the drawer.
    pub your_word: Option<String>,
    #[ts(type = "Array<unknown>")]
    pub current_drawing: Vec<serde_json::Value>,
    pub chat: Vec<ChatEntry>,
    pub settings: RoomSettings,
}

/// Outbound events, server → client.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    RoomCreated {
        room_id: RoomId,
        session_id: SessionId,
        players: Vec<PlayerView>,
        settings: RoomSettings,
    },
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        room_id: RoomId,
        session_id: SessionId,
        players: Vec<PlayerView>,
        settings: RoomSettings,
        /// Set when joining a room whose game is already running.
        game_state: Option<GameSnapshot>,
    },
    #[serde(rename_all = "camelCase")]
    ReconnectionSuccess { game_state: GameSnapshot },
    #[serde(rename_all = "camelCase")]
    PlayerJoined { players: Vec<PlayerView> },
    #[serde(rename_all = "camelCase")]
    PlayerDisconnected {
        session_id: SessionId,
        players: Vec<PlayerView>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerReconnected {
        session_id: SessionId,
        players: Vec<PlayerView>,
    },
    #[serde(rename_all = "camelCase")]
    HostChanged { players: Vec<PlayerView> },
    #[serde(rename_all = "camelCase")]
    SettingsUpdated { settings: RoomSettings },
    #[serde(rename_all = "camelCase")]
    DrawerSelecting {
        drawer_name: String,
        players: Vec<PlayerView>,
    },
    /// Drawer-only: word candidates and the selection window.
    #[serde(rename_all = "camelCase")]
    SelectWord { words: Vec<String>, seconds: u32 },
    /// Drawer-only: the word to draw.
    #[serde(rename_all = "camelCase")]
    YourWord { word: String },
    #[serde(rename_all = "camelCase")]
    GameStarted {
        players: Vec<PlayerView>,
        round: u32,
        max_rounds: u8,
    },
    #[serde(rename_all = "camelCase")]
    Tick { time_left: u32 },
    #[serde(rename_all = "camelCase")]
    HintUpdate { hint: String, time_left: u32 },
    #[serde(rename_all = "camelCase")]
    Draw {
        #[ts(type = "Array<unknown>")]
        lines: Vec<serde_json::Value>,
    },
    ClearCanvas,
    #[serde(rename_all = "camelCase")]
    Chat { message: ChatEntry },
    /// Caller-only: the guess was one edit away from the word.
    CloseGuess,
    #[serde(rename_all = "camelCase")]
    CorrectGuess {
        session_id: SessionId,
        name: String,
        points: i64,
    },
    #[serde(rename_all = "camelCase")]
    TurnEnded {
        word: String,
        players: Vec<PlayerView>,
        correct_guessers: Vec<SessionId>,
        drawer_bonus: i64,
    },
    #[serde(rename_all = "camelCase")]
    GameOver { players: Vec<PlayerView> },
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_tagged_decoding() {
        let raw = r#"{"type":"joinRoom","roomId":"AB12CD","playerName":"Alice","avatar":[1,2,3,4]}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::JoinRoom {
                room_id,
                player_name,
                avatar,
                session_id,
            } => {
                assert_eq!(room_id, "AB12CD");
                assert_eq!(player_name, "Alice");
                assert_eq!(avatar, [1, 2, 3, 4]);
                assert!(session_id.is_none());
            }
            other => panic!("Expected JoinRoom, got: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        let raw = r#"{"type":"launchMissiles","roomId":"AB12CD"}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let raw = r#"{"type":"startGame","roomId":"AB12CD","extra":"ignored"}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, ClientMessage::StartGame { .. }));
    }

    #[test]
    fn test_server_message_tag_casing() {
        let msg = ServerMessage::Tick { time_left: 42 };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"tick""#));
        assert!(json.contains(r#""timeLeft":42"#));
    }

    #[test]
    fn test_close_guess_roundtrip() {
        let json = serde_json::to_string(&ServerMessage::CloseGuess).unwrap();
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ServerMessage::CloseGuess));
    }
}
