use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

use crate::{RoomId, SessionId};

pub const MIN_PLAYERS_TO_START: usize = 2;
pub const CHAT_HISTORY_LIMIT: usize = 50;

pub const MAX_PLAYERS_RANGE: (u8, u8) = (2, 15);
pub const MAX_ROUNDS_RANGE: (u8, u8) = (1, 10);
pub const DRAW_TIME_RANGE: (u16, u16) = (30, 180);
pub const WORD_COUNT_RANGE: (u8, u8) = (3, 5);
pub const CUSTOM_WORD_MAX_LEN: usize = 32;
pub const CUSTOM_WORDS_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub enum RoomPhase {
    Lobby,
    Choosing,
    Drawing,
    Intermission,
    GameOver,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Volatile transport handle, rewritten on every (re)connect.
    pub socket_id: Option<String>,
    pub session_id: SessionId,
    pub name: String,
    pub avatar: [u8; 4],
    pub score: i64,
    pub is_connected: bool,
    #[ts(type = "string")]
    pub last_seen: DateTime<Utc>,
}

/// Wire-facing view of a player; `is_drawer` is derived from the room's
/// drawer index, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub session_id: SessionId,
    pub name: String,
    pub avatar: [u8; 4],
    pub score: i64,
    pub is_drawer: bool,
    pub is_connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub session_id: SessionId,
    pub name: String,
    pub msg: String,
    #[ts(type = "string")]
    pub ts: DateTime<Utc>,
}

/// Host-tunable room settings. Values outside the allowed ranges are clamped,
/// never rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettings {
    pub max_players: u8,
    pub max_rounds: u8,
    pub draw_time: u16,
    pub word_count: u8,
    pub custom_words: Vec<String>,
    pub custom_word_probability: u8,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_players: 8,
            max_rounds: 3,
            draw_time: 60,
            word_count: 3,
            custom_words: Vec::new(),
            custom_word_probability: 0,
        }
    }
}

impl RoomSettings {
    pub fn clamped(self) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut custom_words: Vec<String> = self
            .custom_words
            .into_iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty() && w.len() <= CUSTOM_WORD_MAX_LEN)
            .filter(|w| seen.insert(w.clone()))
            .collect();
        custom_words.truncate(CUSTOM_WORDS_LIMIT);

        Self {
            max_players: self.max_players.clamp(MAX_PLAYERS_RANGE.0, MAX_PLAYERS_RANGE.1),
            max_rounds: self.max_rounds.clamp(MAX_ROUNDS_RANGE.0, MAX_ROUNDS_RANGE.1),
            draw_time: self.draw_time.clamp(DRAW_TIME_RANGE.0, DRAW_TIME_RANGE.1),
            word_count: self.word_count.clamp(WORD_COUNT_RANGE.0, WORD_COUNT_RANGE.1),
            custom_words,
            custom_word_probability: self.custom_word_probability.min(100),
        }
    }
}

/// Authoritative per-room state. The optimistic-concurrency version counter
/// lives in the store row, not here.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: RoomId,
    /// Order fixes host = index 0 and defines drawer rotation.
    pub players: Vec<Player>,
    pub max_players: u8,
    pub game_started: bool,
    pub phase: RoomPhase,
    pub round: u32,
    pub max_rounds: u8,
    pub drawer_index: usize,
    /// Present exactly while the room is in the drawing phase.
    pub current_word: Option<String>,
    #[ts(type = "string | null")]
    pub turn_ends_at: Option<DateTime<Utc>>,
    pub revealed_letters: Vec<usize>,
    pub correct_guessers: Vec<SessionId>,
    pub round_points: HashMap<SessionId, i64>,
    pub draw_time: u16,
    pub word_count: u8,
    pub custom_words: Vec<String>,
    pub custom_word_probability: u8,
    /// Opaque last-known stroke snapshot for late joiners and reconnects.
    #[ts(type = "Array<unknown>")]
    pub current_drawing: Vec<serde_json::Value>,
    /// Ring of the most recent chat records, capped at `CHAT_HISTORY_LIMIT`.
    pub chat: Vec<ChatEntry>,
    #[ts(type = "string")]
    pub last_activity: DateTime<Utc>,
}

impl Room {
    /// Drawer index clamped into `[0, |players|)`; 0 for empty rooms.
    pub fn drawer_index_clamped(&self) -> usize {
        if self.players.is_empty() {
            0
        } else {
            self.drawer_index.min(self.players.len() - 1)
        }
    }

    pub fn drawer(&self) -> Option<&Player> {
        self.players.get(self.drawer_index_clamped())
    }

    /// First player in join order is the host.
    pub fn host(&self) -> Option<&Player> {
        self.players.first()
    }

    pub fn is_host(&self, session_id: &SessionId) -> bool {
        self.host().map(|p| &p.session_id == session_id).unwrap_or(false)
    }

    pub fn is_drawer(&self, session_id: &SessionId) -> bool {
        self.drawer().map(|p| &p.session_id == session_id).unwrap_or(false)
    }

    pub fn player(&self, session_id: &SessionId) -> Option<&Player> {
        self.players.iter().find(|p| &p.session_id == session_id)
    }

    pub fn player_mut(&mut self, session_id: &SessionId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.session_id == session_id)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players as usize
    }

    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_connected).count()
    }

    /// Connected non-drawer players; the population that can still score.
    pub fn eligible_guessers(&self) -> usize {
        let drawer = self.drawer_index_clamped();
        self.players
            .iter()
            .enumerate()
            .filter(|(i, p)| *i != drawer && p.is_connected)
            .count()
    }

    pub fn settings(&self) -> RoomSettings {
        RoomSettings {
            max_players: self.max_players,
            max_rounds: self.max_rounds,
            draw_time: self.draw_time,
            word_count: self.word_count,
            custom_words: self.custom_words.clone(),
            custom_word_probability: self.custom_word_probability,
        }
    }

    pub fn player_views(&self) -> Vec<PlayerView> {
        let drawer = self.drawer_index_clamped();
        let drawing_phase = matches!(self.phase, RoomPhase::Choosing | RoomPhase::Drawing);
        self.players
            .iter()
            .enumerate()
            .map(|(i, p)| PlayerView {
                session_id: p.session_id.clone(),
                name: p.name.clone(),
                avatar: p.avatar,
                score: p.score,
                is_drawer: drawing_phase && i == drawer,
                is_connected: p.is_connected,
            })
            .collect()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }
}
