use chrono::{DateTime, Duration, Utc};
use game_types::{Player, RejectReason, Room, RoomId, RoomPhase, RoomSettings, SessionId};

/// Outcome of removing a player from the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub removed: bool,
    /// A different player now sits at index 0.
    pub host_changed: bool,
    /// The removed player was the current drawer.
    pub was_drawer: bool,
}

pub fn new_player(
    session_id: SessionId,
    socket_id: String,
    name: String,
    avatar: [u8; 4],
    now: DateTime<Utc>,
) -> Player {
    Player {
        socket_id: Some(socket_id),
        session_id,
        name,
        avatar,
        score: 0,
        is_connected: true,
        last_seen: now,
    }
}

pub fn new_room(room_id: RoomId, settings: RoomSettings, now: DateTime<Utc>) -> Room {
    let settings = settings.clamped();
    Room {
        room_id,
        players: Vec::new(),
        max_players: settings.max_players,
        game_started: false,
        phase: RoomPhase::Lobby,
        round: 1,
        max_rounds: settings.max_rounds,
        drawer_index: 0,
        current_word: None,
        turn_ends_at: None,
        revealed_letters: Vec::new(),
        correct_guessers: Vec::new(),
        round_points: Default::default(),
        draw_time: settings.draw_time,
        word_count: settings.word_count,
        custom_words: settings.custom_words,
        custom_word_probability: settings.custom_word_probability,
        current_drawing: Vec::new(),
        chat: Vec::new(),
        last_activity: now,
    }
}

/// Adds a player, or rebinds them when the session is already on the roster
/// (a join retry must never duplicate a player).
pub fn join(room: &mut Room, player: Player, now: DateTime<Utc>) -> Result<(), RejectReason> {
    if let Some(existing) = room.player_mut(&player.session_id) {
        existing.socket_id = player.socket_id;
        existing.name = player.name;
        existing.avatar = player.avatar;
        existing.is_connected = true;
        existing.last_seen = now;
        room.touch(now);
        return Ok(());
    }
    if room.is_full() {
        return Err(RejectReason::RoomFull);
    }
    room.players.push(player);
    room.touch(now);
    Ok(())
}

/// Re-binds a session to a fresh transport. Idempotent; returns whether the
/// session was found.
pub fn rebind_session(
    room: &mut Room,
    session_id: &SessionId,
    socket_id: String,
    now: DateTime<Utc>,
) -> bool {
    match room.player_mut(session_id) {
        Some(player) => {
            player.socket_id = Some(socket_id);
            player.is_connected = true;
            player.last_seen = now;
            room.touch(now);
            true
        }
        None => false,
    }
}

pub fn mark_disconnected(room: &mut Room, session_id: &SessionId, now: DateTime<Utc>) -> bool {
    match room.player_mut(session_id) {
        Some(player) => {
            player.socket_id = None;
            player.is_connected = false;
            player.last_seen = now;
            room.touch(now);
            true
        }
        None => false,
    }
}

/// Drops a player from the roster, re-indexing the drawer rotation over the
/// shrunk list.
pub fn remove_player(room: &mut Room, session_id: &SessionId) -> RemoveOutcome {
    let Some(index) = room.players.iter().position(|p| &p.session_id == session_id) else {
        return RemoveOutcome {
            removed: false,
            host_changed: false,
            was_drawer: false,
        };
    };

    let drawer = room.drawer_index_clamped();
    let was_drawer = index == drawer;

    room.players.remove(index);
    room.round_points.remove(session_id);
    room.correct_guessers.retain(|s| s != session_id);

    if index < drawer {
        room.drawer_index = drawer - 1;
    }
    if !room.players.is_empty() && room.drawer_index >= room.players.len() {
        room.drawer_index = 0;
    }

    RemoveOutcome {
        removed: true,
        host_changed: index == 0 && !room.players.is_empty(),
        was_drawer,
    }
}

/// `drawerIndex := (drawerIndex + 1) mod |players|`; a wrap back to index 0
/// advances the round. Returns whether the rotation wrapped.
pub fn advance_rotation(room: &mut Room) -> bool {
    if room.players.is_empty() {
        room.drawer_index = 0;
        return false;
    }
    room.drawer_index = (room.drawer_index_clamped() + 1) % room.players.len();
    let wrapped = room.drawer_index == 0;
    if wrapped {
        room.round += 1;
    }
    wrapped
}

/// Host `startGame`: fresh rotation, scores reset.
pub fn begin_game(room: &mut Room, now: DateTime<Utc>) {
    room.game_started = true;
    room.round = 1;
    room.drawer_index = 0;
    for player in &mut room.players {
        player.score = 0;
    }
    reset_turn_state(room);
    room.phase = RoomPhase::Choosing;
    room.touch(now);
}

/// Entry into the word-selection window for the current drawer.
pub fn begin_choosing(room: &mut Room, now: DateTime<Utc>) {
    reset_turn_state(room);
    room.phase = RoomPhase::Choosing;
    room.touch(now);
}

/// Entry into the drawing phase once a word is fixed.
pub fn begin_drawing(room: &mut Room, word: String, now: DateTime<Utc>) {
    reset_turn_state(room);
    room.phase = RoomPhase::Drawing;
    room.current_word = Some(word);
    room.turn_ends_at = Some(now + Duration::seconds(room.draw_time as i64));
    room.touch(now);
}

/// End-of-turn bookkeeping: credits the drawer bonus and parks the room in
/// the intermission pause. Returns the bonus awarded.
pub fn finish_turn(room: &mut Room, drawer_bonus: i64, now: DateTime<Utc>) -> i64 {
    let drawer_session = room.drawer().map(|p| p.session_id.clone());
    if let Some(session) = drawer_session {
        if drawer_bonus > 0 {
            if let Some(player) = room.player_mut(&session) {
                player.score += drawer_bonus;
            }
            *room.round_points.entry(session).or_insert(0) += drawer_bonus;
        }
    }
    room.phase = RoomPhase::Intermission;
    room.current_word = None;
    room.turn_ends_at = None;
    room.touch(now);
    drawer_bonus
}

pub fn finish_game(room: &mut Room, now: DateTime<Utc>) {
    reset_turn_state(room);
    room.phase = RoomPhase::GameOver;
    room.game_started = false;
    room.touch(now);
}

pub fn apply_settings(room: &mut Room, settings: RoomSettings, now: DateTime<Utc>) {
    let settings = settings.clamped();
    room.max_players = settings.max_players;
    room.max_rounds = settings.max_rounds;
    room.draw_time = settings.draw_time;
    room.word_count = settings.word_count;
    room.custom_words = settings.custom_words;
    room.custom_word_probability = settings.custom_word_probability;
    room.touch(now);
}

/// Remaining whole seconds on the turn clock: `max(0, ceil(deadline - now))`.
pub fn time_left(room: &Room, now: DateTime<Utc>) -> u32 {
    match room.turn_ends_at {
        Some(deadline) => {
            let millis = (deadline - now).num_milliseconds();
            if millis <= 0 { 0 } else { ((millis + 999) / 1000) as u32 }
        }
        None => 0,
    }
}

fn reset_turn_state(room: &mut Room) {
    room.current_word = None;
    room.turn_ends_at = None;
    room.revealed_letters.clear();
    room.correct_guessers.clear();
    room.round_points.clear();
    room.current_drawing.clear();
}
