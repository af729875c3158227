use chrono::Utc;
use game_core::rooms::{begin_game, join, new_player, new_room};
use game_core::words::WordBank;
use game_types::{Room, RoomId, RoomSettings, SessionId};

/// Creates a test word bank with a known corpus.
pub fn create_test_bank() -> WordBank {
    WordBank::from_lists(
        "cat\ndog\nsun",
        "rocket\ncastle\npenguin",
        "eclipse\nmirage\nlabyrinth",
    )
    .unwrap()
}

/// Creates a lobby room with the given number of connected players.
pub fn create_lobby(player_count: usize) -> Room {
    let now = Utc::now();
    let mut room = new_room(RoomId::generate(), RoomSettings::default(), now);
    for i in 0..player_count {
        let player = new_player(
            SessionId::generate(),
            format!("socket-{}", i),
            format!("Player{}", i),
            [1, 2, 3, 4],
            now,
        );
        join(&mut room, player, now).unwrap();
    }
    room
}

/// Creates a room with a game already started.
pub fn create_started_game(player_count: usize) -> Room {
    let mut room = create_lobby(player_count);
    begin_game(&mut room, Utc::now());
    room
}
