mod common;

use chrono::{Duration, Utc};
use common::*;
use game_core::rooms::{
    advance_rotation, begin_choosing, begin_drawing, finish_turn, mark_disconnected,
    remove_player, time_left,
};
use game_core::scoring::{GuessOutcome, ScoringEngine};
use game_core::{due_reveals, mask_word};
use game_types::RoomPhase;

#[test]
fn test_full_rotation_advances_round_once() {
    let mut room = create_started_game(4);
    let n = room.players.len();

    let mut seen = Vec::new();
    for _ in 0..n {
        seen.push(room.drawer_index_clamped());
        advance_rotation(&mut room);
    }

    // Drawer sequence covers 0..N in order, and the wrap bumped the round
    // exactly once.
    assert_eq!(seen, (0..n).collect::<Vec<_>>());
    assert_eq!(room.round, 2);
    assert_eq!(room.drawer_index_clamped(), 0);
}

#[test]
fn test_scored_turn_flow() {
    // Two players: host draws "apple", the other guesses at 58s remaining.
    let now = Utc::now();
    let mut room = create_started_game(2);
    begin_choosing(&mut room, now);
    begin_drawing(&mut room, "apple".to_string(), now);

    let guesser = room.players[1].session_id.clone();
    let remaining = time_left(&room, now + Duration::seconds(2));
    assert_eq!(remaining, 58);

    let outcome = ScoringEngine::evaluate_guess("apple", "apple", remaining);
    let GuessOutcome::Correct { points } = outcome else {
        panic!("expected a correct guess, got {:?}", outcome);
    };
    assert_eq!(points, 458);

    // Credit the guesser the way the store op does.
    room.correct_guessers.push(guesser.clone());
    room.round_points.insert(guesser.clone(), points);
    if let Some(p) = room.player_mut(&guesser) {
        p.score += points;
    }

    let bonus = ScoringEngine::drawer_bonus(room.correct_guessers.len());
    assert_eq!(bonus, 50);
    finish_turn(&mut room, bonus, now);

    assert_eq!(room.phase, RoomPhase::Intermission);
    assert_eq!(room.players[0].score, 50);
    assert_eq!(room.players[1].score, 458);

    // Net score delta of the turn equals the round_points total.
    let total: i64 = room.round_points.values().sum();
    assert_eq!(total, 458 + 50);

    // Next turn: drawer rotates to the second player, round unchanged.
    advance_rotation(&mut room);
    assert_eq!(room.drawer_index_clamped(), 1);
    assert_eq!(room.round, 1);
}

#[test]
fn test_unguessed_turn_awards_nothing() {
    let now = Utc::now();
    let mut room = create_started_game(2);
    begin_drawing(&mut room, "apple".to_string(), now);

    // Hint schedule for a 60s turn: one reveal by 30s, two by 15s.
    assert_eq!(due_reveals(room.draw_time, 30), 1);
    assert_eq!(due_reveals(room.draw_time, 15), 2);

    let bonus = ScoringEngine::drawer_bonus(room.correct_guessers.len());
    assert_eq!(bonus, 0);
    finish_turn(&mut room, bonus, now);

    assert!(room.players.iter().all(|p| p.score == 0));
    assert!(room.round_points.is_empty());
}

#[test]
fn test_candidate_offer_matches_word_count() {
    let bank = create_test_bank();
    let room = create_started_game(2);
    let mut rng = rand::thread_rng();
    let candidates = bank.pick_candidates(
        room.word_count as usize,
        &room.custom_words,
        room.custom_word_probability,
        &mut rng,
    );
    assert_eq!(candidates.len(), room.word_count as usize);
}

#[test]
fn test_close_guess_gets_private_hint_only() {
    let outcome = ScoringEngine::evaluate_guess("mouse", "house", 40);
    assert_eq!(outcome, GuessOutcome::Close);
}

#[test]
fn test_host_departure_mid_game() {
    let now = Utc::now();
    let mut room = create_started_game(3);
    begin_drawing(&mut room, "castle".to_string(), now);

    let host_session = room.players[0].session_id.clone();
    mark_disconnected(&mut room, &host_session, now);
    let outcome = remove_player(&mut room, &host_session);

    assert!(outcome.removed);
    assert!(outcome.host_changed);
    assert_eq!(room.players.len(), 2);
    // Rotation stays within the shrunk roster.
    assert!(room.drawer_index_clamped() < room.players.len());
}

#[test]
fn test_reconnect_snapshot_inputs_preserved() {
    let now = Utc::now();
    let mut room = create_started_game(2);
    begin_drawing(&mut room, "apple".to_string(), now);
    room.revealed_letters.push(0);
    room.players[1].score = 458;

    let session = room.players[1].session_id.clone();
    mark_disconnected(&mut room, &session, now);

    // Everything a reconnect snapshot needs is still in place.
    let word = room.current_word.as_deref().unwrap();
    assert_eq!(mask_word(word, &room.revealed_letters), "a _ _ _ _");
    assert!(time_left(&room, now) > 0);
    assert_eq!(room.player(&session).unwrap().score, 458);
}

#[test]
fn test_revealed_letters_stay_within_word() {
    let mut room = create_started_game(2);
    begin_drawing(&mut room, "apple".to_string(), Utc::now());

    let word_len = room.current_word.as_deref().unwrap().len();
    let mut rng = rand::thread_rng();
    for _ in 0..word_len {
        if let Some(i) = game_core::pick_hidden_index(
            room.current_word.as_deref().unwrap(),
            &room.revealed_letters,
            &mut rng,
        ) {
            room.revealed_letters.push(i);
        }
    }

    let mut sorted = room.revealed_letters.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), room.revealed_letters.len());
    assert!(room.revealed_letters.iter().all(|&i| i < word_len));
}
