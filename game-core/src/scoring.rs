use crate::text::{levenshtein, normalize_guess};

pub const MAX_POINTS: i64 = 500;
pub const MIN_POINTS: i64 = 50;
pub const TURN_SECONDS: i64 = 60;
pub const DRAWER_BONUS_PER_GUESSER: i64 = 50;

/// Close-guess hints are only given for words of at least this many letters.
pub const CLOSE_GUESS_MIN_WORD_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessOutcome {
    /// Exact match; the caller scores `points`.
    Correct { points: i64 },
    /// One edit away; the sender alone gets a private notice.
    Close,
    Miss,
}

pub struct ScoringEngine;

impl ScoringEngine {
    /// Points for a correct guess with `time_remaining` seconds on the clock.
    /// Decays in 5-second plateaus and never drops below `MIN_POINTS`.
    pub fn guess_points(time_remaining: u32) -> i64 {
        let plateau = (time_remaining as i64 / 5) * 5;
        (MAX_POINTS * plateau / TURN_SECONDS).max(MIN_POINTS)
    }

    /// End-of-turn bonus for the drawer, proportional to how many players
    /// found the word.
    pub fn drawer_bonus(correct_guessers: usize) -> i64 {
        DRAWER_BONUS_PER_GUESSER * correct_guessers as i64
    }

    /// Evaluate a raw guess against the current word.
    pub fn evaluate_guess(guess: &str, word: &str, time_remaining: u32) -> GuessOutcome {
        let guess = normalize_guess(guess);
        let word = normalize_guess(word);

        if guess.is_empty() || word.is_empty() {
            return GuessOutcome::Miss;
        }

        if guess == word {
            return GuessOutcome::Correct {
                points: Self::guess_points(time_remaining),
            };
        }

        if word.chars().count() >= CLOSE_GUESS_MIN_WORD_LEN && levenshtein(&guess, &word) == 1 {
            return GuessOutcome::Close;
        }

        GuessOutcome::Miss
    }
}
