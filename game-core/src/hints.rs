use rand::Rng;

/// Remaining-seconds threshold for the second (and final) letter reveal.
pub const SECOND_REVEAL_AT: u32 = 15;

/// Number of letter reveals that should have happened by the time `time_left`
/// seconds remain. The first reveal fires at half the draw time, but only
/// when that threshold is still above the 15-second mark; the second always
/// fires at 15 seconds.
pub fn due_reveals(draw_time: u16, time_left: u32) -> usize {
    let halfway = (draw_time / 2) as u32;
    let mut due = 0;
    if halfway > SECOND_REVEAL_AT && time_left <= halfway {
        due += 1;
    }
    if time_left <= SECOND_REVEAL_AT {
        due += 1;
    }
    due
}

/// Picks one random not-yet-revealed letter index, or `None` once every
/// position is uncovered.
pub fn pick_hidden_index<R: Rng>(word: &str, revealed: &[usize], rng: &mut R) -> Option<usize> {
    let hidden: Vec<usize> = (0..word.chars().count())
        .filter(|i| !revealed.contains(i))
        .collect();
    if hidden.is_empty() {
        None
    } else {
        Some(hidden[rng.gen_range(0..hidden.len())])
    }
}
