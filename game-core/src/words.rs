use anyhow::{Result, anyhow};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Dictionary difficulty weights: 20% easy, 40% medium, 40% hard.
pub fn sample_difficulty<R: Rng>(rng: &mut R) -> Difficulty {
    match rng.gen_range(0..100u32) {
        0..=19 => Difficulty::Easy,
        20..=59 => Difficulty::Medium,
        _ => Difficulty::Hard,
    }
}

/// Difficulty-tiered word corpus for the drawing game.
#[derive(Debug, Clone)]
pub struct WordBank {
    easy: Vec<String>,
    medium: Vec<String>,
    hard: Vec<String>,
}

impl WordBank {
    /// Builds a bank from raw newline-separated lists. Lines starting with
    /// `#` and blank lines are skipped; words are lowercased.
    pub fn from_lists(easy: &str, medium: &str, hard: &str) -> Result<Self> {
        let bank = Self {
            easy: parse_word_list(easy),
            medium: parse_word_list(medium),
            hard: parse_word_list(hard),
        };
        if bank.easy.is_empty() || bank.medium.is_empty() || bank.hard.is_empty() {
            return Err(anyhow!("word bank requires at least one word per difficulty tier"));
        }
        Ok(bank)
    }

    /// The compiled-in default corpus.
    pub fn embedded() -> Self {
        Self {
            easy: parse_word_list(include_str!("../words/easy.txt")),
            medium: parse_word_list(include_str!("../words/medium.txt")),
            hard: parse_word_list(include_str!("../words/hard.txt")),
        }
    }

    pub fn sample<R: Rng>(&self, difficulty: Difficulty, rng: &mut R) -> String {
        let tier = match difficulty {
            Difficulty::Easy => &self.easy,
            Difficulty::Medium => &self.medium,
            Difficulty::Hard => &self.hard,
        };
        tier[rng.gen_range(0..tier.len())].clone()
    }

    pub fn sample_weighted<R: Rng>(&self, rng: &mut R) -> String {
        let difficulty = sample_difficulty(rng);
        self.sample(difficulty, rng)
    }

    pub fn sample_custom<R: Rng>(list: &[String], rng: &mut R) -> Option<String> {
        if list.is_empty() {
            None
        } else {
            Some(list[rng.gen_range(0..list.len())].clone())
        }
    }

    /// Produces the word candidates offered to a drawer. Each candidate is
    /// drawn independently: with probability `custom_probability`/100 from
    /// the room's custom list (when non-empty), otherwise from the weighted
    /// dictionary.
    pub fn pick_candidates<R: Rng>(
        &self,
        count: usize,
        custom_words: &[String],
        custom_probability: u8,
        rng: &mut R,
    ) -> Vec<String> {
        (0..count)
            .map(|_| {
                let use_custom = !custom_words.is_empty()
                    && rng.gen_range(0..100u32) < custom_probability.min(100) as u32;
                if use_custom {
                    Self::sample_custom(custom_words, rng)
                        .unwrap_or_else(|| self.sample_weighted(rng))
                } else {
                    self.sample_weighted(rng)
                }
            })
            .collect()
    }

    pub fn contains(&self, word: &str) -> bool {
        let word = word.to_lowercase();
        self.easy.contains(&word) || self.medium.contains(&word) || self.hard.contains(&word)
    }
}

fn parse_word_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|word| word.to_lowercase())
        .collect()
}
