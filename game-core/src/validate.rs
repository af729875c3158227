use std::fmt;

pub const NAME_MAX_LEN: usize = 20;
pub const CHAT_MAX_LEN: usize = 200;

// Minimal built-in block list; deployments extend this via the moderation
// layer in front of the server.
const BLOCKED_TERMS: &[&str] = &["admin", "moderator", "system"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    TooLong,
    Blocked,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Rejection::Empty => "Text must not be empty",
            Rejection::TooLong => "Text is too long",
            Rejection::Blocked => "Text contains blocked content",
        };
        write!(f, "{}", msg)
    }
}

/// Cleans a display name: control characters stripped, whitespace runs
/// collapsed, length and block list enforced.
pub fn clean_name(raw: &str) -> Result<String, Rejection> {
    let cleaned = collapse_whitespace(&strip_control(raw));
    if cleaned.is_empty() {
        return Err(Rejection::Empty);
    }
    if cleaned.chars().count() > NAME_MAX_LEN {
        return Err(Rejection::TooLong);
    }
    if is_blocked(&cleaned) {
        return Err(Rejection::Blocked);
    }
    Ok(cleaned)
}

/// Cleans a chat or guess message: control characters stripped, trimmed,
/// length and block list enforced.
pub fn clean_chat(raw: &str) -> Result<String, Rejection> {
    let cleaned = strip_control(raw).trim().to_string();
    if cleaned.is_empty() {
        return Err(Rejection::Empty);
    }
    if cleaned.chars().count() > CHAT_MAX_LEN {
        return Err(Rejection::TooLong);
    }
    if is_blocked(&cleaned) {
        return Err(Rejection::Blocked);
    }
    Ok(cleaned)
}

fn strip_control(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_control()).collect()
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_blocked(text: &str) -> bool {
    let lowered = text.to_lowercase();
    BLOCKED_TERMS.iter().any(|term| lowered.contains(term))
}
