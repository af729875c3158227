use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use ts_rs::TS;

pub const ROOM_ID_LEN: usize = 6;

const UPPER_BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER_BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Room identifier: 6 uppercase base-36 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..ROOM_ID_LEN)
            .map(|_| UPPER_BASE36[rng.gen_range(0..UPPER_BASE36.len())] as char)
            .collect();
        Self(id)
    }

    /// Normalizes and validates a client-supplied room code.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_uppercase();
        if raw.len() == ROOM_ID_LEN && raw.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase()) {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable per-player identity. Survives transport reconnects; the primary
/// key for scoring and guess dedup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// `"session_"` + random base-36 + base-36-encoded unix millis.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let rand_part: String = (0..11)
            .map(|_| LOWER_BASE36[rng.gen_range(0..LOWER_BASE36.len())] as char)
            .collect();
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self(format!("session_{}{}", rand_part, to_base36(millis)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(LOWER_BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
