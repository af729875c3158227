use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// Closed set of user-visible rejection reasons. Every one maps to a single
/// `error{message}` reply to the offender; none is ever broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum RejectReason {
    RoomNotFound,
    RoomFull,
    NotInRoom,
    NotHost,
    NotDrawer,
    GameAlreadyStarted,
    NeedMorePlayers,
    RateLimitExceeded,
    SessionUnknown,
    InvalidInput { reason: String },
}

impl RejectReason {
    pub fn message(&self) -> String {
        match self {
            RejectReason::RoomNotFound => "Room not found".to_string(),
            RejectReason::RoomFull => "Room is full".to_string(),
            RejectReason::NotInRoom => "You are not in this room".to_string(),
            RejectReason::NotHost => "Only the host can do that".to_string(),
            RejectReason::NotDrawer => "Only the drawer can do that".to_string(),
            RejectReason::GameAlreadyStarted => "The game has already started".to_string(),
            RejectReason::NeedMorePlayers => "Need at least 2 players to start".to_string(),
            RejectReason::RateLimitExceeded => "Slow down".to_string(),
            RejectReason::SessionUnknown => "Unknown session".to_string(),
            RejectReason::InvalidInput { reason } => reason.clone(),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_not_found_message() {
        assert_eq!(RejectReason::RoomNotFound.message(), "Room not found");
    }

    #[test]
    fn test_invalid_input_carries_reason() {
        let reason = RejectReason::InvalidInput {
            reason: "Name too long".to_string(),
        };
        assert_eq!(reason.to_string(), "Name too long");
    }
}
