use chrono::{DateTime, Duration, Utc};
use game_types::Room;

/// Idle-room reclamation policy.
pub struct SweepPolicy {
    /// A room with no connected player is deleted once idle this long.
    pub empty_max: Duration,
    /// Any room is deleted once idle this long, connected or not.
    pub idle_max: Duration,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            empty_max: Duration::minutes(5),
            idle_max: Duration::hours(1),
        }
    }
}

impl SweepPolicy {
    pub fn should_delete(&self, room: &Room, now: DateTime<Utc>) -> bool {
        let idle = now - room.last_activity;
        if idle > self.idle_max {
            return true;
        }
        room.connected_count() == 0 && idle > self.empty_max
    }
}
