use serde::Serialize;

use crate::engine::Engine;
use game_persistence::RoomStore;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub uptime: u64,
    pub database: String,
    pub rooms: RoomsHealth,
    pub memory: MemoryHealth,
}

#[derive(Debug, Serialize)]
pub struct RoomsHealth {
    pub total: u64,
    pub active: u64,
}

#[derive(Debug, Serialize)]
pub struct MemoryHealth {
    pub rss_bytes: u64,
}

/// Builds the health payload; the boolean is whether the surface should
/// answer 200.
pub async fn health_response(store: &RoomStore, engine: &Engine) -> (HealthResponse, bool) {
    let db_ok = store.ping().await.is_ok();

    let (total, active) = match store.list().await {
        Ok(rooms) => {
            let total = rooms.len() as u64;
            let active = rooms
                .iter()
                .filter(|(room, _)| room.game_started && room.connected_count() > 0)
                .count() as u64;
            (total, active)
        }
        Err(_) => (0, 0),
    };

    let response = HealthResponse {
        status: if db_ok { "ok" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime: engine.uptime_seconds(),
        database: if db_ok { "connected" } else { "unavailable" }.to_string(),
        rooms: RoomsHealth { total, active },
        memory: MemoryHealth {
            rss_bytes: rss_bytes(),
        },
    };
    (response, db_ok)
}

/// Resident set size of the process, zero where unavailable.
fn rss_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(statm) = std::fs::read_to_string("/proc/self/statm") {
            if let Some(rss_pages) = statm
                .split_whitespace()
                .nth(1)
                .and_then(|v| v.parse::<u64>().ok())
            {
                return rss_pages * 4096;
            }
        }
    }
    0
}
