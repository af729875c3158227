use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::connection::SocketId;

pub const DRAW_LIMIT: usize = 50;
pub const DRAW_WINDOW: Duration = Duration::from_secs(5);
pub const MSG_LIMIT: usize = 10;
pub const MSG_WINDOW: Duration = Duration::from_secs(60);

/// Rolling-window counter: at most `limit` events inside any `window`.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    timestamps: VecDeque<Instant>,
    limit: usize,
    window: Duration,
}

impl RollingWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(limit),
            limit,
            window,
        }
    }

    /// Records the event and returns whether it fits in the window.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        while let Some(&front) = self.timestamps.front() {
            if now.duration_since(front) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        if self.timestamps.len() < self.limit {
            self.timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        match self.timestamps.back() {
            Some(&last) => now.duration_since(last) >= self.window,
            None => true,
        }
    }
}

struct SocketBuckets {
    draw: RollingWindow,
    msg: RollingWindow,
}

impl SocketBuckets {
    fn new() -> Self {
        Self {
            draw: RollingWindow::new(DRAW_LIMIT, DRAW_WINDOW),
            msg: RollingWindow::new(MSG_LIMIT, MSG_WINDOW),
        }
    }
}

/// Process-global rate-limit state, keyed by socket.
pub struct RateLimits {
    buckets: DashMap<SocketId, SocketBuckets>,
}

impl RateLimits {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    pub fn allow_draw(&self, socket_id: SocketId) -> bool {
        self.buckets
            .entry(socket_id)
            .or_insert_with(SocketBuckets::new)
            .draw
            .try_acquire(Instant::now())
    }

    pub fn allow_msg(&self, socket_id: SocketId) -> bool {
        self.buckets
            .entry(socket_id)
            .or_insert_with(SocketBuckets::new)
            .msg
            .try_acquire(Instant::now())
    }

    pub fn remove(&self, socket_id: SocketId) {
        self.buckets.remove(&socket_id);
    }

    /// Garbage-collects buckets whose windows have fully drained.
    pub fn sweep_idle(&self) {
        let now = Instant::now();
        self.buckets
            .retain(|_, b| !(b.draw.is_idle(now) && b.msg.is_idle(now)));
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_allows_up_to_limit() {
        let mut window = RollingWindow::new(3, Duration::from_secs(60));
        let now = Instant::now();
        assert!(window.try_acquire(now));
        assert!(window.try_acquire(now));
        assert!(window.try_acquire(now));
        assert!(!window.try_acquire(now));
    }

    #[test]
    fn test_window_frees_after_expiry() {
        let mut window = RollingWindow::new(2, Duration::from_millis(10));
        let start = Instant::now();
        assert!(window.try_acquire(start));
        assert!(window.try_acquire(start));
        assert!(!window.try_acquire(start));

        let later = start + Duration::from_millis(11);
        assert!(window.try_acquire(later));
    }

    #[test]
    fn test_window_idle_detection() {
        let mut window = RollingWindow::new(2, Duration::from_millis(10));
        let start = Instant::now();
        assert!(window.is_idle(start));
        window.try_acquire(start);
        assert!(!window.is_idle(start));
        assert!(window.is_idle(start + Duration::from_millis(11)));
    }

    #[test]
    fn test_draw_and_msg_buckets_independent() {
        let limits = RateLimits::new();
        let socket = SocketId::new();

        for _ in 0..MSG_LIMIT {
            assert!(limits.allow_msg(socket));
        }
        assert!(!limits.allow_msg(socket));

        // Draw budget is untouched by the chat spend.
        assert!(limits.allow_draw(socket));
    }

    #[test]
    fn test_draw_limit_is_fifty() {
        let limits = RateLimits::new();
        let socket = SocketId::new();
        for _ in 0..DRAW_LIMIT {
            assert!(limits.allow_draw(socket));
        }
        assert!(!limits.allow_draw(socket));
    }

    #[test]
    fn test_remove_resets_budget() {
        let limits = RateLimits::new();
        let socket = SocketId::new();
        for _ in 0..MSG_LIMIT {
            limits.allow_msg(socket);
        }
        assert!(!limits.allow_msg(socket));

        limits.remove(socket);
        assert!(limits.allow_msg(socket));
    }

    #[test]
    fn test_sweep_drops_only_idle_buckets() {
        let limits = RateLimits::new();
        let active = SocketId::new();
        limits.allow_msg(active);

        assert_eq!(limits.len(), 1);
        limits.sweep_idle();
        // Bucket still inside its window survives the sweep.
        assert_eq!(limits.len(), 1);
    }
}
