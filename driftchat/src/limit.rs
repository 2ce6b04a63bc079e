//! Rate limiting capability.
//!
//! The deployed system kept a module-level map of send counts; here the
//! limiter is an explicit capability handed to the pipeline at
//! construction, so the send path has no hidden globals. Rate limiting
//! itself is an external concern — the pipeline only consumes the
//! `check` gate.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use driftchat_proto::message::UserId;

/// Returned when a sender has exceeded their allowance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded for {user}")]
pub struct RateLimited {
    /// The throttled sender.
    pub user: UserId,
}

/// Gate consulted once per send attempt.
pub trait RateLimiter: Send + Sync {
    /// Records one send by `user` and decides whether it may proceed.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimited`] when the sender is over their allowance.
    fn check(&self, user: &UserId) -> Result<(), RateLimited>;
}

/// Limiter that never throttles.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimit;

impl RateLimiter for NoLimit {
    fn check(&self, _user: &UserId) -> Result<(), RateLimited> {
        Ok(())
    }
}

/// Fixed-window limiter: at most `max_per_window` sends per user per
/// window, counters resetting when a window elapses.
pub struct FixedWindowLimiter {
    window: Duration,
    max_per_window: u32,
    state: Mutex<HashMap<UserId, (Instant, u32)>>,
}

impl FixedWindowLimiter {
    /// Creates a limiter with the given window and allowance.
    #[must_use]
    pub fn new(window: Duration, max_per_window: u32) -> Self {
        Self {
            window,
            max_per_window: max_per_window.max(1),
            state: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, user: &UserId) -> Result<(), RateLimited> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let (window_start, count) = state
            .entry(user.clone())
            .or_insert((now, 0));

        if now.duration_since(*window_start) >= self.window {
            *window_start = now;
            *count = 0;
        }
        if *count >= self.max_per_window {
            return Err(RateLimited { user: user.clone() });
        }
        *count += 1;
        Ok(())
    }
}
