//! Fixed-window rate limiting for invitation traffic.
//!
//! This is separate from the per-IP limiter in service-core: that one
//! protects unauthenticated endpoints at the HTTP edge, this one budgets
//! how many invitations a single actor may send per window.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::services::clock::Clock;

/// Action key charged by both issuing and resending an invitation.
pub const INVITE_ACTION: &str = "invite";

/// Outcome of a rate check. The check itself consumed one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_utc: DateTime<Utc>,
    pub retry_after_seconds: u64,
}

#[derive(Debug)]
struct Window {
    count: u32,
    reset_utc: DateTime<Utc>,
}

/// Per-actor fixed-window counter.
///
/// Every call to [`check`](InviteRateLimiter::check) counts against the
/// window, denied calls included, so a client hammering a closed limit
/// keeps it closed.
pub struct InviteRateLimiter {
    windows: DashMap<(Uuid, &'static str), Window>,
    max_attempts: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl InviteRateLimiter {
    pub fn new(max_attempts: u32, window_seconds: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            max_attempts,
            window: Duration::seconds(window_seconds),
            clock,
        }
    }

    /// Consume one attempt for `actor_id` under `action` and report the
    /// window state.
    ///
    /// The entry guard serializes increments for a given key, so two
    /// concurrent checks never read the same count. A window whose reset
    /// instant has been reached is discarded before counting; the reset
    /// instant itself already belongs to the fresh window.
    pub fn check(&self, actor_id: Uuid, action: &'static str) -> RateDecision {
        let now = self.clock.now();
        let mut entry = self
            .windows
            .entry((actor_id, action))
            .or_insert_with(|| Window {
                count: 0,
                reset_utc: now + self.window,
            });

        if now >= entry.reset_utc {
            entry.count = 0;
            entry.reset_utc = now + self.window;
        }

        entry.count += 1;

        let allowed = entry.count <= self.max_attempts;
        let remaining = self.max_attempts.saturating_sub(entry.count);
        let reset_utc = entry.reset_utc;
        let retry_after_seconds = if allowed {
            0
        } else {
            ((reset_utc - now).num_milliseconds().max(0) as u64).div_ceil(1000)
        };

        RateDecision {
            allowed,
            remaining,
            reset_utc,
            retry_after_seconds,
        }
    }
}
