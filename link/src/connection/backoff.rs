//! Reconnect pacing.

use crate::models::ConnectionOptions;
use std::collections::hash_map::{DefaultHasher, RandomState};
use std::hash::{BuildHasher, Hash, Hasher};
use std::time::Duration;
use tokio::time::Instant;

/// Delay before reconnect attempt number `attempt` (zero-based):
/// `min(base * 2^attempt, max)`, then jittered.
pub(crate) fn backoff_delay(options: &ConnectionOptions, attempt: u32, seed: u64) -> Duration {
    let delay_ms = std::cmp::min(
        options.reconnect_delay_ms.saturating_mul(2u64.saturating_pow(attempt)),
        options.max_reconnect_delay_ms,
    );
    apply_jitter(Duration::from_millis(delay_ms), options.reconnect_jitter_percent, (seed, attempt))
}

/// Per-client jitter seed, drawn from the process's random hasher keys.
pub(crate) fn jitter_seed() -> u64 {
    RandomState::new().build_hasher().finish()
}

/// Spread `base` by up to ±`percent`, deterministically per `key`.
pub(crate) fn apply_jitter(base: Duration, percent: u8, key: impl Hash) -> Duration {
    let base_ms = base.as_millis() as u64;
    if base_ms <= 1 || percent == 0 {
        return base;
    }

    let jitter_span = (base_ms.saturating_mul(u64::from(percent.min(100))) / 100)
        .clamp(1, i64::MAX as u64 / 2);
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let hashed = hasher.finish();

    let offset = (hashed % (2 * jitter_span + 1)) as i64 - jitter_span as i64;
    let jittered_ms = if offset >= 0 {
        base_ms.saturating_add(offset as u64)
    } else {
        base_ms.saturating_sub((-offset) as u64).max(1)
    };

    Duration::from_millis(jittered_ms)
}

/// Reconnect bookkeeping owned by the lifecycle task.
#[derive(Debug, Default)]
pub(crate) struct ReconnectState {
    /// Attempts started since the last successful open.
    pub attempt: u32,
    /// When the next attempt fires. `None` while suspended or idle.
    pub next_attempt_at: Option<Instant>,
    /// Give up if still offline at this instant.
    pub offline_deadline: Option<Instant>,
    /// Waiting for the network to come back.
    pub suspended: bool,
    /// A reconnect cycle is in progress (from loss until open or give-up).
    pub active: bool,
}

impl ReconnectState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Park the cycle until the network returns. The pending slot is
    /// released, not consumed.
    pub fn suspend(&mut self, grace: Option<Duration>) {
        self.next_attempt_at = None;
        self.suspended = true;
        if self.offline_deadline.is_none() {
            self.offline_deadline = grace.map(|g| Instant::now() + g);
        }
    }

    /// Network is back: attempt right away.
    pub fn resume(&mut self) {
        self.suspended = false;
        self.offline_deadline = None;
        self.next_attempt_at = Some(Instant::now());
    }
}
