//! Global transformation gate
//!
//! One privilege shared by every entity: at most one transformation in
//! progress, and attempt starts separated by at least the cooldown. A
//! failed attempt still consumes its window.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use shoal_core::SceneTime;

const NEVER: u64 = u64::MAX;

/// Mutual exclusion plus cooldown.
///
/// Lock-free so it can be shared by reference; `try_begin` uses a
/// compare-and-set on the active flag, so even concurrent callers start
/// at most one attempt per cooldown window.
#[derive(Debug)]
pub struct GlobalTransformGate {
    active: AtomicBool,
    last_attempt_start: AtomicU64,
    cooldown: Duration,
}

impl GlobalTransformGate {
    pub fn new(cooldown: Duration) -> Self {
        GlobalTransformGate {
            active: AtomicBool::new(false),
            last_attempt_start: AtomicU64::new(NEVER),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Start time of the most recent attempt, if any
    pub fn last_attempt_start(&self) -> Option<SceneTime> {
        match self.last_attempt_start.load(Ordering::Acquire) {
            NEVER => None,
            micros => Some(SceneTime::from_micros(micros)),
        }
    }

    fn cooldown_elapsed(&self, now: SceneTime) -> bool {
        match self.last_attempt_start() {
            None => true,
            Some(start) => now.since(start) > self.cooldown,
        }
    }

    /// Time left before a new attempt may start (zero once elapsed).
    ///
    /// The window is exclusive, so at exactly `start + cooldown` this
    /// reports zero yet `try_begin` still refuses for that instant.
    pub fn cooldown_remaining(&self, now: SceneTime) -> Duration {
        match self.last_attempt_start() {
            None => Duration::ZERO,
            Some(start) => self.cooldown.saturating_sub(now.since(start)),
        }
    }

    /// Claim the privilege if nobody holds it and the cooldown has elapsed.
    ///
    /// On success the gate is active and `now` becomes the attempt start.
    /// On failure nothing changes.
    pub fn try_begin(&self, now: SceneTime) -> bool {
        if !self.cooldown_elapsed(now) {
            return false;
        }
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // Holding the flag: re-check against a start recorded by a racing winner.
        if !self.cooldown_elapsed(now) {
            self.active.store(false, Ordering::Release);
            return false;
        }
        self.last_attempt_start.store(now.as_micros(), Ordering::Release);
        true
    }

    /// Release the privilege. The cooldown timestamp is kept.
    pub fn end(&self) {
        self.active.store(false, Ordering::Release);
    }
}
