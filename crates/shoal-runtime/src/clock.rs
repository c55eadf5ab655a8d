//! Scene clock for the main tick

use std::time::{Duration, Instant};

use shoal_core::SceneTime;

/// Largest step taken from wall time in one tick (e.g. after a stall)
pub const MAX_REALTIME_STEP: Duration = Duration::from_millis(100);

/// Monotonic scene clock.
///
/// Advanced explicitly by the tick; wall time is only consulted through
/// [`SceneClock::measure`], which clamps large gaps.
pub struct SceneClock {
    value: SceneTime,
    last_measure: Instant,
}

impl SceneClock {
    pub fn new() -> Self {
        SceneClock {
            value: SceneTime::ZERO,
            last_measure: Instant::now(),
        }
    }

    /// Advance by `dt` and return the new scene time
    pub fn advance(&mut self, dt: Duration) -> SceneTime {
        self.value = self.value.saturating_add(dt);
        self.value
    }

    /// Wall time elapsed since the previous measurement, clamped
    pub fn measure(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_measure);
        self.last_measure = now;
        elapsed.min(MAX_REALTIME_STEP)
    }

    pub fn now(&self) -> SceneTime {
        self.value
    }
}

impl Default for SceneClock {
    fn default() -> Self {
        Self::new()
    }
}
