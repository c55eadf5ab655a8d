//! Process-wide latest pose, shared between the estimator and the tick

use std::sync::Arc;

use parking_lot::RwLock;
use shoal_core::Vec2;

use crate::HandState;

/// Latest hand/elbow coordinates.
///
/// Created once at startup and cloned into whoever needs it; every clone
/// refers to the same state. The pose consumer is the only writer, the
/// main tick only reads a copy per tick.
#[derive(Clone, Default)]
pub struct SharedPoseState {
    inner: Arc<RwLock<HandState>>,
}

impl SharedPoseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all four joints at once
    pub fn set(&self, hands: HandState) {
        *self.inner.write() = hands;
    }

    /// Setter matching the estimator contract: four 2D points per tick
    pub fn set_points(&self, right_wrist: Vec2, right_elbow: Vec2, left_wrist: Vec2, left_elbow: Vec2) {
        self.set(HandState::new(right_wrist, right_elbow, left_wrist, left_elbow));
    }

    /// Restore the "no data yet" sentinel
    pub fn reset(&self) {
        self.set(HandState::unknown());
    }

    /// Copy of the current state, consistent across all four points
    pub fn snapshot(&self) -> HandState {
        *self.inner.read()
    }
}

impl std::fmt::Debug for SharedPoseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedPoseState").field(&self.snapshot()).finish()
    }
}
