//! Landmark conversion from the pose estimator
//!
//! The estimator reports normalized image coordinates (origin top-left,
//! y down). The scene is centered with y up, so both axes are recentred
//! and y is flipped before scaling.

use shoal_core::Vec2;

use crate::{HandState, SharedPoseState};

/// Landmark indices in the estimator's 33-point body topology
pub mod index {
    pub const LEFT_ELBOW: usize = 13;
    pub const RIGHT_ELBOW: usize = 14;
    pub const LEFT_WRIST: usize = 15;
    pub const RIGHT_WRIST: usize = 16;
}

/// Normalized landmark as produced by the estimator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl NormalizedLandmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Maps normalized landmarks into scene space
#[derive(Debug, Clone, Copy)]
pub struct LandmarkConverter {
    pub multiplier_x: f32,
    pub multiplier_y: f32,
}

impl Default for LandmarkConverter {
    fn default() -> Self {
        LandmarkConverter {
            multiplier_x: 20.0,
            multiplier_y: 12.0,
        }
    }
}

impl LandmarkConverter {
    /// Project one landmark onto the scene plane (z is dropped)
    pub fn convert(&self, l: &NormalizedLandmark) -> Vec2 {
        Vec2::new((l.x - 0.5) * self.multiplier_x, (0.5 - l.y) * self.multiplier_y)
    }

    /// Extract the four arm joints, `None` if the pose is truncated
    pub fn hands(&self, landmarks: &[NormalizedLandmark]) -> Option<HandState> {
        let at = |i: usize| landmarks.get(i).map(|l| self.convert(l));
        Some(HandState::new(
            at(index::RIGHT_WRIST)?,
            at(index::RIGHT_ELBOW)?,
            at(index::LEFT_WRIST)?,
            at(index::LEFT_ELBOW)?,
        ))
    }
}

/// Writer side of the pose contract.
///
/// Called from the estimator's callback thread; it only ever writes into
/// [`SharedPoseState`].
#[derive(Clone)]
pub struct PoseConsumer {
    converter: LandmarkConverter,
    shared: SharedPoseState,
}

impl PoseConsumer {
    pub fn new(shared: SharedPoseState) -> Self {
        Self::with_converter(shared, LandmarkConverter::default())
    }

    pub fn with_converter(shared: SharedPoseState, converter: LandmarkConverter) -> Self {
        PoseConsumer { converter, shared }
    }

    /// Process one estimator result (a list of detected poses).
    ///
    /// Only the first pose is used. An empty result keeps the previous state.
    /// Returns whether the shared state was updated.
    pub fn process(&self, poses: &[Vec<NormalizedLandmark>]) -> bool {
        let Some(first) = poses.first() else {
            return false;
        };
        match self.converter.hands(first) {
            Some(hands) => {
                self.shared.set(hands);
                true
            }
            None => {
                tracing::trace!(landmarks = first.len(), "pose result too short, ignored");
                false
            }
        }
    }
}
