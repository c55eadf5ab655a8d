//! Hand state - four tracked joints with a validity sentinel

use shoal_core::{arm_segment_contains, Vec2};

/// Coordinate reported before the estimator has produced anything.
pub const UNKNOWN_COORD: f32 = 999.0;

/// A joint is valid iff its x component is below this.
pub const VALID_X_LIMIT: f32 = 500.0;

/// Sentinel point meaning "no data yet"
pub const UNKNOWN_POINT: Vec2 = Vec2::new(UNKNOWN_COORD, UNKNOWN_COORD);

#[inline]
pub fn is_valid_point(p: Vec2) -> bool {
    p.x < VALID_X_LIMIT
}

/// Which arm a joint pair belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Right,
    Left,
}

/// Elbow/wrist pair for one arm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arm {
    pub side: Side,
    pub elbow: Vec2,
    pub wrist: Vec2,
}

impl Arm {
    pub fn is_valid(&self) -> bool {
        is_valid_point(self.elbow) && is_valid_point(self.wrist)
    }

    /// Does `point` lie along this forearm within `scan_width`?
    ///
    /// Both joints must be tracked; a valid wrist with an untracked elbow
    /// covers nothing.
    pub fn covers(&self, point: Vec2, scan_width: f32) -> bool {
        self.is_valid() && arm_segment_contains(self.elbow, self.wrist, point, scan_width)
    }
}

/// Latest hand/elbow coordinates in scene space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandState {
    pub right_wrist: Vec2,
    pub right_elbow: Vec2,
    pub left_wrist: Vec2,
    pub left_elbow: Vec2,
}

impl Default for HandState {
    fn default() -> Self {
        Self::unknown()
    }
}

impl HandState {
    pub const fn unknown() -> Self {
        HandState {
            right_wrist: UNKNOWN_POINT,
            right_elbow: UNKNOWN_POINT,
            left_wrist: UNKNOWN_POINT,
            left_elbow: UNKNOWN_POINT,
        }
    }

    pub fn new(right_wrist: Vec2, right_elbow: Vec2, left_wrist: Vec2, left_elbow: Vec2) -> Self {
        HandState {
            right_wrist,
            right_elbow,
            left_wrist,
            left_elbow,
        }
    }

    /// Both wrists carry real data
    pub fn wrists_valid(&self) -> bool {
        is_valid_point(self.right_wrist) && is_valid_point(self.left_wrist)
    }

    /// Distance between the wrists, `None` unless both are valid
    pub fn wrist_distance(&self) -> Option<f32> {
        self.wrists_valid()
            .then(|| self.right_wrist.distance(&self.left_wrist))
    }

    /// Centroid of the wrists, `None` unless both are valid
    pub fn wrist_centroid(&self) -> Option<Vec2> {
        self.wrists_valid()
            .then(|| self.right_wrist.midpoint(&self.left_wrist))
    }

    pub fn right_arm(&self) -> Arm {
        Arm {
            side: Side::Right,
            elbow: self.right_elbow,
            wrist: self.right_wrist,
        }
    }

    pub fn left_arm(&self) -> Arm {
        Arm {
            side: Side::Left,
            elbow: self.left_elbow,
            wrist: self.left_wrist,
        }
    }

    /// First arm (right before left) whose forearm covers `point`
    pub fn arm_covering(&self, point: Vec2, scan_width: f32) -> Option<Side> {
        [self.right_arm(), self.left_arm()]
            .into_iter()
            .find(|arm| arm.covers(point, scan_width))
            .map(|arm| arm.side)
    }
}
