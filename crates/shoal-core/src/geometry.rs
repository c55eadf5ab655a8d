//! Planar geometry for the scene
//!
//! The installation is 2D: pose landmarks and entity positions share one
//! scene plane. Depth from the estimator is discarded at conversion.

use std::ops::{Add, Div, Mul, Sub};

/// Arm segments shorter than this are treated as a single point.
const DEGENERATE_SEGMENT: f32 = 1e-5;

/// 2D position in scene units
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Distance to another position
    pub fn distance(&self, other: &Vec2) -> f32 {
        (*self - *other).length()
    }

    pub fn dot(&self, other: &Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// 2D cross product (z component of the 3D cross)
    pub fn perp_dot(&self, other: &Vec2) -> f32 {
        self.x * other.y - self.y * other.x
    }

    /// Midpoint of two positions
    pub fn midpoint(&self, other: &Vec2) -> Vec2 {
        (*self + *other) / 2.0
    }

    /// Linear interpolation
    pub fn lerp(&self, other: &Vec2, t: f32) -> Vec2 {
        Vec2 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Step from `self` toward `target` by at most `max_delta`, never overshooting.
    pub fn move_towards(&self, target: &Vec2, max_delta: f32) -> Vec2 {
        let offset = *target - *self;
        let dist = offset.length();
        if dist <= max_delta || dist == 0.0 {
            return *target;
        }
        *self + offset * (max_delta / dist)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f32> for Vec2 {
    type Output = Vec2;

    fn div(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x / rhs, self.y / rhs)
    }
}

/// Arm-segment containment test.
///
/// Returns true when `point` projects onto the segment `elbow -> wrist`
/// (projection within `[0, len]`) and lies within `scan_width` of the
/// infinite line through it. A degenerate arm (elbow on top of wrist)
/// contains only points within `scan_width` of that joint.
pub fn arm_segment_contains(elbow: Vec2, wrist: Vec2, point: Vec2, scan_width: f32) -> bool {
    let arm = wrist - elbow;
    let arm_len = arm.length();
    let to_point = point - elbow;

    if arm_len < DEGENERATE_SEGMENT {
        return to_point.length() <= scan_width;
    }

    let dir = arm / arm_len;
    let projection = to_point.dot(&dir);
    if projection < 0.0 || projection > arm_len {
        return false;
    }

    dir.perp_dot(&to_point).abs() <= scan_width
}

/// Axis-aligned rectangle in scene units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl SceneBounds {
    pub const fn new(min_x: f32, max_x: f32, min_y: f32, max_y: f32) -> Self {
        SceneBounds {
            min: Vec2::new(min_x, min_y),
            max: Vec2::new(max_x, max_y),
        }
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y
    }
}
