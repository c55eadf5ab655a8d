//! Stage configuration

use std::time::Duration;

use shoal_assets::AssetConfig;
use shoal_core::{SceneBounds, ShoalError, ShoalResult};

/// Idle wandering
#[derive(Clone, Debug)]
pub struct MotionConfig {
    /// Wander speed, scene units per second
    pub move_speed: f32,
    /// Waypoint counts as reached within this distance
    pub arrival_epsilon: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            move_speed: 2.0,
            arrival_epsilon: 0.3,
        }
    }
}

/// Hands-together attraction and arm geometry
#[derive(Clone, Debug)]
pub struct AttractionConfig {
    /// Speed toward the hands centroid, scene units per second
    pub attraction_speed: f32,
    /// Only entities strictly closer than this to the centroid are eligible
    pub attraction_radius: f32,
    /// Wrists strictly closer than this count as "together"
    pub hands_together_threshold: f32,
    /// Perpendicular tolerance of the forearm test
    pub arm_scan_width: f32,
}

impl Default for AttractionConfig {
    fn default() -> Self {
        AttractionConfig {
            attraction_speed: 8.0,
            attraction_radius: 15.0,
            hands_together_threshold: 3.0,
            arm_scan_width: 2.5,
        }
    }
}

/// Timing of the transformation privilege
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformPolicy {
    /// Continuous attraction needed before an attempt
    pub min_dwell: Duration,
    /// Minimum time between attempt starts, process-wide
    pub cooldown: Duration,
    /// How long the representational image stays up
    pub display: Duration,
}

impl Default for TransformPolicy {
    fn default() -> Self {
        Self::dwell()
    }
}

impl TransformPolicy {
    /// Attempt on the first qualifying tick, no cooldown
    pub fn instant() -> Self {
        TransformPolicy {
            min_dwell: Duration::ZERO,
            cooldown: Duration::ZERO,
            display: Duration::from_secs(20),
        }
    }

    /// Three-second dwell, global flag, thirty-second cooldown
    pub fn dwell() -> Self {
        TransformPolicy {
            min_dwell: Duration::from_secs(3),
            cooldown: Duration::from_secs(30),
            display: Duration::from_secs(20),
        }
    }

    /// No dwell, thirty-second cooldown, ten-second display
    pub fn flat_cooldown() -> Self {
        TransformPolicy {
            min_dwell: Duration::ZERO,
            cooldown: Duration::from_secs(30),
            display: Duration::from_secs(10),
        }
    }

    /// Look up a preset by name
    pub fn named(name: &str) -> ShoalResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "instant" => Ok(Self::instant()),
            "dwell" => Ok(Self::dwell()),
            "flat" | "flat_cooldown" | "flat-cooldown" => Ok(Self::flat_cooldown()),
            other => Err(ShoalError::InvalidConfig(format!("unknown transform policy {other:?}"))),
        }
    }
}

/// Stage configuration
#[derive(Clone, Debug)]
pub struct StageConfig {
    pub motion: MotionConfig,
    pub attraction: AttractionConfig,
    pub policy: TransformPolicy,
    /// Region waypoints are drawn from
    pub bounds: SceneBounds,
    /// Region new entities appear in
    pub spawn_bounds: SceneBounds,
    pub assets: AssetConfig,
    /// Cap on spawn events taken per tick; `None` drains the whole backlog
    pub max_spawns_per_tick: Option<usize>,
    /// Seed for waypoint/spawn randomness; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for StageConfig {
    fn default() -> Self {
        StageConfig {
            motion: MotionConfig::default(),
            attraction: AttractionConfig::default(),
            policy: TransformPolicy::default(),
            bounds: SceneBounds::new(-10.0, 10.0, -5.0, 5.0),
            spawn_bounds: SceneBounds::new(-5.0, 5.0, -3.0, 3.0),
            assets: AssetConfig::default(),
            max_spawns_per_tick: None,
            seed: None,
        }
    }
}

impl StageConfig {
    pub fn with_policy(policy: TransformPolicy) -> Self {
        StageConfig {
            policy,
            ..Default::default()
        }
    }

    /// Reject values the tick cannot work with
    pub fn validate(&self) -> ShoalResult<()> {
        let positive = [
            ("move_speed", self.motion.move_speed),
            ("attraction_speed", self.attraction.attraction_speed),
            ("attraction_radius", self.attraction.attraction_radius),
            ("hands_together_threshold", self.attraction.hands_together_threshold),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ShoalError::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }
        if !(self.attraction.arm_scan_width >= 0.0) || !(self.motion.arrival_epsilon >= 0.0) {
            return Err(ShoalError::InvalidConfig("tolerances must be non-negative".into()));
        }
        if !self.bounds.is_valid() || !self.spawn_bounds.is_valid() {
            return Err(ShoalError::InvalidConfig("bounds min exceeds max".into()));
        }
        if self.max_spawns_per_tick == Some(0) {
            return Err(ShoalError::InvalidConfig("max_spawns_per_tick must be at least 1".into()));
        }
        Ok(())
    }
}
