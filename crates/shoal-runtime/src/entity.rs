//! Entity state machine and motion
//!
//! ```text
//!   Idle ──selected──▶ Attracted ──dwell ∧ arm ∧ gate──▶ Transforming ──image──▶ Displaying
//!    ▲                    │                                   │                     │
//!    └────not selected────┘◀──────────fetch failed────────────┘◀──display elapsed───┘
//! ```

use std::time::Duration;

use rand::Rng;
use shoal_assets::{HydratedFrame, Playback, Visual};
use shoal_core::{EntityId, SceneBounds, SceneTime, TextureHandle, Vec2};
use shoal_pose::HandState;
use tokio_util::sync::CancellationToken;

use crate::{GlobalTransformGate, Selection, StageConfig};

/// Lifecycle state of one entity
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EntityState {
    /// Wandering toward a random waypoint
    Idle,
    /// Held by arbitration since `since`
    Attracted { since: SceneTime },
    /// Frozen at `pinned`, waiting for the representational image
    Transforming { pinned: Vec2, started: SceneTime },
    /// Frozen at `pinned`, showing `texture` until `until`
    Displaying {
        pinned: Vec2,
        until: SceneTime,
        texture: TextureHandle,
    },
}

impl EntityState {
    /// Transforming or Displaying: the entity owns the global privilege
    pub fn holds_privilege(&self) -> bool {
        matches!(
            self,
            EntityState::Transforming { .. } | EntityState::Displaying { .. }
        )
    }

    pub fn attraction_started(&self) -> Option<SceneTime> {
        match self {
            EntityState::Attracted { since } => Some(*since),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EntityState::Idle => "idle",
            EntityState::Attracted { .. } => "attracted",
            EntityState::Transforming { .. } => "transforming",
            EntityState::Displaying { .. } => "displaying",
        }
    }
}

/// Everything an entity reads during one tick
pub struct StepContext<'a> {
    pub now: SceneTime,
    pub dt: Duration,
    pub hands: &'a HandState,
    pub selection: Option<&'a Selection>,
    pub gate: &'a GlobalTransformGate,
    pub config: &'a StageConfig,
}

/// Side effects the stage must carry out after a step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The gate was claimed; the representational fetch must start
    TransformBegun,
    /// Display finished; the texture can be released
    DisplayEnded(TextureHandle),
}

/// Uniform random point inside `bounds`
pub fn random_point<R: Rng + ?Sized>(bounds: &SceneBounds, rng: &mut R) -> Vec2 {
    Vec2::new(
        rng.gen_range(bounds.min.x..=bounds.max.x),
        rng.gen_range(bounds.min.y..=bounds.max.y),
    )
}

/// One attractable actor
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    url: String,
    position: Vec2,
    /// `Vec2::ZERO` means "not drawn yet"
    waypoint: Vec2,
    state: EntityState,
    playback: Playback,
    cancel: CancellationToken,
}

impl Entity {
    pub fn new(id: EntityId, url: String, position: Vec2, waypoint: Vec2) -> Self {
        Entity {
            id,
            url,
            position,
            waypoint,
            state: EntityState::Idle,
            playback: Playback::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn waypoint(&self) -> Vec2 {
        self.waypoint
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    /// Token handed to background work for this entity; cancelled on destroy
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Move the entity (placement by the owner, not motion)
    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    /// Advance state and motion by one tick
    pub fn step<R: Rng + ?Sized>(&mut self, cx: &StepContext<'_>, rng: &mut R) -> Option<StepOutcome> {
        let selected = cx.selection.filter(|s| s.entity == self.id);

        match self.state {
            EntityState::Transforming { pinned, .. } => {
                self.position = pinned;
                None
            }
            EntityState::Displaying { pinned, until, texture } => {
                self.position = pinned;
                if cx.now < until {
                    return None;
                }
                tracing::info!(entity = %self.id, "display finished, back to idle");
                cx.gate.end();
                self.state = EntityState::Idle;
                self.waypoint = random_point(&cx.config.bounds, rng);
                self.playback.start();
                Some(StepOutcome::DisplayEnded(texture))
            }
            EntityState::Idle | EntityState::Attracted { .. } => match selected {
                Some(selection) => {
                    let since = match self.state {
                        EntityState::Attracted { since } => since,
                        _ => {
                            tracing::debug!(entity = %self.id, distance = selection.distance, "attracted");
                            self.state = EntityState::Attracted { since: cx.now };
                            cx.now
                        }
                    };
                    if self.try_begin_transform(since, cx) {
                        return Some(StepOutcome::TransformBegun);
                    }
                    let step = cx.config.attraction.attraction_speed * cx.dt.as_secs_f32();
                    self.position = self.position.move_towards(&selection.centroid, step);
                    None
                }
                None => {
                    if let EntityState::Attracted { .. } = self.state {
                        tracing::debug!(entity = %self.id, "released by arbitration");
                        self.state = EntityState::Idle;
                    }
                    self.wander(cx, rng);
                    None
                }
            },
        }
    }

    fn wander<R: Rng + ?Sized>(&mut self, cx: &StepContext<'_>, rng: &mut R) {
        let motion = &cx.config.motion;
        if self.waypoint == Vec2::ZERO {
            self.waypoint = random_point(&cx.config.bounds, rng);
        }
        self.position = self
            .position
            .move_towards(&self.waypoint, motion.move_speed * cx.dt.as_secs_f32());
        if self.position.distance(&self.waypoint) < motion.arrival_epsilon {
            self.waypoint = random_point(&cx.config.bounds, rng);
        }
    }

    /// Dwell, then arm geometry, then the gate (the only mutating check)
    fn try_begin_transform(&mut self, since: SceneTime, cx: &StepContext<'_>) -> bool {
        if cx.now.since(since) < cx.config.policy.min_dwell {
            return false;
        }
        let Some(arm) = cx
            .hands
            .arm_covering(self.position, cx.config.attraction.arm_scan_width)
        else {
            return false;
        };
        if !cx.gate.try_begin(cx.now) {
            if cx.gate.is_active() {
                tracing::trace!(entity = %self.id, "transform skipped: another entity holds the gate");
            } else {
                tracing::trace!(
                    entity = %self.id,
                    remaining = ?cx.gate.cooldown_remaining(cx.now),
                    "transform skipped: cooldown"
                );
            }
            return false;
        }

        tracing::info!(entity = %self.id, ?arm, url = %self.url, "transformation started");
        self.state = EntityState::Transforming {
            pinned: self.position,
            started: cx.now,
        };
        self.playback.stop();
        true
    }

    /// Representational image is ready: start the display hold
    pub fn enter_display(&mut self, now: SceneTime, display: Duration, texture: TextureHandle) -> bool {
        let EntityState::Transforming { pinned, .. } = self.state else {
            return false;
        };
        self.state = EntityState::Displaying {
            pinned,
            until: now + display,
            texture,
        };
        true
    }

    /// Fetch failed: back to idle. The gate is released, its cooldown kept.
    pub fn abort_transform(&mut self, gate: &GlobalTransformGate) -> bool {
        if !matches!(self.state, EntityState::Transforming { .. }) {
            return false;
        }
        gate.end();
        self.state = EntityState::Idle;
        self.playback.start();
        true
    }

    /// Install hydrated frames and start looping unless the entity is frozen.
    ///
    /// Returns frames that were replaced, for release.
    pub fn attach_frames(&mut self, frames: Vec<HydratedFrame>) -> Vec<HydratedFrame> {
        let previous = self.playback.take_frames();
        self.playback = Playback::new(frames);
        if !self.state.holds_privilege() {
            self.playback.start();
        }
        previous
    }

    /// Advance the animation and report what to show
    pub fn advance_visual(&mut self, dt: Duration) -> Visual {
        if let EntityState::Displaying { texture, .. } = self.state {
            return Visual::Representation(texture);
        }
        match self.playback.advance(dt) {
            Some(texture) => Visual::Animation(texture),
            None => Visual::Empty,
        }
    }

    /// Tear down: cancel background work and return every owned texture
    pub fn destroy(mut self) -> Vec<TextureHandle> {
        self.cancel.cancel();
        let mut textures: Vec<TextureHandle> = self
            .playback
            .take_frames()
            .into_iter()
            .map(|f| f.texture)
            .collect();
        if let EntityState::Displaying { texture, .. } = self.state {
            textures.push(texture);
        }
        textures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::TransformPolicy;

    struct Fixture {
        config: StageConfig,
        gate: GlobalTransformGate,
        hands: HandState,
        rng: StdRng,
    }

    impl Fixture {
        fn new(policy: TransformPolicy) -> Self {
            let gate = GlobalTransformGate::new(policy.cooldown);
            Fixture {
                config: StageConfig::with_policy(policy),
                gate,
                // Wrists together at the origin, right forearm along +x.
                hands: HandState::new(
                    Vec2::new(0.5, 0.0),
                    Vec2::new(4.0, 0.0),
                    Vec2::new(-0.5, 0.0),
                    Vec2::new(-0.5, -4.0),
                ),
                rng: StdRng::seed_from_u64(7),
            }
        }

        fn step(&mut self, entity: &mut Entity, now: SceneTime, selected: bool) -> Option<StepOutcome> {
            let selection = Selection {
                entity: entity.id(),
                centroid: Vec2::ZERO,
                distance: entity.position().length(),
            };
            let cx = StepContext {
                now,
                dt: Duration::from_millis(100),
                hands: &self.hands,
                selection: selected.then_some(&selection),
                gate: &self.gate,
                config: &self.config,
            };
            entity.step(&cx, &mut self.rng)
        }
    }

    fn entity_at(x: f32, y: f32) -> Entity {
        Entity::new(EntityId::new(1), "http://h/a.webp".into(), Vec2::new(x, y), Vec2::new(5.0, 2.0))
    }

    fn ms(v: u64) -> SceneTime {
        SceneTime::from_millis(v)
    }

    #[test]
    fn test_idle_wanders_toward_waypoint() {
        let mut fx = Fixture::new(TransformPolicy::dwell());
        let mut entity = entity_at(0.0, 0.0);
        let before = entity.position().distance(&entity.waypoint());

        fx.step(&mut entity, ms(100), false);
        let after = entity.position().distance(&entity.waypoint());
        assert!((before - after - 0.2).abs() < 1e-4);
        assert_eq!(entity.state(), EntityState::Idle);
    }

    #[test]
    fn test_origin_waypoint_is_redrawn() {
        let mut fx = Fixture::new(TransformPolicy::dwell());
        let mut entity = Entity::new(EntityId::new(1), "u".into(), Vec2::new(1.0, 1.0), Vec2::ZERO);
        fx.step(&mut entity, ms(100), false);
        assert_ne!(entity.waypoint(), Vec2::ZERO);
        assert!(fx.config.bounds.contains(entity.waypoint()));
    }

    #[test]
    fn test_arrival_draws_new_waypoint() {
        let mut fx = Fixture::new(TransformPolicy::dwell());
        let mut entity = Entity::new(EntityId::new(1), "u".into(), Vec2::new(5.0, 1.9), Vec2::new(5.0, 2.0));
        fx.step(&mut entity, ms(100), false);
        assert_eq!(entity.position(), Vec2::new(5.0, 2.0));
        assert_ne!(entity.waypoint(), Vec2::new(5.0, 2.0));
    }

    #[test]
    fn test_selected_moves_toward_centroid() {
        let mut fx = Fixture::new(TransformPolicy::dwell());
        let mut entity = entity_at(8.0, 0.0);

        fx.step(&mut entity, ms(0), true);
        assert_eq!(entity.state(), EntityState::Attracted { since: ms(0) });
        assert!((entity.position().x - 7.2).abs() < 1e-4);

        fx.step(&mut entity, ms(100), false);
        assert_eq!(entity.state(), EntityState::Idle);
    }

    #[test]
    fn test_dwell_gates_transformation() {
        let mut fx = Fixture::new(TransformPolicy::dwell());
        let mut entity = entity_at(2.0, 0.0);

        let mut begun_at = Vec::new();
        for tick in 0..=40u64 {
            let now = ms(tick * 100);
            let unprivileged = !entity.state().holds_privilege();
            if fx.step(&mut entity, now, unprivileged) == Some(StepOutcome::TransformBegun) {
                begun_at.push(now);
            }
            // The centroid pull keeps the entity on the forearm; hold it there.
            if !entity.state().holds_privilege() {
                entity.set_position(Vec2::new(2.0, 0.0));
            }
        }

        assert_eq!(begun_at, vec![ms(3000)]);
        assert!(fx.gate.is_active());
        assert!(matches!(entity.state(), EntityState::Transforming { .. }));
    }

    #[test]
    fn test_arm_geometry_required() {
        let mut fx = Fixture::new(TransformPolicy::instant());
        // Selected, but nowhere near either forearm.
        let mut entity = entity_at(0.0, 5.0);
        assert_eq!(fx.step(&mut entity, ms(0), true), None);
        assert!(!fx.gate.is_active());
    }

    #[test]
    fn test_instant_policy_transforms_on_first_tick() {
        let mut fx = Fixture::new(TransformPolicy::instant());
        let mut entity = entity_at(2.0, 0.5);
        assert_eq!(fx.step(&mut entity, ms(0), true), Some(StepOutcome::TransformBegun));
        assert_eq!(
            entity.state(),
            EntityState::Transforming { pinned: Vec2::new(2.0, 0.5), started: ms(0) }
        );
    }

    #[test]
    fn test_frozen_entity_is_repinned() {
        let mut fx = Fixture::new(TransformPolicy::instant());
        let mut entity = entity_at(2.0, 0.5);
        fx.step(&mut entity, ms(0), true);

        entity.set_position(Vec2::new(-9.0, -9.0));
        fx.step(&mut entity, ms(100), false);
        assert_eq!(entity.position(), Vec2::new(2.0, 0.5));
    }

    #[test]
    fn test_display_then_idle_releases_gate() {
        let mut fx = Fixture::new(TransformPolicy::instant());
        let mut entity = entity_at(2.0, 0.5);
        fx.step(&mut entity, ms(0), true);

        let tex = TextureHandle::new(99);
        assert!(entity.enter_display(ms(500), Duration::from_secs(20), tex));
        assert_eq!(entity.advance_visual(Duration::from_millis(16)), Visual::Representation(tex));

        assert_eq!(fx.step(&mut entity, ms(20_400), false), None);
        assert!(fx.gate.is_active());

        assert_eq!(fx.step(&mut entity, ms(20_500), false), Some(StepOutcome::DisplayEnded(tex)));
        assert_eq!(entity.state(), EntityState::Idle);
        assert!(!fx.gate.is_active());
        assert_eq!(fx.gate.last_attempt_start(), Some(ms(0)));
    }

    #[test]
    fn test_abort_keeps_cooldown() {
        let mut fx = Fixture::new(TransformPolicy::dwell());
        let mut entity = entity_at(2.0, 0.0);
        fx.gate.try_begin(ms(0));
        fx.gate.end();

        // Can't even start within the cooldown window.
        for tick in 0..=50u64 {
            fx.step(&mut entity, ms(tick * 100), true);
            entity.set_position(Vec2::new(2.0, 0.0));
        }
        assert!(!entity.state().holds_privilege());

        let mut fresh = Fixture::new(TransformPolicy::instant());
        let mut entity = entity_at(2.0, 0.0);
        fresh.step(&mut entity, ms(0), true);
        assert!(entity.abort_transform(&fresh.gate));
        assert_eq!(entity.state(), EntityState::Idle);
        assert!(!fresh.gate.is_active());
        assert_eq!(fresh.gate.last_attempt_start(), Some(ms(0)));
        assert!(!entity.abort_transform(&fresh.gate));
    }

    #[test]
    fn test_frames_attached_while_frozen_wait_for_idle() {
        let mut fx = Fixture::new(TransformPolicy::instant());
        let mut entity = entity_at(2.0, 0.5);
        fx.step(&mut entity, ms(0), true);

        let frames = vec![
            HydratedFrame { texture: TextureHandle::new(1), timestamp_ms: 100 },
            HydratedFrame { texture: TextureHandle::new(2), timestamp_ms: 200 },
        ];
        assert!(entity.attach_frames(frames).is_empty());
        assert!(!entity.playback().is_playing());

        assert!(entity.abort_transform(&fx.gate));
        assert!(entity.playback().is_playing());
    }

    #[test]
    fn test_destroy_returns_textures_and_cancels_work() {
        let mut entity = entity_at(0.0, 0.0);
        let cancel = entity.cancel_token();
        entity.attach_frames(vec![HydratedFrame { texture: TextureHandle::new(5), timestamp_ms: 10 }]);

        let textures = entity.destroy();
        assert_eq!(textures, vec![TextureHandle::new(5)]);
        assert!(cancel.is_cancelled());
    }
}
