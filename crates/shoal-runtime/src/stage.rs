//! The stage: owns the scene and runs the main tick

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use shoal_assets::{hydrate_frames, AssetEvent, AssetPipeline, RenderItem, RenderSurface};
use shoal_core::{EntityId, SceneTime, ShoalError, ShoalResult, Vec2};
use shoal_pose::SharedPoseState;
use shoal_transport::SpawnReceiver;

use crate::{
    random_point, AttractionArbiter, Entity, EntityRegistry, EntityState, GlobalTransformGate,
    SceneClock, Selection, SpawnDispatcher, StageConfig, StepContext, StepOutcome,
};

/// Process-wide state shared with components outside the stage
#[derive(Clone, Debug)]
pub struct SceneContext {
    /// Written by the pose consumer, read once per tick
    pub pose: SharedPoseState,
    pub gate: Arc<GlobalTransformGate>,
}

impl SceneContext {
    pub fn new(pose: SharedPoseState, cooldown: Duration) -> Self {
        SceneContext {
            pose,
            gate: Arc::new(GlobalTransformGate::new(cooldown)),
        }
    }
}

/// Stage statistics
#[derive(Debug, Clone, Default)]
pub struct StageStats {
    pub ticks: u64,
    pub spawns_accepted: u64,
    pub spawns_rejected: u64,
    pub despawned: u64,
    pub frames_hydrated: u64,
    pub assets_failed: u64,
    pub transforms_begun: u64,
    pub transforms_failed: u64,
    pub transforms_completed: u64,
    pub last_tick_duration: Duration,
}

/// The scene and everything the main tick touches
pub struct Stage<S: RenderSurface> {
    config: StageConfig,
    context: SceneContext,
    clock: SceneClock,
    registry: EntityRegistry,
    arbiter: AttractionArbiter,
    dispatcher: SpawnDispatcher,
    pipeline: AssetPipeline,
    surface: S,
    rng: StdRng,
    last_selection: Option<Selection>,
    stats: StageStats,
}

impl<S: RenderSurface> Stage<S> {
    pub fn new(
        config: StageConfig,
        context: SceneContext,
        spawns: SpawnReceiver,
        pipeline: AssetPipeline,
        surface: S,
    ) -> ShoalResult<Self> {
        config.validate()?;
        if context.gate.cooldown() != config.policy.cooldown {
            return Err(ShoalError::InvalidConfig(format!(
                "gate cooldown {:?} does not match policy cooldown {:?}",
                context.gate.cooldown(),
                config.policy.cooldown
            )));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        tracing::info!(policy = ?config.policy, "stage created");

        Ok(Stage {
            arbiter: AttractionArbiter::new(&config.attraction),
            dispatcher: SpawnDispatcher::new(spawns, config.spawn_bounds, config.max_spawns_per_tick),
            clock: SceneClock::new(),
            registry: EntityRegistry::new(),
            last_selection: None,
            stats: StageStats::default(),
            config,
            context,
            pipeline,
            surface,
            rng,
        })
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn context(&self) -> &SceneContext {
        &self.context
    }

    pub fn gate(&self) -> &GlobalTransformGate {
        &self.context.gate
    }

    pub fn now(&self) -> SceneTime {
        self.clock.now()
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn pipeline(&self) -> &AssetPipeline {
        &self.pipeline
    }

    pub fn stats(&self) -> &StageStats {
        &self.stats
    }

    /// Winner of the most recent arbitration
    pub fn last_selection(&self) -> Option<Selection> {
        self.last_selection
    }

    /// Register an entity at `position` and start loading its animation
    pub fn spawn(&mut self, url: String, position: Vec2) -> EntityId {
        let waypoint = random_point(&self.config.bounds, &mut self.rng);
        let id = self
            .registry
            .register_with(|id| Entity::new(id, url, position, waypoint));

        if let Some(entity) = self.registry.get(id) {
            tracing::info!(entity = %id, url = %entity.url(), ?position, "entity spawned");
            self.pipeline
                .initialize(id, entity.url().to_string(), entity.cancel_token());
        }
        self.stats.spawns_accepted += 1;
        id
    }

    /// Remove an entity, cancel its background work and free its textures
    pub fn despawn(&mut self, id: EntityId) -> ShoalResult<()> {
        let entity = self.registry.unregister(id).ok_or(ShoalError::EntityNotFound(id))?;
        let held_gate = entity.state().holds_privilege();

        for texture in entity.destroy() {
            self.surface.release(texture);
        }
        if held_gate {
            self.context.gate.end();
        }

        self.stats.despawned += 1;
        tracing::info!(entity = %id, held_gate, "entity despawned");
        Ok(())
    }

    /// Tick with the measured (clamped) real-time step
    pub fn tick_realtime(&mut self) {
        let dt = self.clock.measure();
        self.tick(dt);
    }

    /// Run one tick of `dt`
    pub fn tick(&mut self, dt: Duration) {
        let start = Instant::now();
        self.stats.ticks += 1;

        // Stage 1: Advance the scene clock
        let now = self.clock.advance(dt);

        // Stage 2: Dispatch spawn events
        self.dispatch_spawns();

        // Stage 3: Apply finished background work
        let events = self.pipeline.poll();
        self.apply_asset_events(now, events);

        // Stage 4: Snapshot the pose
        let hands = self.context.pose.snapshot();

        // Stage 5: Arbitrate
        self.last_selection = self.arbiter.select(&hands, &self.registry);

        // Stage 6: Step entities
        let cx = StepContext {
            now,
            dt,
            hands: &hands,
            selection: self.last_selection.as_ref(),
            gate: &self.context.gate,
            config: &self.config,
        };
        let mut begun = Vec::new();
        let mut finished = Vec::new();
        for entity in self.registry.iter_mut() {
            match entity.step(&cx, &mut self.rng) {
                Some(StepOutcome::TransformBegun) => begun.push(entity.id()),
                Some(StepOutcome::DisplayEnded(texture)) => finished.push(texture),
                None => {}
            }
        }
        for id in begun {
            self.begin_representation(id);
        }
        for texture in finished {
            self.surface.release(texture);
            self.stats.transforms_completed += 1;
        }

        // Stage 7: Playback and presentation
        self.present(dt);

        self.stats.last_tick_duration = start.elapsed();
    }

    /// Stage 2: Turn queued payloads into entities
    fn dispatch_spawns(&mut self) {
        let report = self.dispatcher.drain(&mut self.rng);
        self.stats.spawns_rejected += report.rejected as u64;
        for request in report.accepted {
            self.spawn(request.url, request.position);
        }
    }

    /// Stage 3: Hydrate decoded frames and resolve representation fetches
    fn apply_asset_events(&mut self, now: SceneTime, events: Vec<AssetEvent>) {
        for event in events {
            let id = event.entity();
            let Some(entity) = self.registry.get_mut(id) else {
                tracing::debug!(entity = %id, "result for departed entity dropped");
                continue;
            };

            match event {
                AssetEvent::Decoded { frames, .. } => {
                    if frames.is_empty() {
                        tracing::warn!(entity = %id, "animation has no frames");
                    }
                    let hydrated = hydrate_frames(&mut self.surface, frames);
                    self.stats.frames_hydrated += hydrated.len() as u64;
                    for old in entity.attach_frames(hydrated) {
                        self.surface.release(old.texture);
                    }
                }
                AssetEvent::DownloadFailed { error, .. } => {
                    tracing::debug!(entity = %id, %error, "entity stays without animation");
                    self.stats.assets_failed += 1;
                }
                AssetEvent::Representation { result: Ok(frame), .. } => {
                    if !matches!(entity.state(), EntityState::Transforming { .. }) {
                        tracing::debug!(entity = %id, "stale representational image dropped");
                        continue;
                    }
                    let texture = self.surface.hydrate(frame);
                    entity.enter_display(now, self.config.policy.display, texture);
                    tracing::info!(entity = %id, "displaying representational image");
                }
                AssetEvent::Representation { result: Err(error), .. } => {
                    tracing::warn!(entity = %id, %error, "representational image fetch failed");
                    if entity.abort_transform(&self.context.gate) {
                        self.stats.transforms_failed += 1;
                    }
                }
            }
        }
    }

    /// Stage 6 follow-up: start the representational fetch
    fn begin_representation(&mut self, id: EntityId) {
        let Some(entity) = self.registry.get(id) else {
            return;
        };
        self.stats.transforms_begun += 1;
        self.pipeline
            .fetch_representation(id, entity.url(), entity.cancel_token());
    }

    /// Stage 7: Advance animations and hand the scene to the surface
    fn present(&mut self, dt: Duration) {
        let items: Vec<RenderItem> = self
            .registry
            .iter_mut()
            .map(|entity| RenderItem {
                entity: entity.id(),
                position: entity.position(),
                visual: entity.advance_visual(dt),
            })
            .collect();
        self.surface.present(&items);
    }
}

impl<S: RenderSurface> std::fmt::Debug for Stage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("now", &self.clock.now())
            .field("entities", &self.registry.len())
            .field("gate", &self.context.gate)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_assets::{HeadlessSurface, RawFrame, Visual};
    use shoal_core::ShoalError;
    use shoal_pose::HandState;
    use tokio::runtime::Runtime;
    use tokio::sync::mpsc;

    use crate::TransformPolicy;

    const TICK: Duration = Duration::from_millis(100);

    struct Harness {
        // Never driven: background tasks stay parked.
        _runtime: Runtime,
        spawns: mpsc::UnboundedSender<String>,
        stage: Stage<HeadlessSurface>,
    }

    fn harness(policy: TransformPolicy) -> Harness {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let config = StageConfig {
            seed: Some(3),
            ..StageConfig::with_policy(policy)
        };
        let context = SceneContext::new(SharedPoseState::new(), config.policy.cooldown);
        let pipeline = AssetPipeline::new(config.assets.clone(), runtime.handle().clone()).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let stage = Stage::new(config, context, rx, pipeline, HeadlessSurface::new()).unwrap();
        Harness {
            _runtime: runtime,
            spawns: tx,
            stage,
        }
    }

    fn hands_over_right_forearm() -> HandState {
        HandState::new(
            Vec2::new(0.5, 0.0),
            Vec2::new(4.0, 0.0),
            Vec2::new(-0.5, 0.0),
            Vec2::new(-0.5, -4.0),
        )
    }

    fn raw(ts: u32) -> RawFrame {
        RawFrame::new(1, 1, vec![0, 0, 0, 255], ts)
    }

    #[test]
    fn test_mismatched_gate_rejected() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let config = StageConfig::default();
        let context = SceneContext::new(SharedPoseState::new(), Duration::from_secs(1));
        let pipeline = AssetPipeline::new(config.assets.clone(), runtime.handle().clone()).unwrap();
        let (_tx, rx) = mpsc::unbounded_channel();
        let result = Stage::new(config, context, rx, pipeline, HeadlessSurface::new());
        assert!(matches!(result, Err(ShoalError::InvalidConfig(_))));
    }

    #[test]
    fn test_spawn_events_become_entities() {
        let mut h = harness(TransformPolicy::dwell());
        h.spawns.send(r#"{"url":"http://h/a.webp"}"#.into()).unwrap();
        h.spawns.send("garbage".into()).unwrap();
        h.spawns.send(r#"{"url":"http://h/b.webp"}"#.into()).unwrap();

        h.stage.tick(TICK);

        let urls: Vec<_> = h.stage.registry().iter().map(|e| e.url().to_string()).collect();
        assert_eq!(urls, ["http://h/a.webp", "http://h/b.webp"]);
        assert_eq!(h.stage.stats().spawns_accepted, 2);
        assert_eq!(h.stage.stats().spawns_rejected, 1);
        assert_eq!(h.stage.pipeline().in_flight(), 2);
        assert_eq!(h.stage.surface().presents(), 1);
        assert_eq!(h.stage.surface().last_scene().len(), 2);
    }

    #[test]
    fn test_hands_trigger_transformation() {
        let mut h = harness(TransformPolicy::instant());
        let id = h.stage.spawn("http://h/a.webp".into(), Vec2::new(2.0, 0.5));
        h.stage.context().pose.set(hands_over_right_forearm());

        h.stage.tick(TICK);

        assert_eq!(h.stage.last_selection().map(|s| s.entity), Some(id));
        assert!(h.stage.gate().is_active());
        assert_eq!(h.stage.stats().transforms_begun, 1);
        assert_eq!(h.stage.registry().privilege_holders(), 1);
        // Download plus representational fetch.
        assert_eq!(h.stage.pipeline().in_flight(), 2);
    }

    #[test]
    fn test_representation_success_then_display_expiry() {
        let mut h = harness(TransformPolicy::instant());
        let id = h.stage.spawn("http://h/a.webp".into(), Vec2::new(2.0, 0.5));
        h.stage.context().pose.set(hands_over_right_forearm());
        h.stage.tick(TICK);

        let now = h.stage.now();
        h.stage.apply_asset_events(
            now,
            vec![AssetEvent::Representation { entity: id, result: Ok(raw(0)) }],
        );
        let state = h.stage.registry().get(id).unwrap().state();
        let EntityState::Displaying { until, texture, .. } = state else {
            panic!("expected displaying, got {state:?}");
        };
        assert_eq!(until, now + Duration::from_secs(20));

        h.stage.context().pose.reset();
        h.stage.tick(TICK);
        assert_eq!(h.stage.surface().item_for(id).unwrap().visual, Visual::Representation(texture));

        for _ in 0..200 {
            h.stage.tick(TICK);
        }
        assert_eq!(h.stage.registry().get(id).unwrap().state(), EntityState::Idle);
        assert!(!h.stage.gate().is_active());
        assert!(!h.stage.surface().is_live(texture));
        assert_eq!(h.stage.stats().transforms_completed, 1);
    }

    #[test]
    fn test_representation_failure_returns_to_idle() {
        let mut h = harness(TransformPolicy::dwell());
        let id = h.stage.spawn("http://h/a.webp".into(), Vec2::new(2.0, 0.0));
        h.stage.context().pose.set(hands_over_right_forearm());
        for _ in 0..40 {
            h.stage.tick(TICK);
        }
        assert!(h.stage.gate().is_active());

        let now = h.stage.now();
        h.stage.apply_asset_events(
            now,
            vec![AssetEvent::Representation {
                entity: id,
                result: Err(ShoalError::HttpStatus { url: "x".into(), status: 500 }),
            }],
        );

        assert_eq!(h.stage.registry().get(id).unwrap().state(), EntityState::Idle);
        assert!(!h.stage.gate().is_active());
        assert!(h.stage.gate().cooldown_remaining(now) > Duration::ZERO);
        assert_eq!(h.stage.stats().transforms_failed, 1);

        // Still attracted, but the cooldown holds.
        for _ in 0..50 {
            h.stage.tick(TICK);
        }
        assert_eq!(h.stage.registry().privilege_holders(), 0);
        assert_eq!(h.stage.stats().transforms_begun, 1);
    }

    #[test]
    fn test_decoded_frames_hydrate_and_play() {
        let mut h = harness(TransformPolicy::dwell());
        let id = h.stage.spawn("http://h/a.webp".into(), Vec2::ZERO);

        let now = h.stage.now();
        h.stage.apply_asset_events(
            now,
            vec![AssetEvent::Decoded { entity: id, frames: vec![raw(100), raw(250)] }],
        );
        assert_eq!(h.stage.stats().frames_hydrated, 2);
        assert_eq!(h.stage.surface().live_textures(), 2);
        let entity = h.stage.registry().get(id).unwrap();
        assert!(entity.playback().is_playing());
        assert_eq!(entity.playback().cycle_delays(), vec![100, 150]);
    }

    #[test]
    fn test_download_failure_leaves_entity_usable() {
        let mut h = harness(TransformPolicy::dwell());
        let id = h.stage.spawn("http://h/a.webp".into(), Vec2::ZERO);
        let now = h.stage.now();
        h.stage.apply_asset_events(
            now,
            vec![AssetEvent::DownloadFailed {
                entity: id,
                error: ShoalError::HttpStatus { url: "x".into(), status: 404 },
            }],
        );

        let before = h.stage.registry().get(id).unwrap().position();
        h.stage.tick(TICK);
        let entity = h.stage.registry().get(id).unwrap();
        assert!(entity.playback().is_empty());
        assert_ne!(entity.position(), before);
        assert_eq!(h.stage.surface().item_for(id).unwrap().visual, Visual::Empty);
        assert_eq!(h.stage.stats().assets_failed, 1);
    }

    #[test]
    fn test_results_for_departed_entities_are_dropped() {
        let mut h = harness(TransformPolicy::dwell());
        let id = h.stage.spawn("http://h/a.webp".into(), Vec2::ZERO);
        h.stage.despawn(id).unwrap();

        let now = h.stage.now();
        h.stage.apply_asset_events(now, vec![AssetEvent::Decoded { entity: id, frames: vec![raw(10)] }]);
        assert_eq!(h.stage.surface().hydrated_total(), 0);
        assert!(matches!(h.stage.despawn(id), Err(ShoalError::EntityNotFound(_))));
    }

    #[test]
    fn test_despawn_while_transforming_frees_gate() {
        let mut h = harness(TransformPolicy::instant());
        let id = h.stage.spawn("http://h/a.webp".into(), Vec2::new(2.0, 0.5));
        let now = h.stage.now();
        h.stage.apply_asset_events(now, vec![AssetEvent::Decoded { entity: id, frames: vec![raw(10)] }]);
        h.stage.context().pose.set(hands_over_right_forearm());
        h.stage.tick(TICK);
        assert!(h.stage.gate().is_active());

        h.stage.despawn(id).unwrap();
        assert!(!h.stage.gate().is_active());
        assert_eq!(h.stage.surface().live_textures(), 0);
        assert_eq!(h.stage.stats().despawned, 1);
        assert!(h.stage.registry().is_empty());
    }
}
