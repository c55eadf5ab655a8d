//! Scene simulator
//!
//! Drives a [`Stage`] on a fixed tick with scripted hands and records the
//! invariants every tick must keep.

use std::time::Duration;

use shoal_assets::{AssetPipeline, HeadlessSurface};
use shoal_core::{EntityId, SceneTime, ShoalResult, Vec2};
use shoal_pose::{HandState, SharedPoseState};
use shoal_runtime::{EntityState, SceneContext, Stage, StageConfig};
use shoal_transport::SpawnSender;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;

/// Piecewise-constant hand input over scene time
#[derive(Clone, Debug, Default)]
pub struct HandScript {
    keyframes: Vec<(SceneTime, HandState)>,
}

impl HandScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// The same hands for the whole run
    pub fn hold(hands: HandState) -> Self {
        Self::new().at(SceneTime::ZERO, hands)
    }

    /// From `time` on, report `hands`
    pub fn at(mut self, time: SceneTime, hands: HandState) -> Self {
        self.keyframes.push((time, hands));
        self.keyframes.sort_by_key(|(t, _)| *t);
        self
    }

    /// Hands in effect at `time`; unknown before the first keyframe
    pub fn hands_at(&self, time: SceneTime) -> HandState {
        self.keyframes
            .iter()
            .rev()
            .find(|(t, _)| *t <= time)
            .map(|(_, hands)| *hands)
            .unwrap_or_default()
    }
}

/// Wrists `spacing` apart around `center` with crossed forearms, so both
/// forearms pass near the centroid.
pub fn crossed_hands(center: Vec2, spacing: f32) -> HandState {
    let half = spacing / 2.0;
    HandState::new(
        center + Vec2::new(-half, 0.0),
        center + Vec2::new(3.0, -2.0),
        center + Vec2::new(half, 0.0),
        center + Vec2::new(-3.0, -2.0),
    )
}

/// What the simulator observed across ticks
#[derive(Clone, Debug, Default)]
pub struct SceneTrace {
    pub ticks: u64,
    /// Largest number of Transforming/Displaying entities seen after a tick
    pub max_privilege_holders: usize,
    /// Attempt starts, in order
    pub transform_starts: Vec<(SceneTime, EntityId)>,
    /// Ticks where the gate flag disagreed with the entity states
    pub gate_mismatches: u64,
}

impl SceneTrace {
    /// Smallest gap between consecutive attempt starts
    pub fn min_start_gap(&self) -> Option<Duration> {
        self.transform_starts
            .windows(2)
            .map(|w| w[1].0.since(w[0].0))
            .min()
    }
}

pub struct SceneSimulator {
    stage: Stage<HeadlessSurface>,
    pose: SharedPoseState,
    spawns: SpawnSender,
    dt: Duration,
    script: HandScript,
    trace: SceneTrace,
    // Holds background tasks without ever running them.
    _parked: Option<Runtime>,
}

impl SceneSimulator {
    /// Background work runs on `runtime`
    pub fn new(config: StageConfig, dt: Duration, runtime: Handle) -> ShoalResult<Self> {
        Self::build(config, dt, runtime, None)
    }

    /// Background work is queued on a runtime that never runs, so no
    /// asset ever arrives unless injected through the stage
    pub fn parked(config: StageConfig, dt: Duration) -> ShoalResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| shoal_core::ShoalError::Transport(e.to_string()))?;
        let handle = runtime.handle().clone();
        Self::build(config, dt, handle, Some(runtime))
    }

    fn build(config: StageConfig, dt: Duration, runtime: Handle, parked: Option<Runtime>) -> ShoalResult<Self> {
        let pose = SharedPoseState::new();
        let context = SceneContext::new(pose.clone(), config.policy.cooldown);
        let pipeline = AssetPipeline::new(config.assets.clone(), runtime)?;
        let (spawns, queue) = mpsc::unbounded_channel();
        let stage = Stage::new(config, context, queue, pipeline, HeadlessSurface::new())?;

        Ok(SceneSimulator {
            stage,
            pose,
            spawns,
            dt,
            script: HandScript::new(),
            trace: SceneTrace::default(),
            _parked: parked,
        })
    }

    pub fn set_script(&mut self, script: HandScript) {
        self.script = script;
    }

    pub fn stage(&self) -> &Stage<HeadlessSurface> {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut Stage<HeadlessSurface> {
        &mut self.stage
    }

    pub fn trace(&self) -> &SceneTrace {
        &self.trace
    }

    pub fn now(&self) -> SceneTime {
        self.stage.now()
    }

    pub fn dt(&self) -> Duration {
        self.dt
    }

    /// Put an entity straight into the scene
    pub fn place(&mut self, url: &str, position: Vec2) -> EntityId {
        self.stage.spawn(url.to_string(), position)
    }

    /// Push a raw payload onto the spawn queue, as the ingester would
    pub fn queue_spawn(&self, payload: &str) {
        let _ = self.spawns.send(payload.to_string());
    }

    pub fn state_of(&self, id: EntityId) -> Option<EntityState> {
        self.stage.registry().get(id).map(|e| e.state())
    }

    /// One tick: apply scripted hands, tick, record invariants
    pub fn step(&mut self) -> SceneTime {
        let next = self.stage.now() + self.dt;
        self.pose.set(self.script.hands_at(next));

        let begun_before = self.stage.stats().transforms_begun;
        self.stage.tick(self.dt);
        let now = self.stage.now();

        let holders = self.stage.registry().privilege_holders();
        self.trace.ticks += 1;
        self.trace.max_privilege_holders = self.trace.max_privilege_holders.max(holders);
        if self.stage.gate().is_active() != (holders == 1) {
            self.trace.gate_mismatches += 1;
        }
        if self.stage.stats().transforms_begun > begun_before {
            for entity in self.stage.registry().iter() {
                if let EntityState::Transforming { started, .. } = entity.state() {
                    if started == now {
                        self.trace.transform_starts.push((now, entity.id()));
                    }
                }
            }
        }
        now
    }

    pub fn run_ticks(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Tick until at least `duration` of scene time has passed
    pub fn run_for(&mut self, duration: Duration) {
        let until = self.stage.now() + duration;
        while self.stage.now() < until {
            self.step();
        }
    }

    /// Tick until `done` holds, for at most `max_ticks`
    pub fn run_until<F>(&mut self, max_ticks: u64, mut done: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        for _ in 0..max_ticks {
            if done(self) {
                return true;
            }
            self.step();
        }
        done(self)
    }

    /// Wait (in real time) until no background task is in flight
    pub async fn settle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.stage.pipeline().in_flight() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    /// Settle background work, then tick
    pub async fn step_settled(&mut self) -> SceneTime {
        self.settle(Duration::from_secs(5)).await;
        self.step()
    }

    /// Settled ticks until at least `duration` of scene time has passed
    pub async fn run_for_settled(&mut self, duration: Duration) {
        let until = self.stage.now() + duration;
        while self.stage.now() < until {
            self.step_settled().await;
        }
    }
}
