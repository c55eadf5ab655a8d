//! End-to-end scenarios
//!
//! Pure-logic scenarios run on a parked runtime (no asset ever arrives).
//! Live scenarios run background work on the test runtime against a local
//! fixture server and settle it before every tick.

use std::collections::HashMap;
use std::time::Duration;

use shoal_assets::{AssetConfig, Visual};
use shoal_core::{SceneTime, Vec2};
use shoal_pose::HandState;
use shoal_runtime::{EntityState, StageConfig, TransformPolicy};
use shoal_transport::RetryPolicy;
use tokio::runtime::Handle;

use crate::{crossed_hands, gif_bytes, png_bytes, AssetServer, HandScript, SceneSimulator};

const TICK: Duration = Duration::from_millis(100);

fn config(policy: TransformPolicy) -> StageConfig {
    StageConfig {
        seed: Some(11),
        assets: AssetConfig {
            download_retry: RetryPolicy::none(),
            ..AssetConfig::default()
        },
        ..StageConfig::with_policy(policy)
    }
}

fn live_config(policy: TransformPolicy, server: &AssetServer) -> StageConfig {
    let mut config = config(policy);
    config.assets.code_endpoint = server.url("/qr");
    config
}

fn ring(sim: &mut SceneSimulator, count: usize, radius: f32, url: &str) {
    for i in 0..count {
        let angle = i as f32 / count as f32 * std::f32::consts::TAU;
        sim.place(url, Vec2::new(radius * angle.cos(), radius * angle.sin()));
    }
}

#[test]
fn test_crowd_never_shares_the_privilege() {
    let mut sim = SceneSimulator::parked(config(TransformPolicy::instant()), TICK).unwrap();
    ring(&mut sim, 8, 2.0, "http://fixtures.invalid/fish.webp");
    sim.set_script(HandScript::hold(crossed_hands(Vec2::ZERO, 1.0)));

    sim.run_for(Duration::from_secs(30));

    let trace = sim.trace();
    assert_eq!(trace.max_privilege_holders, 1);
    assert_eq!(trace.gate_mismatches, 0);
    // The representational image never arrives, so the first holder keeps it.
    assert_eq!(trace.transform_starts.len(), 1);
}

#[test]
fn test_dwell_transforms_once_after_three_seconds() {
    let mut sim = SceneSimulator::parked(config(TransformPolicy::dwell()), TICK).unwrap();
    let id = sim.place("http://fixtures.invalid/fish.webp", Vec2::new(3.0, 0.0));
    sim.set_script(HandScript::hold(crossed_hands(Vec2::ZERO, 1.0)));

    let mut attracted_at: Option<SceneTime> = None;
    for _ in 0..100 {
        sim.step();
        if let Some(EntityState::Attracted { since }) = sim.state_of(id) {
            attracted_at.get_or_insert(since);
        }
    }

    let attracted_at = attracted_at.unwrap();
    let starts = &sim.trace().transform_starts;
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].1, id);
    assert_eq!(starts[0].0.since(attracted_at), Duration::from_secs(3));
}

#[test]
fn test_hands_apart_never_attract() {
    let mut sim = SceneSimulator::parked(config(TransformPolicy::instant()), TICK).unwrap();
    let id = sim.place("http://fixtures.invalid/fish.webp", Vec2::new(1.0, 0.0));
    sim.set_script(HandScript::hold(crossed_hands(Vec2::ZERO, 4.0)));

    sim.run_for(Duration::from_secs(10));

    assert!(sim.stage().last_selection().is_none());
    assert_eq!(sim.state_of(id), Some(EntityState::Idle));
    assert!(sim.trace().transform_starts.is_empty());
}

#[test]
fn test_losing_the_gesture_releases_attraction() {
    let mut sim = SceneSimulator::parked(config(TransformPolicy::dwell()), TICK).unwrap();
    let id = sim.place("http://fixtures.invalid/fish.webp", Vec2::new(3.0, 0.0));
    sim.set_script(
        HandScript::new()
            .at(SceneTime::ZERO, crossed_hands(Vec2::ZERO, 1.0))
            .at(SceneTime::from_millis(2000), HandState::unknown()),
    );

    sim.run_for(Duration::from_millis(1500));
    assert!(matches!(sim.state_of(id), Some(EntityState::Attracted { .. })));

    sim.run_for(Duration::from_secs(5));
    assert_eq!(sim.state_of(id), Some(EntityState::Idle));
    assert!(sim.trace().transform_starts.is_empty());
}

#[test]
fn test_spawn_queue_feeds_the_stage() {
    let mut sim = SceneSimulator::parked(config(TransformPolicy::dwell()), TICK).unwrap();
    sim.queue_spawn(r#"{"url":"http://fixtures.invalid/a.webp"}"#);
    sim.queue_spawn(r#"{"nope":true}"#);
    sim.queue_spawn(r#"{"url":"http://fixtures.invalid/b.webp","name":"b"}"#);

    sim.step();

    let stage = sim.stage();
    assert_eq!(stage.registry().len(), 2);
    assert_eq!(stage.stats().spawns_rejected, 1);
    for entity in stage.registry().iter() {
        assert!(stage.config().bounds.contains(entity.position()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_attempt_still_consumes_cooldown() {
    let server = AssetServer::builder()
        .route("/fish.gif", 200, gif_bytes(&[100, 150]).unwrap())
        .route("/qr", 500, Vec::new())
        .start()
        .await
        .unwrap();
    let mut sim = SceneSimulator::new(live_config(TransformPolicy::dwell(), &server), TICK, Handle::current()).unwrap();
    let id = sim.place(&server.url("/fish.gif"), Vec2::new(3.0, 0.0));
    sim.set_script(HandScript::hold(crossed_hands(Vec2::ZERO, 1.0)));

    sim.run_for_settled(Duration::from_secs(40)).await;

    let trace = sim.trace();
    assert_eq!(trace.transform_starts.len(), 2);
    let gap = trace.min_start_gap().unwrap();
    assert!(gap > Duration::from_secs(30));
    assert!(gap <= Duration::from_secs(30) + TICK);
    assert_eq!(trace.max_privilege_holders, 1);
    assert_eq!(trace.gate_mismatches, 0);

    assert_eq!(sim.stage().stats().transforms_failed, 2);
    assert_eq!(sim.stage().stats().transforms_completed, 0);
    // Failure restarts the animation.
    let entity = sim.stage().registry().get(id).unwrap();
    assert_eq!(entity.playback().len(), 2);
    assert!(entity.playback().is_playing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_download_failure_leaves_a_working_entity() {
    let server = AssetServer::builder()
        .route("/qr", 200, png_bytes(16, 16).unwrap())
        .start()
        .await
        .unwrap();
    let mut sim = SceneSimulator::new(live_config(TransformPolicy::instant(), &server), TICK, Handle::current()).unwrap();
    let id = sim.place(&server.url("/missing.webp"), Vec2::new(4.0, 1.0));

    let start = sim.stage().registry().get(id).unwrap().position();
    for _ in 0..5 {
        sim.step_settled().await;
    }
    let stage = sim.stage();
    let entity = stage.registry().get(id).unwrap();
    assert!(entity.playback().is_empty());
    assert_ne!(entity.position(), start);
    assert_eq!(stage.surface().item_for(id).unwrap().visual, Visual::Empty);
    assert_eq!(stage.stats().assets_failed, 1);
    assert_eq!(stage.surface().live_textures(), 0);

    // Still attractable, still transformable.
    sim.set_script(HandScript::hold(crossed_hands(Vec2::ZERO, 1.0)));
    for _ in 0..100 {
        sim.step_settled().await;
        if matches!(sim.state_of(id), Some(EntityState::Displaying { .. })) {
            break;
        }
    }
    assert!(matches!(sim.state_of(id), Some(EntityState::Displaying { .. })));
    assert!(matches!(
        sim.stage().surface().item_for(id).unwrap().visual,
        Visual::Representation(_)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_despawn_mid_retry_stops_downloads() {
    let server = AssetServer::builder()
        .route("/flaky.webp", 503, Vec::new())
        .start()
        .await
        .unwrap();
    let mut config = live_config(TransformPolicy::instant(), &server);
    config.assets.download_retry = RetryPolicy {
        max_attempts: 10,
        initial_backoff: Duration::from_millis(300),
        max_backoff: Duration::from_millis(300),
    };
    let mut sim = SceneSimulator::new(config, TICK, Handle::current()).unwrap();
    let id = sim.place(&server.url("/flaky.webp"), Vec2::new(2.0, 0.0));

    for _ in 0..100 {
        if server.hits_on("/flaky.webp") > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    sim.stage_mut().despawn(id).unwrap();

    assert!(sim.settle(Duration::from_millis(200)).await);
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(server.hits_on("/flaky.webp"), 1);

    sim.step();
    assert_eq!(sim.stage().stats().assets_failed, 0);
    assert!(sim.stage().registry().get(id).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_playback_follows_frame_timestamps() {
    let server = AssetServer::builder()
        .route("/fish.gif", 200, gif_bytes(&[100, 150, 50]).unwrap())
        .start()
        .await
        .unwrap();
    let dt = Duration::from_millis(50);
    let mut sim = SceneSimulator::new(live_config(TransformPolicy::dwell(), &server), dt, Handle::current()).unwrap();
    let id = sim.place(&server.url("/fish.gif"), Vec2::new(4.0, 1.0));

    sim.step_settled().await;
    let frames: Vec<_> = {
        let entity = sim.stage().registry().get(id).unwrap();
        assert!(entity.playback().is_playing());
        assert_eq!(entity.playback().cycle_delays(), vec![100, 150, 50]);
        entity.playback().frames().iter().map(|f| f.texture).collect()
    };

    let mut shown: HashMap<usize, u32> = HashMap::new();
    for tick in 0..60 {
        if tick > 0 {
            sim.step();
        }
        let Visual::Animation(texture) = sim.stage().surface().item_for(id).unwrap().visual else {
            panic!("entity should be animating");
        };
        let index = frames.iter().position(|t| *t == texture).unwrap();
        *shown.entry(index).or_default() += 1;
    }

    // Three seconds at 50 ms: each frame's share matches its delay.
    assert_eq!(shown.get(&0), Some(&20));
    assert_eq!(shown.get(&1), Some(&30));
    assert_eq!(shown.get(&2), Some(&10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_cycles_release_representations() {
    let server = AssetServer::builder()
        .route("/fish.gif", 200, gif_bytes(&[100, 150]).unwrap())
        .route("/qr", 200, png_bytes(32, 32).unwrap())
        .start()
        .await
        .unwrap();
    let mut sim = SceneSimulator::new(live_config(TransformPolicy::instant(), &server), TICK, Handle::current()).unwrap();
    ring(&mut sim, 4, 2.0, &server.url("/fish.gif"));
    sim.set_script(HandScript::hold(crossed_hands(Vec2::ZERO, 1.0)));

    sim.run_for_settled(Duration::from_secs(65)).await;

    let trace = sim.trace();
    assert!(trace.transform_starts.len() >= 3);
    assert_eq!(trace.max_privilege_holders, 1);
    assert_eq!(trace.gate_mismatches, 0);
    assert!(trace.min_start_gap().unwrap() >= Duration::from_secs(20));

    let stage = sim.stage();
    assert!(stage.stats().transforms_completed >= 2);
    let displaying = stage
        .registry()
        .iter()
        .filter(|e| matches!(e.state(), EntityState::Displaying { .. }))
        .count();
    // Animation frames plus at most the one image on display.
    assert_eq!(stage.surface().live_textures(), 4 * 2 + displaying);
    assert_eq!(
        stage.surface().released_total(),
        stage.stats().transforms_completed
    );
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_gate_invariants_hold_under_random_gestures(
            positions in proptest::collection::vec((-8.0f32..8.0, -4.0f32..4.0), 1..8),
            toggles in proptest::collection::vec((0u64..20_000, any::<bool>()), 0..12),
        ) {
            let mut sim = SceneSimulator::parked(config(TransformPolicy::flat_cooldown()), TICK).unwrap();
            for (x, y) in positions {
                sim.place("http://fixtures.invalid/fish.webp", Vec2::new(x, y));
            }
            let mut script = HandScript::new();
            for (at, together) in toggles {
                let spacing = if together { 1.0 } else { 6.0 };
                script = script.at(SceneTime::from_millis(at), crossed_hands(Vec2::ZERO, spacing));
            }
            sim.set_script(script);

            sim.run_for(Duration::from_secs(20));

            let trace = sim.trace();
            prop_assert!(trace.max_privilege_holders <= 1);
            prop_assert_eq!(trace.gate_mismatches, 0);
            prop_assert!(trace.transform_starts.len() <= 1);
        }
    }
}
