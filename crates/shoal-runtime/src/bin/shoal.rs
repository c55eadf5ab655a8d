//! Shoal daemon
//!
//! Connects to the spawn event stream, runs the stage at a fixed rate on a
//! headless surface, and exits on Ctrl-C.
//!
//! Environment:
//! - `SHOAL_STREAM_URL` event stream endpoint
//! - `SHOAL_CODE_ENDPOINT` representational image endpoint
//! - `SHOAL_TICK_HZ` tick rate (default 60)
//! - `SHOAL_POLICY` `instant`, `dwell` or `flat`
//! - `SHOAL_POSE_STDIN` read hand points from stdin, one line of eight
//!   numbers per update: right wrist, right elbow, left wrist, left elbow
//! - `SHOAL_LOG_JSON` emit JSON log lines
//! - `RUST_LOG` log filter (default `info`)

use std::time::Duration;

use shoal_assets::{AssetPipeline, HeadlessSurface};
use shoal_core::{ShoalError, ShoalResult, Vec2};
use shoal_pose::SharedPoseState;
use shoal_runtime::{SceneContext, Stage, StageConfig, TransformPolicy};
use shoal_transport::{IngesterConfig, PoseStreamIngester};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

const DEFAULT_TICK_HZ: f64 = 60.0;
const STATS_INTERVAL: Duration = Duration::from_secs(10);

struct Settings {
    stage: StageConfig,
    ingester: IngesterConfig,
    tick_hz: f64,
    pose_stdin: bool,
}

impl Settings {
    fn from_env() -> ShoalResult<Self> {
        let mut stage = StageConfig::default();
        let mut ingester = IngesterConfig::default();

        if let Ok(url) = std::env::var("SHOAL_STREAM_URL") {
            ingester.url = url;
        }
        if let Ok(endpoint) = std::env::var("SHOAL_CODE_ENDPOINT") {
            stage.assets.code_endpoint = endpoint;
        }
        if let Ok(name) = std::env::var("SHOAL_POLICY") {
            stage.policy = TransformPolicy::named(&name)?;
        }
        let tick_hz = match std::env::var("SHOAL_TICK_HZ") {
            Ok(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|hz| hz.is_finite() && *hz > 0.0)
                .ok_or_else(|| ShoalError::InvalidConfig(format!("SHOAL_TICK_HZ={raw:?}")))?,
            Err(_) => DEFAULT_TICK_HZ,
        };

        stage.validate()?;
        Ok(Settings {
            stage,
            ingester,
            tick_hz,
            pose_stdin: flag("SHOAL_POSE_STDIN"),
        })
    }
}

fn flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref().map(str::trim),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if flag("SHOAL_LOG_JSON") {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

/// Parse "rwx rwy rex rey lwx lwy lex ley"
fn parse_pose_line(line: &str) -> Option<[Vec2; 4]> {
    let values: Vec<f32> = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if values.len() != 8 {
        return None;
    }
    Some([
        Vec2::new(values[0], values[1]),
        Vec2::new(values[2], values[3]),
        Vec2::new(values[4], values[5]),
        Vec2::new(values[6], values[7]),
    ])
}

async fn feed_pose_from_stdin(pose: SharedPoseState) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_pose_line(&line) {
                Some([rw, re, lw, le]) => pose.set_points(rw, re, lw, le),
                None => tracing::debug!(%line, "ignoring pose line"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "pose input failed");
                break;
            }
        }
    }
    tracing::info!("pose input closed");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = Settings::from_env()?;
    tracing::info!(
        stream = %settings.ingester.url,
        tick_hz = settings.tick_hz,
        policy = ?settings.stage.policy,
        "starting shoal"
    );

    let pose = SharedPoseState::new();
    let context = SceneContext::new(pose.clone(), settings.stage.policy.cooldown);

    let client = reqwest::Client::builder().build()?;
    let (ingester, spawns) = PoseStreamIngester::start(settings.ingester, client);

    let pipeline = AssetPipeline::new(settings.stage.assets.clone(), tokio::runtime::Handle::current())?;
    let mut stage = Stage::new(settings.stage, context, spawns, pipeline, HeadlessSurface::new())?;

    if settings.pose_stdin {
        tokio::spawn(feed_pose_from_stdin(pose));
    }

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / settings.tick_hz));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report = tokio::time::interval(STATS_INTERVAL);
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => stage.tick_realtime(),
            _ = report.tick() => {
                tracing::info!(
                    entities = stage.registry().len(),
                    textures = stage.surface().live_textures(),
                    stream_up = ingester.is_running(),
                    stats = ?stage.stats(),
                    "stage status"
                );
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "signal handler failed");
                }
                break;
            }
        }
    }

    tracing::info!("shutting down");
    ingester.shutdown().await;
    tracing::info!(stats = ?stage.stats(), "stopped");
    Ok(())
}
