//! # Tessera Node
//!
//! ```text
//! tessera_node <server|client|host> [config.toml] [seconds]
//! ```
//!
//! Builds the demo scene, starts the session for the chosen role and runs a
//! 60 Hz frame loop. Without `seconds` it runs until killed. Log filtering
//! follows `RUST_LOG` (default `info`).

use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use tessera::{ActorRegistry, Scene, SceneLayout};
use tessera_net::{NetConfig, NetError, NetResult, Role, SceneGate, SessionBuilder};

/// Frame time (60 Hz).
const FRAME: Duration = Duration::from_micros(16_667);

/// Seconds between status lines.
const STATUS_EVERY: Duration = Duration::from_secs(1);

struct Args {
    role: Role,
    config: Option<String>,
    duration: Option<Duration>,
}

fn usage() -> String {
    "usage: tessera_node <server|client|host> [config.toml] [seconds]".to_owned()
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let role = args
        .next()
        .ok_or_else(usage)?
        .parse::<Role>()
        .map_err(|e| format!("{e}\n{}", usage()))?;
    let config = args.next();
    let duration = match args.next() {
        Some(raw) => Some(Duration::from_secs(
            raw.parse::<u64>().map_err(|e| format!("bad duration {raw:?}: {e}"))?,
        )),
        None => None,
    };
    Ok(Args { role, config, duration })
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn run(args: Args) -> NetResult<()> {
    let config = match &args.config {
        Some(path) => NetConfig::load(path)?,
        None => NetConfig::default(),
    };

    let registry = ActorRegistry::new();
    let mut session = SessionBuilder::new(args.role, config)
        .factory(registry.clone())
        .build()?;

    let gate = SceneGate::new();
    let mut scene = Scene::build(&mut session, SceneLayout::default())?;
    gate.mark_ready();
    session.start(&gate)?;

    tracing::info!(
        role = %session.role(),
        gameplay = ?session.gameplay_addr(),
        discovery = ?session.discovery_addr(),
        participant = ?session.participant_addr(),
        "node running"
    );

    let started = Instant::now();
    let mut last_frame = started;
    let mut last_status = started;
    loop {
        let now = Instant::now();
        let dt = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;

        scene.update(&mut session, dt);
        session.tick(dt);

        if now.duration_since(last_status) >= STATUS_EVERY {
            last_status = now;
            let stats = session.stats();
            tracing::info!(
                tick = session.tick_count(),
                link = ?session.link_state(),
                peers = stats.peers,
                remote_actors = registry.len(),
                failed_actions = stats.failed_actions,
                decode_errors = stats.coordinator.decode_errors + stats.participant.decode_errors,
                foreign_packets = stats.participant.foreign_packets,
                "status"
            );
        }

        if args.duration.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        thread::sleep(FRAME.saturating_sub(now.elapsed()));
    }

    session.shutdown();
    tracing::info!(seconds = started.elapsed().as_secs_f32(), "node stopped");
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(NetError::SceneNotReady(ms)) => {
            tracing::error!(timeout_ms = ms, "scene was not ready");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "node failed");
            ExitCode::FAILURE
        }
    }
}
