//! `session run`: drive one breathing session to completion.
//!
//! Events are printed as JSON lines on stdout. With `--simulate` a manual
//! clock is advanced instead of sleeping, so a whole session runs instantly.

use std::time::Duration;

use breathflow_core::{
    CapabilityProbe, Config, FeatureRequest, HttpSessionSink, ManualTimeSource, PatternSource,
    SessionConfig, SessionEvent, SessionFlow, SessionOrchestrator, SessionPhase, SessionVariant,
    StaticProbe, SystemTimeSource, TimeSource,
};
use clap::{Args, Subcommand};

use super::{open_store, runtime, CliResult};

const TICK_MS: u64 = 100;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Run a session and store the result
    Run(RunArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Pattern id; defaults to session.pattern_id
    #[arg(long)]
    pattern: Option<String>,
    /// Stop after this many cycles; defaults to session.target_cycles
    #[arg(long)]
    cycles: Option<u32>,
    /// Stop after this many seconds of active breathing
    #[arg(long)]
    max_secs: Option<u64>,
    /// Request camera tracking
    #[arg(long)]
    camera: bool,
    /// Request AI feedback (needs the camera)
    #[arg(long)]
    ai: bool,
    /// Do not request audio guidance
    #[arg(long)]
    no_audio: bool,
    /// Session variant: classic, enhanced or mobile
    #[arg(long)]
    mode: Option<SessionVariant>,
    /// Treat the device as touch-capable
    #[arg(long)]
    touch: bool,
    /// Report a camera as present when probing
    #[arg(long)]
    camera_available: bool,
    /// Advance a manual clock instead of waiting in real time
    #[arg(long)]
    simulate: bool,
    /// Do not attempt a sync pass after saving
    #[arg(long)]
    no_sync: bool,
}

pub fn run(action: SessionAction) -> CliResult {
    match action {
        SessionAction::Run(args) => run_session(args),
    }
}

/// How the loop waits between ticks.
enum Pacer {
    Wall,
    Manual(ManualTimeSource),
}

impl Pacer {
    async fn step(&self) {
        match self {
            Pacer::Wall => tokio::time::sleep(Duration::from_millis(TICK_MS)).await,
            Pacer::Manual(time) => time.advance(TICK_MS),
        }
    }
}

fn run_session(args: RunArgs) -> CliResult {
    let config = Config::load()?;
    let pattern_id = args
        .pattern
        .clone()
        .unwrap_or_else(|| config.session.pattern_id.clone());
    let pattern = config
        .pattern_library()
        .pattern(&pattern_id)
        .ok_or_else(|| format!("unknown pattern: {pattern_id}"))?;

    let target_cycles = match args.cycles {
        Some(0) => None,
        Some(n) => Some(n),
        None => config.target_cycles(),
    };
    if target_cycles.is_none() && args.max_secs.is_none() {
        return Err("a session needs --cycles or --max-secs to end".into());
    }

    let defaults = config.feature_request();
    let session_config = SessionConfig {
        pattern,
        features: FeatureRequest {
            camera: args.camera || defaults.camera,
            ai: args.ai || defaults.ai,
            audio: !args.no_audio && defaults.audio,
        },
        display_mode: Default::default(),
        target_cycles,
    };
    let flow = SessionFlow {
        requested: args.mode,
        allow_mobile: config.session.allow_mobile,
        touch_capable: args.touch,
    };
    let probe = StaticProbe {
        camera: args.camera_available,
        audio: true,
        ai: true,
    };

    let rt = runtime()?;
    if args.simulate {
        let time = ManualTimeSource::new();
        let orch = SessionOrchestrator::new(session_config, flow, time.clone());
        rt.block_on(execute(orch, Pacer::Manual(time), &probe, &config, &args))
    } else {
        let orch = SessionOrchestrator::new(session_config, flow, SystemTimeSource::new());
        rt.block_on(execute(orch, Pacer::Wall, &probe, &config, &args))
    }
}

async fn execute<T: TimeSource>(
    mut orch: SessionOrchestrator<T>,
    pacer: Pacer,
    probe: &dyn CapabilityProbe,
    config: &Config,
    args: &RunArgs,
) -> CliResult {
    for event in orch.prepare(probe).await? {
        emit(&event)?;
    }
    emit(&orch.start()?)?;

    let max_ms = args.max_secs.map(|s| s * 1000);
    while orch.phase() == SessionPhase::Active {
        pacer.step().await;
        for event in orch.tick() {
            emit(&event)?;
        }
        let elapsed = orch.metrics().elapsed_ms;
        if max_ms.is_some_and(|max| elapsed >= max) {
            for event in orch.stop() {
                emit(&event)?;
            }
        }
    }

    if orch.phase() != SessionPhase::Complete {
        return Err(orch
            .state()
            .error
            .clone()
            .unwrap_or_else(|| "session did not complete".into())
            .into());
    }

    println!(
        "{}",
        serde_json::json!({ "type": "Metrics", "metrics": orch.metrics() })
    );

    let store = open_store(config)?;
    let id = orch
        .save_to(&store)
        .ok_or("session finished without a record")?;
    println!("{}", serde_json::json!({ "type": "Saved", "id": id }));

    if args.no_sync {
        return Ok(());
    }
    if let Some(endpoint) = &config.sync.endpoint {
        let mut sink = HttpSessionSink::new(endpoint)?;
        if let Some(key) = &config.sync.api_key {
            sink = sink.with_api_key(key.clone());
        }
        // Sync failure never fails the session; the record stays queued.
        match store.sync_once(&sink).await {
            Ok(report) => tracing::info!(synced = report.synced, "post-session sync"),
            Err(e) => eprintln!("sync deferred: {e}"),
        }
    }
    Ok(())
}

fn emit(event: &SessionEvent) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
