//! sentryd - edge video-analytics runner daemon
//!
//! This daemon:
//! 1. Resolves the typed runner configuration (JSON file + env overrides)
//! 2. Opens one frame stream per configured source slot
//! 3. Selects the detection backend (local model or remote server) once
//! 4. Drives the round-robin run loop until a termination condition fires
//! 5. Appends per-detection rows and per-round records to the log sinks

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;

use sentry_edge::{
    open_stream, select_backend, DirArtifactSink, LivenessMarker, LoopDelays, RoundAggregator,
    RunLoop, RunMode, RunnerConfig, SourceMultiplexer,
};

#[derive(Parser, Debug)]
#[command(name = "sentryd", about = "Edge video-analytics runner")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, env = "SENTRY_CONFIG")]
    config: Option<PathBuf>,

    /// Process exactly one frame, then exit.
    #[arg(long)]
    single_pass: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = match args.config.as_deref() {
        Some(path) => RunnerConfig::load_from(path)?,
        None => RunnerConfig::load()?,
    };
    std::fs::create_dir_all(&cfg.output_dir)
        .with_context(|| format!("cannot create output dir {}", cfg.output_dir.display()))?;

    log::info!("run_id={} output_dir={}", cfg.run_id, cfg.output_dir.display());
    log::info!(
        "frame {}x{}x{} ({} bytes), {} source(s), backend {:?}",
        cfg.dims.width,
        cfg.dims.height,
        cfg.dims.channels,
        cfg.dims.byte_len(),
        cfg.sources.len(),
        cfg.backend
    );

    // Any collaborator failing here aborts before the loop enters Running.
    let mut mux = SourceMultiplexer::new(cfg.dims, cfg.retry);
    for slot in &cfg.sources {
        let stream = open_stream(&slot.endpoint, cfg.dims)
            .with_context(|| format!("cannot open source {}", slot.id))?;
        mux.attach(slot.id, stream)?;
        log::info!("source {} attached: {}", slot.id, slot.endpoint);
    }

    let backend = select_backend(&cfg.backend)?;

    let detection_log_path = cfg.output_dir.join("predictions.log");
    let detection_log = File::create(&detection_log_path)
        .with_context(|| format!("cannot open {}", detection_log_path.display()))?;
    let round_log = match cfg.round_log_path() {
        Some(path) => Some(Box::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("cannot open round log {}", path.display()))?,
        ) as Box<dyn std::io::Write + Send>),
        None => None,
    };

    let source_ids: Vec<u8> = cfg.sources.iter().map(|s| s.id).collect();
    let aggregator = RoundAggregator::new(
        cfg.run_id,
        source_ids,
        Box::new(detection_log),
        round_log,
        Box::new(DirArtifactSink::new(cfg.output_dir.clone())),
    )?;

    let mode = if args.single_pass || cfg.single_pass {
        RunMode::SinglePass
    } else {
        RunMode::Continuous
    };
    let delays = LoopDelays {
        inter_round: cfg.inter_round_delay,
        inter_attempt: cfg.inter_attempt_delay,
    };
    let liveness = LivenessMarker::new(cfg.liveness_marker_path());

    let mut run_loop = RunLoop::new(mux, backend, aggregator, liveness, mode, delays);

    let term = run_loop.termination_flag();
    ctrlc::set_handler(move || {
        term.store(true, Ordering::SeqCst);
    })
    .context("cannot install signal handler")?;

    run_loop.run()?;
    log::info!("exiting");
    Ok(())
}
