//! Reelflow - headless preview renderer
//!
//! Renders a timeline layout from the first frame to the end and reports
//! throughput. Decoding goes through the synthetic backend, so any layout
//! renders without media on disk.
//!
//! Usage: `reelflow [--config engine.json] [--layout timeline.json]`

mod demo;

use anyhow::{bail, Context, Result};
use reelflow_core::EngineConfig;
use reelflow_effects::EffectsEngine;
use reelflow_media::{MediaLibrary, MediaProbe, SyntheticBackend};
use reelflow_timeline::TimelineLayout;
use reelflow_workflow::{MainWorkflow, WorkflowEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    layout: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(iter.next().context("--config needs a path")?.into()),
            "--layout" => args.layout = Some(iter.next().context("--layout needs a path")?.into()),
            other => bail!("unexpected argument: {}", other),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Reelflow starting...");
    reelflow_media::init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let layout = match &args.layout {
        Some(path) => TimelineLayout::load(path)
            .with_context(|| format!("loading layout {}", path.display()))?,
        None => demo::layout(),
    };

    // Every source the layout references becomes a synthetic media file.
    let library = MediaLibrary::new();
    for clip in &layout.clips {
        library.register(MediaProbe::new(
            clip.source.path.clone(),
            clip.source.frame_count,
            config.frame_rate,
        ));
    }
    let backend = Arc::new(SyntheticBackend::new(library));

    let workflow = MainWorkflow::new(config, backend)?;
    workflow
        .apply_layout(&layout, &EffectsEngine::with_builtins())
        .context("applying layout")?;
    let events = workflow.subscribe();

    info!(length = workflow.length(), "rendering timeline");
    let started = Instant::now();
    let mut frames = 0u64;
    while let Some(frame) = workflow.get_synchrone_output()? {
        frames += 1;
        debug!(frame = ?frame.position, "frame composited");
    }
    let elapsed = started.elapsed();

    let mut completed = 0usize;
    let mut end_reached = false;
    for event in events.try_iter() {
        match event {
            WorkflowEvent::RenderCompleted { .. } => completed += 1,
            WorkflowEvent::EndReached => end_reached = true,
            _ => {}
        }
    }
    if !end_reached {
        warn!("render loop finished without an end-of-timeline event");
    }

    let players = workflow.player_stats();
    info!(
        frames,
        completed,
        elapsed_ms = elapsed.as_millis() as u64,
        fps = frames as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        players_created = players.created,
        players_idle = players.idle,
        "render finished"
    );

    workflow.stop();
    Ok(())
}
