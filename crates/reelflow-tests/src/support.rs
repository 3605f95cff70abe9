//! Shared fixtures.

use reelflow_core::{EngineConfig, FrameRate, PixelFormat, Rgba8, VideoFormat};
use reelflow_media::{FramePainter, MediaLibrary, MediaProbe, SyntheticBackend};
use reelflow_timeline::{Clip, ClipRef};
use reelflow_workflow::MainWorkflow;
use std::sync::Arc;

pub const SOURCE_FRAMES: i64 = 500;

pub fn config() -> EngineConfig {
    EngineConfig {
        video: VideoFormat::new(16, 9, PixelFormat::Rgba8),
        track_count: 8,
        render_timeout_ms: 10_000,
        init_timeout_ms: 10_000,
        ..EngineConfig::default()
    }
}

pub fn library(sources: &[&str]) -> MediaLibrary {
    let library = MediaLibrary::new();
    for source in sources {
        library.register(MediaProbe::new(*source, SOURCE_FRAMES, FrameRate::FPS_25));
    }
    library
}

/// Workflow with one solid color per source.
pub fn workflow(sources: &[&str]) -> MainWorkflow {
    MainWorkflow::new(config(), Arc::new(SyntheticBackend::new(library(sources)))).unwrap()
}

pub fn workflow_with_painter(sources: &[&str], painter: FramePainter) -> MainWorkflow {
    workflow_with_config(config(), sources, painter)
}

pub fn workflow_with_config(config: EngineConfig, sources: &[&str], painter: FramePainter) -> MainWorkflow {
    let backend = SyntheticBackend::new(library(sources)).with_painter(painter);
    MainWorkflow::new(config, Arc::new(backend)).unwrap()
}

/// Painter writing the source frame number into the red channel.
pub fn position_painter() -> FramePainter {
    Arc::new(|_path, position, frame| frame.fill(Rgba8::opaque((position % 256) as u8, 0, 0)))
}

pub fn clip(source: &str, begin: i64, end: i64) -> Clip {
    Clip::with_range(source, ClipRef::new(source, SOURCE_FRAMES), begin, end).unwrap()
}
