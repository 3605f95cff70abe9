//! Notifications flowing up from clips to tracks to the main workflow.

use reelflow_core::SharedFrameBuffer;
use reelflow_timeline::ClipId;

/// Events published to subscribers of a [`MainWorkflow`](crate::MainWorkflow).
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// The current frame moved.
    FrameChanged(i64),
    /// The current frame moved, as a fraction of the timeline length.
    PositionChanged(f32),
    /// A composited frame is available.
    RenderCompleted { frame: i64, buffer: SharedFrameBuffer },
    /// Playback ran past the last frame of the timeline.
    EndReached,
    /// Every track acknowledged a pause.
    Paused,
}

/// Receives events from clip workflows.
///
/// Called on the decoder thread, possibly while the clip's producer is about
/// to park. Implementations must not block.
pub trait ClipListener: Send + Sync {
    /// A frame was delivered.
    fn render_complete(&self, clip: ClipId);

    /// The producer parked in response to a pause.
    fn paused(&self, clip: ClipId);

    /// The decoder reported end of stream.
    fn end_reached(&self, clip: ClipId);
}

/// Listener ignoring everything.
pub struct NoopListener;

impl ClipListener for NoopListener {
    fn render_complete(&self, _clip: ClipId) {}
    fn paused(&self, _clip: ClipId) {}
    fn end_reached(&self, _clip: ClipId) {}
}

/// Receives events from track workflows. `ticket` identifies the round the
/// event belongs to.
pub trait TrackListener: Send + Sync {
    fn track_render_completed(&self, track: usize, ticket: u64);

    fn track_paused(&self, track: usize, ticket: u64);

    /// The track has no more content.
    fn track_end_reached(&self, track: usize);
}
