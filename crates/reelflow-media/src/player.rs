//! The decoder backend contract.
//!
//! A player decodes one source at a time. It never allocates output frames
//! itself: before writing a frame it asks its [`PlayerCallbacks`] for a buffer
//! (`lock_frame`) and hands it back once filled (`unlock_frame`). Both calls
//! happen on the player's own decode thread and may block; that is how the
//! receiving side throttles the decoder.

use reelflow_core::{FrameBuffer, Result, VideoFormat};
use std::path::Path;
use std::sync::Arc;

/// Playback notifications sent by a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Playback started or resumed.
    Playing,
    /// A seek completed; the next frame produced is this source frame.
    PositionChanged(i64),
    /// Playback paused.
    Paused,
    /// Playback stopped and the session closed.
    Stopped,
    /// The last frame of the source was produced.
    EndReached,
}

/// Receiver side of a player session.
pub trait PlayerCallbacks: Send + Sync {
    /// Provide the buffer the next frame is decoded into.
    fn lock_frame(&self) -> FrameBuffer;

    /// Take back a filled buffer. `position` is set to the source frame.
    fn unlock_frame(&self, frame: FrameBuffer);

    /// Handle a playback notification.
    fn player_event(&self, event: PlayerEvent);
}

/// A decoder instance that can be reused across sources.
///
/// Every method except `stop` only queues a request and returns immediately;
/// the outcome is reported through [`PlayerCallbacks::player_event`].
pub trait MediaPlayer: Send + Sync {
    /// Open a source. Frames are produced in `format`.
    fn open(&self, path: &Path, format: VideoFormat, callbacks: Arc<dyn PlayerCallbacks>) -> Result<()>;

    fn play(&self);

    fn pause(&self);

    /// Move to a source frame.
    fn seek(&self, frame: i64);

    /// Close the session and wait for the decode thread to finish.
    ///
    /// Safe to call on a player that was never opened or is already stopped.
    fn stop(&self);
}

pub type SharedPlayer = Arc<dyn MediaPlayer>;

/// Factory for players.
pub trait MediaBackend: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    fn create_player(&self) -> Result<SharedPlayer>;
}
