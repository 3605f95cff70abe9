//! Reelflow Core - Foundation types for the playback engine
//!
//! This crate provides the fundamental types shared by every other crate:
//! - Frame positions, frame rates and frame ranges
//! - Pixel buffers exchanged between decoders and the compositor
//! - Engine configuration
//! - The common error type

pub mod config;
pub mod error;
pub mod frame;
pub mod time;

pub use config::{EngineConfig, VideoFormat};
pub use error::{ReelflowError, Result};
pub use frame::{FrameBuffer, PixelFormat, Rgba8, SharedFrameBuffer};
pub use time::{FrameRange, FrameRate, RationalTime};

/// Default values used when no configuration file overrides them.
pub mod defaults {
    /// Buffers preallocated per clip workflow.
    pub const BUFFER_POOL_SIZE: usize = 5;

    /// Output width in pixels.
    pub const VIDEO_WIDTH: u32 = 640;

    /// Output height in pixels.
    pub const VIDEO_HEIGHT: u32 = 480;

    /// Tracks created with a new workflow.
    pub const TRACK_COUNT: usize = 64;

    /// Idle decoder players kept around for reuse.
    pub const MAX_IDLE_PLAYERS: usize = 8;

    /// How long a caller waits for every track to deliver a frame.
    pub const RENDER_TIMEOUT_MS: u64 = 3000;

    /// How long a caller waits for the decoder handshake of a clip.
    pub const INIT_TIMEOUT_MS: u64 = 3000;
}
