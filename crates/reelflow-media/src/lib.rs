//! Reelflow Media - Decoder backends
//!
//! This crate handles:
//! - The contract between workflows and a decoding backend
//! - Pooling of decoder players between clips
//! - Media probing
//! - A thread-backed synthetic backend used for previews and tests

pub mod player;
pub mod pool;
pub mod probe;
pub mod synthetic;

pub use player::{MediaBackend, MediaPlayer, PlayerCallbacks, PlayerEvent, SharedPlayer};
pub use pool::{ObjectPool, PlayerPool};
pub use probe::MediaProbe;
pub use synthetic::{FramePainter, MediaLibrary, SyntheticBackend, SyntheticPlayer};

/// Initialize the media layer (call once at startup).
pub fn init() {
    tracing::info!("Reelflow Media initialized");
}
