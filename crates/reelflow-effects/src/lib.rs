//! Reelflow Effects - CPU filters and mixers
//!
//! Filters rewrite a single frame, mixers blend two layers together. Both are
//! attached to frame ranges: filter lists run every filter active at a frame
//! in insertion order, mixer lists hold at most one mixer per frame.

pub mod engine;
pub mod filter;
pub mod filters;
pub mod mixer;
pub mod mixers;

pub use engine::{EffectKind, EffectsEngine};
pub use filter::{FilterEntry, FilterInstance, FilterList, SharedFilter};
pub use filters::{Brightness, Grayscale, Invert};
pub use mixer::{MixerEntry, MixerInstance, MixerList, SharedMixer};
pub use mixers::{CrossDissolve, DipToBlack};

use reelflow_core::{FrameBuffer, ReelflowError, Result};

/// Fail unless `output` can receive the pixels of `input`.
pub fn ensure_compatible(input: &FrameBuffer, output: &FrameBuffer) -> Result<()> {
    if input.is_compatible(output) {
        Ok(())
    } else {
        Err(ReelflowError::Effect(format!(
            "frame mismatch: {}x{} {:?} into {}x{} {:?}",
            input.width, input.height, input.format, output.width, output.height, output.format
        )))
    }
}
