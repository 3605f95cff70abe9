//! Reelflow Timeline - What gets played
//!
//! Clip descriptors handed to the workflows, and the JSON layout documents
//! describing where clips and effects sit on the timeline.

pub mod clip;
pub mod layout;

pub use clip::{Clip, ClipId, ClipRef};
pub use layout::{ClipPlacement, EffectPlacement, TimelineLayout};
