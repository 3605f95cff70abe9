//! Reelflow Workflow - Frame production engine
//!
//! Turns a timeline of clips into a stream of composited frames:
//! - `ClipWorkflow` drives one decoder session, one frame per request
//! - `TrackWorkflow` picks the clip under the playhead on one track
//! - `MainWorkflow` runs every track per frame behind a barrier and
//!   composites the results
//!
//! Frames move between decoder threads and consumers through a bounded
//! `BufferPool` without copying.

pub mod buffer_pool;
pub mod clip_workflow;
pub mod compositor;
pub mod events;
pub mod main_workflow;
pub mod sync;
pub mod track_workflow;

pub use buffer_pool::{BufferPool, PoolStats};
pub use clip_workflow::{ClipState, ClipSyncHandle, ClipWorkflow};
pub use compositor::blend_over;
pub use events::{ClipListener, NoopListener, TrackListener, WorkflowEvent};
pub use main_workflow::{FrameOutput, MainWorkflow};
pub use sync::{StateMonitor, TrackBarrier, WaitOutcome};
pub use track_workflow::{FrameRequest, TrackLink, TrackWorkflow};
