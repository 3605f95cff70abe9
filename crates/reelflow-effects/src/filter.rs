//! Filters and ordered filter lists.

use reelflow_core::{FrameBuffer, FrameRange, Result};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A single-input video effect.
pub trait FilterInstance: Send + Sync {
    fn name(&self) -> &str;

    /// Prepare for frames of the given size. Called before first use and
    /// whenever the output size changes.
    fn init(&self, _width: u32, _height: u32) {}

    /// Render `input` at `time` seconds into `output`, which has the same
    /// dimensions and format.
    fn process(&self, time: f64, input: &FrameBuffer, output: &mut FrameBuffer) -> Result<()>;
}

pub type SharedFilter = Arc<dyn FilterInstance>;

/// A filter attached to a range of frames.
#[derive(Clone)]
pub struct FilterEntry {
    pub filter: SharedFilter,
    pub range: FrameRange,
}

impl fmt::Debug for FilterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEntry")
            .field("filter", &self.filter.name())
            .field("range", &self.range)
            .finish()
    }
}

/// Filters applied in insertion order.
#[derive(Clone, Debug, Default)]
pub struct FilterList {
    entries: Vec<FilterEntry>,
}

impl FilterList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: SharedFilter, range: FrameRange) {
        self.entries.push(FilterEntry { filter, range });
    }

    /// Remove every entry using `filter`. Returns how many were removed.
    pub fn remove(&mut self, filter: &SharedFilter) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !Arc::ptr_eq(&e.filter, filter));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    pub fn init(&self, width: u32, height: u32) {
        for entry in &self.entries {
            entry.filter.init(width, height);
        }
    }

    /// Entries whose range contains `frame`, in application order.
    pub fn active_at(&self, frame: i64) -> SmallVec<[&FilterEntry; 4]> {
        self.entries.iter().filter(|e| e.range.contains(frame)).collect()
    }

    /// Run every filter active at `frame` over `target`.
    ///
    /// Filters ping-pong between `target` and `scratch`; the result always
    /// ends up in `target`. `scratch` is reallocated if its size is wrong.
    pub fn apply(&self, frame: i64, time: f64, target: &mut FrameBuffer, scratch: &mut FrameBuffer) -> Result<()> {
        let active = self.active_at(frame);
        if active.is_empty() {
            return Ok(());
        }
        if !scratch.is_compatible(target) {
            *scratch = FrameBuffer::new(target.width, target.height, target.format);
        }
        for entry in active {
            trace!(filter = entry.filter.name(), frame, "applying filter");
            entry.filter.process(time, target, scratch)?;
            scratch.position = target.position;
            std::mem::swap(target, scratch);
        }
        Ok(())
    }
}
