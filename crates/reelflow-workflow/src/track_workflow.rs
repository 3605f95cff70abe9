//! One track: a set of non-overlapping clips, at most one of them active.

use parking_lot::Mutex;
use reelflow_core::{EngineConfig, FrameRange, ReelflowError, Result, SharedFrameBuffer};
use reelflow_media::PlayerPool;
use reelflow_timeline::{Clip, ClipId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clip_workflow::{ClipSyncHandle, ClipWorkflow};
use crate::events::{ClipListener, TrackListener};

/// What a track does for a requested frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRequest {
    /// A clip is producing the frame; the track reports through its listener.
    Participating,
    /// Nothing to render; the track will not report.
    Idle,
}

/// Shared between a track, its clips and its owner.
///
/// Relays clip events upward tagged with the current round's ticket, and
/// lets the owner cancel clip waits without locking the track.
pub struct TrackLink {
    track: usize,
    listener: Arc<dyn TrackListener>,
    render_ticket: AtomicU64,
    pause_ticket: AtomicU64,
    needs_resync: AtomicBool,
    clips: Mutex<Vec<ClipSyncHandle>>,
}

impl TrackLink {
    fn new(track: usize, listener: Arc<dyn TrackListener>) -> Self {
        Self {
            track,
            listener,
            render_ticket: AtomicU64::new(0),
            pause_ticket: AtomicU64::new(0),
            needs_resync: AtomicBool::new(false),
            clips: Mutex::new(Vec::new()),
        }
    }

    fn register(&self, handle: ClipSyncHandle) {
        let mut clips = self.clips.lock();
        clips.retain(ClipSyncHandle::is_alive);
        clips.push(handle);
    }

    /// Release every blocked clip wait. The next frame request restarts the
    /// active clip instead of trusting its position.
    pub fn cancel(&self) {
        self.needs_resync.store(true, Ordering::SeqCst);
        self.clips.lock().retain(|handle| handle.cancel());
    }
}

impl ClipListener for TrackLink {
    fn render_complete(&self, _clip: ClipId) {
        self.listener
            .track_render_completed(self.track, self.render_ticket.load(Ordering::SeqCst));
    }

    fn paused(&self, _clip: ClipId) {
        self.listener
            .track_paused(self.track, self.pause_ticket.load(Ordering::SeqCst));
    }

    fn end_reached(&self, clip: ClipId) {
        debug!(track = self.track, clip = %clip, "clip ran out of frames");
        self.listener.track_end_reached(self.track);
        // No frame is coming for this round.
        self.listener
            .track_render_completed(self.track, self.render_ticket.load(Ordering::SeqCst));
    }
}

pub struct TrackWorkflow {
    index: usize,
    config: EngineConfig,
    players: Arc<PlayerPool>,
    clips: BTreeMap<i64, ClipWorkflow>,
    active: Option<i64>,
    last_frame: Option<i64>,
    end_reported: bool,
    link: Arc<TrackLink>,
}

impl TrackWorkflow {
    pub fn new(
        index: usize,
        config: EngineConfig,
        players: Arc<PlayerPool>,
        listener: Arc<dyn TrackListener>,
    ) -> Self {
        Self {
            index,
            config,
            players,
            clips: BTreeMap::new(),
            active: None,
            last_frame: None,
            end_reported: false,
            link: Arc::new(TrackLink::new(index, listener)),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn link(&self) -> Arc<TrackLink> {
        self.link.clone()
    }

    /// Frame after the last clip ends.
    pub fn length(&self) -> i64 {
        self.clips
            .iter()
            .next_back()
            .map(|(start, cw)| start + cw.length())
            .unwrap_or(0)
    }

    /// Start of the clip covering `frame`.
    pub fn clip_at(&self, frame: i64) -> Option<i64> {
        let (start, cw) = self.clips.range(..=frame).next_back()?;
        (frame < start + cw.length()).then_some(*start)
    }

    pub fn clip_workflow(&self, start: i64) -> Option<&ClipWorkflow> {
        self.clips.get(&start)
    }

    /// Clip workflow currently driven by this track.
    pub fn active_clip(&self) -> Option<&ClipWorkflow> {
        self.active.and_then(|start| self.clips.get(&start))
    }

    /// Start frame and descriptor of every clip, in timeline order.
    pub fn clips(&self) -> Vec<(i64, Clip)> {
        self.clips.iter().map(|(start, cw)| (*start, cw.clip())).collect()
    }

    pub fn find_clip(&self, id: ClipId) -> Option<i64> {
        self.clips
            .iter()
            .find(|(_, cw)| cw.id() == id)
            .map(|(start, _)| *start)
    }

    /// Drive the clip covering `frame` for round `ticket`.
    pub fn request_frame(&mut self, frame: i64, ticket: u64) -> FrameRequest {
        let target = self.clip_at(frame);
        let previous = self.active;
        if previous != target {
            if let Some(old) = previous.and_then(|start| self.clips.get(&start)) {
                old.stop();
            }
            self.active = None;
        }
        self.link.render_ticket.store(ticket, Ordering::SeqCst);
        let resync = self.link.needs_resync.swap(false, Ordering::SeqCst);
        let last_frame = self.last_frame.replace(frame);

        let Some(start) = target else {
            let length = self.length();
            if length > 0 && frame >= length {
                if !self.end_reported {
                    self.end_reported = true;
                    self.link.listener.track_end_reached(self.index);
                }
            } else {
                self.end_reported = false;
            }
            return FrameRequest::Idle;
        };
        self.end_reported = false;
        self.active = Some(start);

        let Some(cw) = self.clips.get(&start) else {
            return FrameRequest::Idle;
        };
        let offset = frame - start;
        let same_clip = previous == Some(start) && !resync;

        let result = if same_clip && last_frame == Some(frame - 1) && cw.is_end_reached() {
            return FrameRequest::Idle;
        } else if same_clip && cw.is_parked() {
            if last_frame != Some(frame - 1) {
                cw.seek(offset);
            }
            if cw.is_paused() {
                cw.unpause(false);
            }
            cw.wake();
            Ok(())
        } else {
            debug!(track = self.index, start, offset, "starting clip");
            cw.stop();
            cw.initialize_at(offset).and_then(|_| cw.start_render())
        };

        match result {
            Ok(()) => FrameRequest::Participating,
            Err(e) => {
                if !cw.is_end_reached() {
                    warn!(track = self.index, clip = %cw.id(), frame, error = %e, "skipping clip");
                }
                cw.stop();
                self.active = None;
                FrameRequest::Idle
            }
        }
    }

    /// Pause the active clip for round `ticket`.
    ///
    /// Returns true when nothing is left to wait for.
    pub fn pause(&mut self, ticket: u64) -> bool {
        self.link.pause_ticket.store(ticket, Ordering::SeqCst);
        match self.active_clip() {
            Some(cw) => cw.pause(),
            None => true,
        }
    }

    /// Let the active clip render again. The next frame request wakes it.
    pub fn unpause(&mut self) {
        if let Some(cw) = self.active_clip() {
            cw.unpause(false);
        }
    }

    /// Frame delivered by the active clip.
    pub fn take_output(&self) -> Option<SharedFrameBuffer> {
        self.active_clip().and_then(ClipWorkflow::get_output)
    }

    pub fn stop(&mut self) {
        for cw in self.clips.values() {
            cw.stop();
        }
        self.active = None;
        self.last_frame = None;
        self.end_reported = false;
    }

    fn check_free(&self, range: FrameRange, ignore: Option<ClipId>) -> Result<()> {
        if range.start < 0 {
            return Err(ReelflowError::InvalidParameter(format!(
                "clip start {} is negative",
                range.start
            )));
        }
        for (start, cw) in &self.clips {
            if Some(cw.id()) == ignore {
                continue;
            }
            if FrameRange::new(*start, start + cw.length()).overlaps(range) {
                return Err(ReelflowError::Timeline(format!(
                    "track {} already has clip {} at [{}, {})",
                    self.index,
                    cw.id(),
                    start,
                    start + cw.length()
                )));
            }
        }
        Ok(())
    }

    /// Deactivate the clip at `start` if it is the active one.
    fn release_active(&mut self, start: i64) {
        if self.active == Some(start) {
            if let Some(cw) = self.clips.get(&start) {
                cw.stop();
            }
            self.active = None;
        }
    }

    pub fn add_clip(&mut self, clip: Clip, start: i64) -> Result<ClipId> {
        self.check_free(FrameRange::new(start, start + clip.length()), None)?;
        let id = clip.id;
        let cw = ClipWorkflow::new(clip, &self.config, self.players.clone());
        cw.set_listener(self.link.clone());
        self.link.register(cw.sync_handle());
        self.clips.insert(start, cw);
        info!(track = self.index, clip = %id, start, "clip added");
        Ok(id)
    }

    fn locate(&self, id: ClipId) -> Result<i64> {
        self.find_clip(id).ok_or_else(|| {
            ReelflowError::NotFound(format!("clip {} is not on track {}", id, self.index))
        })
    }

    /// Remove a clip, stopping it first.
    pub fn remove_clip(&mut self, id: ClipId) -> Result<Clip> {
        let start = self.locate(id)?;
        self.release_active(start);
        let cw = self
            .clips
            .remove(&start)
            .ok_or_else(|| ReelflowError::Internal(format!("clip {} vanished", id)))?;
        cw.stop();
        info!(track = self.index, clip = %id, "clip removed");
        Ok(cw.clip())
    }

    pub fn move_clip(&mut self, id: ClipId, new_start: i64) -> Result<()> {
        let start = self.locate(id)?;
        if start == new_start {
            return Ok(());
        }
        let length = self.clips.get(&start).map_or(0, ClipWorkflow::length);
        self.check_free(FrameRange::new(new_start, new_start + length), Some(id))?;
        self.release_active(start);
        if let Some(cw) = self.clips.remove(&start) {
            cw.stop();
            self.clips.insert(new_start, cw);
        }
        debug!(track = self.index, clip = %id, from = start, to = new_start, "clip moved");
        Ok(())
    }

    /// Change a clip's in and out points, keeping its start.
    pub fn resize_clip(&mut self, id: ClipId, begin: i64, end: i64) -> Result<()> {
        let start = self.locate(id)?;
        self.check_free(FrameRange::new(start, start + (end - begin)), Some(id))?;
        self.release_active(start);
        let cw = self
            .clips
            .get(&start)
            .ok_or_else(|| ReelflowError::Internal(format!("clip {} vanished", id)))?;
        cw.update_clip(|clip| clip.set_range(begin, end))
    }
}

impl Drop for TrackWorkflow {
    fn drop(&mut self) {
        self.stop();
    }
}
