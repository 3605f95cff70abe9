//! Timeline-level orchestration.
//!
//! The main workflow owns every track. Each output frame is one *round*: all
//! tracks with content at the current frame are asked for a frame at once,
//! the caller waits on the render barrier until each of them delivered (or
//! gave up), then the layers are composited bottom-up and the playhead
//! advances by one.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};
use rayon::prelude::*;
use reelflow_core::{
    EngineConfig, FrameBuffer, FrameRange, ReelflowError, Result, Rgba8, SharedFrameBuffer,
};
use reelflow_effects::{EffectsEngine, FilterList, MixerList, SharedFilter, SharedMixer};
use reelflow_media::{MediaBackend, PlayerPool};
use reelflow_timeline::{Clip, ClipId, TimelineLayout};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::compositor::blend_over;
use crate::events::{TrackListener, WorkflowEvent};
use crate::sync::{TrackBarrier, WaitOutcome};
use crate::track_workflow::{FrameRequest, TrackLink, TrackWorkflow};

/// Result of a non-blocking output poll.
#[derive(Debug, Clone)]
pub enum FrameOutput {
    Frame(SharedFrameBuffer),
    /// Tracks are still rendering.
    Pending,
    /// The playhead is past the last frame.
    EndOfTimeline,
}

/// State shared with the tracks' listeners.
struct MainSignals {
    render_barrier: TrackBarrier,
    pause_barrier: TrackBarrier,
    ended: AtomicBool,
    subscribers: Mutex<Vec<Sender<WorkflowEvent>>>,
}

impl MainSignals {
    fn new() -> Self {
        Self {
            render_barrier: TrackBarrier::new(),
            pause_barrier: TrackBarrier::new(),
            ended: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl TrackListener for MainSignals {
    fn track_render_completed(&self, track: usize, ticket: u64) {
        if !self.render_barrier.arrive(ticket, track) {
            debug!(track, ticket, "ignored stale render completion");
        }
    }

    fn track_paused(&self, track: usize, ticket: u64) {
        self.pause_barrier.arrive(ticket, track);
    }

    /// Informational only: the end of the timeline is decided by
    /// `MainWorkflow::open_round`, which calls `declare_end` once the
    /// playhead reaches the timeline length.
    fn track_end_reached(&self, track: usize) {
        debug!(track, "track has no more content");
    }
}

#[derive(Debug, Clone, Copy)]
struct Round {
    frame: i64,
    ticket: u64,
    /// No track had content; the blank frame is the result.
    idle: bool,
}

struct Effects {
    global: FilterList,
    track_filters: Vec<FilterList>,
    track_mixers: Vec<MixerList>,
    scratch: FrameBuffer,
    layer: FrameBuffer,
    mixed: FrameBuffer,
}

pub struct MainWorkflow {
    config: EngineConfig,
    tracks: Mutex<Vec<TrackWorkflow>>,
    links: Vec<Arc<TrackLink>>,
    signals: Arc<MainSignals>,
    effects: Mutex<Effects>,
    output: Mutex<SharedFrameBuffer>,
    round: Mutex<Option<Round>>,
    /// Serializes consumers; the round itself is guarded by `round`.
    render_lock: Mutex<()>,
    current_frame: AtomicI64,
    length: AtomicI64,
    paused: AtomicBool,
    players: Arc<PlayerPool>,
    blank: SharedFrameBuffer,
}

impl MainWorkflow {
    pub fn new(config: EngineConfig, backend: Arc<dyn MediaBackend>) -> Result<Self> {
        config.validate()?;
        let players = Arc::new(PlayerPool::for_backend(backend, config.max_idle_players));
        let signals = Arc::new(MainSignals::new());

        let tracks: Vec<TrackWorkflow> = (0..config.track_count)
            .map(|index| TrackWorkflow::new(index, config.clone(), players.clone(), signals.clone()))
            .collect();
        let links = tracks.iter().map(TrackWorkflow::link).collect();

        let video = config.video;
        let frame = || FrameBuffer::new(video.width, video.height, video.pixel_format);
        let blank = Arc::new(FrameBuffer::blank(video.width, video.height, video.pixel_format));
        let effects = Effects {
            global: FilterList::new(),
            track_filters: (0..config.track_count).map(|_| FilterList::new()).collect(),
            track_mixers: (0..config.track_count).map(|_| MixerList::new()).collect(),
            scratch: frame(),
            layer: frame(),
            mixed: frame(),
        };

        info!(
            tracks = config.track_count,
            width = video.width,
            height = video.height,
            "main workflow created"
        );

        Ok(Self {
            tracks: Mutex::new(tracks),
            links,
            signals,
            effects: Mutex::new(effects),
            output: Mutex::new(Arc::new(frame())),
            round: Mutex::new(None),
            render_lock: Mutex::new(()),
            current_frame: AtomicI64::new(0),
            length: AtomicI64::new(0),
            paused: AtomicBool::new(false),
            players,
            blank,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn track_count(&self) -> usize {
        self.config.track_count
    }

    pub fn current_frame(&self) -> i64 {
        self.current_frame.load(Ordering::SeqCst)
    }

    /// Frames on the timeline: the end of the last clip on any track.
    pub fn length(&self) -> i64 {
        self.length.load(Ordering::SeqCst)
    }

    /// Playhead as a fraction of the timeline length.
    pub fn position(&self) -> f32 {
        self.fraction(self.current_frame())
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_end_reached(&self) -> bool {
        self.signals.ended.load(Ordering::SeqCst)
    }

    pub fn blank_frame(&self) -> SharedFrameBuffer {
        self.blank.clone()
    }

    pub fn player_stats(&self) -> reelflow_media::pool::PoolStats {
        self.players.stats()
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> Receiver<WorkflowEvent> {
        let (tx, rx) = unbounded();
        self.signals.subscribers.lock().push(tx);
        rx
    }

    /// Clips on `track` with their start frames.
    pub fn clips(&self, track: usize) -> Result<Vec<(i64, Clip)>> {
        let tracks = self.tracks.lock();
        let track = tracks
            .get(track)
            .ok_or_else(|| Self::no_such_track(track, tracks.len()))?;
        Ok(track.clips())
    }

    /// Track and start frame of a clip.
    pub fn find_clip(&self, id: ClipId) -> Option<(usize, i64)> {
        let tracks = self.tracks.lock();
        tracks
            .iter()
            .find_map(|t| t.find_clip(id).map(|start| (t.index(), start)))
    }

    fn fraction(&self, frame: i64) -> f32 {
        let length = self.length();
        if length > 0 {
            (frame as f64 / length as f64) as f32
        } else {
            0.0
        }
    }

    fn notify_position(&self, frame: i64) {
        self.signals.emit(WorkflowEvent::FrameChanged(frame));
        self.signals
            .emit(WorkflowEvent::PositionChanged(self.fraction(frame)));
    }

    fn no_such_track(track: usize, count: usize) -> ReelflowError {
        ReelflowError::InvalidParameter(format!("track {} out of range (0..{})", track, count))
    }

    // --- Rendering -------------------------------------------------------

    /// Begin rendering the current frame without waiting for it.
    ///
    /// Returns false at the end of the timeline. A round already in flight
    /// is left alone.
    pub fn start_render(&self) -> bool {
        self.open_round().is_some()
    }

    /// Render the current frame and advance the playhead.
    ///
    /// Blocks until every participating track delivered, bounded by the
    /// configured render timeout. After a timeout the round stays open and
    /// the next call keeps waiting for it. Returns `Ok(None)` once the
    /// playhead reached the end of the timeline.
    pub fn get_synchrone_output(&self) -> Result<Option<SharedFrameBuffer>> {
        let _consumer = self.render_lock.lock();
        let Some(round) = self.open_round() else {
            return Ok(None);
        };
        if !round.idle {
            match self
                .signals
                .render_barrier
                .wait(round.ticket, Some(self.config.render_timeout()))
            {
                WaitOutcome::Reached => {}
                WaitOutcome::TimedOut => {
                    let pending = self.signals.render_barrier.remaining(round.ticket);
                    warn!(frame = round.frame, ?pending, "render timed out");
                    return Err(ReelflowError::Timeout(format!(
                        "frame {} still waiting for tracks {:?}",
                        round.frame, pending
                    )));
                }
                WaitOutcome::Cancelled => {
                    self.abandon_round(round.ticket);
                    return Err(ReelflowError::Cancelled);
                }
            }
        }
        self.finish_round(round).map(Some)
    }

    /// Poll for the current frame. Starts a round when none is in flight.
    pub fn get_output(&self) -> Result<FrameOutput> {
        let Some(_consumer) = self.render_lock.try_lock() else {
            return Ok(FrameOutput::Pending);
        };
        let Some(round) = self.open_round() else {
            return Ok(FrameOutput::EndOfTimeline);
        };
        if !round.idle {
            match self
                .signals
                .render_barrier
                .wait(round.ticket, Some(Duration::ZERO))
            {
                WaitOutcome::Reached => {}
                WaitOutcome::TimedOut => return Ok(FrameOutput::Pending),
                WaitOutcome::Cancelled => {
                    self.abandon_round(round.ticket);
                    return Err(ReelflowError::Cancelled);
                }
            }
        }
        self.finish_round(round).map(FrameOutput::Frame)
    }

    /// The round in flight, or a new one for the current frame.
    fn open_round(&self) -> Option<Round> {
        let mut slot = self.round.lock();
        if let Some(round) = *slot {
            if !self.signals.render_barrier.is_cancelled(round.ticket) {
                return Some(round);
            }
        }
        *slot = None;

        let frame = self.current_frame();
        let mut tracks = self.tracks.lock();
        if frame >= self.length() {
            self.declare_end(&mut tracks);
            return None;
        }
        let round = self.begin_round(&mut tracks, frame);
        *slot = Some(round);
        Some(round)
    }

    fn begin_round(&self, tracks: &mut [TrackWorkflow], frame: i64) -> Round {
        if self.paused.swap(false, Ordering::SeqCst) {
            debug!(frame, "resuming for next frame");
            for track in tracks.iter_mut() {
                track.unpause();
            }
        }

        let participants: SmallVec<[usize; 8]> = tracks
            .iter()
            .filter(|t| t.clip_at(frame).is_some())
            .map(TrackWorkflow::index)
            .collect();
        let barrier = &self.signals.render_barrier;
        let ticket = barrier.begin(participants.iter().copied());

        // Every track sees the request so the ones without content can
        // release the clip they were playing.
        let idle: Vec<usize> = tracks
            .par_iter_mut()
            .filter_map(|track| match track.request_frame(frame, ticket) {
                FrameRequest::Participating => None,
                FrameRequest::Idle => Some(track.index()),
            })
            .collect();
        for track in idle {
            barrier.arrive(ticket, track);
        }

        debug!(frame, ticket, tracks = participants.len(), "render round started");
        Round {
            frame,
            ticket,
            idle: participants.is_empty(),
        }
    }

    fn abandon_round(&self, ticket: u64) {
        let mut slot = self.round.lock();
        if matches!(*slot, Some(round) if round.ticket == ticket) {
            *slot = None;
        }
    }

    fn declare_end(&self, tracks: &mut [TrackWorkflow]) {
        if !self.signals.ended.swap(true, Ordering::SeqCst) {
            info!(length = self.length(), "end of timeline");
            for track in tracks.iter_mut() {
                track.stop();
            }
            self.signals.emit(WorkflowEvent::EndReached);
        }
    }

    fn finish_round(&self, round: Round) -> Result<SharedFrameBuffer> {
        let composited = if round.idle {
            Ok(self.blank.clone())
        } else {
            let tracks = self.tracks.lock();
            self.composite(&tracks, round.frame)
        };

        {
            let mut slot = self.round.lock();
            if !matches!(*slot, Some(current) if current.ticket == round.ticket) {
                return Err(ReelflowError::Cancelled);
            }
            *slot = None;
        }
        let buffer = composited?;

        let next = round.frame + 1;
        if self
            .current_frame
            .compare_exchange(round.frame, next, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(frame = round.frame, "playhead moved during render");
        }
        self.signals.emit(WorkflowEvent::RenderCompleted {
            frame: round.frame,
            buffer: buffer.clone(),
        });
        self.notify_position(next);
        Ok(buffer)
    }

    /// Stack the tracks' frames, track 0 at the bottom.
    fn composite(&self, tracks: &[TrackWorkflow], frame: i64) -> Result<SharedFrameBuffer> {
        let time = self.config.frame_rate.frame_time(frame);
        let mut effects = self.effects.lock();
        let Effects {
            global,
            track_filters,
            track_mixers,
            scratch,
            layer,
            mixed,
        } = &mut *effects;

        let mut output = self.output.lock();
        let out = Arc::make_mut(&mut *output);
        out.fill(Rgba8::BLACK);

        for track in tracks {
            let index = track.index();
            let delivered = track.take_output();
            let mixer = track_mixers[index].mixer_at(frame);
            if delivered.is_none() && mixer.is_none() {
                continue;
            }

            let filters = &track_filters[index];
            let top: &FrameBuffer = match &delivered {
                Some(src) if !filters.active_at(frame).is_empty() => {
                    layer.copy_from(src)?;
                    filters.apply(frame, time, layer, scratch)?;
                    &*layer
                }
                Some(src) => src.as_ref(),
                None => self.blank.as_ref(),
            };

            match mixer {
                Some((entry, progress)) => {
                    entry.mixer.process(time, progress, out, top, mixed)?;
                    std::mem::swap(out, mixed);
                }
                None => blend_over(out, top)?,
            }
        }

        global.apply(frame, time, out, scratch)?;
        out.position = Some(frame);
        Ok(output.clone())
    }

    // --- Transport -------------------------------------------------------

    /// Pause every track with an active clip and wait for the producers to
    /// park. Pausing twice is a no-op.
    pub fn pause(&self) -> Result<()> {
        let barrier = &self.signals.pause_barrier;
        let ticket = {
            let mut tracks = self.tracks.lock();
            if self.paused.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            let participants: SmallVec<[usize; 8]> = tracks
                .iter()
                .filter(|t| t.active_clip().is_some())
                .map(TrackWorkflow::index)
                .collect();
            let ticket = barrier.begin(participants);
            for track in tracks.iter_mut() {
                if track.pause(ticket) {
                    barrier.arrive(ticket, track.index());
                }
            }
            ticket
        };

        match barrier.wait(ticket, Some(self.config.render_timeout())) {
            WaitOutcome::Reached => {
                info!(frame = self.current_frame(), "paused");
                self.signals.emit(WorkflowEvent::Paused);
                Ok(())
            }
            WaitOutcome::TimedOut => {
                self.paused.store(false, Ordering::SeqCst);
                Err(ReelflowError::Timeout(format!(
                    "tracks {:?} did not pause",
                    barrier.remaining(ticket)
                )))
            }
            WaitOutcome::Cancelled => {
                self.paused.store(false, Ordering::SeqCst);
                Err(ReelflowError::Cancelled)
            }
        }
    }

    pub fn unpause(&self) {
        let mut tracks = self.tracks.lock();
        if self.paused.swap(false, Ordering::SeqCst) {
            for track in tracks.iter_mut() {
                track.unpause();
            }
            info!(frame = self.current_frame(), "unpaused");
        }
    }

    /// Lock the round slot, failing while a live round is in flight.
    fn lock_idle(&self, action: &str) -> Result<MutexGuard<'_, Option<Round>>> {
        let mut slot = self.round.lock();
        if let Some(round) = *slot {
            if !self.signals.render_barrier.is_cancelled(round.ticket) {
                return Err(ReelflowError::Timeline(format!(
                    "cannot {} while frame {} is rendering",
                    action, round.frame
                )));
            }
            *slot = None;
        }
        Ok(slot)
    }

    /// Move the playhead to `frame`, clamped to `[0, length]`. Seeking to
    /// `length` parks the playhead at the end of the timeline.
    pub fn seek(&self, frame: i64) -> Result<()> {
        self.seek_within(frame, self.length())
    }

    fn seek_within(&self, frame: i64, last: i64) -> Result<()> {
        let slot = self.lock_idle("move the playhead")?;
        let length = self.length();
        let target = frame.clamp(0, last.min(length));
        self.current_frame.store(target, Ordering::SeqCst);
        if target < length {
            self.signals.ended.store(false, Ordering::SeqCst);
        }
        drop(slot);
        debug!(frame = target, "seek");
        self.notify_position(target);
        Ok(())
    }

    /// Step one frame forward, staying on the last frame of the timeline.
    pub fn next_frame(&self) -> Result<()> {
        self.step(1)
    }

    /// Step one frame back, stopping at frame 0.
    pub fn previous_frame(&self) -> Result<()> {
        self.step(-1)
    }

    fn step(&self, delta: i64) -> Result<()> {
        let last = (self.length() - 1).max(0);
        self.seek_within(self.current_frame() + delta, last)
    }

    /// Seek to a fraction of the timeline length.
    pub fn set_position(&self, position: f32) -> Result<()> {
        if !position.is_finite() {
            return Err(ReelflowError::InvalidParameter(format!(
                "invalid timeline position {}",
                position
            )));
        }
        let frame = (position.clamp(0.0, 1.0) as f64 * self.length() as f64).round() as i64;
        self.seek(frame)
    }

    /// Release every blocked wait: render and pause barriers and the clips'
    /// own waits. Safe from any thread at any time. The round in flight is
    /// abandoned; tracks restart their clips on the next one.
    pub fn cancel_synchronisation(&self) {
        self.signals.render_barrier.cancel();
        self.signals.pause_barrier.cancel();
        for link in &self.links {
            link.cancel();
        }
    }

    /// Stop every track and rewind to frame 0.
    pub fn stop(&self) {
        self.cancel_synchronisation();
        {
            let mut slot = self.round.lock();
            *slot = None;
            let mut tracks = self.tracks.lock();
            for track in tracks.iter_mut() {
                track.stop();
            }
        }
        self.current_frame.store(0, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.signals.ended.store(false, Ordering::SeqCst);
        info!("main workflow stopped");
        self.notify_position(0);
    }

    // --- Editing ---------------------------------------------------------

    fn refresh_length(&self, tracks: &[TrackWorkflow]) {
        let length = tracks.iter().map(TrackWorkflow::length).max().unwrap_or(0);
        let previous = self.length.swap(length, Ordering::SeqCst);
        if self.current_frame() < length {
            self.signals.ended.store(false, Ordering::SeqCst);
        }
        if previous != length {
            debug!(previous, length, "timeline length changed");
        }
    }

    fn track_of(tracks: &[TrackWorkflow], id: ClipId) -> Result<usize> {
        tracks
            .iter()
            .position(|t| t.find_clip(id).is_some())
            .ok_or_else(|| ReelflowError::NotFound(format!("clip {}", id)))
    }

    /// Place `clip` on `track` starting at timeline frame `start`.
    pub fn add_clip(&self, clip: Clip, track: usize, start: i64) -> Result<ClipId> {
        let _slot = self.lock_idle("edit the timeline")?;
        let mut tracks = self.tracks.lock();
        let count = tracks.len();
        let id = tracks
            .get_mut(track)
            .ok_or_else(|| Self::no_such_track(track, count))?
            .add_clip(clip, start)?;
        self.refresh_length(&tracks);
        Ok(id)
    }

    pub fn remove_clip(&self, id: ClipId) -> Result<Clip> {
        let _slot = self.lock_idle("edit the timeline")?;
        let mut tracks = self.tracks.lock();
        let track = Self::track_of(&tracks, id)?;
        let clip = tracks[track].remove_clip(id)?;
        self.refresh_length(&tracks);
        Ok(clip)
    }

    /// Add several clips at once; if one does not fit, the ones already
    /// placed are removed again.
    fn place_clips(&self, clips: Vec<(Clip, usize, i64)>) -> Result<()> {
        let _slot = self.lock_idle("edit the timeline")?;
        let mut tracks = self.tracks.lock();
        let mut placed: Vec<(usize, ClipId)> = Vec::with_capacity(clips.len());
        for (clip, track, start) in clips {
            match tracks[track].add_clip(clip, start) {
                Ok(id) => placed.push((track, id)),
                Err(e) => {
                    for (track, id) in placed.into_iter().rev() {
                        tracks[track].remove_clip(id)?;
                    }
                    return Err(e);
                }
            }
        }
        self.refresh_length(&tracks);
        Ok(())
    }

    /// Move a clip along its own track.
    pub fn move_clip(&self, id: ClipId, start: i64) -> Result<()> {
        let _slot = self.lock_idle("edit the timeline")?;
        let mut tracks = self.tracks.lock();
        let track = Self::track_of(&tracks, id)?;
        tracks[track].move_clip(id, start)?;
        self.refresh_length(&tracks);
        Ok(())
    }

    /// Move a clip from one track to another. On failure the clip stays
    /// where it was.
    pub fn clip_moved(&self, id: ClipId, from: usize, to: usize, start: i64) -> Result<()> {
        let _slot = self.lock_idle("edit the timeline")?;
        let mut tracks = self.tracks.lock();
        let count = tracks.len();
        for track in [from, to] {
            if track >= count {
                return Err(Self::no_such_track(track, count));
            }
        }

        if from == to {
            tracks[from].move_clip(id, start)?;
        } else {
            let old_start = tracks[from]
                .find_clip(id)
                .ok_or_else(|| ReelflowError::NotFound(format!("clip {} on track {}", id, from)))?;
            let clip = tracks[from].remove_clip(id)?;
            if let Err(e) = tracks[to].add_clip(clip.clone(), start) {
                tracks[from].add_clip(clip, old_start)?;
                return Err(e);
            }
            debug!(clip = %id, from, to, start, "clip moved across tracks");
        }
        self.refresh_length(&tracks);
        Ok(())
    }

    /// Change the source in/out points of a clip.
    pub fn resize_clip(&self, id: ClipId, begin: i64, end: i64) -> Result<()> {
        let _slot = self.lock_idle("edit the timeline")?;
        let mut tracks = self.tracks.lock();
        let track = Self::track_of(&tracks, id)?;
        tracks[track].resize_clip(id, begin, end)?;
        self.refresh_length(&tracks);
        Ok(())
    }

    // --- Effects ---------------------------------------------------------

    /// Attach a filter to a track's layer, or to the composited output when
    /// `track` is `None`.
    pub fn add_filter(&self, track: Option<usize>, range: FrameRange, filter: SharedFilter) -> Result<()> {
        let video = self.config.video;
        let mut effects = self.effects.lock();
        let list = match track {
            None => &mut effects.global,
            Some(index) => effects
                .track_filters
                .get_mut(index)
                .ok_or_else(|| Self::no_such_track(index, self.config.track_count))?,
        };
        filter.init(video.width, video.height);
        debug!(filter = filter.name(), ?track, ?range, "filter added");
        list.push(filter, range);
        Ok(())
    }

    /// Blend `track` over the tracks below it with `mixer` during `range`.
    pub fn add_mixer(&self, track: usize, range: FrameRange, mixer: SharedMixer) -> Result<()> {
        let video = self.config.video;
        let mut effects = self.effects.lock();
        let list = effects
            .track_mixers
            .get_mut(track)
            .ok_or_else(|| Self::no_such_track(track, self.config.track_count))?;
        mixer.init(video.width, video.height);
        debug!(mixer = mixer.name(), track, ?range, "mixer added");
        list.insert(mixer, range)
    }

    /// Place the clips and effects of a layout document, creating effects
    /// through `engine`.
    ///
    /// Everything is resolved and checked before the timeline changes; an
    /// invalid layout leaves the workflow as it was.
    pub fn apply_layout(&self, layout: &TimelineLayout, engine: &EffectsEngine) -> Result<()> {
        let count = self.config.track_count;
        let check_track = |track: usize| {
            if track < count {
                Ok(track)
            } else {
                Err(Self::no_such_track(track, count))
            }
        };

        let clips = layout
            .clips
            .iter()
            .map(|p| -> Result<_> { Ok((p.to_clip()?, check_track(p.track)?, p.start)) })
            .collect::<Result<Vec<_>>>()?;
        let filters = layout
            .filters
            .iter()
            .map(|p| -> Result<_> {
                let track = p.track.map(check_track).transpose()?;
                Ok((track, p.range, engine.create_filter(&p.effect)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let mixers = layout
            .mixers
            .iter()
            .map(|p| -> Result<_> {
                let track = p.track.ok_or_else(|| {
                    ReelflowError::InvalidParameter(format!("mixer {} needs a track", p.effect))
                })?;
                Ok((check_track(track)?, p.range, engine.create_mixer(&p.effect)?))
            })
            .collect::<Result<Vec<_>>>()?;

        {
            // Mixer ranges may collide; try them on copies first.
            let mut staged = self.effects.lock().track_mixers.clone();
            for (track, range, mixer) in &mixers {
                staged[*track].insert(mixer.clone(), *range)?;
            }
        }

        self.place_clips(clips)?;
        for (track, range, filter) in filters {
            self.add_filter(track, range, filter)?;
        }
        for (track, range, mixer) in mixers {
            self.add_mixer(track, range, mixer)?;
        }
        info!(
            clips = layout.clips.len(),
            filters = layout.filters.len(),
            mixers = layout.mixers.len(),
            length = self.length(),
            "layout applied"
        );
        Ok(())
    }
}

impl Drop for MainWorkflow {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelflow_core::{FrameRate, PixelFormat, VideoFormat};
    use crossbeam_channel::bounded;
    use reelflow_media::{FramePainter, MediaLibrary, MediaProbe, SyntheticBackend};
    use reelflow_timeline::ClipRef;
    use std::thread;
    use std::time::Instant;

    fn config() -> EngineConfig {
        EngineConfig {
            video: VideoFormat::new(8, 6, PixelFormat::Rgba8),
            track_count: 4,
            render_timeout_ms: 5000,
            init_timeout_ms: 5000,
            ..EngineConfig::default()
        }
    }

    fn backend() -> SyntheticBackend {
        let library = MediaLibrary::new();
        for name in ["a.mov", "b.mov"] {
            library.register(MediaProbe::new(name, 200, FrameRate::FPS_25));
        }
        SyntheticBackend::new(library)
    }

    fn workflow() -> MainWorkflow {
        MainWorkflow::new(config(), Arc::new(backend())).unwrap()
    }

    fn clip(path: &str, begin: i64, end: i64) -> Clip {
        Clip::with_range(path, ClipRef::new(path, 200), begin, end).unwrap()
    }

    #[test]
    fn test_empty_timeline_ends_immediately() {
        let main = workflow();
        let events = main.subscribe();
        assert!(main.get_synchrone_output().unwrap().is_none());
        assert!(main.is_end_reached());
        assert!(matches!(events.try_recv(), Ok(WorkflowEvent::EndReached)));
        assert!(matches!(main.get_output().unwrap(), FrameOutput::EndOfTimeline));
    }

    #[test]
    fn test_frames_advance_to_the_end() {
        let main = workflow();
        main.add_clip(clip("a.mov", 0, 4), 0, 0).unwrap();
        assert_eq!(main.length(), 4);
        for expected in 0..4 {
            let frame = main.get_synchrone_output().unwrap().unwrap();
            assert_eq!(frame.position, Some(expected));
            assert_eq!(main.current_frame(), expected + 1);
        }
        assert!(main.get_synchrone_output().unwrap().is_none());
    }

    #[test]
    fn test_gap_frames_are_blank() {
        let main = workflow();
        main.add_clip(clip("a.mov", 0, 2), 1, 3).unwrap();
        let frame = main.get_synchrone_output().unwrap().unwrap();
        assert_eq!(frame.pixel(0, 0), Rgba8::BLACK);
        assert_eq!(main.current_frame(), 1);
    }

    #[test]
    fn test_poll_eventually_delivers() {
        let main = workflow();
        main.add_clip(clip("a.mov", 0, 3), 0, 0).unwrap();
        assert!(main.start_render());
        let frame = loop {
            match main.get_output().unwrap() {
                FrameOutput::Frame(frame) => break frame,
                FrameOutput::Pending => std::thread::sleep(Duration::from_millis(1)),
                FrameOutput::EndOfTimeline => panic!("timeline ended early"),
            }
        };
        assert_eq!(frame.position, Some(0));
        assert_eq!(main.current_frame(), 1);
    }

    #[test]
    fn test_edits_update_length_and_reject_overlap() {
        let main = workflow();
        let a = main.add_clip(clip("a.mov", 0, 10), 0, 0).unwrap();
        let b = main.add_clip(clip("b.mov", 0, 5), 1, 20).unwrap();
        assert_eq!(main.length(), 25);
        assert!(main.add_clip(clip("b.mov", 0, 5), 0, 8).is_err());
        assert!(main.add_clip(clip("b.mov", 0, 5), 9, 0).is_err());

        main.resize_clip(b, 0, 10).unwrap();
        assert_eq!(main.length(), 30);
        main.clip_moved(b, 1, 0, 10).unwrap();
        assert_eq!(main.find_clip(b), Some((0, 10)));
        // Target occupied: the clip stays on its track.
        assert!(main.clip_moved(a, 0, 0, 5).is_err());
        main.remove_clip(b).unwrap();
        assert_eq!(main.length(), 10);
        assert!(main.remove_clip(b).is_err());
    }

    #[test]
    fn test_edit_rejected_during_round() {
        let main = workflow();
        main.add_clip(clip("a.mov", 0, 10), 0, 0).unwrap();
        assert!(main.start_render());
        assert!(main.add_clip(clip("b.mov", 0, 5), 1, 0).is_err());
        assert!(main.seek(3).is_err());
        main.get_synchrone_output().unwrap();
        main.add_clip(clip("b.mov", 0, 5), 1, 0).unwrap();
    }

    #[test]
    fn test_seek_and_position() {
        let main = workflow();
        main.add_clip(clip("a.mov", 0, 100), 0, 0).unwrap();
        let events = main.subscribe();
        main.set_position(0.5).unwrap();
        assert_eq!(main.current_frame(), 50);
        assert!(matches!(events.try_recv(), Ok(WorkflowEvent::FrameChanged(50))));
        main.next_frame().unwrap();
        main.previous_frame().unwrap();
        main.previous_frame().unwrap();
        assert_eq!(main.current_frame(), 49);
        main.seek(-5).unwrap();
        assert_eq!(main.current_frame(), 0);
        main.seek(500).unwrap();
        assert_eq!(main.current_frame(), 100);
        let frame = {
            main.seek(10).unwrap();
            main.get_synchrone_output().unwrap().unwrap()
        };
        assert_eq!(frame.position, Some(10));
    }

    #[test]
    fn test_stepping_stays_inside_timeline() {
        let main = workflow();
        main.add_clip(clip("a.mov", 0, 10), 0, 0).unwrap();
        main.seek(9).unwrap();
        main.next_frame().unwrap();
        main.next_frame().unwrap();
        assert_eq!(main.current_frame(), 9);
        let frame = main.get_synchrone_output().unwrap().unwrap();
        assert_eq!(frame.position, Some(9));

        // Stepping back from the end lands on the last frame.
        main.seek(10).unwrap();
        main.previous_frame().unwrap();
        assert_eq!(main.current_frame(), 9);
        main.seek(0).unwrap();
        main.previous_frame().unwrap();
        assert_eq!(main.current_frame(), 0);
    }

    #[test]
    fn test_stepping_on_empty_timeline() {
        let main = workflow();
        main.next_frame().unwrap();
        main.previous_frame().unwrap();
        assert_eq!(main.current_frame(), 0);
    }

    #[test]
    fn test_pause_is_idempotent() {
        let main = workflow();
        main.add_clip(clip("a.mov", 0, 10), 0, 0).unwrap();
        main.get_synchrone_output().unwrap();
        let events = main.subscribe();
        main.pause().unwrap();
        main.pause().unwrap();
        assert!(main.is_paused());
        let paused = events
            .try_iter()
            .filter(|e| matches!(e, WorkflowEvent::Paused))
            .count();
        assert_eq!(paused, 1);
        // The next frame resumes playback.
        let frame = main.get_synchrone_output().unwrap().unwrap();
        assert_eq!(frame.position, Some(1));
        assert!(!main.is_paused());
    }

    #[test]
    fn test_stop_rewinds() {
        let main = workflow();
        main.add_clip(clip("a.mov", 0, 10), 0, 0).unwrap();
        main.get_synchrone_output().unwrap();
        main.get_synchrone_output().unwrap();
        main.stop();
        assert_eq!(main.current_frame(), 0);
        let frame = main.get_synchrone_output().unwrap().unwrap();
        assert_eq!(frame.position, Some(0));
    }

    #[test]
    fn test_cancel_releases_every_blocked_wait() {
        // Both producers stall on source frame 1 until the gate closes.
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let (stalled_tx, stalled_rx) = unbounded::<()>();
        let painter: FramePainter = Arc::new(move |_path, position, frame| {
            if position == 1 {
                let _ = stalled_tx.send(());
                let _ = gate_rx.recv();
            }
            frame.fill(Rgba8::WHITE);
        });
        let main = MainWorkflow::new(config(), Arc::new(backend().with_painter(painter))).unwrap();
        main.add_clip(clip("a.mov", 0, 10), 0, 0).unwrap();
        main.add_clip(clip("b.mov", 0, 10), 1, 0).unwrap();
        main.get_synchrone_output().unwrap();

        let timeout = Some(Duration::from_secs(10));
        let (output, rendered, paused, elapsed) = thread::scope(|s| {
            let render = s.spawn(|| main.get_synchrone_output());
            for _ in 0..2 {
                stalled_rx
                    .recv_timeout(Duration::from_secs(5))
                    .expect("producers never reached frame 1");
            }
            let (rendering, pausing) = {
                let tracks = main.tracks.lock();
                let a = tracks[0].active_clip().expect("track 0 is playing");
                let b = tracks[1].active_clip().expect("track 1 is playing");
                assert!(!b.pause());
                (a.sync_handle(), b.sync_handle())
            };
            let started = Instant::now();
            let render_wait = s.spawn(move || rendering.wait_for_complete_render(timeout));
            let pause_wait = s.spawn(move || pausing.wait_for_paused_thread(timeout));
            thread::sleep(Duration::from_millis(100));

            main.cancel_synchronisation();
            (
                render.join().unwrap(),
                render_wait.join().unwrap(),
                pause_wait.join().unwrap(),
                started.elapsed(),
            )
        });
        drop(gate_tx);

        assert!(matches!(output, Err(ReelflowError::Cancelled)));
        assert_eq!(rendered, WaitOutcome::Cancelled);
        assert_eq!(paused, WaitOutcome::Cancelled);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_layout_mixer_needs_track() {
        let main = workflow();
        let mut layout = TimelineLayout::default();
        layout.mixers.push(reelflow_timeline::EffectPlacement {
            effect: "cross_dissolve".into(),
            track: None,
            range: FrameRange::new(0, 5),
        });
        assert!(main.apply_layout(&layout, &EffectsEngine::with_builtins()).is_err());
    }

    #[test]
    fn test_layout_with_colliding_mixers_changes_nothing() {
        let main = workflow();
        let mut layout = TimelineLayout::default();
        layout.clips.push(reelflow_timeline::ClipPlacement {
            track: 1,
            start: 0,
            name: "a".into(),
            source: ClipRef::new("a.mov", 200),
            begin: None,
            end: Some(20),
        });
        for start in [0, 5] {
            layout.mixers.push(reelflow_timeline::EffectPlacement {
                effect: "cross_dissolve".into(),
                track: Some(1),
                range: FrameRange::new(start, start + 10),
            });
        }
        assert!(main.apply_layout(&layout, &EffectsEngine::with_builtins()).is_err());
        assert_eq!(main.length(), 0);
        assert!(main.clips(1).unwrap().is_empty());
    }

    #[test]
    fn test_failed_layout_rolls_back_placed_clips() {
        let main = workflow();
        let mut layout = TimelineLayout::default();
        for start in [0, 10] {
            layout.clips.push(reelflow_timeline::ClipPlacement {
                track: 0,
                start,
                name: "a".into(),
                source: ClipRef::new("a.mov", 200),
                begin: None,
                end: Some(20),
            });
        }
        assert!(main.apply_layout(&layout, &EffectsEngine::with_builtins()).is_err());
        assert_eq!(main.length(), 0);
        assert!(main.clips(0).unwrap().is_empty());
    }
}
