//! Per-clip decode state machine.
//!
//! A clip workflow drives one decoder player and turns its frames into a
//! strictly one-frame-per-request stream. The decoder thread delivers a frame
//! through `unlock_frame`, then parks there until the owner asks for the next
//! one with [`ClipWorkflow::wake`]. That park is the per-frame checkpoint:
//! staged state requests are applied there and nowhere else.
//!
//! ```text
//! Stopped -> Initializing -> Ready -> Rendering <-> Sleeping
//!                                        |            |
//!                                        v            v
//!                                      Paused -> ThreadPaused
//! any -> EndReached (decoder end of stream), any -> Stopped (stop)
//! ```

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use reelflow_core::{
    EngineConfig, FrameBuffer, ReelflowError, Result, SharedFrameBuffer, VideoFormat,
};
use reelflow_media::{PlayerCallbacks, PlayerEvent, PlayerPool, SharedPlayer};
use reelflow_timeline::{Clip, ClipId};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::buffer_pool::{BufferPool, PoolStats};
use crate::events::{ClipListener, NoopListener};
use crate::sync::{StateMonitor, WaitOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipState {
    /// No decoder attached.
    Stopped,
    /// Decoder attached, handshake in progress.
    Initializing,
    /// Positioned on the first frame, waiting for `start_render`.
    Ready,
    /// The producer is decoding the requested frame.
    Rendering,
    /// Frame delivered, producer parked until `wake`.
    Sleeping,
    /// Pause requested.
    Paused,
    /// Producer parked because of a pause.
    ThreadPaused,
    /// The decoder ran out of frames.
    EndReached,
}

impl ClipState {
    pub fn is_paused(self) -> bool {
        matches!(self, Self::Paused | Self::ThreadPaused)
    }
}

/// Where the initialization handshake stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitStep {
    Idle,
    AwaitPlaying,
    AwaitPosition,
    AwaitPaused,
}

#[derive(Debug, Clone, Copy)]
struct ClipCell {
    state: ClipState,
    init_step: InitStep,
    /// Source frame the handshake seeks to.
    seek_target: i64,
    wake_token: u64,
    frames_produced: u64,
    /// Producer is blocked in the checkpoint.
    parked: bool,
    stopping: bool,
}

struct ClipShared {
    id: ClipId,
    clip: RwLock<Clip>,
    format: VideoFormat,
    cell: StateMonitor<ClipCell>,
    requests_tx: Sender<ClipState>,
    requests_rx: Receiver<ClipState>,
    buffers: BufferPool,
    player: Mutex<Option<SharedPlayer>>,
    listener: RwLock<Arc<dyn ClipListener>>,
}

impl ClipShared {
    fn current_player(&self) -> Option<SharedPlayer> {
        self.player.lock().clone()
    }

    fn listener(&self) -> Arc<dyn ClipListener> {
        self.listener.read().clone()
    }

    fn wait_for_complete_render(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.cell
            .wait_until(|c| c.state != ClipState::Rendering, timeout)
    }

    fn wait_for_paused_thread(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.cell.wait_until(
            |c| match c.state {
                ClipState::ThreadPaused => true,
                ClipState::Paused => c.parked,
                _ => true,
            },
            timeout,
        )
    }

    fn clear_requests(&self) {
        while self.requests_rx.try_recv().is_ok() {}
    }

    /// Apply the most recent staged request.
    fn apply_staged(&self) {
        let Some(required) = self.requests_rx.try_iter().last() else {
            return;
        };
        self.cell.update(|c| {
            if !c.stopping && !matches!(c.state, ClipState::Stopped | ClipState::EndReached) {
                trace!(clip = %self.id, from = ?c.state, to = ?required, "applying staged state");
                c.state = required;
            }
        });
    }

    /// Advance the handshake if it is waiting for `step`.
    fn advance_init(&self, step: InitStep, next: InitStep) -> Option<i64> {
        self.cell.update(|c| {
            if c.stopping || c.state != ClipState::Initializing || c.init_step != step {
                return None;
            }
            c.init_step = next;
            if next == InitStep::Idle {
                c.state = ClipState::Ready;
            }
            Some(c.seek_target)
        })
    }
}

impl PlayerCallbacks for ClipShared {
    fn lock_frame(&self) -> FrameBuffer {
        self.buffers.acquire()
    }

    fn unlock_frame(&self, frame: FrameBuffer) {
        let position = frame.position;
        let mut frame = Some(frame);
        let parked = self.cell.update(|c| {
            if c.stopping || !matches!(c.state, ClipState::Rendering | ClipState::Paused) {
                return None;
            }
            if let Some(frame) = frame.take() {
                self.buffers.publish(frame);
            }
            c.frames_produced += 1;
            c.state = match c.state {
                ClipState::Paused => ClipState::ThreadPaused,
                _ => ClipState::Sleeping,
            };
            c.parked = true;
            Some((c.state, c.wake_token))
        });

        if let Some(unwanted) = frame {
            trace!(clip = %self.id, ?position, "dropping unrequested frame");
            self.buffers.recycle(unwanted);
        }

        if let Some((state, token)) = parked {
            debug!(clip = %self.id, ?position, ?state, "frame delivered");
            let listener = self.listener();
            listener.render_complete(self.id);
            if state == ClipState::ThreadPaused {
                listener.paused(self.id);
            }
            self.cell.wait_and_update(
                |c| c.wake_token != token || c.stopping,
                |c| {
                    c.parked = false;
                    c.state = match c.state {
                        ClipState::Sleeping => ClipState::Rendering,
                        ClipState::ThreadPaused => ClipState::Paused,
                        other => other,
                    };
                },
            );
        }

        self.apply_staged();
    }

    fn player_event(&self, event: PlayerEvent) {
        match event {
            PlayerEvent::Playing => {
                if let Some(target) = self.advance_init(InitStep::AwaitPlaying, InitStep::AwaitPosition) {
                    if let Some(player) = self.current_player() {
                        player.seek(target);
                    }
                }
            }
            PlayerEvent::PositionChanged(position) => {
                if self
                    .advance_init(InitStep::AwaitPosition, InitStep::AwaitPaused)
                    .is_some()
                {
                    trace!(clip = %self.id, position, "initial seek done");
                    if let Some(player) = self.current_player() {
                        player.pause();
                    }
                }
            }
            PlayerEvent::Paused => {
                if self.advance_init(InitStep::AwaitPaused, InitStep::Idle).is_some() {
                    debug!(clip = %self.id, "clip ready");
                }
            }
            PlayerEvent::EndReached => {
                let reached = self.cell.update(|c| {
                    if c.stopping || c.state == ClipState::Stopped {
                        return false;
                    }
                    c.state = ClipState::EndReached;
                    c.init_step = InitStep::Idle;
                    true
                });
                if reached {
                    debug!(clip = %self.id, "end of clip reached");
                    self.listener().end_reached(self.id);
                }
            }
            PlayerEvent::Stopped => trace!(clip = %self.id, "decoder stopped"),
        }
    }
}

/// Lets a track wait on or cancel a clip's synchronisation without owning
/// the clip. Waits on a clip that is gone report `Cancelled`.
#[derive(Clone)]
pub struct ClipSyncHandle(Weak<ClipShared>);

impl ClipSyncHandle {
    /// Release the clip's blocked waits. Returns false if the clip is gone.
    pub fn cancel(&self) -> bool {
        match self.0.upgrade() {
            Some(shared) => {
                shared.cell.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn wait_for_complete_render(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.0
            .upgrade()
            .map_or(WaitOutcome::Cancelled, |shared| shared.wait_for_complete_render(timeout))
    }

    pub fn wait_for_paused_thread(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.0
            .upgrade()
            .map_or(WaitOutcome::Cancelled, |shared| shared.wait_for_paused_thread(timeout))
    }
}

/// Decode state machine for one clip on a track.
pub struct ClipWorkflow {
    shared: Arc<ClipShared>,
    players: Arc<PlayerPool>,
    init_timeout: Duration,
}

impl ClipWorkflow {
    pub fn new(clip: Clip, config: &EngineConfig, players: Arc<PlayerPool>) -> Self {
        let (requests_tx, requests_rx) = unbounded();
        let shared = Arc::new(ClipShared {
            id: clip.id,
            clip: RwLock::new(clip),
            format: config.video,
            cell: StateMonitor::new(ClipCell {
                state: ClipState::Stopped,
                init_step: InitStep::Idle,
                seek_target: 0,
                wake_token: 0,
                frames_produced: 0,
                parked: false,
                stopping: false,
            }),
            requests_tx,
            requests_rx,
            buffers: BufferPool::new(config.video, config.buffer_pool_size),
            player: Mutex::new(None),
            listener: RwLock::new(Arc::new(NoopListener)),
        });
        Self {
            shared,
            players,
            init_timeout: config.init_timeout(),
        }
    }

    pub fn id(&self) -> ClipId {
        self.shared.id
    }

    /// Snapshot of the clip descriptor.
    pub fn clip(&self) -> Clip {
        self.shared.clip.read().clone()
    }

    /// Frames the clip occupies on its track.
    pub fn length(&self) -> i64 {
        self.shared.clip.read().length()
    }

    /// Edit the clip descriptor. The clip is stopped first so the change
    /// applies from the next initialization.
    pub fn update_clip<R>(&self, f: impl FnOnce(&mut Clip) -> Result<R>) -> Result<R> {
        self.stop();
        let mut clip = self.shared.clip.write();
        f(&mut clip)
    }

    pub fn set_listener(&self, listener: Arc<dyn ClipListener>) {
        *self.shared.listener.write() = listener;
    }

    pub fn sync_handle(&self) -> ClipSyncHandle {
        ClipSyncHandle(Arc::downgrade(&self.shared))
    }

    pub fn state(&self) -> ClipState {
        self.shared.cell.read(|c| c.state)
    }

    pub fn frames_produced(&self) -> u64 {
        self.shared.cell.read(|c| c.frames_produced)
    }

    pub fn buffer_stats(&self) -> PoolStats {
        self.shared.buffers.stats()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ClipState::Ready
    }

    pub fn is_rendering(&self) -> bool {
        self.state() == ClipState::Rendering
    }

    pub fn is_sleeping(&self) -> bool {
        self.state() == ClipState::Sleeping
    }

    /// Paused, whether or not the producer parked yet.
    pub fn is_paused(&self) -> bool {
        self.state().is_paused()
    }

    pub fn is_thread_paused(&self) -> bool {
        self.state() == ClipState::ThreadPaused
    }

    pub fn is_end_reached(&self) -> bool {
        self.state() == ClipState::EndReached
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ClipState::Stopped
    }

    /// Producer blocked in the checkpoint.
    pub fn is_parked(&self) -> bool {
        self.shared.cell.read(|c| c.parked)
    }

    pub fn initialize(&self) -> Result<()> {
        self.initialize_at(0)
    }

    /// Attach a decoder and position it `offset` frames into the clip.
    ///
    /// Returns once the decoder is opened; the handshake finishes on the
    /// decoder thread. A running clip is stopped first. On error the clip is
    /// left `Stopped`.
    pub fn initialize_at(&self, offset: i64) -> Result<()> {
        let (path, target) = {
            let clip = self.shared.clip.read();
            if offset < 0 || offset >= clip.length() {
                return Err(ReelflowError::InvalidParameter(format!(
                    "offset {} outside clip {} of {} frames",
                    offset,
                    clip.name,
                    clip.length()
                )));
            }
            (clip.source.path.clone(), clip.begin() + offset)
        };
        if !self.is_stopped() {
            self.stop();
        }

        self.shared.clear_requests();
        self.shared.cell.update(|c| {
            c.state = ClipState::Initializing;
            c.init_step = InitStep::AwaitPlaying;
            c.seek_target = target;
            c.parked = false;
            c.stopping = false;
        });

        let player = match self.players.acquire() {
            Ok(player) => player,
            Err(e) => {
                self.set_stopped();
                return Err(e);
            }
        };
        let callbacks: Arc<dyn PlayerCallbacks> = self.shared.clone();
        if let Err(e) = player.open(&path, self.shared.format, callbacks) {
            warn!(clip = %self.shared.id, path = %path.display(), error = %e, "failed to open clip source");
            player.stop();
            self.players.release(player);
            self.set_stopped();
            return Err(e);
        }
        *self.shared.player.lock() = Some(player.clone());
        info!(clip = %self.shared.id, path = %path.display(), target, "initializing clip");
        player.play();
        Ok(())
    }

    fn set_stopped(&self) {
        self.shared.cell.update(|c| {
            c.state = ClipState::Stopped;
            c.init_step = InitStep::Idle;
            c.parked = false;
            c.stopping = false;
        });
    }

    /// Wait for the handshake, then let the decoder produce the first frame.
    pub fn start_render(&self) -> Result<()> {
        match self.wait_for_complete_init(Some(self.init_timeout)) {
            WaitOutcome::Reached => {}
            WaitOutcome::TimedOut => {
                return Err(ReelflowError::Timeout(format!(
                    "initialization of clip {}",
                    self.shared.id
                )))
            }
            WaitOutcome::Cancelled => return Err(ReelflowError::Cancelled),
        }

        let state = self.shared.cell.update(|c| {
            if c.state == ClipState::Ready {
                c.state = ClipState::Rendering;
            }
            c.state
        });
        match state {
            ClipState::Rendering => {}
            ClipState::EndReached => {
                return Err(ReelflowError::Decoder(format!(
                    "clip {} reached the end of its source while initializing",
                    self.shared.id
                )))
            }
            other => {
                return Err(ReelflowError::Internal(format!(
                    "clip {} cannot start rendering from {:?}",
                    self.shared.id, other
                )))
            }
        }

        if let Some(player) = self.shared.current_player() {
            player.play();
        }
        Ok(())
    }

    /// Request the next frame from a parked producer.
    ///
    /// A parked producer is at its checkpoint, so a staged request is applied
    /// right away and the new state is visible as soon as this returns.
    pub fn wake(&self) {
        let shared = &self.shared;
        shared.cell.update(|c| {
            c.wake_token += 1;
            if c.parked {
                c.state = match c.state {
                    ClipState::Sleeping => ClipState::Rendering,
                    ClipState::ThreadPaused => ClipState::Paused,
                    other => other,
                };
                if let Some(required) = shared.requests_rx.try_iter().last() {
                    if !matches!(c.state, ClipState::Stopped | ClipState::EndReached) {
                        c.state = required;
                    }
                }
            }
            c.parked = false;
        });
    }

    /// Pause rendering.
    ///
    /// Returns true when the producer is already parked (or there is no
    /// producer), false when it will park after delivering its current frame
    /// and report through the listener's `paused`.
    pub fn pause(&self) -> bool {
        let (parked, changed) = self.shared.cell.update(|c| match c.state {
            ClipState::Rendering => {
                c.state = ClipState::Paused;
                (false, true)
            }
            ClipState::Sleeping => {
                c.state = ClipState::Paused;
                (c.parked, true)
            }
            ClipState::Paused => (c.parked, false),
            _ => (true, false),
        });
        if changed {
            self.shared.clear_requests();
            debug!(clip = %self.shared.id, parked, "clip paused");
        }
        parked
    }

    /// Leave the paused state at the next checkpoint.
    pub fn unpause(&self, wake: bool) {
        if !self.is_paused() {
            return;
        }
        let _ = self.shared.requests_tx.send(ClipState::Rendering);
        if let Some(player) = self.shared.current_player() {
            player.play();
        }
        if wake {
            self.wake();
        }
    }

    /// Move a parked producer `offset` frames into the clip.
    pub fn seek(&self, offset: i64) {
        let target = {
            let clip = self.shared.clip.read();
            clip.begin() + offset.clamp(0, (clip.length() - 1).max(0))
        };
        self.shared.buffers.flush();
        if let Some(player) = self.shared.current_player() {
            debug!(clip = %self.shared.id, target, "seeking clip");
            player.seek(target);
        }
    }

    /// Oldest delivered frame, if any.
    pub fn get_output(&self) -> Option<SharedFrameBuffer> {
        self.shared.buffers.consume()
    }

    /// Detach the decoder and return it to the pool.
    fn release_player(&self) -> bool {
        let player = self.shared.player.lock().take();
        self.shared.cell.update(|c| {
            c.stopping = true;
            c.parked = false;
        });
        let had_player = player.is_some();
        if let Some(player) = player {
            // Joins the decoder thread, which leaves the checkpoint because
            // `stopping` is set.
            player.stop();
            self.players.release(player);
        }
        self.set_stopped();
        self.shared.clear_requests();
        had_player
    }

    /// Stop decoding, drop queued frames and release the decoder.
    pub fn stop(&self) {
        if self.release_player() {
            info!(clip = %self.shared.id, "clip stopped");
        }
        self.shared.buffers.reset();
    }

    /// Back to `Stopped` keeping the buffers, so the clip can be initialized again.
    pub fn reinitialize(&self) {
        self.release_player();
    }

    pub fn wait_for_complete_init(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.shared
            .cell
            .wait_until(|c| c.state != ClipState::Initializing, timeout)
    }

    pub fn wait_for_complete_render(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.shared.wait_for_complete_render(timeout)
    }

    /// Wait until a pause took effect on the producer.
    pub fn wait_for_paused_thread(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.shared.wait_for_paused_thread(timeout)
    }

    /// Release every caller blocked in one of the waits above.
    pub fn cancel_synchronisation(&self) {
        self.shared.cell.cancel();
    }
}

impl Drop for ClipWorkflow {
    fn drop(&mut self) {
        self.release_player();
    }
}
