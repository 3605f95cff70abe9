//! A decoder backend that paints frames instead of decoding files.
//!
//! Sources live in an in-memory [`MediaLibrary`]; opening a path that was not
//! registered fails like a missing file would. Each open session runs its own
//! decode thread which follows the same rules a real decoder does: commands
//! are handled in order, frames are written into buffers obtained from the
//! callbacks, and end of stream is reported once the last frame is out.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use reelflow_core::{FrameBuffer, ReelflowError, Result, Rgba8, VideoFormat};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::player::{MediaBackend, MediaPlayer, PlayerCallbacks, PlayerEvent, SharedPlayer};
use crate::probe::MediaProbe;

/// Fills `frame` with the content of source frame `position` of `path`.
pub type FramePainter = Arc<dyn Fn(&Path, i64, &mut FrameBuffer) + Send + Sync>;

/// Painter giving every source its own solid color.
pub fn solid_color_painter() -> FramePainter {
    Arc::new(|path, _position, frame| frame.fill(source_color(path)))
}

/// Color derived from a source path.
pub fn source_color(path: &Path) -> Rgba8 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    let [r, g, b, ..] = hasher.finish().to_le_bytes();
    Rgba8::opaque(r, g, b)
}

/// Registered sources, shared between a backend and its players.
#[derive(Clone, Default)]
pub struct MediaLibrary {
    sources: Arc<RwLock<HashMap<PathBuf, MediaProbe>>>,
}

impl MediaLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a source available, replacing an earlier registration.
    pub fn register(&self, probe: MediaProbe) {
        debug!(path = %probe.path.display(), frames = probe.frame_count, "registering source");
        self.sources.write().insert(probe.path.clone(), probe);
    }

    pub fn remove(&self, path: &Path) -> Option<MediaProbe> {
        self.sources.write().remove(path)
    }

    /// Metadata of a registered source.
    pub fn probe(&self, path: &Path) -> Result<MediaProbe> {
        self.sources
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| ReelflowError::NotFound(format!("File not found: {}", path.display())))
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }
}

/// Backend producing [`SyntheticPlayer`]s.
pub struct SyntheticBackend {
    library: MediaLibrary,
    painter: FramePainter,
    frame_interval: Option<Duration>,
}

impl SyntheticBackend {
    pub fn new(library: MediaLibrary) -> Self {
        Self {
            library,
            painter: solid_color_painter(),
            frame_interval: None,
        }
    }

    /// Replace the default solid color painter.
    pub fn with_painter(mut self, painter: FramePainter) -> Self {
        self.painter = painter;
        self
    }

    /// Sleep this long after every frame, to mimic decode cost.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    pub fn library(&self) -> &MediaLibrary {
        &self.library
    }
}

impl MediaBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn create_player(&self) -> Result<SharedPlayer> {
        Ok(Arc::new(SyntheticPlayer {
            library: self.library.clone(),
            painter: self.painter.clone(),
            frame_interval: self.frame_interval,
            session: Mutex::new(None),
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Play,
    Pause,
    Seek(i64),
    Stop,
}

struct Session {
    commands: Sender<Command>,
    handle: JoinHandle<()>,
    thread: ThreadId,
}

/// A player whose decode thread paints frames.
pub struct SyntheticPlayer {
    library: MediaLibrary,
    painter: FramePainter,
    frame_interval: Option<Duration>,
    session: Mutex<Option<Session>>,
}

impl SyntheticPlayer {
    fn send(&self, command: Command) {
        if let Some(session) = self.session.lock().as_ref() {
            // A closed channel means the decode thread already exited.
            let _ = session.commands.send(command);
        }
    }
}

impl MediaPlayer for SyntheticPlayer {
    fn open(&self, path: &Path, format: VideoFormat, callbacks: Arc<dyn PlayerCallbacks>) -> Result<()> {
        let probe = self.library.probe(path)?;
        self.stop();

        let (tx, rx) = unbounded();
        let decode = DecodeLoop {
            probe,
            format,
            painter: self.painter.clone(),
            frame_interval: self.frame_interval,
            callbacks,
            commands: rx,
            position: 0,
            playing: false,
        };
        let handle = thread::Builder::new()
            .name("synthetic-decoder".into())
            .spawn(move || decode.run())?;

        info!(path = %path.display(), "opened synthetic source");
        *self.session.lock() = Some(Session {
            commands: tx,
            thread: handle.thread().id(),
            handle,
        });
        Ok(())
    }

    fn play(&self) {
        self.send(Command::Play);
    }

    fn pause(&self) {
        self.send(Command::Pause);
    }

    fn seek(&self, frame: i64) {
        self.send(Command::Seek(frame));
    }

    fn stop(&self) {
        // Taken out first so event handlers running on the decode thread can
        // still lock the session while we join.
        let Some(session) = self.session.lock().take() else {
            return;
        };
        let _ = session.commands.send(Command::Stop);
        if thread::current().id() == session.thread {
            return;
        }
        if session.handle.join().is_err() {
            warn!("synthetic decode thread panicked");
        }
    }
}

impl Drop for SyntheticPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct DecodeLoop {
    probe: MediaProbe,
    format: VideoFormat,
    painter: FramePainter,
    frame_interval: Option<Duration>,
    callbacks: Arc<dyn PlayerCallbacks>,
    commands: Receiver<Command>,
    position: i64,
    playing: bool,
}

impl DecodeLoop {
    fn run(mut self) {
        loop {
            // Pending commands always go before the next frame.
            let command = if self.playing {
                match self.commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => return,
                }
            } else {
                match self.commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => return,
                }
            };

            match command {
                Some(Command::Stop) => {
                    self.playing = false;
                    self.callbacks.player_event(PlayerEvent::Stopped);
                    return;
                }
                Some(command) => self.handle(command),
                None => self.produce(),
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Play => {
                if self.position >= self.probe.frame_count {
                    self.playing = false;
                    self.callbacks.player_event(PlayerEvent::EndReached);
                } else if !self.playing {
                    self.playing = true;
                    self.callbacks.player_event(PlayerEvent::Playing);
                }
            }
            Command::Pause => {
                self.playing = false;
                self.callbacks.player_event(PlayerEvent::Paused);
            }
            Command::Seek(frame) => {
                self.position = frame.clamp(0, self.probe.frame_count);
                self.callbacks
                    .player_event(PlayerEvent::PositionChanged(self.position));
            }
            Command::Stop => {}
        }
    }

    fn produce(&mut self) {
        if self.position >= self.probe.frame_count {
            self.playing = false;
            debug!(path = %self.probe.path.display(), "end of source");
            self.callbacks.player_event(PlayerEvent::EndReached);
            return;
        }

        let mut frame = self.callbacks.lock_frame();
        if frame.width != self.format.width
            || frame.height != self.format.height
            || frame.format != self.format.pixel_format
        {
            frame = FrameBuffer::new(self.format.width, self.format.height, self.format.pixel_format);
        }
        (self.painter)(&self.probe.path, self.position, &mut frame);
        frame.position = Some(self.position);
        self.callbacks.unlock_frame(frame);
        self.position += 1;

        if let Some(interval) = self.frame_interval {
            thread::sleep(interval);
        }
    }
}
