// crates/playbridge-media/src/worker.rs
//
// PlaybackEngine: the stock MediaEngine. One dedicated playback thread owns
// the open source, advances the clock and paints pooled frames; the public
// API sends it commands and keeps EngineState current.
//
// Threads:
//   caller:   open/play/pause/stop/close/seek; writes EngineState, sends WorkerCmd
//   playback: recv_timeout(frame interval) loop; writes position, sends frames
//
// Frames travel on a bounded channel. When the consumer falls behind, the
// oldest queued frame is recycled to make room so the newest always gets in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use playbridge_core::helpers::time::{clamp_duration, format_timecode, scale_elapsed};
use playbridge_core::{DecodedFrame, EngineError, MediaEvent, MediaInfo, MediaPlaybackState};

use crate::engine::{MediaConnector, MediaEngine};
use crate::pool::FramePool;
use crate::source::{MediaSource, SourceOpener, SourceRegistry};
use crate::state::EngineState;

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Decoded frames in circulation between the playback thread and the consumer.
    pub frame_pool_size:     usize,
    /// Frames that may wait in the channel before the oldest is recycled.
    pub frame_queue_depth:   usize,
    /// Retry interval for a paused render that found the pool empty.
    pub idle_frame_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_pool_size:     4,
            frame_queue_depth:   2,
            idle_frame_interval: Duration::from_millis(10),
        }
    }
}

// ── Internal types ────────────────────────────────────────────────────────────

enum WorkerCmd {
    Start { session: Uuid, source: Box<dyn MediaSource> },
    Play,
    Pause,
    Stop,
    Seek(Duration),
    Close,
    Shutdown,
}

struct Shared {
    state:     EngineState,
    connector: RwLock<Option<Arc<dyn MediaConnector>>>,
    pool:      FramePool,
}

impl Shared {
    fn raise(&self, event: MediaEvent) {
        // Clone out so the connector runs without the lock held.
        let connector = self.connector.read().clone();
        match connector {
            Some(c) => c.notify(event),
            None    => log::trace!("[engine] no connector for {event:?}"),
        }
    }
}

// ── PlaybackEngine ────────────────────────────────────────────────────────────

pub struct PlaybackEngine {
    shared:    Arc<Shared>,
    opener:    Box<dyn SourceOpener>,
    cmd_tx:    Sender<WorkerCmd>,
    frame_rx:  Receiver<DecodedFrame>,
    open_lock: Mutex<()>,
    disposed:  AtomicBool,
    thread:    Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackEngine {
    pub fn new(opener: impl SourceOpener + 'static, config: EngineConfig) -> Self {
        let shared = Arc::new(Shared {
            state:     EngineState::new(),
            connector: RwLock::new(None),
            pool:      FramePool::new(config.frame_pool_size),
        });
        let (cmd_tx, cmd_rx)     = unbounded::<WorkerCmd>();
        let (frame_tx, frame_rx) = bounded::<DecodedFrame>(config.frame_queue_depth.max(1));

        let worker = PlaybackThread {
            shared:              Arc::clone(&shared),
            cmd_rx,
            frame_tx,
            frame_drain:         frame_rx.clone(),
            idle_frame_interval: config.idle_frame_interval,
            session:             None,
        };
        let handle = thread::Builder::new()
            .name("playbridge-playback".into())
            .spawn(move || worker.run());
        let thread = match handle {
            Ok(h) => Some(h),
            Err(e) => {
                // The engine still answers queries; every command reports WorkerGone.
                log::error!("[engine] failed to spawn playback thread: {e}");
                None
            }
        };

        Self {
            shared,
            opener: Box::new(opener),
            cmd_tx,
            frame_rx,
            open_lock: Mutex::new(()),
            disposed:  AtomicBool::new(false),
            thread:    Mutex::new(thread),
        }
    }

    /// Engine over the default source registry.
    pub fn with_defaults() -> Self {
        Self::new(SourceRegistry::with_defaults(), EngineConfig::default())
    }

    fn send(&self, cmd: WorkerCmd) -> Result<(), EngineError> {
        self.cmd_tx.send(cmd).map_err(|_| EngineError::WorkerGone)
    }

    fn check_alive(&self) -> Result<(), EngineError> {
        if self.disposed.load(Ordering::Acquire) {
            Err(EngineError::Disposed)
        } else {
            Ok(())
        }
    }

    fn require_session(&self) -> Result<Uuid, EngineError> {
        self.check_alive()?;
        self.shared
            .state
            .read(|s| s.session.filter(|_| s.is_open))
            .ok_or(EngineError::NoSession)
    }

    fn drain_frames(&self) {
        while let Ok(frame) = self.frame_rx.try_recv() {
            self.shared.pool.recycle(frame);
        }
    }

    fn close_session(&self, session: Uuid) -> Result<(), EngineError> {
        self.send(WorkerCmd::Close)?;
        self.shared.state.update(|s| {
            s.reset_session();
            s.media_state = MediaPlaybackState::Close;
        });
        self.drain_frames();
        log::info!("[engine] closed session {session}");
        self.shared.raise(MediaEvent::Closed { session });
        Ok(())
    }
}

impl MediaEngine for PlaybackEngine {
    fn state(&self) -> &EngineState { &self.shared.state }

    fn is_disposed(&self) -> bool { self.disposed.load(Ordering::Acquire) }

    fn attach_connector(&self, connector: Arc<dyn MediaConnector>) {
        *self.shared.connector.write() = Some(connector);
    }

    fn open(&self, uri: &str) -> Result<(), EngineError> {
        self.check_alive()?;
        let Some(_opening) = self.open_lock.try_lock() else {
            return Err(EngineError::Busy);
        };
        if let Ok(previous) = self.require_session() {
            self.close_session(previous)?;
        }

        let state = &self.shared.state;
        state.update(|s| s.is_opening = true);

        let source = match self.opener.open(uri) {
            Ok(source) => source,
            Err(e) => {
                state.update(|s| s.is_opening = false);
                log::error!("[engine] open {uri}: {e}");
                self.shared.raise(MediaEvent::Failed { session: None, message: e.to_string() });
                return Err(e);
            }
        };

        let info: MediaInfo = source.info().clone();
        let session = Uuid::new_v4();
        state.update(|s| {
            s.is_opening          = false;
            s.is_open             = true;
            s.session             = Some(session);
            s.source              = Some(info.source.clone());
            s.playback_start_time = Some(info.start_time);
            s.playback_end_time   = info.end_time();
            s.natural_duration    = info.natural_duration;
            s.is_seekable         = info.is_seekable;
            s.natural_video_width = info.width;
            s.natural_video_height = info.height;
            s.position            = info.start_time;
            s.media_state         = MediaPlaybackState::Stop;
        });
        self.send(WorkerCmd::Start { session, source })?;

        log::info!(
            "[engine] opened {uri} as {session} ({}x{} @ {:.2} fps, {})",
            info.width,
            info.height,
            info.frame_rate,
            info.natural_duration.map(format_timecode).unwrap_or_else(|| "live".into()),
        );
        self.shared.raise(MediaEvent::Opened { session, info });
        Ok(())
    }

    fn play(&self) -> Result<(), EngineError> {
        self.require_session()?;
        self.shared.state.update(|s| s.media_state = MediaPlaybackState::Play);
        self.send(WorkerCmd::Play)
    }

    fn pause(&self) -> Result<(), EngineError> {
        self.require_session()?;
        self.shared.state.update(|s| s.media_state = MediaPlaybackState::Pause);
        self.send(WorkerCmd::Pause)
    }

    fn stop(&self) -> Result<(), EngineError> {
        self.require_session()?;
        self.shared.state.update(|s| s.media_state = MediaPlaybackState::Stop);
        self.send(WorkerCmd::Stop)
    }

    fn close(&self) -> Result<(), EngineError> {
        let session = self.require_session()?;
        self.close_session(session)
    }

    fn seek(&self, position: Duration) -> Result<(), EngineError> {
        self.require_session()?;
        let (seekable, (start, end)) = self.shared.state.read(|s| (s.is_seekable, s.seek_range()));
        if !seekable {
            return Err(EngineError::NotSeekable);
        }
        self.send(WorkerCmd::Seek(clamp_duration(position, start, end)))
    }

    fn try_next_frame(&self) -> Option<DecodedFrame> {
        self.frame_rx.try_recv().ok()
    }

    fn recycle_frame(&self, frame: DecodedFrame) {
        self.shared.pool.recycle(frame);
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.cmd_tx.send(WorkerCmd::Shutdown);
        if let Some(handle) = self.thread.lock().take() {
            if handle.thread().id() == thread::current().id() {
                log::warn!("[engine] dispose called from the playback thread, not joining");
            } else if handle.join().is_err() {
                log::error!("[engine] playback thread panicked");
            }
        }
        self.drain_frames();
        self.shared.state.update(|s| {
            s.reset_session();
            s.media_state = MediaPlaybackState::Close;
        });
        log::debug!("[engine] disposed");
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ── Playback thread ───────────────────────────────────────────────────────────

struct Session {
    id:           Uuid,
    source:       Box<dyn MediaSource>,
    info:         MediaInfo,
    position:     Duration,
    playing:      bool,
    last_tick:    Instant,
    needs_render: bool,
}

struct PlaybackThread {
    shared:              Arc<Shared>,
    cmd_rx:              Receiver<WorkerCmd>,
    frame_tx:            Sender<DecodedFrame>,
    /// Receiver clone used to evict the oldest queued frame when the channel is full.
    frame_drain:         Receiver<DecodedFrame>,
    idle_frame_interval: Duration,
    session:             Option<Session>,
}

impl PlaybackThread {
    fn run(mut self) {
        loop {
            let timeout = match &self.session {
                Some(s) if s.playing      => Some(s.info.frame_interval()),
                Some(s) if s.needs_render => Some(self.idle_frame_interval),
                _ => None,
            };
            let cmd = match timeout {
                Some(t) => match self.cmd_rx.recv_timeout(t) {
                    Ok(cmd)                             => Some(cmd),
                    Err(RecvTimeoutError::Timeout)      => None,
                    Err(RecvTimeoutError::Disconnected) => return,
                },
                None => match self.cmd_rx.recv() {
                    Ok(cmd) => Some(cmd),
                    Err(_)  => return,
                },
            };
            if let Some(cmd) = cmd {
                if !self.handle(cmd) {
                    log::debug!("[pb] shutdown");
                    return;
                }
            }
            self.tick();
        }
    }

    /// Returns false on shutdown.
    fn handle(&mut self, cmd: WorkerCmd) -> bool {
        match cmd {
            WorkerCmd::Start { session, source } => {
                let info = source.info().clone();
                self.session = Some(Session {
                    id:           session,
                    position:     info.start_time,
                    source,
                    info,
                    playing:      false,
                    last_tick:    Instant::now(),
                    needs_render: true,
                });
            }
            WorkerCmd::Play => {
                if let Some(s) = &mut self.session {
                    if s.info.end_time().is_some_and(|end| s.position >= end) {
                        s.position = s.info.start_time;
                    }
                    s.playing      = true;
                    s.last_tick    = Instant::now();
                    s.needs_render = true;
                }
            }
            WorkerCmd::Pause => {
                if let Some(s) = &mut self.session {
                    s.playing = false;
                }
            }
            WorkerCmd::Stop => {
                if let Some(s) = &mut self.session {
                    s.playing      = false;
                    s.position     = s.info.start_time;
                    s.needs_render = true;
                }
            }
            WorkerCmd::Seek(target) => {
                let scrub = self.shared.state.scrubbing_enabled();
                if let Some(s) = &mut self.session {
                    s.position     = target;
                    s.last_tick    = Instant::now();
                    s.needs_render = s.playing || scrub;
                }
            }
            WorkerCmd::Close => self.session = None,
            WorkerCmd::Shutdown => return false,
        }
        self.publish_position(false);
        true
    }

    fn tick(&mut self) {
        let speed = self.shared.state.speed_ratio();
        let Some(s) = &mut self.session else { return };

        let mut ended = false;
        if s.playing {
            let now     = Instant::now();
            let elapsed = now - s.last_tick;
            s.last_tick = now;
            s.position += scale_elapsed(elapsed, speed);
            if let Some(end) = s.info.end_time() {
                if s.position >= end {
                    s.position = end;
                    s.playing  = false;
                    ended      = true;
                }
            }
            s.needs_render = true;
        }

        if s.needs_render {
            self.render();
        }
        self.publish_position(ended);

        if ended {
            if let Some(s) = &self.session {
                log::debug!("[pb] session {} reached end at {}", s.id, format_timecode(s.position));
                self.shared.raise(MediaEvent::Ended { session: s.id });
            }
        }
    }

    /// Write the clock into EngineState, unless the session was closed meanwhile.
    fn publish_position(&self, ended: bool) {
        let Some(s) = &self.session else { return };
        let (id, position) = (s.id, s.position);
        self.shared.state.update(|st| {
            if st.session == Some(id) {
                st.position = position;
                if ended {
                    st.media_state = MediaPlaybackState::Pause;
                }
            }
        });
    }

    fn render(&mut self) {
        let Some(s) = &mut self.session else { return };
        let Some(mut frame) = self.shared.pool.acquire() else {
            log::trace!("[pb] pool exhausted, retrying");
            return;
        };
        s.needs_render = false;

        if let Err(e) = s.source.read_frame(s.position, &mut frame) {
            self.shared.pool.recycle(frame);
            log::warn!("[pb] read_frame at {}: {e}", format_timecode(s.position));
            let session = s.id;
            s.playing = false;
            self.shared.raise(MediaEvent::Failed { session: Some(session), message: e.to_string() });
            return;
        }
        frame.session  = s.id;
        frame.position = s.position;

        match self.frame_tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                if let Ok(oldest) = self.frame_drain.try_recv() {
                    self.shared.pool.recycle(oldest);
                }
                if let Err(e) = self.frame_tx.try_send(frame) {
                    self.shared.pool.recycle(e.into_inner());
                }
            }
            Err(TrySendError::Disconnected(frame)) => self.shared.pool.recycle(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChannelConnector;
    use playbridge_core::PlaybackProperty;

    fn engine() -> (PlaybackEngine, Receiver<MediaEvent>) {
        let engine = PlaybackEngine::with_defaults();
        let (tx, rx) = unbounded();
        engine.attach_connector(Arc::new(ChannelConnector(tx)));
        (engine, rx)
    }

    fn wait_for_frame(engine: &PlaybackEngine) -> DecodedFrame {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(f) = engine.try_next_frame() {
                return f;
            }
            assert!(Instant::now() < deadline, "no frame produced");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn transport_without_session_fails_fast() {
        let (engine, _) = engine();
        assert_eq!(engine.play(), Err(EngineError::NoSession));
        assert_eq!(engine.seek(Duration::from_secs(1)), Err(EngineError::NoSession));
        assert_eq!(engine.close(), Err(EngineError::NoSession));
    }

    #[test]
    fn open_publishes_session_facts() {
        let (engine, events) = engine();
        engine.open("pattern:16x8@25/4").unwrap();
        let s = engine.state().snapshot();
        assert!(s.is_open && !s.is_opening && s.is_seekable);
        assert_eq!(s.playback_end_time, Some(Duration::from_secs(4)));
        assert_eq!((s.natural_video_width, s.natural_video_height), (16, 8));
        assert_eq!(s.media_state, MediaPlaybackState::Stop);
        assert!(matches!(events.try_recv(), Ok(MediaEvent::Opened { .. })));
    }

    #[test]
    fn opened_session_renders_first_frame() {
        let (engine, _) = engine();
        engine.open("pattern:16x8@25/4").unwrap();
        let frame = wait_for_frame(&engine);
        assert_eq!(Some(frame.session), engine.state().snapshot().session);
        assert_eq!(frame.width, 16);
        assert!(frame.view().is_ok());
        engine.recycle_frame(frame);
    }

    #[test]
    fn failed_open_reports_and_clears_opening() {
        let (engine, events) = engine();
        assert!(engine.open("nope:thing").is_err());
        assert!(!engine.state().snapshot().is_opening);
        assert!(matches!(events.try_recv(), Ok(MediaEvent::Failed { session: None, .. })));
    }

    #[test]
    fn seek_on_live_source_is_rejected() {
        let (engine, _) = engine();
        engine.open("pattern:8x8@25/live").unwrap();
        assert_eq!(engine.seek(Duration::from_secs(1)), Err(EngineError::NotSeekable));
    }

    #[test]
    fn seek_clamps_into_range() {
        let (engine, _) = engine();
        engine.open("pattern:8x8@25/2").unwrap();
        engine.seek(Duration::from_secs(30)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while engine.state().position() != Duration::from_secs(2) {
            assert!(Instant::now() < deadline, "position never reached the end");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn playback_advances_and_ends() {
        let (engine, events) = engine();
        engine.open("pattern:8x8@100/0.1").unwrap();
        let _ = events.try_recv();
        engine.play().unwrap();
        let ended = events.recv_timeout(Duration::from_secs(3));
        assert!(matches!(ended, Ok(MediaEvent::Ended { .. })), "{ended:?}");
        let s = engine.state().snapshot();
        assert_eq!(s.position, Duration::from_millis(100));
        assert_eq!(s.media_state, MediaPlaybackState::Pause);
    }

    #[test]
    fn close_resets_session_and_notifies() {
        let (engine, events) = engine();
        engine.open("pattern:8x8@25/1").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.state().subscribe(move |p| sink.lock().push(p));

        engine.close().unwrap();
        let s = engine.state().snapshot();
        assert!(!s.is_open);
        assert_eq!(s.session, None);
        assert!(seen.lock().contains(&PlaybackProperty::IsOpen));
        assert!(events.try_iter().any(|e| matches!(e, MediaEvent::Closed { .. })));
    }

    #[test]
    fn dispose_is_idempotent() {
        let (engine, _) = engine();
        engine.open("pattern:8x8@25/1").unwrap();
        engine.dispose();
        engine.dispose();
        assert!(engine.is_disposed());
        assert_eq!(engine.open("pattern:8x8@25/1"), Err(EngineError::Disposed));
        assert!(!engine.state().is_open());
    }

    #[test]
    fn reopen_replaces_session() {
        let (engine, _) = engine();
        engine.open("pattern:8x8@25/1").unwrap();
        let first = engine.state().snapshot().session;
        engine.open("pattern:4x4@25/1").unwrap();
        let second = engine.state().snapshot().session;
        assert_ne!(first, second);
        assert_eq!(engine.state().snapshot().natural_video_width, 4);
    }
}
