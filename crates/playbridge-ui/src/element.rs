// crates/playbridge-ui/src/element.rs
//
// MediaElement: the control. Owns the bridge between one MediaEngine and the
// egui thread that displays it.
//
// Per frame (`update`):
//   1. run marshaled work posted by engine threads (dispatcher)
//   2. handle media events (loaded / looping / closed behaviors, listeners)
//   3. flush pump tick if due: engine change names → mirror refresh
//   4. take the newest frame of the current session, copy it into a
//      ColorImage, recycle it, upload the texture
//
// Teardown (`unload`) runs in a fixed order: stop the pump, close the engine,
// then release the control's own resources.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use egui::{Color32, ColorImage, Pos2, Rect, TextureHandle, TextureOptions, Vec2};

use playbridge_core::frame::DEFAULT_DPI;
use playbridge_core::{DecodedFrame, EngineError, MediaCommand, MediaEvent, MediaPlaybackState};
use playbridge_media::{ChangeQueue, MediaConnector, MediaEngine, SubscriptionId};

use crate::affinity::ThreadAffinityContext;
use crate::config::ElementConfig;
use crate::dispatch::Dispatcher;
use crate::helpers::layout::fit_rect;
use crate::mirror::StateMirror;
use crate::pump::FlushPump;
use crate::surface::TextureSurfaceFactory;

const TEXTURE_NAME: &str = "playbridge-video";

/// Routes engine events onto the owner thread and into the element's inbox.
struct AffinityConnector {
    affinity: ThreadAffinityContext,
    inbox:    Sender<MediaEvent>,
}

impl MediaConnector for AffinityConnector {
    fn notify(&self, event: MediaEvent) {
        let inbox = self.inbox.clone();
        self.affinity.run_or_post(move || {
            let _ = inbox.send(event);
        });
    }
}

/// Frame delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames copied into the texture.
    pub delivered:  u64,
    /// Frames skipped because a newer one was already queued.
    pub superseded: u64,
    /// Frames from a session that is no longer current.
    pub stale:      u64,
    /// Frames whose buffer failed validation or copy.
    pub invalid:    u64,
}

type EventListener = Box<dyn FnMut(&MediaEvent)>;

pub struct MediaElement {
    config:       ElementConfig,
    affinity:     ThreadAffinityContext,
    engine:       Arc<dyn MediaEngine>,
    mirror:       StateMirror,
    pump:         FlushPump,
    subscription: Option<SubscriptionId>,
    events:       Receiver<MediaEvent>,
    listeners:    Vec<EventListener>,
    surfaces:     TextureSurfaceFactory,
    texture:      Option<TextureHandle>,
    last_image:   Option<Arc<ColorImage>>,
    stats:        FrameStats,
    unloaded:     bool,
}

impl MediaElement {
    /// Build the control on the calling thread, which becomes its owner
    /// thread. The element takes over the engine's lifetime: unloading with
    /// the Close behavior disposes it.
    pub fn new(engine: Arc<dyn MediaEngine>, config: ElementConfig) -> Self {
        let affinity = ThreadAffinityContext::for_current_thread(Dispatcher::new());

        let queue = Arc::new(ChangeQueue::new());
        let subscription = queue.attach(engine.state());

        let (inbox, events) = unbounded();
        engine.attach_connector(Arc::new(AffinityConnector { affinity: affinity.clone(), inbox }));

        let mut mirror = StateMirror::new(Arc::clone(&engine), &config);
        for name in playbridge_core::PlaybackProperty::ALL {
            mirror.refresh(name);
        }
        if mirror.scrubbing_enabled() != config.scrubbing_enabled {
            mirror.set_scrubbing_enabled(config.scrubbing_enabled);
        }
        // The initial refresh above already reflects everything queued so far.
        queue.drain_distinct();

        let mut pump = FlushPump::new(queue, config.flush_interval());
        pump.start(Instant::now());

        log::debug!("[element] created, flush every {:?}", pump.interval());
        Self {
            config,
            affinity,
            engine,
            mirror,
            pump,
            subscription: Some(subscription),
            events,
            listeners:  Vec::new(),
            surfaces:   TextureSurfaceFactory::new(),
            texture:    None,
            last_image: None,
            stats:      FrameStats::default(),
            unloaded:   false,
        }
    }

    /// Like `new`, and wakes `ctx` whenever an engine thread marshals work.
    pub fn with_context(ctx: &egui::Context, engine: Arc<dyn MediaEngine>, config: ElementConfig) -> Self {
        let element = Self::new(engine, config);
        let ctx = ctx.clone();
        element.affinity.dispatcher().set_waker(move || ctx.request_repaint());
        element
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn mirror(&self) -> &StateMirror { &self.mirror }
    pub fn mirror_mut(&mut self) -> &mut StateMirror { &mut self.mirror }
    pub fn engine(&self) -> &Arc<dyn MediaEngine> { &self.engine }
    pub fn affinity(&self) -> &ThreadAffinityContext { &self.affinity }
    pub fn config(&self) -> &ElementConfig { &self.config }
    pub fn pump(&self) -> &FlushPump { &self.pump }
    pub fn stats(&self) -> FrameStats { self.stats }
    pub fn texture(&self) -> Option<&TextureHandle> { self.texture.as_ref() }
    pub fn is_unloaded(&self) -> bool { self.unloaded }

    /// The last frame shown, as uploaded.
    pub fn snapshot(&self) -> Option<Arc<ColorImage>> { self.last_image.clone() }

    pub fn on_media_event(&mut self, listener: impl FnMut(&MediaEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    // ── Frame loop ────────────────────────────────────────────────────────────

    pub fn update(&mut self, ctx: &egui::Context) {
        self.update_at(ctx, Instant::now());
    }

    /// `update` with an explicit clock, for hosts that drive time themselves.
    pub fn update_at(&mut self, ctx: &egui::Context, now: Instant) {
        if self.unloaded {
            return;
        }
        self.affinity.dispatcher().run_pending();
        self.process_events();
        self.pump.poll(now, &mut self.mirror);
        self.deliver_frames(ctx);
        if let Some(wait) = self.pump.time_until_next(now) {
            ctx.request_repaint_after(wait);
        }
    }

    /// Paint the current video frame into all of the available space.
    pub fn show(&mut self, ui: &mut egui::Ui) -> egui::Response {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::click());
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, Color32::BLACK);

        if let Some(tex) = &self.texture {
            let video = fit_rect(rect, self.content_size(tex), self.mirror.stretch(), self.mirror.stretch_direction());
            painter.image(
                tex.id(),
                video,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        }
        self.mirror.effects_mut().layout_dirty = false;
        response
    }

    /// Natural video size in points, honouring the configured DPI.
    fn content_size(&self, tex: &TextureHandle) -> Vec2 {
        let (w, h) = match (self.mirror.natural_video_width(), self.mirror.natural_video_height()) {
            (w, h) if w > 0 && h > 0 => (w as f32, h as f32),
            _ => (tex.size()[0] as f32, tex.size()[1] as f32),
        };
        let (dpi_x, dpi_y) = self.config.dpi();
        Vec2::new(w * (DEFAULT_DPI / dpi_x) as f32, h * (DEFAULT_DPI / dpi_y) as f32)
    }

    fn deliver_frames(&mut self, ctx: &egui::Context) {
        let current = self.engine.state().read(|s| s.session);
        let mut newest: Option<DecodedFrame> = None;
        while let Some(frame) = self.engine.try_next_frame() {
            if Some(frame.session) != current {
                self.stats.stale += 1;
                log::debug!("[element] dropping frame from stale session {}", frame.session);
                self.engine.recycle_frame(frame);
                continue;
            }
            if let Some(older) = newest.replace(frame) {
                self.stats.superseded += 1;
                self.engine.recycle_frame(older);
            }
        }
        let Some(frame) = newest else { return };

        let (dpi_x, dpi_y) = self.config.dpi();
        let copied = frame
            .view_with_dpi(dpi_x, dpi_y)
            .and_then(|view| view.materialize(&mut self.surfaces));
        // The copy has finished and the surface is unlocked; the buffer may go back.
        self.engine.recycle_frame(frame);

        match copied {
            Ok(image) => {
                let image = Arc::new(image);
                match &mut self.texture {
                    Some(tex) => tex.set(Arc::clone(&image), TextureOptions::LINEAR),
                    None => {
                        self.texture = Some(ctx.load_texture(TEXTURE_NAME, Arc::clone(&image), TextureOptions::LINEAR));
                    }
                }
                self.last_image = Some(image);
                self.stats.delivered += 1;
            }
            Err(e) => {
                self.stats.invalid += 1;
                log::warn!("[element] dropped frame: {e}");
            }
        }
    }

    // ── Events and behaviors ──────────────────────────────────────────────────

    fn process_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match &event {
                MediaEvent::Opened { session, info } => {
                    log::info!("[element] opened {} ({session})", info.source);
                    self.sync_now();
                    if self.mirror.loaded_behavior() == MediaPlaybackState::Play {
                        if let Err(e) = self.engine.play() {
                            log::warn!("[element] loaded behavior play: {e}");
                        }
                    }
                }
                MediaEvent::Ended { session } => {
                    if self.engine.state().read(|s| s.session) == Some(*session) {
                        self.apply_looping_behavior();
                    }
                }
                MediaEvent::Failed { session, message } => {
                    log::error!("[element] media failed ({session:?}): {message}");
                }
                MediaEvent::Closed { session } => {
                    log::debug!("[element] closed {session}");
                    self.mirror.reset_session();
                    self.sync_now();
                    self.texture    = None;
                    self.last_image = None;
                }
            }
            for listener in self.listeners.iter_mut() {
                listener(&event);
            }
        }
    }

    fn apply_looping_behavior(&mut self) {
        let outcome = match self.mirror.looping_behavior() {
            MediaPlaybackState::Play => {
                let start = self.mirror.playback_start_time().unwrap_or(Duration::ZERO);
                self.engine.seek(start).and_then(|()| self.engine.play())
            }
            MediaPlaybackState::Stop  => self.engine.stop(),
            MediaPlaybackState::Close => self.engine.close(),
            MediaPlaybackState::Pause | MediaPlaybackState::Manual => Ok(()),
        };
        if let Err(e) = outcome {
            log::warn!("[element] looping behavior: {e}");
        }
    }

    /// Flush now instead of waiting for the next tick.
    fn sync_now(&mut self) {
        self.pump.tick(&mut self.mirror);
    }

    /// Handle events raised inline by the last command, then flush.
    fn settle(&mut self) {
        self.affinity.dispatcher().run_pending();
        self.process_events();
        self.sync_now();
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    fn check_loaded(&self) -> Result<(), EngineError> {
        if self.unloaded { Err(EngineError::Disposed) } else { Ok(()) }
    }

    pub fn execute(&mut self, command: MediaCommand) -> Result<(), EngineError> {
        log::debug!("[element] {}", command.name());
        self.check_loaded()?;
        if command.requires_session() && !self.engine.state().is_open() {
            return Err(EngineError::NoSession);
        }
        match command {
            MediaCommand::Open(source) => self.open(&source),
            MediaCommand::Play         => self.play(),
            MediaCommand::Pause        => self.pause(),
            MediaCommand::Stop         => self.stop(),
            MediaCommand::Close        => self.close(),
            MediaCommand::Seek(p)      => self.seek(p).map(|_| ()),
        }
    }

    pub fn open(&mut self, source: &str) -> Result<(), EngineError> {
        self.check_loaded()?;
        let result = self.engine.open(source);
        self.settle();
        result
    }

    pub fn play(&mut self) -> Result<(), EngineError> {
        self.check_loaded()?;
        self.engine.play()?;
        self.settle();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.check_loaded()?;
        self.engine.pause()?;
        self.settle();
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.check_loaded()?;
        self.engine.stop()?;
        self.settle();
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), EngineError> {
        self.check_loaded()?;
        self.engine.close()?;
        self.settle();
        Ok(())
    }

    /// Seek through the position coercion. Returns the accepted position.
    pub fn seek(&mut self, position: Duration) -> Result<Duration, EngineError> {
        self.check_loaded()?;
        if !self.mirror.is_open() {
            return Err(EngineError::NoSession);
        }
        if !self.mirror.is_seekable() {
            return Err(EngineError::NotSeekable);
        }
        Ok(self.mirror.set_position(position))
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    pub fn prevent_shutdown(&self) -> bool {
        self.mirror.effects().prevent_shutdown
    }

    /// Host surface teardown. With unloaded_behavior Close: stop the pump,
    /// close and dispose the engine, then release everything else and return
    /// true. With any other behavior nothing happens and false is returned.
    pub fn unload(&mut self) -> bool {
        if self.unloaded {
            return true;
        }
        if self.prevent_shutdown() {
            log::debug!("[element] unload ignored, unloaded behavior is {:?}", self.mirror.unloaded_behavior());
            return false;
        }

        self.pump.stop();

        if self.engine.state().is_open() {
            if let Err(e) = self.engine.close() {
                log::warn!("[element] close on unload: {e}");
            }
        }
        self.engine.dispose();

        self.release();
        self.unloaded = true;
        log::debug!("[element] unloaded ({:?})", self.stats);
        true
    }

    fn release(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.engine.state().unsubscribe(id);
        }
        self.affinity.dispatcher().shutdown();
        while self.events.try_recv().is_ok() {}
        self.texture    = None;
        self.last_image = None;
    }

    /// Write the last displayed frame to `path` as an RGBA PNG.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let image = self.last_image.as_ref().context("no frame has been displayed yet")?;
        let [w, h] = image.size;
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut encoder = png::Encoder::new(BufWriter::new(file), w as u32, h as u32);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().context("writing PNG header")?;
        writer
            .write_image_data(bytemuck::cast_slice(&image.pixels))
            .context("writing PNG data")?;
        log::info!("[element] snapshot {w}x{h} saved to {}", path.display());
        Ok(())
    }
}

impl Drop for MediaElement {
    fn drop(&mut self) {
        if !self.unloaded {
            self.pump.stop();
            self.release();
        }
    }
}
