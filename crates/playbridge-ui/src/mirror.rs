// crates/playbridge-ui/src/mirror.rs
//
// StateMirror: the UI-thread copy of every playback property the control
// exposes, kept consistent with the engine in both directions.
//
//   user write   set_* / set(name, v)
//                  → coerce (validates against live engine state, forwards
//                    into EngineState, returns the engine's resulting value)
//                  → store, on_changed, observers
//   engine write EngineState notification → ChangeQueue → FlushPump tick
//                  → refresh(name) with the ReentrancyGuard held
//                  → same path, but every coerce passes the value through
//
// The guard is what keeps a refresh from being forwarded back into the
// engine. It is checked before anything else in every coercion.
//
// Owned by the UI thread (the guard is an Rc); never shared across threads.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use playbridge_core::helpers::time::clamp_duration;
use playbridge_core::state::{UnknownProperty, DEFAULT_BALANCE, DEFAULT_SPEED_RATIO, DEFAULT_VOLUME};
use playbridge_core::{
    CaptionsChannel, MediaPlaybackState, PlaybackProperty, PlaybackState, Stretch, StretchDirection,
};
use playbridge_media::{EngineState, MediaEngine};

use crate::config::ElementConfig;
use crate::error::MirrorError;

// ── Values ────────────────────────────────────────────────────────────────────

/// Dynamically typed property value, for the name-based API and observers.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Float(f64),
    UInt(u32),
    Duration(Duration),
    OptDuration(Option<Duration>),
    Text(Option<String>),
    MediaState(MediaPlaybackState),
    Stretch(Stretch),
    StretchDirection(StretchDirection),
    Captions(CaptionsChannel),
}

impl PropertyValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_)             => "bool",
            Self::Float(_)            => "float",
            Self::UInt(_)             => "uint",
            Self::Duration(_)         => "duration",
            Self::OptDuration(_)      => "optional duration",
            Self::Text(_)             => "text",
            Self::MediaState(_)       => "media state",
            Self::Stretch(_)          => "stretch",
            Self::StretchDirection(_) => "stretch direction",
            Self::Captions(_)         => "captions channel",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v)             => write!(f, "{v}"),
            Self::Float(v)            => write!(f, "{v}"),
            Self::UInt(v)             => write!(f, "{v}"),
            Self::Duration(v)         => write!(f, "{v:?}"),
            Self::OptDuration(Some(v)) => write!(f, "{v:?}"),
            Self::OptDuration(None)   => f.write_str("none"),
            Self::Text(Some(v))       => f.write_str(v),
            Self::Text(None)          => f.write_str("none"),
            Self::MediaState(v)       => write!(f, "{v:?}"),
            Self::Stretch(v)          => write!(f, "{v:?}"),
            Self::StretchDirection(v) => write!(f, "{v:?}"),
            Self::Captions(v)         => write!(f, "{v:?}"),
        }
    }
}

/// A type a mirror property can hold.
pub trait MirrorValue: Clone + PartialEq + fmt::Debug + 'static {
    const KIND: &'static str;
    fn into_value(self) -> PropertyValue;
    fn from_value(value: PropertyValue) -> Option<Self>;
}

macro_rules! mirror_value {
    ($ty:ty, $variant:ident, $kind:literal) => {
        impl MirrorValue for $ty {
            const KIND: &'static str = $kind;
            fn into_value(self) -> PropertyValue { PropertyValue::$variant(self) }
            fn from_value(value: PropertyValue) -> Option<Self> {
                match value {
                    PropertyValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

mirror_value!(bool, Bool, "bool");
mirror_value!(f64, Float, "float");
mirror_value!(u32, UInt, "uint");
mirror_value!(Duration, Duration, "duration");
mirror_value!(Option<Duration>, OptDuration, "optional duration");
mirror_value!(Option<String>, Text, "text");
mirror_value!(MediaPlaybackState, MediaState, "media state");
mirror_value!(Stretch, Stretch, "stretch");
mirror_value!(StretchDirection, StretchDirection, "stretch direction");
mirror_value!(CaptionsChannel, Captions, "captions channel");

// ── Reentrancy guard ──────────────────────────────────────────────────────────

/// Set while the mirror is being written from engine state.
#[derive(Clone, Default)]
pub struct ReentrancyGuard(Rc<Cell<bool>>);

impl ReentrancyGuard {
    pub fn is_held(&self) -> bool { self.0.get() }

    /// Hold the guard until the returned value drops. Nested holds restore
    /// the outer state.
    pub fn hold(&self) -> GuardHold {
        let previous = self.0.replace(true);
        GuardHold { guard: self.clone(), previous }
    }
}

pub struct GuardHold {
    guard:    ReentrancyGuard,
    previous: bool,
}

impl Drop for GuardHold {
    fn drop(&mut self) {
        self.guard.0.set(self.previous);
    }
}

// ── Properties ────────────────────────────────────────────────────────────────

/// What a coercion function may look at.
pub struct CoerceScope<'a> {
    pub engine:      &'a dyn MediaEngine,
    /// The reentrancy guard: true during an engine-driven refresh.
    pub updating:    bool,
    /// The mirror's own is_open / is_seekable, as last refreshed.
    pub is_open:     bool,
    pub is_seekable: bool,
}

pub type CoerceFn<T>   = fn(&CoerceScope<'_>, T) -> T;
pub type ChangedFn<T>  = fn(&mut ViewEffects, &T, &T);

pub struct MirrorProperty<T: MirrorValue> {
    pub name:       PlaybackProperty,
    pub default:    T,
    value:          T,
    coerce:         Option<CoerceFn<T>>,
    on_changed:     Option<ChangedFn<T>>,
}

impl<T: MirrorValue> MirrorProperty<T> {
    fn new(name: PlaybackProperty, default: T) -> Self {
        Self { name, value: default.clone(), default, coerce: None, on_changed: None }
    }

    fn coerced(mut self, coerce: CoerceFn<T>) -> Self {
        self.coerce = Some(coerce);
        self
    }

    fn changed(mut self, on_changed: ChangedFn<T>) -> Self {
        self.on_changed = Some(on_changed);
        self
    }

    fn starting_at(mut self, value: T) -> Self {
        self.value = value;
        self
    }

    pub fn value(&self) -> &T { &self.value }
}

/// Derived visual state the host reads back after property changes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewEffects {
    /// Stretch or natural size changed; the video rect must be refit.
    pub layout_dirty:        bool,
    /// The control must not be torn down on unload (unloaded_behavior != Close).
    pub prevent_shutdown:    bool,
    /// Bumped on every captions channel change; renderers reset on a new value.
    pub captions_generation: u64,
}

fn mark_layout<T>(fx: &mut ViewEffects, _old: &T, _new: &T) {
    fx.layout_dirty = true;
}

fn update_prevent_shutdown(fx: &mut ViewEffects, _old: &MediaPlaybackState, new: &MediaPlaybackState) {
    fx.prevent_shutdown = *new != MediaPlaybackState::Close;
}

fn reset_captions(fx: &mut ViewEffects, _old: &CaptionsChannel, _new: &CaptionsChannel) {
    fx.captions_generation += 1;
}

// ── Coercion ──────────────────────────────────────────────────────────────────

/// Forward a user preference into the engine and read back what it kept.
fn forward<T>(
    scope:    &CoerceScope<'_>,
    proposed: T,
    default:  T,
    write:    fn(&EngineState, T),
    read:     fn(&EngineState) -> T,
) -> T {
    if scope.updating {
        return proposed;
    }
    if scope.engine.is_disposed() {
        return default;
    }
    write(scope.engine.state(), proposed);
    read(scope.engine.state())
}

fn coerce_volume(scope: &CoerceScope<'_>, v: f64) -> f64 {
    forward(scope, v, DEFAULT_VOLUME, EngineState::set_volume, EngineState::volume)
}

fn coerce_balance(scope: &CoerceScope<'_>, v: f64) -> f64 {
    forward(scope, v, DEFAULT_BALANCE, EngineState::set_balance, EngineState::balance)
}

fn coerce_is_muted(scope: &CoerceScope<'_>, v: bool) -> bool {
    forward(scope, v, false, EngineState::set_is_muted, EngineState::is_muted)
}

fn coerce_speed_ratio(scope: &CoerceScope<'_>, v: f64) -> f64 {
    forward(scope, v, DEFAULT_SPEED_RATIO, EngineState::set_speed_ratio, EngineState::speed_ratio)
}

fn coerce_scrubbing(scope: &CoerceScope<'_>, v: bool) -> bool {
    forward(scope, v, true, EngineState::set_scrubbing_enabled, EngineState::scrubbing_enabled)
}

fn coerce_vsync(scope: &CoerceScope<'_>, v: bool) -> bool {
    forward(scope, v, true, EngineState::set_vertical_sync_enabled, EngineState::vertical_sync_enabled)
}

/// Closed or disposed → zero. Not seekable → pass through. Otherwise clamp
/// into the playback window and seek there; with no usable window, keep the
/// engine's current position and do not seek.
fn coerce_position(scope: &CoerceScope<'_>, p: Duration) -> Duration {
    if scope.updating {
        return p;
    }
    let engine = scope.engine;
    if engine.is_disposed() || !scope.is_open {
        return Duration::ZERO;
    }
    if !scope.is_seekable {
        return p;
    }
    let (start, end) = engine.state().read(PlaybackState::seek_range);
    if end <= start {
        return engine.state().position();
    }
    let target = clamp_duration(p, start, end);
    if let Err(e) = engine.seek(target) {
        log::warn!("[mirror] seek to {target:?} failed: {e}");
    }
    target
}

/// The engine-side value of an engine-backed property.
fn engine_value(name: PlaybackProperty, s: &PlaybackState) -> Option<PropertyValue> {
    use PlaybackProperty as P;
    use PropertyValue as V;
    Some(match name {
        P::Volume              => V::Float(s.volume),
        P::Balance             => V::Float(s.balance),
        P::IsMuted             => V::Bool(s.is_muted),
        P::SpeedRatio          => V::Float(s.speed_ratio),
        P::Position            => V::Duration(s.position),
        P::PlaybackStartTime   => V::OptDuration(s.playback_start_time),
        P::PlaybackEndTime     => V::OptDuration(s.playback_end_time),
        P::NaturalDuration     => V::OptDuration(s.natural_duration),
        P::ScrubbingEnabled    => V::Bool(s.scrubbing_enabled),
        P::VerticalSyncEnabled => V::Bool(s.vertical_sync_enabled),
        P::IsSeekable          => V::Bool(s.is_seekable),
        P::IsOpen              => V::Bool(s.is_open),
        P::IsOpening           => V::Bool(s.is_opening),
        P::MediaState          => V::MediaState(s.media_state),
        P::NaturalVideoWidth   => V::UInt(s.natural_video_width),
        P::NaturalVideoHeight  => V::UInt(s.natural_video_height),
        P::Source              => V::Text(s.source.clone()),
        _ => return None,
    })
}

// ── StateMirror ───────────────────────────────────────────────────────────────

struct Properties {
    volume:                    MirrorProperty<f64>,
    balance:                   MirrorProperty<f64>,
    is_muted:                  MirrorProperty<bool>,
    speed_ratio:               MirrorProperty<f64>,
    position:                  MirrorProperty<Duration>,
    playback_start_time:       MirrorProperty<Option<Duration>>,
    playback_end_time:         MirrorProperty<Option<Duration>>,
    natural_duration:          MirrorProperty<Option<Duration>>,
    scrubbing_enabled:         MirrorProperty<bool>,
    vertical_sync_enabled:     MirrorProperty<bool>,
    is_seekable:               MirrorProperty<bool>,
    is_open:                   MirrorProperty<bool>,
    is_opening:                MirrorProperty<bool>,
    media_state:               MirrorProperty<MediaPlaybackState>,
    natural_video_width:       MirrorProperty<u32>,
    natural_video_height:      MirrorProperty<u32>,
    source:                    MirrorProperty<Option<String>>,
    loaded_behavior:           MirrorProperty<MediaPlaybackState>,
    unloaded_behavior:         MirrorProperty<MediaPlaybackState>,
    looping_behavior:          MirrorProperty<MediaPlaybackState>,
    closed_captions_channel:   MirrorProperty<CaptionsChannel>,
    stretch:                   MirrorProperty<Stretch>,
    stretch_direction:         MirrorProperty<StretchDirection>,
    ignore_pixel_aspect_ratio: MirrorProperty<bool>,
}

impl Properties {
    fn new(config: &ElementConfig) -> Self {
        use PlaybackProperty as P;
        Self {
            volume:                MirrorProperty::new(P::Volume, DEFAULT_VOLUME).coerced(coerce_volume),
            balance:               MirrorProperty::new(P::Balance, DEFAULT_BALANCE).coerced(coerce_balance),
            is_muted:              MirrorProperty::new(P::IsMuted, false).coerced(coerce_is_muted),
            speed_ratio:           MirrorProperty::new(P::SpeedRatio, DEFAULT_SPEED_RATIO).coerced(coerce_speed_ratio),
            position:              MirrorProperty::new(P::Position, Duration::ZERO).coerced(coerce_position),
            playback_start_time:   MirrorProperty::new(P::PlaybackStartTime, None),
            playback_end_time:     MirrorProperty::new(P::PlaybackEndTime, None),
            natural_duration:      MirrorProperty::new(P::NaturalDuration, None),
            scrubbing_enabled:     MirrorProperty::new(P::ScrubbingEnabled, true).coerced(coerce_scrubbing),
            vertical_sync_enabled: MirrorProperty::new(P::VerticalSyncEnabled, true).coerced(coerce_vsync),
            is_seekable:           MirrorProperty::new(P::IsSeekable, false),
            is_open:               MirrorProperty::new(P::IsOpen, false),
            is_opening:            MirrorProperty::new(P::IsOpening, false),
            media_state:           MirrorProperty::new(P::MediaState, MediaPlaybackState::Close),
            natural_video_width:   MirrorProperty::new(P::NaturalVideoWidth, 0).changed(mark_layout),
            natural_video_height:  MirrorProperty::new(P::NaturalVideoHeight, 0).changed(mark_layout),
            source:                MirrorProperty::new(P::Source, None),

            loaded_behavior: MirrorProperty::new(P::LoadedBehavior, MediaPlaybackState::Manual)
                .starting_at(config.loaded_behavior),
            unloaded_behavior: MirrorProperty::new(P::UnloadedBehavior, MediaPlaybackState::Close)
                .changed(update_prevent_shutdown)
                .starting_at(config.unloaded_behavior),
            looping_behavior: MirrorProperty::new(P::LoopingBehavior, MediaPlaybackState::Pause)
                .starting_at(config.looping_behavior),
            closed_captions_channel: MirrorProperty::new(P::ClosedCaptionsChannel, CaptionsChannel::Ccp)
                .changed(reset_captions),
            stretch: MirrorProperty::new(P::Stretch, Stretch::Uniform)
                .changed(mark_layout)
                .starting_at(config.stretch),
            stretch_direction: MirrorProperty::new(P::StretchDirection, StretchDirection::Both)
                .changed(mark_layout)
                .starting_at(config.stretch_direction),
            ignore_pixel_aspect_ratio: MirrorProperty::new(P::IgnorePixelAspectRatio, false)
                .changed(mark_layout),
        }
    }
}

/// Runs `$body` with `$p` bound to the property named `$name`.
macro_rules! with_property {
    ($props:expr, $name:expr, $p:ident => $body:expr) => {{
        use PlaybackProperty as P;
        match $name {
            P::Volume                 => { let $p = &$props.volume; $body }
            P::Balance                => { let $p = &$props.balance; $body }
            P::IsMuted                => { let $p = &$props.is_muted; $body }
            P::SpeedRatio             => { let $p = &$props.speed_ratio; $body }
            P::Position               => { let $p = &$props.position; $body }
            P::PlaybackStartTime      => { let $p = &$props.playback_start_time; $body }
            P::PlaybackEndTime        => { let $p = &$props.playback_end_time; $body }
            P::NaturalDuration        => { let $p = &$props.natural_duration; $body }
            P::ScrubbingEnabled       => { let $p = &$props.scrubbing_enabled; $body }
            P::VerticalSyncEnabled    => { let $p = &$props.vertical_sync_enabled; $body }
            P::IsSeekable             => { let $p = &$props.is_seekable; $body }
            P::IsOpen                 => { let $p = &$props.is_open; $body }
            P::IsOpening              => { let $p = &$props.is_opening; $body }
            P::MediaState             => { let $p = &$props.media_state; $body }
            P::NaturalVideoWidth      => { let $p = &$props.natural_video_width; $body }
            P::NaturalVideoHeight     => { let $p = &$props.natural_video_height; $body }
            P::Source                 => { let $p = &$props.source; $body }
            P::LoadedBehavior         => { let $p = &$props.loaded_behavior; $body }
            P::UnloadedBehavior       => { let $p = &$props.unloaded_behavior; $body }
            P::LoopingBehavior        => { let $p = &$props.looping_behavior; $body }
            P::ClosedCaptionsChannel  => { let $p = &$props.closed_captions_channel; $body }
            P::Stretch                => { let $p = &$props.stretch; $body }
            P::StretchDirection       => { let $p = &$props.stretch_direction; $body }
            P::IgnorePixelAspectRatio => { let $p = &$props.ignore_pixel_aspect_ratio; $body }
        }
    }};
}

type Observer = Box<dyn FnMut(&PropertyValue, &PropertyValue)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub struct StateMirror {
    engine:        Arc<dyn MediaEngine>,
    guard:         ReentrancyGuard,
    props:         Properties,
    effects:       ViewEffects,
    observers:     Vec<(ObserverId, PlaybackProperty, Observer)>,
    next_observer: u64,
}

macro_rules! accessors {
    (read: $($field:ident: $ty:ty),* $(,)?) => {
        $( pub fn $field(&self) -> $ty { self.props.$field.value.clone() } )*
    };
    (write: $($field:ident / $setter:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $field(&self) -> $ty { self.props.$field.value.clone() }
            pub fn $setter(&mut self, value: $ty) -> $ty { self.write(|p| &mut p.$field, value) }
        )*
    };
}

impl StateMirror {
    pub fn new(engine: Arc<dyn MediaEngine>, config: &ElementConfig) -> Self {
        let props = Properties::new(config);
        let effects = ViewEffects {
            prevent_shutdown: config.unloaded_behavior != MediaPlaybackState::Close,
            ..ViewEffects::default()
        };
        Self {
            engine,
            guard: ReentrancyGuard::default(),
            props,
            effects,
            observers: Vec::new(),
            next_observer: 1,
        }
    }

    pub fn guard(&self) -> &ReentrancyGuard { &self.guard }
    pub fn effects(&self) -> &ViewEffects { &self.effects }
    pub fn effects_mut(&mut self) -> &mut ViewEffects { &mut self.effects }
    pub fn engine(&self) -> &Arc<dyn MediaEngine> { &self.engine }

    accessors!(write:
        volume / set_volume: f64,
        balance / set_balance: f64,
        is_muted / set_is_muted: bool,
        speed_ratio / set_speed_ratio: f64,
        position / set_position: Duration,
        scrubbing_enabled / set_scrubbing_enabled: bool,
        vertical_sync_enabled / set_vertical_sync_enabled: bool,
        loaded_behavior / set_loaded_behavior: MediaPlaybackState,
        unloaded_behavior / set_unloaded_behavior: MediaPlaybackState,
        looping_behavior / set_looping_behavior: MediaPlaybackState,
        closed_captions_channel / set_closed_captions_channel: CaptionsChannel,
        stretch / set_stretch: Stretch,
        stretch_direction / set_stretch_direction: StretchDirection,
        ignore_pixel_aspect_ratio / set_ignore_pixel_aspect_ratio: bool,
    );

    accessors!(read:
        playback_start_time: Option<Duration>,
        playback_end_time: Option<Duration>,
        natural_duration: Option<Duration>,
        is_seekable: bool,
        is_open: bool,
        is_opening: bool,
        media_state: MediaPlaybackState,
        natural_video_width: u32,
        natural_video_height: u32,
        source: Option<String>,
    );

    // ── Name-based API ────────────────────────────────────────────────────────

    pub fn get(&self, name: PlaybackProperty) -> PropertyValue {
        with_property!(self.props, name, p => p.value.clone().into_value())
    }

    pub fn default_value(&self, name: PlaybackProperty) -> PropertyValue {
        with_property!(self.props, name, p => p.default.clone().into_value())
    }

    /// User write by name. Returns the accepted value, which may differ from
    /// `value` after coercion.
    pub fn set(&mut self, name: PlaybackProperty, value: PropertyValue) -> Result<PropertyValue, MirrorError> {
        if name.is_read_only() {
            return Err(MirrorError::ReadOnly(name));
        }
        self.assign(name, value)
    }

    /// `set` keyed by the property's name, matched case-insensitively.
    pub fn set_by_name(&mut self, name: &str, value: PropertyValue) -> Result<PropertyValue, MirrorError> {
        let name: PlaybackProperty = name.parse().map_err(|e: UnknownProperty| MirrorError::UnknownProperty(e.0))?;
        self.set(name, value)
    }

    /// Pull the engine's current value for `name` into the mirror without
    /// forwarding it back. A no-op once the engine is disposed, for
    /// element-only names, and for session-scoped names while no session is
    /// open, which leaves the last good value in place.
    pub fn refresh(&mut self, name: PlaybackProperty) {
        if self.engine.is_disposed() {
            log::trace!("[mirror] refresh {name} skipped: engine disposed");
            return;
        }
        let value = self.engine.state().read(|s| {
            if name.is_session_scoped() && !s.is_open && !s.is_opening {
                None
            } else {
                engine_value(name, s)
            }
        });
        let Some(value) = value else { return };
        let _hold = self.guard.hold();
        if let Err(e) = self.assign(name, value) {
            log::error!("[mirror] refresh {name}: {e}");
        }
    }

    /// Put every session-scoped property back to its default without
    /// touching the engine.
    pub fn reset_session(&mut self) {
        let _hold = self.guard.hold();
        for name in PlaybackProperty::ALL.into_iter().filter(|p| p.is_session_scoped()) {
            let default = self.default_value(name);
            if let Err(e) = self.assign(name, default) {
                log::error!("[mirror] reset {name}: {e}");
            }
        }
    }

    // ── Observers ─────────────────────────────────────────────────────────────

    /// Call `observer(old, new)` after every accepted change of `name`.
    /// Writes that leave the value unchanged are not reported.
    pub fn observe(
        &mut self,
        name: PlaybackProperty,
        observer: impl FnMut(&PropertyValue, &PropertyValue) + 'static,
    ) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, name, Box::new(observer)));
        id
    }

    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _, _)| *oid != id);
        self.observers.len() != before
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn assign(&mut self, name: PlaybackProperty, value: PropertyValue) -> Result<PropertyValue, MirrorError> {
        use PlaybackProperty as P;
        match name {
            P::Volume                 => self.write_value(name, |p| &mut p.volume, value),
            P::Balance                => self.write_value(name, |p| &mut p.balance, value),
            P::IsMuted                => self.write_value(name, |p| &mut p.is_muted, value),
            P::SpeedRatio             => self.write_value(name, |p| &mut p.speed_ratio, value),
            P::Position               => self.write_value(name, |p| &mut p.position, value),
            P::PlaybackStartTime      => self.write_value(name, |p| &mut p.playback_start_time, value),
            P::PlaybackEndTime        => self.write_value(name, |p| &mut p.playback_end_time, value),
            P::NaturalDuration        => self.write_value(name, |p| &mut p.natural_duration, value),
            P::ScrubbingEnabled       => self.write_value(name, |p| &mut p.scrubbing_enabled, value),
            P::VerticalSyncEnabled    => self.write_value(name, |p| &mut p.vertical_sync_enabled, value),
            P::IsSeekable             => self.write_value(name, |p| &mut p.is_seekable, value),
            P::IsOpen                 => self.write_value(name, |p| &mut p.is_open, value),
            P::IsOpening              => self.write_value(name, |p| &mut p.is_opening, value),
            P::MediaState             => self.write_value(name, |p| &mut p.media_state, value),
            P::NaturalVideoWidth      => self.write_value(name, |p| &mut p.natural_video_width, value),
            P::NaturalVideoHeight     => self.write_value(name, |p| &mut p.natural_video_height, value),
            P::Source                 => self.write_value(name, |p| &mut p.source, value),
            P::LoadedBehavior         => self.write_value(name, |p| &mut p.loaded_behavior, value),
            P::UnloadedBehavior       => self.write_value(name, |p| &mut p.unloaded_behavior, value),
            P::LoopingBehavior        => self.write_value(name, |p| &mut p.looping_behavior, value),
            P::ClosedCaptionsChannel  => self.write_value(name, |p| &mut p.closed_captions_channel, value),
            P::Stretch                => self.write_value(name, |p| &mut p.stretch, value),
            P::StretchDirection       => self.write_value(name, |p| &mut p.stretch_direction, value),
            P::IgnorePixelAspectRatio => self.write_value(name, |p| &mut p.ignore_pixel_aspect_ratio, value),
        }
    }

    fn write_value<T: MirrorValue>(
        &mut self,
        name:  PlaybackProperty,
        pick:  fn(&mut Properties) -> &mut MirrorProperty<T>,
        value: PropertyValue,
    ) -> Result<PropertyValue, MirrorError> {
        let actual = value.kind();
        let typed = T::from_value(value).ok_or(MirrorError::TypeMismatch {
            property: name,
            expected: T::KIND,
            actual,
        })?;
        Ok(self.write(pick, typed).into_value())
    }

    /// The one write path: coerce, store, then report if the value moved.
    fn write<T: MirrorValue>(&mut self, pick: fn(&mut Properties) -> &mut MirrorProperty<T>, proposed: T) -> T {
        let scope = CoerceScope {
            engine:      self.engine.as_ref(),
            updating:    self.guard.is_held(),
            is_open:     self.props.is_open.value,
            is_seekable: self.props.is_seekable.value,
        };
        let prop = pick(&mut self.props);
        let accepted = match prop.coerce {
            Some(coerce) => coerce(&scope, proposed),
            None => proposed,
        };
        let old = std::mem::replace(&mut prop.value, accepted.clone());
        if old == accepted {
            return accepted;
        }
        if let Some(on_changed) = prop.on_changed {
            on_changed(&mut self.effects, &old, &accepted);
        }
        let name = prop.name;
        let (old, new) = (old.into_value(), accepted.clone().into_value());
        for (_, target, observer) in self.observers.iter_mut() {
            if *target == name {
                observer(&old, &new);
            }
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use playbridge_core::{DecodedFrame, EngineError};
    use playbridge_media::MediaConnector;
    use std::cell::RefCell;

    /// Engine double: EngineState plus a log of seeks, with configurable session.
    #[derive(Default)]
    struct FakeEngine {
        state:    EngineState,
        seeks:    Mutex<Vec<Duration>>,
        disposed: std::sync::atomic::AtomicBool,
    }

    impl FakeEngine {
        fn with_session(start: Duration, end: Duration) -> Arc<Self> {
            let engine = Arc::new(Self::default());
            engine.state.update(|s| {
                s.is_open             = true;
                s.is_seekable         = true;
                s.playback_start_time = Some(start);
                s.playback_end_time   = Some(end);
                s.natural_duration    = Some(end - start);
            });
            engine
        }
    }

    impl MediaEngine for FakeEngine {
        fn state(&self) -> &EngineState { &self.state }
        fn is_disposed(&self) -> bool { self.disposed.load(std::sync::atomic::Ordering::SeqCst) }
        fn attach_connector(&self, _: Arc<dyn MediaConnector>) {}
        fn open(&self, _: &str) -> Result<(), EngineError> { Ok(()) }
        fn play(&self) -> Result<(), EngineError> { Ok(()) }
        fn pause(&self) -> Result<(), EngineError> { Ok(()) }
        fn stop(&self) -> Result<(), EngineError> { Ok(()) }
        fn close(&self) -> Result<(), EngineError> { Ok(()) }
        fn seek(&self, position: Duration) -> Result<(), EngineError> {
            self.seeks.lock().push(position);
            Ok(())
        }
        fn try_next_frame(&self) -> Option<DecodedFrame> { None }
        fn recycle_frame(&self, _: DecodedFrame) {}
        fn dispose(&self) { self.disposed.store(true, std::sync::atomic::Ordering::SeqCst) }
    }

    fn mirror_over(engine: &Arc<FakeEngine>) -> StateMirror {
        let dyn_engine: Arc<dyn MediaEngine> = engine.clone();
        let mut mirror = StateMirror::new(dyn_engine, &ElementConfig::default());
        for p in PlaybackProperty::ALL {
            mirror.refresh(p);
        }
        mirror
    }

    fn secs(s: u64) -> Duration { Duration::from_secs(s) }

    #[test]
    fn position_clamps_into_window_and_seeks_once() {
        let engine = FakeEngine::with_session(secs(0), secs(10));
        let mut m = mirror_over(&engine);
        for (proposed, expected) in [(15, 10), (4, 4), (0, 0)] {
            engine.seeks.lock().clear();
            assert_eq!(m.set_position(secs(proposed)), secs(expected));
            assert_eq!(*engine.seeks.lock(), vec![secs(expected)]);
        }
    }

    #[test]
    fn position_below_start_clamps_to_start() {
        let engine = FakeEngine::with_session(secs(2), secs(10));
        let mut m = mirror_over(&engine);
        assert_eq!(m.set_position(secs(1)), secs(2));
    }

    #[test]
    fn degenerate_window_takes_engine_position_without_seeking() {
        let engine = FakeEngine::with_session(secs(5), secs(5));
        engine.state.update(|s| s.position = secs(3));
        let mut m = mirror_over(&engine);
        assert_eq!(m.position(), secs(3));

        // The engine moves on before the next flush reaches the mirror.
        engine.state.update(|s| s.position = secs(7));
        assert_eq!(m.set_position(secs(8)), secs(7));
        assert_eq!(m.position(), secs(7));
        assert!(engine.seeks.lock().is_empty());
    }

    #[test]
    fn position_is_zero_when_closed() {
        let engine = Arc::new(FakeEngine::default());
        let mut m = mirror_over(&engine);
        assert_eq!(m.set_position(secs(4)), Duration::ZERO);
        assert!(engine.seeks.lock().is_empty());
    }

    #[test]
    fn position_passes_through_when_not_seekable() {
        let engine = FakeEngine::with_session(secs(0), secs(10));
        engine.state.update(|s| s.is_seekable = false);
        let mut m = mirror_over(&engine);
        assert_eq!(m.set_position(secs(42)), secs(42));
        assert!(engine.seeks.lock().is_empty());
    }

    #[test]
    fn volume_returns_engine_clamped_value() {
        let engine = FakeEngine::with_session(secs(0), secs(10));
        let mut m = mirror_over(&engine);
        assert_eq!(m.set_volume(1.5), 1.0);
        assert_eq!(m.set_volume(0.25), 0.25);
        assert_eq!(engine.state.volume(), 0.25);
        assert_eq!(m.set_balance(-3.0), -1.0);
        assert_eq!(m.set_speed_ratio(2.0), 2.0);
    }

    #[test]
    fn preferences_forward_without_a_session() {
        let engine = Arc::new(FakeEngine::default());
        let mut m = mirror_over(&engine);
        assert!(m.set_is_muted(true));
        assert!(engine.state.is_muted());
    }

    #[test]
    fn disposed_engine_yields_defaults() {
        let engine = FakeEngine::with_session(secs(0), secs(10));
        let mut m = mirror_over(&engine);
        engine.dispose();
        assert_eq!(m.set_volume(0.3), DEFAULT_VOLUME);
        assert_eq!(m.set_position(secs(3)), Duration::ZERO);
    }

    #[test]
    fn guard_makes_set_a_pass_through() {
        let engine = FakeEngine::with_session(secs(0), secs(10));
        let mut m = mirror_over(&engine);
        let guard = m.guard().clone();
        let _hold = guard.hold();
        assert_eq!(m.set_volume(7.0), 7.0);
        assert_eq!(m.set_position(secs(99)), secs(99));
        assert_eq!(engine.state.volume(), 1.0);
        assert!(engine.seeks.lock().is_empty());
    }

    #[test]
    fn guard_holds_nest() {
        let g = ReentrancyGuard::default();
        {
            let _outer = g.hold();
            {
                let _inner = g.hold();
            }
            assert!(g.is_held());
        }
        assert!(!g.is_held());
    }

    #[test]
    fn refresh_pulls_engine_value_without_forwarding() {
        let engine = FakeEngine::with_session(secs(0), secs(10));
        let mut m = mirror_over(&engine);
        engine.state.update(|s| s.position = secs(6));
        m.refresh(PlaybackProperty::Position);
        assert_eq!(m.position(), secs(6));
        assert!(engine.seeks.lock().is_empty());
        assert!(!m.guard().is_held());
    }

    #[test]
    fn repeated_refresh_reports_one_change() {
        let engine = FakeEngine::with_session(secs(0), secs(10));
        let mut m = mirror_over(&engine);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        m.observe(PlaybackProperty::Volume, move |old, new| sink.borrow_mut().push((old.clone(), new.clone())));

        engine.state.set_volume(0.5);
        m.refresh(PlaybackProperty::Volume);
        m.refresh(PlaybackProperty::Volume);
        assert_eq!(*seen.borrow(), vec![(PropertyValue::Float(1.0), PropertyValue::Float(0.5))]);
    }

    #[test]
    fn session_scoped_refresh_is_noop_when_closed() {
        let engine = FakeEngine::with_session(secs(0), secs(10));
        let mut m = mirror_over(&engine);
        engine.state.update(|s| s.position = secs(4));
        m.refresh(PlaybackProperty::Position);
        engine.state.update(|s| s.reset_session());
        m.refresh(PlaybackProperty::Position);
        m.refresh(PlaybackProperty::PlaybackEndTime);
        assert_eq!(m.position(), secs(4));
        assert_eq!(m.playback_end_time(), Some(secs(10)));
        m.refresh(PlaybackProperty::IsOpen);
        assert!(!m.is_open());
    }

    #[test]
    fn refresh_after_dispose_is_noop() {
        let engine = FakeEngine::with_session(secs(0), secs(10));
        let mut m = mirror_over(&engine);
        engine.state.set_volume(0.1);
        engine.dispose();
        m.refresh(PlaybackProperty::Volume);
        assert_eq!(m.volume(), 1.0);
    }

    #[test]
    fn reset_session_restores_defaults_only_for_session_fields() {
        let engine = FakeEngine::with_session(secs(0), secs(10));
        let mut m = mirror_over(&engine);
        m.set_volume(0.4);
        m.reset_session();
        assert_eq!(m.playback_end_time(), None);
        assert_eq!(m.position(), Duration::ZERO);
        assert_eq!(m.volume(), 0.4);
        assert!(engine.seeks.lock().is_empty());
    }

    #[test]
    fn read_only_and_mistyped_sets_are_rejected() {
        let engine = Arc::new(FakeEngine::default());
        let mut m = mirror_over(&engine);
        assert_eq!(
            m.set(PlaybackProperty::IsOpen, PropertyValue::Bool(true)),
            Err(MirrorError::ReadOnly(PlaybackProperty::IsOpen))
        );
        assert!(matches!(
            m.set(PlaybackProperty::Volume, PropertyValue::Bool(true)),
            Err(MirrorError::TypeMismatch { expected: "float", actual: "bool", .. })
        ));
        assert_eq!(
            m.set(PlaybackProperty::Volume, PropertyValue::Float(2.0)),
            Ok(PropertyValue::Float(1.0))
        );
    }

    #[test]
    fn set_by_name_parses_and_rejects_unknown_names() {
        let engine = Arc::new(FakeEngine::default());
        let mut m = mirror_over(&engine);
        assert_eq!(m.set_by_name("balance", PropertyValue::Float(0.5)), Ok(PropertyValue::Float(0.5)));
        assert_eq!(engine.state.balance(), 0.5);
        assert_eq!(
            m.set_by_name("Loudness", PropertyValue::Float(0.5)),
            Err(MirrorError::UnknownProperty("Loudness".into()))
        );
        assert_eq!(
            m.set_by_name("IsSeekable", PropertyValue::Bool(true)),
            Err(MirrorError::ReadOnly(PlaybackProperty::IsSeekable))
        );
    }

    #[test]
    fn element_only_properties_drive_view_effects() {
        let engine = Arc::new(FakeEngine::default());
        let mut m = mirror_over(&engine);
        assert!(!m.effects().prevent_shutdown);

        m.set_unloaded_behavior(MediaPlaybackState::Manual);
        assert!(m.effects().prevent_shutdown);

        m.set_stretch(Stretch::Fill);
        assert!(m.effects().layout_dirty);

        m.set_closed_captions_channel(CaptionsChannel::Cc2);
        m.set_closed_captions_channel(CaptionsChannel::Cc2);
        assert_eq!(m.effects().captions_generation, 1);
    }

    #[test]
    fn get_reads_back_by_name() {
        let engine = FakeEngine::with_session(secs(0), secs(10));
        let m = mirror_over(&engine);
        assert_eq!(m.get(PlaybackProperty::PlaybackEndTime), PropertyValue::OptDuration(Some(secs(10))));
        assert_eq!(m.get(PlaybackProperty::Stretch), PropertyValue::Stretch(Stretch::Uniform));
        assert_eq!(m.default_value(PlaybackProperty::MediaState), PropertyValue::MediaState(MediaPlaybackState::Close));
    }
}
