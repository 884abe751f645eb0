// crates/playbridge-core/src/state.rs
//
// Pure playback data. No egui, no threads, no engine handles.
// The engine owns a live PlaybackState behind a lock (playbridge-media::state);
// the UI side only ever sees copies of it through the mirror refresh path.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_VOLUME:      f64 = 1.0;
pub const DEFAULT_BALANCE:     f64 = 0.0;
pub const DEFAULT_SPEED_RATIO: f64 = 1.0;
pub const MIN_SPEED_RATIO:     f64 = 0.0;
pub const MAX_SPEED_RATIO:     f64 = 8.0;

/// Playback state of a session, and the vocabulary for the loaded / unloaded /
/// looping behaviors of the control.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaPlaybackState {
    /// Nothing happens automatically; the host drives play/pause.
    #[default]
    Manual,
    Play,
    Close,
    Pause,
    Stop,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stretch {
    None,
    Fill,
    #[default]
    Uniform,
    UniformToFill,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StretchDirection {
    UpOnly,
    DownOnly,
    #[default]
    Both,
}

/// Closed-caption channel selection. `Ccp` means captions are passed through
/// untouched (no channel selected).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptionsChannel {
    #[default]
    Ccp,
    Cc1,
    Cc2,
    Cc3,
    Cc4,
}

// ── Property names ────────────────────────────────────────────────────────────

/// Name of every field the control mirrors.
///
/// The first block is engine-backed: the engine raises a change notification
/// carrying one of these names whenever it mutates the matching field of
/// `PlaybackState`. The second block exists only on the control side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PlaybackProperty {
    Volume,
    Balance,
    IsMuted,
    SpeedRatio,
    Position,
    PlaybackStartTime,
    PlaybackEndTime,
    NaturalDuration,
    ScrubbingEnabled,
    VerticalSyncEnabled,
    IsSeekable,
    IsOpen,
    IsOpening,
    MediaState,
    NaturalVideoWidth,
    NaturalVideoHeight,
    Source,

    LoadedBehavior,
    UnloadedBehavior,
    LoopingBehavior,
    ClosedCaptionsChannel,
    Stretch,
    StretchDirection,
    IgnorePixelAspectRatio,
}

impl PlaybackProperty {
    pub const ALL: [PlaybackProperty; 24] = [
        Self::Volume,
        Self::Balance,
        Self::IsMuted,
        Self::SpeedRatio,
        Self::Position,
        Self::PlaybackStartTime,
        Self::PlaybackEndTime,
        Self::NaturalDuration,
        Self::ScrubbingEnabled,
        Self::VerticalSyncEnabled,
        Self::IsSeekable,
        Self::IsOpen,
        Self::IsOpening,
        Self::MediaState,
        Self::NaturalVideoWidth,
        Self::NaturalVideoHeight,
        Self::Source,
        Self::LoadedBehavior,
        Self::UnloadedBehavior,
        Self::LoopingBehavior,
        Self::ClosedCaptionsChannel,
        Self::Stretch,
        Self::StretchDirection,
        Self::IgnorePixelAspectRatio,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Volume                 => "Volume",
            Self::Balance                => "Balance",
            Self::IsMuted                => "IsMuted",
            Self::SpeedRatio             => "SpeedRatio",
            Self::Position               => "Position",
            Self::PlaybackStartTime      => "PlaybackStartTime",
            Self::PlaybackEndTime        => "PlaybackEndTime",
            Self::NaturalDuration        => "NaturalDuration",
            Self::ScrubbingEnabled       => "ScrubbingEnabled",
            Self::VerticalSyncEnabled    => "VerticalSyncEnabled",
            Self::IsSeekable             => "IsSeekable",
            Self::IsOpen                 => "IsOpen",
            Self::IsOpening              => "IsOpening",
            Self::MediaState             => "MediaState",
            Self::NaturalVideoWidth      => "NaturalVideoWidth",
            Self::NaturalVideoHeight     => "NaturalVideoHeight",
            Self::Source                 => "Source",
            Self::LoadedBehavior         => "LoadedBehavior",
            Self::UnloadedBehavior       => "UnloadedBehavior",
            Self::LoopingBehavior        => "LoopingBehavior",
            Self::ClosedCaptionsChannel  => "ClosedCaptionsChannel",
            Self::Stretch                => "Stretch",
            Self::StretchDirection       => "StretchDirection",
            Self::IgnorePixelAspectRatio => "IgnorePixelAspectRatio",
        }
    }

    /// True for names the engine raises change notifications for.
    pub fn is_engine_backed(self) -> bool {
        (self as u8) <= (Self::Source as u8)
    }

    /// Fields only the engine may write. Setting them on the mirror is an error.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Self::PlaybackStartTime
                | Self::PlaybackEndTime
                | Self::NaturalDuration
                | Self::IsSeekable
                | Self::IsOpen
                | Self::IsOpening
                | Self::MediaState
                | Self::NaturalVideoWidth
                | Self::NaturalVideoHeight
                | Self::Source
        )
    }

    /// Fields whose value only means something while a session is open.
    pub fn is_session_scoped(self) -> bool {
        matches!(
            self,
            Self::Position
                | Self::PlaybackStartTime
                | Self::PlaybackEndTime
                | Self::NaturalDuration
                | Self::IsSeekable
                | Self::NaturalVideoWidth
                | Self::NaturalVideoHeight
                | Self::Source
        )
    }
}

impl fmt::Display for PlaybackProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaybackProperty {
    type Err = UnknownProperty;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownProperty(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown playback property '{0}'")]
pub struct UnknownProperty(pub String);

// ── PropertySet ───────────────────────────────────────────────────────────────

/// Allocation-free set of property names, iterated in declaration order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropertySet(u32);

impl PropertySet {
    pub const fn empty() -> Self { Self(0) }

    /// Returns true if `prop` was not already present.
    pub fn insert(&mut self, prop: PlaybackProperty) -> bool {
        let bit = 1u32 << (prop as u8);
        let fresh = self.0 & bit == 0;
        self.0 |= bit;
        fresh
    }

    pub fn contains(&self, prop: PlaybackProperty) -> bool {
        self.0 & (1u32 << (prop as u8)) != 0
    }

    pub fn is_empty(&self) -> bool { self.0 == 0 }

    pub fn len(&self) -> usize { self.0.count_ones() as usize }

    pub fn clear(&mut self) { self.0 = 0; }

    /// Empties the set, returning what it held.
    pub fn take(&mut self) -> PropertySet {
        std::mem::take(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = PlaybackProperty> + '_ {
        PlaybackProperty::ALL.iter().copied().filter(|p| self.contains(*p))
    }
}

impl FromIterator<PlaybackProperty> for PropertySet {
    fn from_iter<I: IntoIterator<Item = PlaybackProperty>>(iter: I) -> Self {
        let mut set = PropertySet::empty();
        for p in iter {
            set.insert(p);
        }
        set
    }
}

// ── PlaybackState ─────────────────────────────────────────────────────────────

/// The engine's view of one playback session plus the user preferences that
/// survive across sessions (volume, balance, mute, speed, scrub, vsync).
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    pub volume:                f64,
    pub balance:               f64,
    pub is_muted:              bool,
    pub speed_ratio:           f64,
    pub position:              Duration,
    pub playback_start_time:   Option<Duration>,
    pub playback_end_time:     Option<Duration>,
    pub natural_duration:      Option<Duration>,
    pub scrubbing_enabled:     bool,
    pub vertical_sync_enabled: bool,
    pub is_seekable:           bool,
    pub is_open:               bool,
    pub is_opening:            bool,
    pub media_state:           MediaPlaybackState,
    pub natural_video_width:   u32,
    pub natural_video_height:  u32,
    pub source:                Option<String>,
    /// Id of the open session. Not mirrored; used to reject stale frames.
    pub session:               Option<Uuid>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            volume:                DEFAULT_VOLUME,
            balance:               DEFAULT_BALANCE,
            is_muted:              false,
            speed_ratio:           DEFAULT_SPEED_RATIO,
            position:              Duration::ZERO,
            playback_start_time:   None,
            playback_end_time:     None,
            natural_duration:      None,
            scrubbing_enabled:     true,
            vertical_sync_enabled: true,
            is_seekable:           false,
            is_open:               false,
            is_opening:            false,
            media_state:           MediaPlaybackState::Close,
            natural_video_width:   0,
            natural_video_height:  0,
            source:                None,
            session:               None,
        }
    }
}

impl PlaybackState {
    /// Clear every session-scoped field, keeping the user preferences.
    pub fn reset_session(&mut self) {
        let keep = Self {
            volume:                self.volume,
            balance:               self.balance,
            is_muted:              self.is_muted,
            speed_ratio:           self.speed_ratio,
            scrubbing_enabled:     self.scrubbing_enabled,
            vertical_sync_enabled: self.vertical_sync_enabled,
            ..Self::default()
        };
        *self = keep;
    }

    /// Names of the engine-backed fields that differ between `self` and `other`.
    pub fn changed_properties(&self, other: &PlaybackState) -> PropertySet {
        use PlaybackProperty as P;
        let mut set = PropertySet::empty();
        let mut mark = |differs: bool, p: P| {
            if differs {
                set.insert(p);
            }
        };
        mark(self.volume != other.volume, P::Volume);
        mark(self.balance != other.balance, P::Balance);
        mark(self.is_muted != other.is_muted, P::IsMuted);
        mark(self.speed_ratio != other.speed_ratio, P::SpeedRatio);
        mark(self.position != other.position, P::Position);
        mark(self.playback_start_time != other.playback_start_time, P::PlaybackStartTime);
        mark(self.playback_end_time != other.playback_end_time, P::PlaybackEndTime);
        mark(self.natural_duration != other.natural_duration, P::NaturalDuration);
        mark(self.scrubbing_enabled != other.scrubbing_enabled, P::ScrubbingEnabled);
        mark(self.vertical_sync_enabled != other.vertical_sync_enabled, P::VerticalSyncEnabled);
        mark(self.is_seekable != other.is_seekable, P::IsSeekable);
        mark(self.is_open != other.is_open, P::IsOpen);
        mark(self.is_opening != other.is_opening, P::IsOpening);
        mark(self.media_state != other.media_state, P::MediaState);
        mark(self.natural_video_width != other.natural_video_width, P::NaturalVideoWidth);
        mark(self.natural_video_height != other.natural_video_height, P::NaturalVideoHeight);
        mark(self.source != other.source, P::Source);
        set
    }

    /// The seekable window as `(start, end)`, with absent bounds read as zero.
    pub fn seek_range(&self) -> (Duration, Duration) {
        (
            self.playback_start_time.unwrap_or(Duration::ZERO),
            self.playback_end_time.unwrap_or(Duration::ZERO),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_names_round_trip_through_from_str() {
        for p in PlaybackProperty::ALL {
            assert_eq!(p.as_str().parse::<PlaybackProperty>(), Ok(p));
        }
        assert!("NoSuchThing".parse::<PlaybackProperty>().is_err());
    }

    #[test]
    fn engine_backed_block_ends_at_source() {
        assert!(PlaybackProperty::Source.is_engine_backed());
        assert!(PlaybackProperty::Volume.is_engine_backed());
        assert!(!PlaybackProperty::LoadedBehavior.is_engine_backed());
        assert!(!PlaybackProperty::Stretch.is_engine_backed());
    }

    #[test]
    fn property_set_deduplicates() {
        let mut set = PropertySet::empty();
        assert!(set.insert(PlaybackProperty::Volume));
        assert!(!set.insert(PlaybackProperty::Volume));
        assert!(set.insert(PlaybackProperty::Position));
        assert_eq!(set.len(), 2);
        let names: Vec<_> = set.iter().collect();
        assert_eq!(names, vec![PlaybackProperty::Volume, PlaybackProperty::Position]);
        let taken = set.take();
        assert!(set.is_empty());
        assert_eq!(taken.len(), 2);
    }

    #[test]
    fn reset_session_keeps_preferences() {
        let mut s = PlaybackState {
            volume:      0.4,
            is_muted:    true,
            speed_ratio: 2.0,
            position:    Duration::from_secs(3),
            is_open:     true,
            source:      Some("pattern:4x4@30/1".into()),
            ..PlaybackState::default()
        };
        s.reset_session();
        assert_eq!(s.volume, 0.4);
        assert!(s.is_muted);
        assert_eq!(s.speed_ratio, 2.0);
        assert_eq!(s.position, Duration::ZERO);
        assert!(!s.is_open);
        assert!(s.source.is_none());
    }

    #[test]
    fn changed_properties_reports_only_differences() {
        let a = PlaybackState::default();
        let mut b = a.clone();
        b.volume = 0.5;
        b.position = Duration::from_millis(10);
        let diff = a.changed_properties(&b);
        assert_eq!(diff.len(), 2);
        assert!(diff.contains(PlaybackProperty::Volume));
        assert!(diff.contains(PlaybackProperty::Position));
        assert!(a.changed_properties(&a).is_empty());
    }

    #[test]
    fn seek_range_treats_absent_bounds_as_zero() {
        let s = PlaybackState {
            playback_end_time: Some(Duration::from_secs(10)),
            ..PlaybackState::default()
        };
        assert_eq!(s.seek_range(), (Duration::ZERO, Duration::from_secs(10)));
    }
}
