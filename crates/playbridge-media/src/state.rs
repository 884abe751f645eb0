// crates/playbridge-media/src/state.rs
//
// EngineState: the engine-owned PlaybackState behind a lock, with one change
// notification per mutated field.
//
// Every write goes through `update`, which snapshots, mutates, diffs and then
// notifies outside the lock so listeners may read the state back. Listeners
// run on the writing thread (usually the playback thread) and must not block;
// the control's listener only pushes the property name into a ChangeQueue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use playbridge_core::state::{MAX_SPEED_RATIO, MIN_SPEED_RATIO};
use playbridge_core::{MediaPlaybackState, PlaybackProperty, PlaybackState, PropertySet};

type Listener = Box<dyn Fn(PlaybackProperty) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Inner {
    state:     RwLock<PlaybackState>,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_id:   AtomicU64,
}

/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct EngineState {
    inner: Arc<Inner>,
}

impl Default for EngineState {
    fn default() -> Self { Self::new() }
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state:     RwLock::new(PlaybackState::default()),
                listeners: RwLock::new(Vec::new()),
                next_id:   AtomicU64::new(1),
            }),
        }
    }

    // ── Subscriptions ─────────────────────────────────────────────────────────

    pub fn subscribe(&self, listener: impl Fn(PlaybackProperty) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> PlaybackState {
        self.inner.state.read().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&PlaybackState) -> R) -> R {
        f(&self.inner.state.read())
    }

    pub fn volume(&self) -> f64 { self.read(|s| s.volume) }
    pub fn balance(&self) -> f64 { self.read(|s| s.balance) }
    pub fn is_muted(&self) -> bool { self.read(|s| s.is_muted) }
    pub fn speed_ratio(&self) -> f64 { self.read(|s| s.speed_ratio) }
    pub fn position(&self) -> Duration { self.read(|s| s.position) }
    pub fn scrubbing_enabled(&self) -> bool { self.read(|s| s.scrubbing_enabled) }
    pub fn vertical_sync_enabled(&self) -> bool { self.read(|s| s.vertical_sync_enabled) }
    pub fn is_open(&self) -> bool { self.read(|s| s.is_open) }
    pub fn media_state(&self) -> MediaPlaybackState { self.read(|s| s.media_state) }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Mutate the state and notify once per field that actually changed.
    pub fn update(&self, f: impl FnOnce(&mut PlaybackState)) -> PropertySet {
        let changed = {
            let mut state = self.inner.state.write();
            let before = state.clone();
            f(&mut state);
            before.changed_properties(&state)
        };
        if !changed.is_empty() {
            let listeners = self.inner.listeners.read();
            for prop in changed.iter() {
                for (_, listener) in listeners.iter() {
                    listener(prop);
                }
            }
        }
        changed
    }

    /// Clamped to [0, 1]; non-finite values are ignored.
    pub fn set_volume(&self, volume: f64) {
        if volume.is_finite() {
            self.update(|s| s.volume = volume.clamp(0.0, 1.0));
        }
    }

    /// Clamped to [-1, 1]; non-finite values are ignored.
    pub fn set_balance(&self, balance: f64) {
        if balance.is_finite() {
            self.update(|s| s.balance = balance.clamp(-1.0, 1.0));
        }
    }

    /// Clamped to [MIN_SPEED_RATIO, MAX_SPEED_RATIO]; non-finite values are ignored.
    pub fn set_speed_ratio(&self, ratio: f64) {
        if ratio.is_finite() {
            self.update(|s| s.speed_ratio = ratio.clamp(MIN_SPEED_RATIO, MAX_SPEED_RATIO));
        }
    }

    pub fn set_is_muted(&self, muted: bool) {
        self.update(|s| s.is_muted = muted);
    }

    pub fn set_scrubbing_enabled(&self, enabled: bool) {
        self.update(|s| s.scrubbing_enabled = enabled);
    }

    pub fn set_vertical_sync_enabled(&self, enabled: bool) {
        self.update(|s| s.vertical_sync_enabled = enabled);
    }
}
