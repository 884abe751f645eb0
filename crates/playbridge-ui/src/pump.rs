// crates/playbridge-ui/src/pump.rs
//
// FlushPump: the fixed-cadence owner-thread task that drains the ChangeQueue
// and refreshes each distinct changed property once.
//
// The pump owns no timer. The host calls `poll(now, ..)` from its frame loop
// (MediaElement::update) and schedules its next wake with `time_until_next`.
// When a tick is late, the next one is scheduled a full interval after the
// late tick rather than bursting to catch up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use playbridge_core::PlaybackProperty;
use playbridge_media::ChangeQueue;

use crate::mirror::StateMirror;

/// Something a flush can refresh by name.
pub trait RefreshTarget {
    fn refresh(&mut self, name: PlaybackProperty);
}

impl RefreshTarget for StateMirror {
    fn refresh(&mut self, name: PlaybackProperty) {
        StateMirror::refresh(self, name);
    }
}

pub struct FlushPump {
    queue:    Arc<ChangeQueue>,
    interval: Duration,
    next_due: Option<Instant>,
    ticks:    u64,
}

impl FlushPump {
    pub fn new(queue: Arc<ChangeQueue>, interval: Duration) -> Self {
        Self { queue, interval: interval.max(Duration::from_millis(1)), next_due: None, ticks: 0 }
    }

    pub fn queue(&self) -> &Arc<ChangeQueue> { &self.queue }
    pub fn interval(&self) -> Duration { self.interval }
    pub fn is_running(&self) -> bool { self.next_due.is_some() }
    pub fn ticks(&self) -> u64 { self.ticks }

    /// Schedule the first tick one interval from `now`. No-op when running.
    pub fn start(&mut self, now: Instant) {
        if self.next_due.is_none() {
            self.next_due = Some(now + self.interval);
        }
    }

    /// After this, `poll` never ticks again until `start`.
    pub fn stop(&mut self) {
        self.next_due = None;
    }

    /// Tick if due. Returns the number of properties refreshed, or None when
    /// no tick ran.
    pub fn poll(&mut self, now: Instant, target: &mut impl RefreshTarget) -> Option<usize> {
        let due = self.next_due?;
        if now < due {
            return None;
        }
        self.next_due = Some(now + self.interval);
        Some(self.tick(target))
    }

    /// Drain and refresh immediately, regardless of schedule.
    pub fn tick(&mut self, target: &mut impl RefreshTarget) -> usize {
        self.ticks += 1;
        let changed = self.queue.drain_distinct();
        if !changed.is_empty() {
            log::trace!("[pump] tick {} refreshing {} propert(ies)", self.ticks, changed.len());
        }
        for name in changed.iter() {
            target.refresh(name);
        }
        changed.len()
    }

    /// Time until the next scheduled tick; None when stopped.
    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.next_due.map(|due| due.saturating_duration_since(now))
    }
}
