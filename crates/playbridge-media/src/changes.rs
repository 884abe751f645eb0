// crates/playbridge-media/src/changes.rs
//
// ChangeQueue: the multi-producer, single-consumer queue of changed property
// names between engine threads and the UI thread.
//
// Producers never block and never fail while the queue is alive. The consumer
// drains everything present at the moment of the call and collapses repeats,
// so a property that changed forty times between flushes is refreshed once.

use crossbeam_channel::{unbounded, Receiver, Sender};

use playbridge_core::{PlaybackProperty, PropertySet};

use crate::state::{EngineState, SubscriptionId};

pub struct ChangeQueue {
    tx: Sender<PlaybackProperty>,
    rx: Receiver<PlaybackProperty>,
}

/// Producer half; clone one into each notifying thread.
#[derive(Clone)]
pub struct ChangeProducer {
    tx: Sender<PlaybackProperty>,
}

impl ChangeProducer {
    pub fn enqueue(&self, prop: PlaybackProperty) {
        // The consumer side only disappears at teardown; late changes are moot.
        let _ = self.tx.send(prop);
    }
}

impl Default for ChangeQueue {
    fn default() -> Self { Self::new() }
}

impl ChangeQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn producer(&self) -> ChangeProducer {
        ChangeProducer { tx: self.tx.clone() }
    }

    pub fn enqueue(&self, prop: PlaybackProperty) {
        let _ = self.tx.send(prop);
    }

    /// Feed every change notification raised by `state` into this queue.
    pub fn attach(&self, state: &EngineState) -> SubscriptionId {
        let producer = self.producer();
        state.subscribe(move |prop| producer.enqueue(prop))
    }

    /// Take every queued name, deduplicated. Names enqueued while this runs
    /// may land in this drain or the next one, never in neither.
    pub fn drain_distinct(&self) -> PropertySet {
        let mut set = PropertySet::empty();
        for _ in 0..self.rx.len() {
            match self.rx.try_recv() {
                Ok(prop) => { set.insert(prop); }
                Err(_) => break,
            }
        }
        set
    }

    pub fn len(&self) -> usize { self.rx.len() }
    pub fn is_empty(&self) -> bool { self.rx.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn drain_collapses_duplicates() {
        let q = ChangeQueue::new();
        for _ in 0..5 {
            q.enqueue(PlaybackProperty::Position);
        }
        q.enqueue(PlaybackProperty::Volume);
        let set = q.drain_distinct();
        assert_eq!(set.len(), 2);
        assert!(set.contains(PlaybackProperty::Position));
        assert!(q.is_empty());
        assert!(q.drain_distinct().is_empty());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let q = ChangeQueue::new();
        let handles: Vec<_> = [PlaybackProperty::Volume, PlaybackProperty::Balance, PlaybackProperty::Position]
            .into_iter()
            .map(|prop| {
                let p = q.producer();
                thread::spawn(move || for _ in 0..1000 { p.enqueue(prop) })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(q.len(), 3000);
        assert_eq!(q.drain_distinct().len(), 3);
    }

    #[test]
    fn attached_state_feeds_queue() {
        let q = ChangeQueue::new();
        let state = EngineState::new();
        q.attach(&state);
        state.set_volume(0.2);
        state.set_is_muted(true);
        let set = q.drain_distinct();
        assert!(set.contains(PlaybackProperty::Volume));
        assert!(set.contains(PlaybackProperty::IsMuted));
    }
}
