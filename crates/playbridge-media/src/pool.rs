// crates/playbridge-media/src/pool.rs
//
// FramePool: a fixed number of reusable DecodedFrame buffers.
//
// The playback thread acquires, fills and sends; the UI copies and recycles.
// Frames are allocated lazily up to `capacity`, after which `acquire` returns
// None until something is recycled. That is the backpressure: a UI that stops
// draining stalls rendering instead of growing memory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use playbridge_core::DecodedFrame;

#[derive(Clone)]
pub struct FramePool {
    free_tx:   Sender<DecodedFrame>,
    free_rx:   Receiver<DecodedFrame>,
    allocated: Arc<AtomicUsize>,
    capacity:  usize,
}

impl FramePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (free_tx, free_rx) = bounded(capacity);
        Self { free_tx, free_rx, allocated: Arc::new(AtomicUsize::new(0)), capacity }
    }

    pub fn acquire(&self) -> Option<DecodedFrame> {
        if let Ok(frame) = self.free_rx.try_recv() {
            return Some(frame);
        }
        let cap = self.capacity;
        self.allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < cap).then_some(n + 1))
            .ok()
            .map(|_| DecodedFrame::empty())
    }

    pub fn recycle(&self, frame: DecodedFrame) {
        if self.free_tx.try_send(frame).is_err() {
            // Only reachable if a foreign frame is recycled into a full pool.
            log::warn!("[pool] recycle into full pool, dropping buffer");
        }
    }

    pub fn capacity(&self) -> usize { self.capacity }
    pub fn available(&self) -> usize { self.free_rx.len() }
    pub fn allocated(&self) -> usize { self.allocated.load(Ordering::Acquire) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_recovers_on_recycle() {
        let pool = FramePool::new(2);
        let a = pool.acquire().expect("first");
        let _b = pool.acquire().expect("second");
        assert!(pool.acquire().is_none());
        pool.recycle(a);
        assert_eq!(pool.available(), 1);
        assert!(pool.acquire().is_some());
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    fn recycled_buffer_keeps_its_allocation() {
        let pool = FramePool::new(1);
        let mut f = pool.acquire().unwrap();
        f.buffer = vec![7; 4096];
        pool.recycle(f);
        let f = pool.acquire().unwrap();
        assert_eq!(f.buffer.len(), 4096);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        assert_eq!(FramePool::new(0).capacity(), 1);
    }
}
