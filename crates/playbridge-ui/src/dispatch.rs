// crates/playbridge-ui/src/dispatch.rs
//
// Dispatcher: the owner thread's task queue.
//
// Any thread may post a boxed task at a priority; only the owner thread runs
// them, from `run_pending`, which MediaElement::update calls once per frame.
// Higher priorities run first, FIFO within a priority. After `shutdown` posts
// fail and queued tasks are dropped unrun, which is how pending marshaled
// calls observe teardown.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::DispatchError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DispatchPriority {
    Background,
    Input,
    Loaded,
    Render,
    DataBind,
    Normal,
    Send,
}

type Task  = Box<dyn FnOnce() + Send>;
type Waker = Box<dyn Fn() + Send + Sync>;

struct Job {
    priority: DispatchPriority,
    seq:      u64,
    task:     Task,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Job {
    // Max-heap: higher priority first, then lower sequence number first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap:     BinaryHeap<Job>,
    next_seq: u64,
    closed:   bool,
}

#[derive(Default)]
struct Inner {
    queue: Mutex<Queue>,
    waker: RwLock<Option<Waker>>,
}

#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new() -> Self { Self::default() }

    /// Called after every successful post, from the posting thread. The egui
    /// host installs `Context::request_repaint` here so queued work gets a frame.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self.inner.waker.write() = Some(Box::new(waker));
    }

    pub fn post(&self, priority: DispatchPriority, task: impl FnOnce() + Send + 'static) -> Result<(), DispatchError> {
        {
            let mut q = self.inner.queue.lock();
            if q.closed {
                return Err(DispatchError::ShutDown);
            }
            let seq = q.next_seq;
            q.next_seq += 1;
            q.heap.push(Job { priority, seq, task: Box::new(task) });
        }
        if let Some(wake) = self.inner.waker.read().as_ref() {
            wake();
        }
        Ok(())
    }

    /// Run the tasks queued at the moment of the call, highest priority first.
    /// Tasks posted while running wait for the next call. A panicking task is
    /// logged and does not stop the rest. Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let budget = self.inner.queue.lock().heap.len();
        let mut ran = 0;
        for _ in 0..budget {
            let Some(job) = self.inner.queue.lock().heap.pop() else { break };
            if catch_unwind(AssertUnwindSafe(job.task)).is_err() {
                log::error!("[dispatch] task at {:?} panicked", job.priority);
            }
            ran += 1;
        }
        ran
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.lock().heap.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.queue.lock().closed
    }

    /// Refuse further posts and drop everything queued. Returns the number of
    /// tasks dropped.
    pub fn shutdown(&self) -> usize {
        let dropped = {
            let mut q = self.inner.queue.lock();
            q.closed = true;
            std::mem::take(&mut q.heap)
        };
        let n = dropped.len();
        // Dropped outside the lock: task destructors may post or wake waiters.
        drop(dropped);
        if n > 0 {
            log::debug!("[dispatch] shutdown dropped {n} pending task(s)");
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    #[test]
    fn runs_by_priority_then_fifo() {
        let d = Dispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (p, tag) in [
            (DispatchPriority::Background, "bg"),
            (DispatchPriority::DataBind, "bind-1"),
            (DispatchPriority::Send, "send"),
            (DispatchPriority::DataBind, "bind-2"),
        ] {
            let order = Arc::clone(&order);
            d.post(p, move || order.lock().push(tag)).unwrap();
        }
        assert_eq!(d.run_pending(), 4);
        assert_eq!(*order.lock(), vec!["send", "bind-1", "bind-2", "bg"]);
    }

    #[test]
    fn tasks_posted_while_running_wait_a_round() {
        let d = Dispatcher::new();
        let inner = d.clone();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        d.post(DispatchPriority::Normal, move || {
            let h2 = Arc::clone(&h);
            inner.post(DispatchPriority::Normal, move || { h2.fetch_add(1, AtomicOrdering::SeqCst); }).unwrap();
        }).unwrap();
        assert_eq!(d.run_pending(), 1);
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(d.run_pending(), 1);
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn shutdown_drops_pending_and_refuses_posts() {
        let d = Dispatcher::new();
        d.post(DispatchPriority::Normal, || {}).unwrap();
        assert_eq!(d.shutdown(), 1);
        assert_eq!(d.post(DispatchPriority::Normal, || {}), Err(DispatchError::ShutDown));
        assert_eq!(d.run_pending(), 0);
    }

    #[test]
    fn panicking_task_does_not_stop_the_queue() {
        let d = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        d.post(DispatchPriority::Send, || panic!("boom")).unwrap();
        let h = Arc::clone(&hits);
        d.post(DispatchPriority::Normal, move || { h.fetch_add(1, AtomicOrdering::SeqCst); }).unwrap();
        assert_eq!(d.run_pending(), 2);
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn waker_fires_on_post() {
        let d = Dispatcher::new();
        let wakes = Arc::new(AtomicUsize::new(0));
        let w = Arc::clone(&wakes);
        d.set_waker(move || { w.fetch_add(1, AtomicOrdering::SeqCst); });
        d.post(DispatchPriority::Render, || {}).unwrap();
        assert_eq!(wakes.load(AtomicOrdering::SeqCst), 1);
    }
}
