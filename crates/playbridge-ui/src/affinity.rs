// crates/playbridge-ui/src/affinity.rs
//
// ThreadAffinityContext: "run now if on the owner thread, else marshal".
//
// Captured once, on the thread that owns the control. Engine threads use it
// for the rare UI-visible action that cannot wait for the next flush tick,
// such as raising a media event to host listeners.
//
// Outcomes of a marshaled call:
//   Ok(Some(v))  the action ran and returned v
//   Err(e)       the action ran and failed, or panicked
//   Ok(None)     the owner went away first; logged at debug, never an error

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, ThreadId};
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

use crate::dispatch::{DispatchPriority, Dispatcher};
use crate::error::DispatchError;

/// Priority for all marshaled calls.
pub const MARSHAL_PRIORITY: DispatchPriority = DispatchPriority::DataBind;

#[derive(Clone)]
pub struct ThreadAffinityContext {
    owner:      ThreadId,
    dispatcher: Dispatcher,
}

impl ThreadAffinityContext {
    /// Bind to the calling thread.
    pub fn for_current_thread(dispatcher: Dispatcher) -> Self {
        Self { owner: thread::current().id(), dispatcher }
    }

    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    pub fn dispatcher(&self) -> &Dispatcher { &self.dispatcher }

    /// Run `action` on the owner thread and wait for it. Inline when already
    /// there. Never call this from the owner thread's own task queue while
    /// holding something a queued task needs.
    pub fn run_sync<T, F>(&self, action: F) -> Result<Option<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        if self.is_owner_thread() {
            return action().map(Some);
        }
        self.run_async(action).wait()
    }

    /// Post `action` to the owner thread without waiting. Inline when already there.
    pub fn run_or_post<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_owner_thread() {
            action();
            return;
        }
        if let Err(e) = self.dispatcher.post(MARSHAL_PRIORITY, action) {
            log::debug!("[affinity] dropped marshaled call: {e}");
        }
    }

    /// Always enqueue, even from the owner thread. The returned handle may be
    /// waited on from another thread, or dropped to ignore the outcome.
    pub fn run_async<T, F>(&self, action: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = bounded::<Result<T>>(1);
        let posted = self.dispatcher.post(MARSHAL_PRIORITY, move || {
            let outcome = catch_unwind(AssertUnwindSafe(action))
                .unwrap_or_else(|panic| Err(anyhow!("marshaled action panicked: {}", panic_message(&*panic))));
            let _ = tx.send(outcome);
        });
        match posted {
            Ok(())  => Pending { rx: Some(rx) },
            Err(e) => {
                log::debug!("[affinity] marshaled call cancelled: {e}");
                Pending { rx: None }
            }
        }
    }

    /// Drain the owner's queue. Owner thread only.
    pub fn run_pending(&self) -> Result<usize, DispatchError> {
        if !self.is_owner_thread() {
            return Err(DispatchError::WrongThread);
        }
        Ok(self.dispatcher.run_pending())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic".into())
}

/// Outcome of a `run_async` call.
pub struct Pending<T> {
    rx: Option<Receiver<Result<T>>>,
}

impl<T> Pending<T> {
    /// Block until the action has run or been dropped. Must not be called on
    /// the owner thread: nothing would drain the queue.
    pub fn wait(self) -> Result<Option<T>> {
        let Some(rx) = self.rx else { return Ok(None) };
        match rx.recv() {
            Ok(outcome) => outcome.map(Some),
            Err(_) => {
                log::debug!("[affinity] marshaled call cancelled: owner torn down");
                Ok(None)
            }
        }
    }

    /// Like `wait`, but gives up after `timeout`, returning Ok(None).
    pub fn wait_timeout(self, timeout: Duration) -> Result<Option<T>> {
        let Some(rx) = self.rx else { return Ok(None) };
        match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome.map(Some),
            Err(RecvTimeoutError::Timeout) => {
                log::debug!("[affinity] marshaled call timed out after {timeout:?}");
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::debug!("[affinity] marshaled call cancelled: owner torn down");
                Ok(None)
            }
        }
    }

    /// Non-blocking poll: Some once the action has completed or been dropped.
    pub fn try_take(&mut self) -> Option<Result<Option<T>>> {
        let rx = self.rx.as_ref()?;
        match rx.try_recv() {
            Ok(outcome) => {
                self.rx = None;
                Some(outcome.map(Some))
            }
            Err(crossbeam_channel::TryRecvError::Empty) => None,
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                self.rx = None;
                Some(Ok(None))
            }
        }
    }
}
