// src/bridge.rs

//! The cross-thread bridge between the engine worker and the UI thread.
//!
//! Every engine callback that touches display or input state submits a
//! closure here and blocks until the UI thread has executed it, so all UI
//! mutations form one sequential history. Dispatch is always queued, never a
//! recursive drain, and the pump carries a re-entrancy guard so a nested
//! "process pending work" call from inside a running task is a no-op.
//!
//! The bridge is generic over the UI context it dispatches into; in
//! production that context is the shell, in tests it can be anything.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use log::trace;

type Task<C> = Box<dyn FnOnce(&mut C) + Send>;

struct BridgeInner<C> {
    tasks: Mutex<VecDeque<Task<C>>>,
    /// Guard against overlapping pumps from nested contexts.
    pumping: AtomicBool,
    quitting: AtomicBool,
}

/// Handle for submitting work to the UI thread. Cheap to clone; one per
/// engine session plus the UI side's own copy.
pub struct UiBridge<C> {
    inner: Arc<BridgeInner<C>>,
}

impl<C> Clone for UiBridge<C> {
    fn clone(&self) -> Self {
        UiBridge {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Default for UiBridge<C> {
    fn default() -> Self {
        UiBridge::new()
    }
}

impl<C> UiBridge<C> {
    pub fn new() -> Self {
        UiBridge {
            inner: Arc::new(BridgeInner {
                tasks: Mutex::new(VecDeque::new()),
                pumping: AtomicBool::new(false),
                quitting: AtomicBool::new(false),
            }),
        }
    }

    /// Queues work for the UI thread without waiting for it (completion
    /// events, media callbacks).
    pub fn post(&self, job: impl FnOnce(&mut C) + Send + 'static) {
        let mut tasks = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        tasks.push_back(Box::new(job));
    }

    /// Queues work and blocks the calling (engine) thread until the UI
    /// thread has run it, returning the closure's result. Returns `None`
    /// when the shell is already quitting and the work was not submitted.
    pub fn run_on_ui<R, F>(&self, job: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut C) -> R + Send + 'static,
    {
        if self.is_quitting() {
            trace!("run_on_ui skipped, shell is quitting");
            return None;
        }
        let slot: Arc<(Mutex<Option<R>>, Condvar)> = Arc::new((Mutex::new(None), Condvar::new()));
        let completion = Arc::clone(&slot);
        self.post(move |ctx| {
            let result = job(ctx);
            let (lock, cond) = &*completion;
            *lock.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
            cond.notify_all();
        });

        let (lock, cond) = &*slot;
        let mut guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(result) = guard.take() {
                return Some(result);
            }
            guard = cond.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Runs queued tasks against the UI context. Must only be called from
    /// the UI thread; nested calls return immediately.
    pub fn pump(&self, ctx: &mut C) {
        if self
            .inner
            .pumping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("nested pump ignored");
            return;
        }
        loop {
            let task = {
                let mut tasks = self
                    .inner
                    .tasks
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                tasks.pop_front()
            };
            match task {
                Some(task) => task(ctx),
                None => break,
            }
        }
        self.inner.pumping.store(false, Ordering::Release);
    }

    /// Marks the bridge as shutting down. Already-queued work still drains
    /// through `pump`; new synchronous dispatches are refused.
    pub fn begin_quit(&self) {
        self.inner.quitting.store(true, Ordering::Release);
    }

    pub fn is_quitting(&self) -> bool {
        self.inner.quitting.load(Ordering::Acquire)
    }

    pub fn has_pending(&self) -> bool {
        !self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}
