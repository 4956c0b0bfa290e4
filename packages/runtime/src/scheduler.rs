//! # Refresh scheduler
//!
//! Dirty objects that somebody is waiting on are collected into an open
//! refresh batch. The first member queues a flush microtask for that exact
//! batch; the flush swaps in a fresh batch, advances the global generation
//! and then notifies every member.
//!
//! Microtasks live in a thread-local queue drained by [`run_microtasks`].
//! Awaiting a [`ChangeComplete`] drains the queue as well, so async callers
//! never have to pump it by hand.
//!
//! ## Ordering
//!
//! - Members are notified in insertion order, watchers before settle
//!   callbacks.
//! - Anything a callback mutates lands in the next batch.
//! - A panicking callback is logged and skipped; its siblings still run.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use tracing::{debug, trace, warn};

use crate::config::{DispatchMode, RuntimeConfig};
use crate::tracker::Tracker;
use crate::value::Trackable;

/// One-shot callback run when an object's batch flushes.
pub type SettleCallback = Box<dyn FnOnce()>;

type Microtask = Box<dyn FnOnce()>;

/// Persistent watcher registration, also the handle passed to `unwatch`.
#[derive(Clone)]
pub struct WatchHandle(Rc<dyn Fn()>);

impl WatchHandle {
    pub(crate) fn new(callback: impl Fn() + 'static) -> Self {
        Self(Rc::new(callback))
    }

    pub fn ptr_eq(&self, other: &WatchHandle) -> bool {
        Rc::as_ptr(&self.0) as *const () == Rc::as_ptr(&other.0) as *const ()
    }

    fn call(&self) {
        (self.0)()
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WatchHandle({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

#[derive(Default)]
struct RefreshBatch {
    members: Vec<Rc<dyn Trackable>>,
    flush_scheduled: bool,
}

pub(crate) struct Scheduler {
    generation: Cell<u64>,
    batch: RefCell<RefreshBatch>,
    microtasks: RefCell<VecDeque<Microtask>>,
    config: RefCell<RuntimeConfig>,
    draining: Cell<bool>,
}

thread_local! {
    static SCHEDULER: Scheduler = Scheduler::new();
}

pub(crate) fn with_scheduler<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
    SCHEDULER.with(f)
}

/// The generation currently accumulating writes.
pub fn current_generation() -> u64 {
    with_scheduler(|s| s.generation.get())
}

/// Run queued microtasks until the queue is empty or the configured limit
/// is reached. Returns the number of tasks run.
///
/// Calls made from inside a running microtask return 0 immediately.
pub fn run_microtasks() -> usize {
    with_scheduler(|s| s.drain())
}

pub fn pending_microtasks() -> usize {
    with_scheduler(|s| s.microtasks.borrow().len())
}

/// Replace the runtime configuration for the current thread.
pub fn configure(config: RuntimeConfig) {
    with_scheduler(|s| {
        debug!(?config, "runtime configured");
        *s.config.borrow_mut() = config;
    })
}

pub fn current_config() -> RuntimeConfig {
    with_scheduler(|s| s.config.borrow().clone())
}

struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Scheduler {
    fn new() -> Self {
        Self {
            generation: Cell::new(1),
            batch: RefCell::new(RefreshBatch::default()),
            microtasks: RefCell::new(VecDeque::new()),
            config: RefCell::new(RuntimeConfig::default()),
            draining: Cell::new(false),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.get()
    }

    fn queue_microtask(&self, task: Microtask) {
        self.microtasks.borrow_mut().push_back(task);
    }

    /// Queue `node` for the open batch if anything is waiting on it.
    pub(crate) fn register_if_watched(&self, node: &Tracker) {
        if !node.wants_notification() {
            return;
        }
        let generation = self.generation.get();
        if node.batch() == Some(generation) {
            return;
        }
        let Some(handle) = node.handle() else {
            return;
        };
        node.set_batch(generation);

        let schedule = {
            let mut batch = self.batch.borrow_mut();
            batch.members.push(handle);
            !std::mem::replace(&mut batch.flush_scheduled, true)
        };
        if schedule {
            trace!(generation, "scheduling refresh flush");
            self.queue_microtask(Box::new(move || with_scheduler(|s| s.flush(generation))));
        }
    }

    pub(crate) fn add_watcher(&self, node: &Tracker, handle: WatchHandle) {
        node.add_watcher(handle);
        if node.is_mutating() {
            self.register_if_watched(node);
        }
    }

    pub(crate) fn add_settle_callback(&self, node: &Tracker, callback: SettleCallback) {
        node.add_settle_callback(callback);
        if node.is_mutating() {
            self.register_if_watched(node);
        }
    }

    fn flush(&self, generation: u64) {
        if self.generation.get() != generation {
            return;
        }
        let batch = self.batch.replace(RefreshBatch::default());
        self.generation.set(generation + 1);

        debug!(
            generation,
            members = batch.members.len(),
            "flushing refresh batch"
        );

        let mut notifications: Vec<Microtask> = Vec::new();
        for member in batch.members {
            let (watchers, settled) = member.tracker().take_notifications();
            for watcher in watchers {
                notifications.push(Box::new(move || watcher.call()));
            }
            notifications.extend(settled);
        }

        let mode = self.config.borrow().dispatch;
        match mode {
            DispatchMode::Immediate => dispatch(notifications),
            DispatchMode::Deferred => {
                self.queue_microtask(Box::new(move || dispatch(notifications)))
            }
        }
    }

    fn drain(&self) -> usize {
        if self.draining.replace(true) {
            return 0;
        }
        let _guard = DrainGuard(&self.draining);
        let limit = self.config.borrow().microtask_limit;

        let mut ran = 0;
        loop {
            if ran >= limit {
                warn!(
                    limit,
                    pending = self.microtasks.borrow().len(),
                    "microtask limit reached, leaving remaining tasks queued"
                );
                break;
            }
            let task = self.microtasks.borrow_mut().pop_front();
            let Some(task) = task else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }
}

fn dispatch(notifications: Vec<Microtask>) {
    for notify in notifications {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(notify)) {
            warn!(
                message = panic_message(panic.as_ref()),
                "watcher callback panicked"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic>"
    }
}

#[derive(Default)]
struct SettleSignal {
    settled: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

impl SettleSignal {
    fn settle(&self) {
        self.settled.set(true);
        if let Some(waker) = self.waker.borrow_mut().take() {
            waker.wake();
        }
    }
}

/// Resolves once the object's current dirty round has flushed.
#[must_use = "futures do nothing unless polled"]
pub struct ChangeComplete {
    signal: Option<Rc<SettleSignal>>,
}

impl ChangeComplete {
    pub(crate) fn settled() -> Self {
        Self { signal: None }
    }

    pub(crate) fn pending(node: &Tracker) -> Self {
        let signal = Rc::new(SettleSignal::default());
        let on_settle = signal.clone();
        with_scheduler(|s| s.add_settle_callback(node, Box::new(move || on_settle.settle())));
        Self {
            signal: Some(signal),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.signal.as_ref().map_or(true, |s| s.settled.get())
    }
}

impl Future for ChangeComplete {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let Some(signal) = &self.signal else {
            return Poll::Ready(());
        };
        if !signal.settled.get() {
            run_microtasks();
        }
        if signal.settled.get() {
            return Poll::Ready(());
        }
        *signal.waker.borrow_mut() = Some(cx.waker().clone());
        Poll::Pending
    }
}
