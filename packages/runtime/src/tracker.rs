//! # Object metadata store
//!
//! Every trackable object embeds one [`Tracker`]. It carries the generation
//! stamp and version counter that the mutation protocol reads on every
//! write, plus a lazily allocated [`Metadata`] record holding the object's
//! parents, watchers and refresh-batch membership.
//!
//! ## Invariants
//!
//! 1. Metadata is only allocated on first parent connection, first watch or
//!    first settle callback, and is dropped again once it holds nothing.
//! 2. Parents are stored as `Weak` links, one entry per referencing slot.
//!    Each link carries the depth its slot grants to this object, and the
//!    object's own depth is derived from its current links.
//! 3. A hydration payload entry is removed the first time its field is read
//!    or written; the payload itself is dropped once empty.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::trace;

use crate::multi_value::MultiValue;
use crate::scheduler::{current_generation, SettleCallback, WatchHandle};
use crate::value::Trackable;

/// One owner reference. `depth` is the tracking depth granted to the child
/// through this link (`None` = unlimited).
#[derive(Clone)]
pub(crate) struct ParentLink {
    pub(crate) parent: Weak<dyn Trackable>,
    pub(crate) depth: Option<u32>,
}

impl ParentLink {
    fn is_from(&self, addr: usize) -> bool {
        self.parent.as_ptr() as *const () as usize == addr
    }
}

/// Side record allocated on first need.
#[derive(Default)]
pub(crate) struct Metadata {
    pub(crate) parents: MultiValue<ParentLink>,
    pub(crate) watchers: MultiValue<WatchHandle>,
    pub(crate) settle_callbacks: Vec<SettleCallback>,
    /// Generation of the refresh batch this object is queued in
    pub(crate) batch: Option<u64>,
}

impl Metadata {
    fn is_idle(&self) -> bool {
        self.parents.is_empty()
            && self.watchers.is_empty()
            && self.settle_callbacks.is_empty()
            && self.batch.is_none()
    }
}

/// Change-tracking state embedded in every trackable object.
pub struct Tracker {
    this: Weak<dyn Trackable>,
    change_generation: Cell<u64>,
    /// Fewest hops between this object and a write in the current generation
    reach: Cell<u32>,
    version: Cell<u64>,
    metadata: RefCell<Option<Box<Metadata>>>,
    payload: RefCell<Option<HashMap<String, Rc<Value>>>>,
}

impl Tracker {
    /// Create the tracker for the object behind `this`.
    ///
    /// Objects build their tracker inside `Rc::new_cyclic` so the weak self
    /// link is available from the start.
    pub fn new(this: Weak<dyn Trackable>) -> Self {
        Self {
            this,
            change_generation: Cell::new(0),
            reach: Cell::new(0),
            version: Cell::new(0),
            metadata: RefCell::new(None),
            payload: RefCell::new(None),
        }
    }

    /// Strong handle to the owning object, if it is still alive.
    pub fn handle(&self) -> Option<Rc<dyn Trackable>> {
        self.this.upgrade()
    }

    pub(crate) fn weak(&self) -> Weak<dyn Trackable> {
        self.this.clone()
    }

    pub(crate) fn addr(&self) -> usize {
        self.this.as_ptr() as *const () as usize
    }

    // ---------------------------------------------------------------
    // Generation and version
    // ---------------------------------------------------------------

    /// Generation at which this object was last touched.
    pub fn change_generation(&self) -> u64 {
        self.change_generation.get()
    }

    /// True while the object has been touched in the current generation and
    /// its batch has not flushed yet.
    pub fn is_mutating(&self) -> bool {
        self.change_generation.get() == current_generation()
    }

    /// Odd while dirty, even while stable.
    pub fn version(&self) -> u64 {
        self.settle_stale_round(current_generation());
        self.version.get()
    }

    /// Stamp the object for `generation`, reached `hops` links away from
    /// the write.
    ///
    /// Returns false when there is nothing new to propagate: the object was
    /// already stamped for that generation from the same distance or closer.
    pub(crate) fn mark(&self, generation: u64, hops: u32) -> bool {
        if self.change_generation.get() == generation {
            if hops >= self.reach.get() {
                return false;
            }
            self.reach.set(hops);
            return true;
        }
        self.settle_stale_round(generation);
        self.change_generation.set(generation);
        self.reach.set(hops);
        self.version.set(self.version.get() + 1);
        true
    }

    /// A dirty round that belongs to an older generation has settled.
    fn settle_stale_round(&self, generation: u64) {
        let version = self.version.get();
        if version % 2 == 1 && self.change_generation.get() != generation {
            self.version.set(version + 1);
        }
    }

    // ---------------------------------------------------------------
    // Depth policy
    // ---------------------------------------------------------------

    /// How deep this object tracks its own children.
    ///
    /// Unlinked objects and objects with any unlimited link are unlimited.
    /// Otherwise the most generous link wins.
    pub fn depth(&self) -> Option<u32> {
        self.read_metadata(|m| {
            m.parents
                .iter()
                .map(|link| link.depth)
                .try_fold(0u32, |deepest, depth| depth.map(|d| deepest.max(d)))
                .filter(|_| !m.parents.is_empty())
        })
        .flatten()
    }

    // ---------------------------------------------------------------
    // Metadata
    // ---------------------------------------------------------------

    pub fn has_metadata(&self) -> bool {
        self.metadata.borrow().is_some()
    }

    fn with_metadata<R>(&self, f: impl FnOnce(&mut Metadata) -> R) -> R {
        let mut slot = self.metadata.borrow_mut();
        let metadata = slot.get_or_insert_with(Box::default);
        let result = f(metadata);
        if metadata.is_idle() {
            *slot = None;
        }
        result
    }

    fn read_metadata<R>(&self, f: impl FnOnce(&Metadata) -> R) -> Option<R> {
        self.metadata.borrow().as_deref().map(f)
    }

    pub(crate) fn add_parent(&self, parent: Weak<dyn Trackable>, depth: Option<u32>) {
        self.with_metadata(|m| m.parents.push(ParentLink { parent, depth }));
    }

    /// Remove one link from `parent`, preferring one granted `depth`.
    pub(crate) fn remove_parent(&self, parent: &Tracker, depth: Option<u32>) -> bool {
        if !self.has_metadata() {
            return false;
        }
        let addr = parent.addr();
        self.with_metadata(|m| {
            m.parents
                .remove_first(|link| link.is_from(addr) && link.depth == depth)
                .or_else(|| m.parents.remove_first(|link| link.is_from(addr)))
                .is_some()
        })
    }

    /// Live parents, one entry per link.
    pub(crate) fn parents(&self) -> Vec<Rc<dyn Trackable>> {
        self.parent_links()
            .into_iter()
            .map(|(parent, _)| parent)
            .collect()
    }

    /// Live parents with the depth each link grants.
    pub(crate) fn parent_links(&self) -> Vec<(Rc<dyn Trackable>, Option<u32>)> {
        self.read_metadata(|m| {
            m.parents
                .iter()
                .filter_map(|link| link.parent.upgrade().map(|parent| (parent, link.depth)))
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn parent_count(&self) -> usize {
        self.read_metadata(|m| {
            m.parents
                .iter()
                .filter(|link| link.parent.strong_count() > 0)
                .count()
        })
        .unwrap_or(0)
    }

    pub fn has_parents(&self) -> bool {
        self.parent_count() > 0
    }

    pub(crate) fn clear_parents(&self) {
        if self.has_metadata() {
            self.with_metadata(|m| {
                m.parents.take_all();
            });
        }
    }

    pub(crate) fn add_watcher(&self, handle: WatchHandle) {
        self.with_metadata(|m| m.watchers.push(handle));
    }

    pub(crate) fn remove_watcher(&self, handle: &WatchHandle) -> bool {
        if !self.has_metadata() {
            return false;
        }
        self.with_metadata(|m| m.watchers.remove_first(|w| w.ptr_eq(handle)).is_some())
    }

    pub fn watcher_count(&self) -> usize {
        self.read_metadata(|m| m.watchers.len()).unwrap_or(0)
    }

    pub(crate) fn add_settle_callback(&self, callback: SettleCallback) {
        self.with_metadata(|m| m.settle_callbacks.push(callback));
    }

    /// Whether a flush would have anything to call for this object.
    pub(crate) fn wants_notification(&self) -> bool {
        self.read_metadata(|m| !m.watchers.is_empty() || !m.settle_callbacks.is_empty())
            .unwrap_or(false)
    }

    pub(crate) fn batch(&self) -> Option<u64> {
        self.read_metadata(|m| m.batch).flatten()
    }

    pub(crate) fn set_batch(&self, generation: u64) {
        self.with_metadata(|m| m.batch = Some(generation));
    }

    /// Leave the batch and hand out what must be called for this flush.
    ///
    /// Persistent watchers are cloned, settle callbacks are consumed.
    pub(crate) fn take_notifications(&self) -> (Vec<WatchHandle>, Vec<SettleCallback>) {
        if !self.has_metadata() {
            return (Vec::new(), Vec::new());
        }
        self.with_metadata(|m| {
            m.batch = None;
            let watchers = m.watchers.iter().cloned().collect();
            let settled = std::mem::take(&mut m.settle_callbacks);
            (watchers, settled)
        })
    }

    // ---------------------------------------------------------------
    // Hydration payload
    // ---------------------------------------------------------------

    /// Attach a raw JSON object as pending data for the given fields.
    ///
    /// Keys that are not in `fields` are dropped right away. Anything but a
    /// JSON object is ignored.
    #[doc(hidden)]
    pub fn install_payload(&self, raw: Rc<Value>, fields: &[&str]) -> bool {
        let raw = Rc::try_unwrap(raw).unwrap_or_else(|shared| (*shared).clone());
        let Value::Object(map) = raw else {
            return false;
        };
        let pending: HashMap<String, Rc<Value>> = map
            .into_iter()
            .filter(|(key, _)| fields.contains(&key.as_str()))
            .map(|(key, value)| (key, Rc::new(value)))
            .collect();
        if pending.is_empty() {
            return false;
        }
        *self.payload.borrow_mut() = Some(pending);
        true
    }

    /// Remove and return the raw fragment pending for `key`.
    pub(crate) fn take_payload(&self, key: &str) -> Option<Rc<Value>> {
        let mut payload = self.payload.borrow_mut();
        let fields = payload.as_mut()?;
        let raw = fields.remove(key);
        if fields.is_empty() {
            trace!(field = key, "hydration payload fully consumed");
            *payload = None;
        }
        raw
    }

    /// Raw fragment still pending for `key`, if any.
    pub fn pending_payload(&self, key: &str) -> Option<Rc<Value>> {
        self.payload.borrow().as_ref()?.get(key).cloned()
    }

    pub fn has_payload(&self) -> bool {
        self.payload.borrow().is_some()
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("change_generation", &self.change_generation.get())
            .field("version", &self.version.get())
            .field("depth", &self.depth())
            .field("parents", &self.parent_count())
            .field("watchers", &self.watcher_count())
            .field("has_payload", &self.has_payload())
            .finish()
    }
}

/// Address of a trackable node, ignoring vtable metadata.
pub(crate) fn node_addr(node: &Rc<dyn Trackable>) -> usize {
    Rc::as_ptr(node) as *const () as usize
}
