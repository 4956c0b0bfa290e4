//! Public entry points operating on any trackable object.

use std::collections::HashSet;
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::errors::TraxResult;
use crate::mutation;
use crate::scheduler::{with_scheduler, ChangeComplete, WatchHandle};
use crate::tracker::node_addr;
use crate::value::{DataObject, FieldValue, Hydrate, Trackable};

/// Call `callback` after every flush of a batch containing `obj`.
///
/// The returned handle identifies this registration for [`unwatch`]. The
/// callback holds `obj` weakly.
pub fn watch<T, F>(obj: &Rc<T>, callback: F) -> WatchHandle
where
    T: Trackable + ?Sized,
    F: Fn(&Rc<T>) + 'static,
{
    let target = Rc::downgrade(obj);
    let handle = WatchHandle::new(move || {
        if let Some(obj) = target.upgrade() {
            callback(&obj);
        }
    });
    with_scheduler(|s| s.add_watcher(obj.tracker(), handle.clone()));
    debug!(
        type_name = obj.type_name(),
        watchers = obj.tracker().watcher_count(),
        "watcher added"
    );
    handle
}

/// Remove a watcher. Returns false if `handle` was not registered on `obj`.
pub fn unwatch<T: Trackable + ?Sized>(obj: &Rc<T>, handle: &WatchHandle) -> bool {
    obj.tracker().remove_watcher(handle)
}

pub fn number_of_watchers<T: Trackable + ?Sized>(obj: &Rc<T>) -> usize {
    obj.tracker().watcher_count()
}

/// Future resolving once `obj`'s pending round, if any, has flushed.
pub fn change_complete<T: Trackable + ?Sized>(obj: &Rc<T>) -> ChangeComplete {
    let tracker = obj.tracker();
    if tracker.is_mutating() {
        ChangeComplete::pending(tracker)
    } else {
        ChangeComplete::settled()
    }
}

pub fn version<T: Trackable + ?Sized>(obj: &Rc<T>) -> u64 {
    obj.tracker().version()
}

pub fn is_mutating<T: Trackable + ?Sized>(obj: &Rc<T>) -> bool {
    obj.tracker().is_mutating()
}

/// Same as [`is_mutating`].
pub fn is_being_changed<T: Trackable + ?Sized>(obj: &Rc<T>) -> bool {
    is_mutating(obj)
}

pub fn has_parents<T: Trackable + ?Sized>(obj: &Rc<T>) -> bool {
    obj.tracker().has_parents()
}

pub fn parent_count<T: Trackable + ?Sized>(obj: &Rc<T>) -> usize {
    obj.tracker().parent_count()
}

/// Mark `obj` and its owners dirty without writing anything. Returns the
/// resulting version.
pub fn touch<T: Trackable + ?Sized>(obj: &Rc<T>) -> u64 {
    mutation::touch(obj.tracker());
    obj.tracker().version()
}

/// Whether `value` holds a generated data object.
pub fn is_data_object<V: FieldValue>(value: &V) -> bool {
    value.is_data_object()
}

/// Whether `name` is a declared field of `T`.
pub fn has_property<T: DataObject>(_obj: &Rc<T>, name: &str) -> bool {
    T::FIELDS.contains(&name)
}

/// Build `T` from raw JSON without reading any of it yet.
///
/// The result starts stable at version 0.
pub fn create<T: Hydrate>(raw: Value) -> Rc<T> {
    T::hydrate(Rc::new(raw))
}

pub fn create_from_str<T: Hydrate>(source: &str) -> TraxResult<Rc<T>> {
    let raw: Value = serde_json::from_str(source)?;
    Ok(create(raw))
}

/// Restore `field` to its factory default. Returns false for unknown fields.
pub fn reset<T: DataObject>(obj: &Rc<T>, field: &str) -> bool {
    obj.reset_field(field)
}

/// Make sure `field` holds a value, building one even for optional fields.
/// Returns false for unknown fields.
pub fn ensure_field<T: DataObject>(obj: &Rc<T>, field: &str) -> bool {
    obj.ensure_field(field)
}

/// Detach `obj` from the graph.
///
/// Every owner drops its reference to `obj` (and is touched), then `obj`
/// drops its references to its children without being touched itself.
/// With `recursive`, children left without any owner are disposed the
/// same way. Returns the number of objects disposed.
pub fn dispose<T: Trackable + ?Sized>(obj: &Rc<T>, recursive: bool) -> usize {
    let Some(root) = obj.tracker().handle() else {
        return 0;
    };
    let mut seen = HashSet::new();
    let mut pending = vec![root];
    let mut disposed = 0;

    while let Some(node) = pending.pop() {
        if !seen.insert(node_addr(&node)) {
            continue;
        }
        let tracker = node.tracker();
        for parent in tracker.parents() {
            parent.release_child(&node);
        }
        let children = node.release_children();
        tracker.clear_parents();
        disposed += 1;
        if recursive {
            pending.extend(
                children
                    .into_iter()
                    .filter(|child| !child.tracker().has_parents()),
            );
        }
    }

    debug!(disposed, recursive, "disposed object graph");
    disposed
}
