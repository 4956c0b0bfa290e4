//! Backing storage for one data-object field.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::computed;
use crate::convert::{ConversionContext, Plain};
use crate::mutation::{connect, disconnect, relink, touch};
use crate::tracker::{node_addr, Tracker};
use crate::value::{FieldValue, Trackable};

/// A field slot. Empty until first read or write.
pub struct Slot<T> {
    value: RefCell<Option<T>>,
    /// Bumped every time the held value is replaced or dropped
    revision: Cell<u64>,
}

impl<T: FieldValue> Slot<T> {
    pub fn new() -> Self {
        Self {
            value: RefCell::new(None),
            revision: Cell::new(0),
        }
    }

    pub fn is_set(&self) -> bool {
        self.value.borrow().is_some()
    }

    pub fn revision(&self) -> u64 {
        self.revision.get()
    }

    /// Read the field, materializing it from the hydration payload or
    /// `factory` on first access. Never touches `owner`.
    pub fn get(
        &self,
        owner: &Tracker,
        key: &'static str,
        depth: Option<u32>,
        factory: impl FnOnce() -> T,
    ) -> T {
        let current = self.value.borrow().clone();
        let value = match current {
            Some(value) => value,
            None => {
                let value = initial_value(owner, key, factory);
                if let Some(child) = value.node() {
                    connect(owner, &child, depth);
                }
                *self.value.borrow_mut() = Some(value.clone());
                value
            }
        };
        if computed::is_capturing() {
            computed::record_field(owner, key, self.revision.get());
            if let Some(child) = value.node() {
                computed::record_node(child.tracker());
            }
        }
        value
    }

    /// Write the field. Any pending hydration data for it is discarded.
    ///
    /// Writing what an unread field would have produced anyway only stores
    /// it, without touching `owner`.
    pub fn set(
        &self,
        owner: &Tracker,
        key: &'static str,
        depth: Option<u32>,
        value: T,
        factory: impl FnOnce() -> T,
    ) {
        let current = self.value.borrow().clone();
        let unread = current.is_none();
        let old = match current {
            Some(old) => Some(old),
            None if value.node().is_none() => Some(initial_value(owner, key, factory)),
            None => {
                owner.take_payload(key);
                None
            }
        };
        if !relink(owner, old.as_ref(), &value, depth) {
            if unread {
                *self.value.borrow_mut() = Some(value);
            }
            return;
        }
        *self.value.borrow_mut() = Some(value);
        self.bump();
        touch(owner);
    }

    fn bump(&self) {
        self.revision.set(self.revision.get() + 1);
    }

    fn holds(&self, child: &Rc<dyn Trackable>) -> bool {
        self.value
            .borrow()
            .as_ref()
            .and_then(FieldValue::node)
            .is_some_and(|node| node_addr(&node) == node_addr(child))
    }

    /// Unset the slot if it currently holds `child`, touching `owner`.
    ///
    /// The next read builds a fresh default.
    pub fn release(&self, owner: &Tracker, depth: Option<u32>, child: &Rc<dyn Trackable>) -> bool {
        if !self.holds(child) {
            return false;
        }
        self.value.borrow_mut().take();
        self.bump();
        disconnect(owner, child, depth);
        touch(owner);
        true
    }

    /// Unset the slot without touching `owner` and return the child it held.
    pub fn take_child(&self, owner: &Tracker, depth: Option<u32>) -> Option<Rc<dyn Trackable>> {
        let child = self.value.borrow().as_ref().and_then(FieldValue::node)?;
        self.value.borrow_mut().take();
        self.bump();
        disconnect(owner, &child, depth);
        Some(child)
    }

    /// The held child with this slot's declared depth, for re-linking.
    pub fn linked_child(&self, depth: Option<u32>) -> Option<(Rc<dyn Trackable>, Option<u32>)> {
        self.value
            .borrow()
            .as_ref()
            .and_then(FieldValue::node)
            .map(|child| (child, depth))
    }

    /// Plain-data form of the field for conversion.
    ///
    /// A set value converts normally. A field still waiting on hydration
    /// hands out the raw fragment as-is. An untouched field only shows up
    /// when it has a declared default.
    pub fn to_plain(
        &self,
        owner: &Tracker,
        key: &str,
        has_default: bool,
        read: impl FnOnce() -> T,
        ctx: &mut ConversionContext<'_>,
    ) -> Option<Plain> {
        let current = self.value.borrow().clone();
        if let Some(value) = current {
            return value.to_plain(ctx);
        }
        if let Some(raw) = owner.pending_payload(key).filter(|raw| !raw.is_null()) {
            return Some(Plain::Raw(raw));
        }
        if has_default {
            return read().to_plain(ctx);
        }
        None
    }
}

/// What an unset field reads as: its pending fragment, or the factory value.
/// Consumes the fragment.
fn initial_value<T: FieldValue>(owner: &Tracker, key: &str, factory: impl FnOnce() -> T) -> T {
    owner
        .take_payload(key)
        .filter(|raw| !raw.is_null())
        .and_then(T::from_json)
        .unwrap_or_else(factory)
}

impl<T: FieldValue> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}
