//! # Reactive list
//!
//! [`List`] behaves like a growable array whose structural mutations touch
//! the list (and through it, every owner). Elements that are themselves
//! trackable are linked to the list as children, so edits inside an element
//! propagate up as well.
//!
//! A list built from JSON keeps each element as a raw fragment until it is
//! first read. Bulk operations touch once per call.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::computed;
use crate::convert::{ConversionContext, Plain};
use crate::mutation::{connect, disconnect, relink, touch};
use crate::tracker::{node_addr, Tracker};
use crate::value::{FieldValue, Hydrate, Trackable};

pub(crate) enum Item<T> {
    /// Not read yet since hydration
    Pending(Rc<Value>),
    /// `None` is a hole left by a sparse write or a released child
    Ready(Option<T>),
}

impl<T: Clone> Clone for Item<T> {
    fn clone(&self) -> Self {
        match self {
            Item::Pending(raw) => Item::Pending(raw.clone()),
            Item::Ready(value) => Item::Ready(value.clone()),
        }
    }
}

impl<T: FieldValue> Item<T> {
    pub(crate) fn ready(&self) -> Option<&T> {
        match self {
            Item::Ready(value) => value.as_ref(),
            Item::Pending(_) => None,
        }
    }

    pub(crate) fn holds(&self, child: &Rc<dyn Trackable>) -> bool {
        self.ready()
            .and_then(FieldValue::node)
            .is_some_and(|node| node_addr(&node) == node_addr(child))
    }

    /// Build a detached value without linking it to any owner.
    pub(crate) fn into_value(self) -> Option<T> {
        match self {
            Item::Ready(value) => value,
            Item::Pending(raw) => Some(materialize(raw)),
        }
    }

    pub(crate) fn to_plain(&self, ctx: &mut ConversionContext<'_>) -> Plain {
        match self {
            Item::Pending(raw) => Plain::Raw(raw.clone()),
            Item::Ready(Some(value)) => value.to_plain(ctx).unwrap_or(Plain::Value(Value::Null)),
            Item::Ready(None) => Plain::Value(Value::Null),
        }
    }
}

pub(crate) fn materialize<T: FieldValue>(raw: Rc<Value>) -> T {
    T::from_json(raw).unwrap_or_else(T::create_default)
}

/// Render an element the way list and dictionary `Display` show it.
pub(crate) fn display_plain(plain: &Plain) -> String {
    match plain.to_value() {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Reactive, array-like collection.
pub struct List<T> {
    tracker: Tracker,
    items: RefCell<Vec<Item<T>>>,
}

impl<T: FieldValue> List<T> {
    fn with_items(items: Vec<Item<T>>) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| {
            let this: Weak<dyn Trackable> = this.clone();
            Self {
                tracker: Tracker::new(this),
                items: RefCell::new(items),
            }
        })
    }

    pub fn new() -> Rc<Self> {
        Self::with_items(Vec::new())
    }

    /// Build a list from initial values. The list starts stable.
    pub fn from_items(values: impl IntoIterator<Item = T>) -> Rc<Self> {
        let list = Self::new();
        for value in values {
            list.link(&value);
            list.items.borrow_mut().push(Item::Ready(Some(value)));
        }
        list
    }

    pub fn len(&self) -> usize {
        computed::record_node(&self.tracker);
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read an element. Holes and out-of-range indexes give `None`.
    ///
    /// A pending element is taken out of the list before it is built, so
    /// its fragment is moved into the new value rather than copied.
    pub fn get(&self, index: usize) -> Option<T> {
        computed::record_node(&self.tracker);
        let pending = {
            let mut items = self.items.borrow_mut();
            let slot = items.get_mut(index)?;
            if let Item::Ready(value) = slot {
                return value.clone();
            }
            std::mem::replace(slot, Item::Ready(None))
        };
        let Item::Pending(raw) = pending else {
            return None;
        };
        let value: T = materialize(raw);
        if let Some(child) = value.node() {
            connect(&self.tracker, &child, None);
        }
        if let Some(slot) = self.items.borrow_mut().get_mut(index) {
            *slot = Item::Ready(Some(value.clone()));
        }
        Some(value)
    }

    /// Write an element, padding with holes when `index` is past the end.
    pub fn set(&self, index: usize, value: T) {
        let old = {
            let items = self.items.borrow();
            items.get(index).and_then(Item::ready).cloned()
        };
        if !relink(&self.tracker, old.as_ref(), &value, None) {
            return;
        }
        {
            let mut items = self.items.borrow_mut();
            if index >= items.len() {
                items.resize_with(index + 1, || Item::Ready(None));
            }
            items[index] = Item::Ready(Some(value));
        }
        touch(&self.tracker);
    }

    /// Append a value and return the new length.
    pub fn push(&self, value: T) -> usize {
        self.link(&value);
        let len = {
            let mut items = self.items.borrow_mut();
            items.push(Item::Ready(Some(value)));
            items.len()
        };
        touch(&self.tracker);
        len
    }

    pub fn extend(&self, values: impl IntoIterator<Item = T>) {
        let mut added = Vec::new();
        for value in values {
            self.link(&value);
            added.push(Item::Ready(Some(value)));
        }
        if added.is_empty() {
            return;
        }
        self.items.borrow_mut().extend(added);
        touch(&self.tracker);
    }

    pub fn pop(&self) -> Option<T> {
        let item = self.items.borrow_mut().pop()?;
        self.unlink(&item);
        touch(&self.tracker);
        item.into_value()
    }

    /// Insert at `index`, clamped to the current length.
    pub fn insert(&self, index: usize, value: T) {
        self.link(&value);
        {
            let mut items = self.items.borrow_mut();
            let index = index.min(items.len());
            items.insert(index, Item::Ready(Some(value)));
        }
        touch(&self.tracker);
    }

    pub fn remove(&self, index: usize) -> Option<T> {
        let item = {
            let mut items = self.items.borrow_mut();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        self.unlink(&item);
        touch(&self.tracker);
        item.into_value()
    }

    /// Remove `delete_count` elements starting at `start` and insert
    /// `values` in their place. Returns the removed elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        values: impl IntoIterator<Item = T>,
    ) -> Vec<T> {
        let inserted: Vec<Item<T>> = values
            .into_iter()
            .map(|value| {
                self.link(&value);
                Item::Ready(Some(value))
            })
            .collect();
        let inserted_any = !inserted.is_empty();

        let removed: Vec<Item<T>> = {
            let mut items = self.items.borrow_mut();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, inserted).collect()
        };
        for item in &removed {
            self.unlink(item);
        }
        if inserted_any || !removed.is_empty() {
            touch(&self.tracker);
        }
        removed.into_iter().filter_map(Item::into_value).collect()
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.items.borrow_mut());
        if removed.is_empty() {
            return;
        }
        for item in &removed {
            self.unlink(item);
        }
        touch(&self.tracker);
    }

    /// Iterate over present elements, materializing them on the way.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index))
    }

    pub fn for_each(&self, mut f: impl FnMut(&T, usize)) {
        for index in 0..self.len() {
            if let Some(value) = self.get(index) {
                f(&value, index);
            }
        }
    }

    /// Matching elements as a plain `Vec`. Ownership links are unchanged.
    pub fn filter(&self, mut pred: impl FnMut(&T, usize) -> bool) -> Vec<T> {
        let mut matches = Vec::new();
        self.for_each(|value, index| {
            if pred(value, index) {
                matches.push(value.clone());
            }
        });
        matches
    }

    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        self.iter().find(|value| pred(value))
    }

    pub fn index_of(&self, needle: &T) -> Option<usize> {
        (0..self.len()).find(|&index| self.get(index).is_some_and(|value| value.same(needle)))
    }

    pub fn contains(&self, needle: &T) -> bool {
        self.index_of(needle).is_some()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Empty the list without touching it, unlinking every materialized
    /// element, and return those elements. Unread elements are dropped
    /// without being built.
    pub fn dispose_items(&self) -> Vec<T> {
        let items = std::mem::take(&mut *self.items.borrow_mut());
        let mut released = Vec::new();
        for item in items {
            self.unlink(&item);
            if let Item::Ready(Some(value)) = item {
                released.push(value);
            }
        }
        released
    }

    fn link(&self, value: &T) {
        if let Some(child) = value.node() {
            connect(&self.tracker, &child, None);
        }
    }

    fn unlink(&self, item: &Item<T>) {
        if let Some(child) = item.ready().and_then(FieldValue::node) {
            disconnect(&self.tracker, &child, None);
        }
    }
}

impl<T: FieldValue> Trackable for List<T> {
    fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    fn type_name(&self) -> &'static str {
        "List"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn release_child(&self, child: &Rc<dyn Trackable>) -> bool {
        let released = {
            let mut items = self.items.borrow_mut();
            match items.iter_mut().find(|item| item.holds(child)) {
                Some(item) => {
                    *item = Item::Ready(None);
                    true
                }
                None => false,
            }
        };
        if released {
            disconnect(&self.tracker, child, None);
            touch(&self.tracker);
        }
        released
    }

    fn release_children(&self) -> Vec<Rc<dyn Trackable>> {
        self.dispose_items()
            .iter()
            .filter_map(FieldValue::node)
            .collect()
    }

    fn linked_children(&self) -> Vec<(Rc<dyn Trackable>, Option<u32>)> {
        self.items
            .borrow()
            .iter()
            .filter_map(|item| item.ready().and_then(FieldValue::node))
            .map(|child| (child, None))
            .collect()
    }

    fn to_plain(&self, ctx: &mut ConversionContext<'_>) -> Plain {
        let items: Vec<Item<T>> = self.items.borrow().clone();
        let values = items.iter().map(|item| item.to_plain(ctx)).collect();
        Plain::Array(Rc::new(values))
    }
}

impl<T: FieldValue> Hydrate for List<T> {
    fn empty() -> Rc<Self> {
        Self::new()
    }

    /// Anything but a JSON array hydrates to an empty list.
    fn hydrate(raw: Rc<Value>) -> Rc<Self> {
        let raw = Rc::try_unwrap(raw).unwrap_or_else(|shared| (*shared).clone());
        let items = match raw {
            Value::Array(values) => values
                .into_iter()
                .map(|value| Item::Pending(Rc::new(value)))
                .collect(),
            _ => Vec::new(),
        };
        Self::with_items(items)
    }
}

impl<T: FieldValue> fmt::Display for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<Item<T>> = self.items.borrow().clone();
        let mut ctx = ConversionContext::new();
        let rendered: Vec<String> = items
            .iter()
            .map(|item| display_plain(&item.to_plain(&mut ctx)))
            .collect();
        write!(f, "Trax List [{}]", rendered.join(", "))
    }
}

impl<T: FieldValue> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("len", &self.len())
            .field("tracker", &self.tracker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{change_complete, is_mutating, version};
    use crate::scheduler::run_microtasks;
    use serde_json::json;

    #[test]
    fn test_display() {
        let list = List::<i64>::new();
        assert_eq!(list.to_string(), "Trax List []");

        list.set(0, 123);
        list.set(1, 234);
        assert_eq!(list.to_string(), "Trax List [123, 234]");
    }

    #[test]
    fn test_sparse_set_leaves_holes() {
        let list = List::<String>::new();
        list.set(2, "c".to_string());

        assert_eq!(list.len(), 3);
        assert_eq!(list.get(0), None);
        assert_eq!(list.get(2).as_deref(), Some("c"));
        assert_eq!(list.to_string(), "Trax List [null, null, c]");
    }

    #[test]
    fn test_splice_touches_once() {
        let list = List::from_items(vec![1, 2, 3, 4]);
        assert_eq!(version(&list), 0);

        let removed = list.splice(1, 2, vec![9]);
        assert_eq!(removed, vec![2, 3]);
        assert_eq!(list.to_vec(), vec![1, 9, 4]);
        assert_eq!(version(&list), 1);

        list.push(5);
        assert_eq!(version(&list), 1);
    }

    #[test]
    fn test_noop_operations_do_not_touch() {
        let list = List::from_items(vec![1, 2]);
        list.set(0, 1);
        list.extend(Vec::new());
        list.splice(5, 3, Vec::new());
        assert!(!is_mutating(&list));
    }

    #[test]
    fn test_hydrated_list_is_lazy() {
        let list = List::<i64>::hydrate(Rc::new(json!([1, 2, 3])));
        assert_eq!(list.len(), 3);
        assert_eq!(version(&list), 0);

        assert_eq!(list.get(1), Some(2));
        assert_eq!(list.to_vec(), vec![1, 2, 3]);
        assert!(!is_mutating(&list));
    }

    #[test]
    fn test_nested_lists_propagate() {
        let outer = List::<Rc<List<i64>>>::new();
        let inner = List::new();
        outer.push(inner.clone());
        let settled = change_complete(&outer);
        run_microtasks();
        assert!(settled.is_settled());
        assert_eq!(version(&outer), 2);

        inner.push(1);
        assert!(is_mutating(&outer));
        assert_eq!(version(&outer), 3);
    }

    #[test]
    fn test_dispose_items_skips_unread_elements() {
        let list = List::<Rc<List<i64>>>::hydrate(Rc::new(json!([[1], [2], [3]])));
        let first = list.get(0).unwrap();
        assert!(first.tracker().has_parents());

        let released = list.dispose_items();
        assert_eq!(released.len(), 1);
        assert!(Rc::ptr_eq(&released[0], &first));
        assert!(!first.tracker().has_parents());
        assert!(list.is_empty());
        assert!(!is_mutating(&list));
    }

    #[test]
    fn test_first_read_moves_the_fragment() {
        let list = List::<Rc<List<String>>>::hydrate(Rc::new(json!([["a long enough string"]])));
        let before = match &list.items.borrow()[0] {
            Item::Pending(raw) => raw[0].as_str().map(str::as_ptr),
            Item::Ready(_) => None,
        };

        let inner = list.get(0).unwrap();
        let after = match &inner.items.borrow()[0] {
            Item::Pending(raw) => raw.as_str().map(str::as_ptr),
            Item::Ready(_) => None,
        };
        assert!(before.is_some());
        assert_eq!(before, after);
    }

    #[test]
    fn test_pop_and_remove_unlink_children() {
        let outer = List::<Rc<List<i64>>>::new();
        let a = List::new();
        let b = List::new();
        outer.extend(vec![a.clone(), b.clone()]);
        assert!(a.tracker().has_parents());

        let popped = outer.pop().unwrap();
        assert!(Rc::ptr_eq(&popped, &b));
        assert!(!b.tracker().has_parents());

        outer.remove(0);
        assert!(!a.tracker().has_parents());
        assert!(outer.is_empty());
    }
}
