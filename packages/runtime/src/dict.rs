//! Reactive string-keyed dictionary. Keys iterate in insertion order.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::computed;
use crate::convert::{ConversionContext, Plain};
use crate::list::{materialize, Item};
use crate::mutation::{connect, disconnect, relink, touch};
use crate::tracker::Tracker;
use crate::value::{FieldValue, Hydrate, Trackable};

struct Entries<T> {
    order: Vec<(String, Item<T>)>,
    index: HashMap<String, usize>,
}

impl<T> Entries<T> {
    fn new(order: Vec<(String, Item<T>)>) -> Self {
        let index = order
            .iter()
            .enumerate()
            .map(|(position, (key, _))| (key.clone(), position))
            .collect();
        Self { order, index }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    fn remove_at(&mut self, position: usize) -> (String, Item<T>) {
        let (key, item) = self.order.remove(position);
        self.index.remove(&key);
        for (_, slot) in self.index.iter_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        (key, item)
    }
}

pub struct Dict<T> {
    tracker: Tracker,
    entries: RefCell<Entries<T>>,
}

impl<T: FieldValue> Dict<T> {
    fn with_entries(order: Vec<(String, Item<T>)>) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| {
            let this: Weak<dyn Trackable> = this.clone();
            Self {
                tracker: Tracker::new(this),
                entries: RefCell::new(Entries::new(order)),
            }
        })
    }

    pub fn new() -> Rc<Self> {
        Self::with_entries(Vec::new())
    }

    /// Build a dictionary from initial entries. Later duplicates win.
    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, T)>) -> Rc<Self> {
        let dict = Self::new();
        for (key, value) in entries {
            dict.insert_untracked(key.into(), value);
        }
        dict
    }

    fn insert_untracked(&self, key: String, value: T) {
        let old = self.replace_entry(key, value);
        self.unlink(old.as_ref());
    }

    /// Store `value` under `key`, linking it. Returns the previous ready value.
    fn replace_entry(&self, key: String, value: T) -> Option<T> {
        if let Some(child) = value.node() {
            connect(&self.tracker, &child, None);
        }
        let mut entries = self.entries.borrow_mut();
        match entries.position(&key) {
            Some(position) => {
                let item = std::mem::replace(&mut entries.order[position].1, Item::Ready(Some(value)));
                item.ready().cloned()
            }
            None => {
                let position = entries.order.len();
                entries.index.insert(key.clone(), position);
                entries.order.push((key, Item::Ready(Some(value))));
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        computed::record_node(&self.tracker);
        self.entries.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        computed::record_node(&self.tracker);
        self.entries.borrow().position(key).is_some()
    }

    /// Read an entry. A pending entry's fragment is moved into the value
    /// built from it.
    pub fn get(&self, key: &str) -> Option<T> {
        computed::record_node(&self.tracker);
        let (position, pending) = {
            let mut entries = self.entries.borrow_mut();
            let position = entries.position(key)?;
            let slot = &mut entries.order[position].1;
            if let Item::Ready(value) = slot {
                return value.clone();
            }
            (position, std::mem::replace(slot, Item::Ready(None)))
        };
        let Item::Pending(raw) = pending else {
            return None;
        };
        let value: T = materialize(raw);
        if let Some(child) = value.node() {
            connect(&self.tracker, &child, None);
        }
        if let Some((_, slot)) = self.entries.borrow_mut().order.get_mut(position) {
            *slot = Item::Ready(Some(value.clone()));
        }
        Some(value)
    }

    pub fn set(&self, key: impl Into<String>, value: T) {
        let key = key.into();
        let old = {
            let entries = self.entries.borrow();
            entries
                .position(&key)
                .and_then(|position| entries.order[position].1.ready().cloned())
        };
        if old.as_ref().is_some_and(|old| old.same(&value)) {
            return;
        }
        if let Some(old) = old.as_ref() {
            relink(&self.tracker, Some(old), &value, None);
            let mut entries = self.entries.borrow_mut();
            if let Some(position) = entries.position(&key) {
                entries.order[position].1 = Item::Ready(Some(value));
            }
        } else {
            self.replace_entry(key, value);
        }
        touch(&self.tracker);
    }

    /// Delete `key`. Touches only when the key existed.
    pub fn remove(&self, key: &str) -> Option<T> {
        let (_, item) = {
            let mut entries = self.entries.borrow_mut();
            let position = entries.position(key)?;
            entries.remove_at(position)
        };
        self.unlink(item.ready());
        touch(&self.tracker);
        item.into_value()
    }

    pub fn clear(&self) {
        let removed = std::mem::replace(&mut *self.entries.borrow_mut(), Entries::new(Vec::new()));
        if removed.order.is_empty() {
            return;
        }
        for (_, item) in &removed.order {
            self.unlink(item.ready());
        }
        touch(&self.tracker);
    }

    pub fn keys(&self) -> Vec<String> {
        computed::record_node(&self.tracker);
        self.entries
            .borrow()
            .order
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Present values in key order, materializing pending ones.
    pub fn values(&self) -> Vec<T> {
        self.keys().iter().filter_map(|key| self.get(key)).collect()
    }

    pub fn entries(&self) -> Vec<(String, T)> {
        self.keys()
            .into_iter()
            .filter_map(|key| self.get(&key).map(|value| (key, value)))
            .collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(&str, &T)) {
        for (key, value) in self.entries() {
            f(&key, &value);
        }
    }

    /// Empty the dictionary without touching it, unlinking every
    /// materialized value, and return those values in key order.
    pub fn dispose_items(&self) -> Vec<T> {
        let removed = std::mem::replace(&mut *self.entries.borrow_mut(), Entries::new(Vec::new()));
        let mut released = Vec::new();
        for (_, item) in removed.order {
            self.unlink(item.ready());
            if let Item::Ready(Some(value)) = item {
                released.push(value);
            }
        }
        released
    }

    fn unlink(&self, value: Option<&T>) {
        if let Some(child) = value.and_then(FieldValue::node) {
            disconnect(&self.tracker, &child, None);
        }
    }
}

impl<T: FieldValue> Trackable for Dict<T> {
    fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    fn type_name(&self) -> &'static str {
        "Dict"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    /// Drops the first entry holding `child`.
    fn release_child(&self, child: &Rc<dyn Trackable>) -> bool {
        let removed = {
            let mut entries = self.entries.borrow_mut();
            let position = entries.order.iter().position(|(_, item)| item.holds(child));
            position.map(|position| entries.remove_at(position))
        };
        if removed.is_none() {
            return false;
        }
        disconnect(&self.tracker, child, None);
        touch(&self.tracker);
        true
    }

    fn release_children(&self) -> Vec<Rc<dyn Trackable>> {
        self.dispose_items()
            .iter()
            .filter_map(FieldValue::node)
            .collect()
    }

    fn linked_children(&self) -> Vec<(Rc<dyn Trackable>, Option<u32>)> {
        self.entries
            .borrow()
            .order
            .iter()
            .filter_map(|(_, item)| item.ready().and_then(FieldValue::node))
            .map(|child| (child, None))
            .collect()
    }

    fn to_plain(&self, ctx: &mut ConversionContext<'_>) -> Plain {
        let order: Vec<(String, Item<T>)> = self
            .entries
            .borrow()
            .order
            .iter()
            .map(|(key, item)| (key.clone(), item.clone()))
            .collect();
        let members = order
            .into_iter()
            .map(|(key, item)| {
                let value = item.to_plain(ctx);
                (key, value)
            })
            .collect();
        Plain::Object(Rc::new(members))
    }
}

impl<T: FieldValue> Hydrate for Dict<T> {
    fn empty() -> Rc<Self> {
        Self::new()
    }

    fn hydrate(raw: Rc<Value>) -> Rc<Self> {
        let raw = Rc::try_unwrap(raw).unwrap_or_else(|shared| (*shared).clone());
        let order = match raw {
            Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| (key, Item::Pending(Rc::new(value))))
                .collect(),
            _ => Vec::new(),
        };
        Self::with_entries(order)
    }
}

impl<T: FieldValue> fmt::Debug for Dict<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dict")
            .field("keys", &self.keys())
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
    fn test_set_get_and_order() {
        let dict = Dict::<i64>::new();
        dict.set("b", 2);
        dict.set("a", 1);
        dict.set("b", 3);

        assert_eq!(dict.keys(), vec!["b", "a"]);
        assert_eq!(dict.get("b"), Some(3));
        assert_eq!(dict.get("missing"), None);
    }

    #[test]
    fn test_same_value_is_noop() {
        let dict = Dict::from_entries(vec![("a", 1)]);
        dict.set("a", 1);
        assert!(!is_mutating(&dict));
        assert_eq!(version(&dict), 0);
    }

    #[test]
    fn test_remove_reindexes() {
        let dict = Dict::from_entries(vec![("a", 1), ("b", 2), ("c", 3)]);
        assert_eq!(dict.remove("a"), Some(1));
        assert_eq!(dict.remove("a"), None);
        assert_eq!(version(&dict), 1);

        dict.set("d", 4);
        assert_eq!(dict.keys(), vec!["b", "c", "d"]);
        assert_eq!(dict.get("c"), Some(3));
        assert_eq!(dict.get("d"), Some(4));
    }

    #[test]
    fn test_missing_remove_does_not_touch() {
        let dict = Dict::<i64>::new();
        assert_eq!(dict.remove("nope"), None);
        assert!(!is_mutating(&dict));
    }

    #[test]
    fn test_hydrated_keys_keep_json_order() {
        let dict = Dict::<String>::hydrate(Rc::new(json!({ "z": "last", "a": "first" })));
        assert_eq!(dict.keys(), vec!["z", "a"]);
        assert_eq!(dict.get("a").as_deref(), Some("first"));
        assert_eq!(version(&dict), 0);
    }

    #[test]
    fn test_child_edits_propagate() {
        let dict = Dict::<Rc<Dict<i64>>>::new();
        let child = Dict::new();
        dict.set("child", child.clone());
        let settled = change_complete(&dict);
        run_microtasks();
        assert!(settled.is_settled());
        assert!(!is_mutating(&dict));

        child.set("x", 1);
        assert!(is_mutating(&dict));

        dict.remove("child");
        assert!(!child.tracker().has_parents());
    }
}
