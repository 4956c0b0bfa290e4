//! # Plain-data conversion
//!
//! Walks an object graph and produces JSON-shaped data. Objects and arrays
//! are reference counted inside [`Plain`], so a node reached through two
//! paths converts once and both paths share the same allocation. Fields
//! still waiting on hydration are emitted as the raw fragment they were
//! created from, without materializing them.
//!
//! A [`Converter`] may replace, extend or drop the conversion of any node.

use std::collections::HashMap;
use std::rc::Rc;

use serde::ser::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, instrument, trace};

use crate::tracker::node_addr;
use crate::value::Trackable;

/// Converted data. Composite variants are shared by reference.
#[derive(Debug, Clone)]
pub enum Plain {
    Value(Value),
    /// Untouched hydration fragment
    Raw(Rc<Value>),
    Array(Rc<Vec<Plain>>),
    /// Members in field or insertion order
    Object(Rc<Vec<(String, Plain)>>),
}

impl Plain {
    pub fn null() -> Self {
        Plain::Value(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        match self {
            Plain::Value(value) => value.is_null(),
            Plain::Raw(raw) => raw.is_null(),
            _ => false,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Plain::Raw(_))
    }

    /// Member `key` of an object.
    pub fn get(&self, key: &str) -> Option<Plain> {
        match self {
            Plain::Object(members) => members
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone()),
            Plain::Value(value) => value.get(key).cloned().map(Plain::Value),
            Plain::Raw(raw) => raw.get(key).cloned().map(Plain::Value),
            Plain::Array(_) => None,
        }
    }

    /// Element `index` of an array.
    pub fn index(&self, index: usize) -> Option<Plain> {
        match self {
            Plain::Array(items) => items.get(index).cloned(),
            Plain::Value(value) => value.get(index).cloned().map(Plain::Value),
            Plain::Raw(raw) => raw.get(index).cloned().map(Plain::Value),
            Plain::Object(_) => None,
        }
    }

    /// Add or replace a member. Returns false if `self` is not an object.
    ///
    /// The map is copied first if it is shared with other paths.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Plain>) -> bool {
        match self {
            Plain::Object(members) => {
                let (key, value) = (key.into(), value.into());
                let members = Rc::make_mut(members);
                match members.iter_mut().find(|(name, _)| *name == key) {
                    Some((_, slot)) => *slot = value,
                    None => members.push((key, value)),
                }
                true
            }
            _ => false,
        }
    }

    /// Whether both sides are the same shared allocation.
    pub fn ptr_eq(&self, other: &Plain) -> bool {
        match (self, other) {
            (Plain::Raw(a), Plain::Raw(b)) => Rc::ptr_eq(a, b),
            (Plain::Array(a), Plain::Array(b)) => Rc::ptr_eq(a, b),
            (Plain::Object(a), Plain::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_raw(&self) -> Option<&Rc<Value>> {
        match self {
            Plain::Raw(raw) => Some(raw),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Plain::Value(value) => value.clone(),
            Plain::Raw(raw) => (**raw).clone(),
            Plain::Array(items) => Value::Array(items.iter().map(Plain::to_value).collect()),
            Plain::Object(members) => Value::Object(
                members
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_value()))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Plain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Plain::Value(value) => value.serialize(serializer),
            Plain::Raw(raw) => raw.serialize(serializer),
            Plain::Array(items) => serializer.collect_seq(items.iter()),
            Plain::Object(members) => {
                serializer.collect_map(members.iter().map(|(key, value)| (key, value)))
            }
        }
    }
}

impl PartialEq for Plain {
    fn eq(&self, other: &Plain) -> bool {
        self.ptr_eq(other) || self.to_value() == other.to_value()
    }
}

impl PartialEq<Value> for Plain {
    fn eq(&self, other: &Value) -> bool {
        self.to_value() == *other
    }
}

impl From<Value> for Plain {
    fn from(value: Value) -> Self {
        Plain::Value(value)
    }
}

impl From<&str> for Plain {
    fn from(value: &str) -> Self {
        Plain::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Plain {
    fn from(value: String) -> Self {
        Plain::Value(Value::String(value))
    }
}

impl From<bool> for Plain {
    fn from(value: bool) -> Self {
        Plain::Value(Value::Bool(value))
    }
}

impl From<i64> for Plain {
    fn from(value: i64) -> Self {
        Plain::Value(Value::from(value))
    }
}

impl From<f64> for Plain {
    fn from(value: f64) -> Self {
        Plain::Value(Value::from(value))
    }
}

/// What a [`Converter`] decided for one node.
pub enum Conversion {
    /// Use the node's default conversion
    Default,
    /// Emit this instead
    Value(Plain),
    /// Leave the node out of its parent
    Skip,
}

/// Per-node override hook.
pub type Converter<'a> = dyn Fn(&Rc<dyn Trackable>, &mut ConversionContext<'_>) -> Conversion + 'a;

enum Memo {
    InProgress,
    Done(Option<Plain>),
}

/// State for one conversion pass.
pub struct ConversionContext<'a> {
    memo: HashMap<usize, Memo>,
    converter: Option<&'a Converter<'a>>,
}

impl<'a> ConversionContext<'a> {
    pub fn new() -> Self {
        Self {
            memo: HashMap::new(),
            converter: None,
        }
    }

    pub fn with_converter(converter: &'a Converter<'a>) -> Self {
        Self {
            memo: HashMap::new(),
            converter: Some(converter),
        }
    }

    /// Convert a node once per pass. Returns `None` when a converter
    /// skipped it. A node reached again while its own conversion is still
    /// running converts to `null`.
    pub fn convert_node(&mut self, node: &Rc<dyn Trackable>) -> Option<Plain> {
        let key = node_addr(node);
        match self.memo.get(&key) {
            Some(Memo::Done(result)) => return result.clone(),
            Some(Memo::InProgress) => {
                trace!(type_name = node.type_name(), "cycle during conversion");
                return Some(Plain::null());
            }
            None => {}
        }

        self.memo.insert(key, Memo::InProgress);
        let result = match self.converter {
            Some(converter) => match converter(node, self) {
                Conversion::Default => Some(self.default_conversion(node)),
                Conversion::Value(plain) => Some(plain),
                Conversion::Skip => None,
            },
            None => Some(self.default_conversion(node)),
        };
        self.memo.insert(key, Memo::Done(result.clone()));
        result
    }

    /// The conversion `node` gets without a converter. Its children still
    /// go through the converter.
    pub fn default_conversion(&mut self, node: &Rc<dyn Trackable>) -> Plain {
        node.to_plain(self)
    }

    pub fn converted_count(&self) -> usize {
        self.memo.len()
    }
}

impl Default for ConversionContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn run(root: Option<Rc<dyn Trackable>>, mut ctx: ConversionContext<'_>) -> Plain {
    let Some(root) = root else {
        return Plain::null();
    };
    let result = ctx.convert_node(&root).unwrap_or_else(Plain::null);
    debug!(nodes = ctx.converted_count(), "converted object graph");
    result
}

/// Convert `obj` and everything reachable from it to plain data.
#[instrument(skip_all, fields(type_name = obj.type_name()))]
pub fn convert_to_json<T: Trackable + ?Sized>(obj: &Rc<T>) -> Plain {
    run(obj.tracker().handle(), ConversionContext::new())
}

/// Like [`convert_to_json`], consulting `converter` for every node.
///
/// A skipped root converts to `null`.
#[instrument(skip_all, fields(type_name = obj.type_name()))]
pub fn convert_to_json_with<T, F>(obj: &Rc<T>, converter: F) -> Plain
where
    T: Trackable + ?Sized,
    F: Fn(&Rc<dyn Trackable>, &mut ConversionContext<'_>) -> Conversion,
{
    run(obj.tracker().handle(), ConversionContext::with_converter(&converter))
}
