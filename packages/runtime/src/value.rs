//! Traits shared by every trackable object and every value a field can hold.

use std::any::Any;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::convert::{ConversionContext, Plain};
use crate::tracker::Tracker;

/// An object that takes part in change tracking.
///
/// Implemented by the `data_object!` macro and by [`List`](crate::List) and
/// [`Dict`](crate::Dict). The trait is object safe so parent links and batch
/// members can be stored as `dyn Trackable`.
pub trait Trackable: Any {
    fn tracker(&self) -> &Tracker;

    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn is_data_object(&self) -> bool {
        false
    }

    /// Unset one slot holding `child` and touch `self`.
    ///
    /// Returns false when no slot of this object links to `child`.
    fn release_child(&self, child: &Rc<dyn Trackable>) -> bool;

    /// Unset every linked slot without touching `self` and return the
    /// children that were unlinked.
    fn release_children(&self) -> Vec<Rc<dyn Trackable>>;

    /// Every materialized trackable child, once per holding slot, with the
    /// depth declared by that slot.
    fn linked_children(&self) -> Vec<(Rc<dyn Trackable>, Option<u32>)>;

    /// Write counter of field `name`, for objects that have named fields.
    fn field_revision(&self, _name: &str) -> Option<u64> {
        None
    }

    /// Default plain-data conversion of this object.
    fn to_plain(&self, ctx: &mut ConversionContext<'_>) -> Plain;
}

/// Trackable types that can be built empty or from raw JSON.
pub trait Hydrate: Trackable + Sized {
    fn empty() -> Rc<Self>;

    /// Build an instance whose contents are read lazily from `raw`.
    fn hydrate(raw: Rc<Value>) -> Rc<Self>;
}

/// Record types generated by `data_object!`.
pub trait DataObject: Hydrate {
    const FIELDS: &'static [&'static str];

    /// Restore a field to its factory default through the normal write path.
    fn reset_field(&self, name: &str) -> bool;

    /// Materialize a field so it is populated and linked.
    fn ensure_field(&self, name: &str) -> bool;
}

/// Anything that can be stored in a field, list element or dictionary entry.
pub trait FieldValue: Clone + 'static {
    /// Whether writing `other` over `self` would be a no-op.
    fn same(&self, other: &Self) -> bool;

    /// The trackable object behind this value, if any.
    fn node(&self) -> Option<Rc<dyn Trackable>> {
        None
    }

    /// `None` leaves the value out of its parent's conversion.
    fn to_plain(&self, ctx: &mut ConversionContext<'_>) -> Option<Plain>;

    /// Build a value from a hydration fragment. `None` falls back to the
    /// field's factory.
    fn from_json(raw: Rc<Value>) -> Option<Self>;

    fn create_default() -> Self;

    /// True for values that stand for "nothing here", like `None`.
    fn is_absent(&self) -> bool {
        false
    }

    /// A present value for a field that is explicitly asked to exist.
    fn materialize() -> Self {
        Self::create_default()
    }

    fn is_data_object(&self) -> bool {
        false
    }
}

fn unwrap_raw(raw: Rc<Value>) -> Value {
    Rc::try_unwrap(raw).unwrap_or_else(|shared| (*shared).clone())
}

macro_rules! scalar_field_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                fn same(&self, other: &Self) -> bool {
                    self == other
                }

                fn to_plain(&self, _ctx: &mut ConversionContext<'_>) -> Option<Plain> {
                    serde_json::to_value(self).ok().map(Plain::Value)
                }

                fn from_json(raw: Rc<Value>) -> Option<Self> {
                    serde_json::from_value(unwrap_raw(raw)).ok()
                }

                fn create_default() -> Self {
                    Default::default()
                }
            }
        )*
    };
}

scalar_field_value!(
    String, bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, Value,
);

impl<T: FieldValue> FieldValue for Option<T> {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same(b),
            _ => false,
        }
    }

    fn node(&self) -> Option<Rc<dyn Trackable>> {
        self.as_ref().and_then(FieldValue::node)
    }

    fn to_plain(&self, ctx: &mut ConversionContext<'_>) -> Option<Plain> {
        self.as_ref().and_then(|value| value.to_plain(ctx))
    }

    fn from_json(raw: Rc<Value>) -> Option<Self> {
        if raw.is_null() {
            return Some(None);
        }
        T::from_json(raw).map(Some)
    }

    fn create_default() -> Self {
        None
    }

    fn is_absent(&self) -> bool {
        self.is_none()
    }

    fn materialize() -> Self {
        Some(T::materialize())
    }

    fn is_data_object(&self) -> bool {
        self.as_ref().is_some_and(FieldValue::is_data_object)
    }
}

impl<T: Hydrate> FieldValue for Rc<T> {
    fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }

    fn node(&self) -> Option<Rc<dyn Trackable>> {
        Some(self.clone())
    }

    fn to_plain(&self, ctx: &mut ConversionContext<'_>) -> Option<Plain> {
        let node: Rc<dyn Trackable> = self.clone();
        ctx.convert_node(&node)
    }

    fn from_json(raw: Rc<Value>) -> Option<Self> {
        Some(T::hydrate(raw))
    }

    fn create_default() -> Self {
        T::empty()
    }

    fn is_data_object(&self) -> bool {
        Trackable::is_data_object(&**self)
    }
}

/// Untracked value held by reference.
///
/// Writes compare the `Rc` pointer, so replacing it with an equal but
/// distinct value still counts as a change. Mutations inside it are never
/// seen by the owner.
#[derive(Debug, Default)]
pub struct Shared<T>(pub Rc<T>);

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Shared(Rc::new(value))
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(self.0.clone())
    }
}

impl<T> std::ops::Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> FieldValue for Shared<T>
where
    T: Serialize + DeserializeOwned + Default + 'static,
{
    fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn to_plain(&self, _ctx: &mut ConversionContext<'_>) -> Option<Plain> {
        serde_json::to_value(&*self.0).ok().map(Plain::Value)
    }

    fn from_json(raw: Rc<Value>) -> Option<Self> {
        serde_json::from_value(unwrap_raw(raw)).ok().map(Shared::new)
    }

    fn create_default() -> Self {
        Shared::new(T::default())
    }
}
