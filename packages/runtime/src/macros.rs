//! The `data_object!` accessor builder.

/// Declare a tracked record type.
///
/// Each field is written as `getter, setter: Type` with an optional
/// `= default` expression. Fields without a default are built from
/// [`FieldValue::create_default`](crate::FieldValue::create_default) on
/// first read and are left out of conversions until then.
///
/// Prefix a field with `@ref` to track only the reference itself, or with
/// `@ref(n)` to track `n` levels (the reference, then `n - 1` levels of
/// collections below it).
///
/// An optional `@computed` block after the fields declares memoized
/// getters as `name: Type => function`, where `function` takes `&Self`. The
/// function only runs again once a field or object it read has changed.
///
/// ```
/// use std::rc::Rc;
/// use trax_runtime::{data_object, version, List};
///
/// data_object! {
///     pub struct Book {
///         title, set_title: String = "untitled".to_string(),
///         tags, set_tags: Rc<List<String>>,
///         @ref(2) readers, set_readers: Rc<List<String>>,
///     }
/// }
///
/// let book = Book::new();
/// assert_eq!(book.title(), "untitled");
/// book.tags().push("fiction".to_string());
/// assert_eq!(version(&book), 1);
/// ```
///
/// ```
/// use std::rc::Rc;
/// use trax_runtime::{data_object, List};
///
/// data_object! {
///     pub struct Shelf {
///         books, set_books: Rc<List<String>>,
///     }
///
///     @computed {
///         count: usize => |shelf| shelf.books().len(),
///     }
/// }
///
/// let shelf = Shelf::new();
/// shelf.books().push("Dune".to_string());
/// assert_eq!(shelf.count(), 1);
/// ```
#[macro_export]
macro_rules! data_object {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $(@$marker:ident $(($depth:expr))?)?
                $getter:ident, $setter:ident : $ty:ty $(= $default:expr)?
            ),* $(,)?
        }
        $(
            @computed {
                $(
                    $(#[$cmeta:meta])*
                    $computed:ident : $cty:ty => $compute:expr
                ),* $(,)?
            }
        )?
    ) => {
        $(#[$meta])*
        $vis struct $name {
            __trax: $crate::Tracker,
            $( $getter: $crate::Slot<$ty>, )*
            $( $( $computed: $crate::Computed<$cty>, )* )?
        }

        #[allow(dead_code)]
        impl $name {
            pub fn new() -> ::std::rc::Rc<Self> {
                ::std::rc::Rc::new_cyclic(|this: &::std::rc::Weak<Self>| {
                    let this: ::std::rc::Weak<dyn $crate::Trackable> = this.clone();
                    Self {
                        __trax: $crate::Tracker::new(this),
                        $( $getter: $crate::Slot::new(), )*
                        $( $( $computed: $crate::Computed::new(), )* )?
                    }
                })
            }

            $(
                $(#[$fmeta])*
                pub fn $getter(&self) -> $ty {
                    self.$getter.get(
                        &self.__trax,
                        stringify!($getter),
                        $crate::__trax_depth!($($marker $($depth)?)?),
                        || $crate::__trax_default!($ty $(, $default)?),
                    )
                }

                pub fn $setter(&self, value: impl ::core::convert::Into<$ty>) {
                    self.$getter.set(
                        &self.__trax,
                        stringify!($getter),
                        $crate::__trax_depth!($($marker $($depth)?)?),
                        value.into(),
                        || $crate::__trax_default!($ty $(, $default)?),
                    )
                }
            )*

            $(
                $(
                    $(#[$cmeta])*
                    pub fn $computed(&self) -> $cty {
                        let compute: fn(&Self) -> $cty = $compute;
                        self.$computed.get(|| compute(self))
                    }
                )*
            )?
        }

        impl $crate::Trackable for $name {
            fn tracker(&self) -> &$crate::Tracker {
                &self.__trax
            }

            fn type_name(&self) -> &'static str {
                stringify!($name)
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn is_data_object(&self) -> bool {
                true
            }

            fn release_child(&self, child: &::std::rc::Rc<dyn $crate::Trackable>) -> bool {
                $(
                    if self.$getter.release(
                        &self.__trax,
                        $crate::__trax_depth!($($marker $($depth)?)?),
                        child,
                    ) {
                        return true;
                    }
                )*
                let _ = child;
                false
            }

            fn release_children(&self) -> ::std::vec::Vec<::std::rc::Rc<dyn $crate::Trackable>> {
                #[allow(unused_mut)]
                let mut children = ::std::vec::Vec::new();
                $(
                    if let Some(child) = self.$getter.take_child(
                        &self.__trax,
                        $crate::__trax_depth!($($marker $($depth)?)?),
                    ) {
                        children.push(child);
                    }
                )*
                children
            }

            fn linked_children(
                &self,
            ) -> ::std::vec::Vec<(::std::rc::Rc<dyn $crate::Trackable>, ::core::option::Option<u32>)> {
                #[allow(unused_mut)]
                let mut children = ::std::vec::Vec::new();
                $(
                    children.extend(
                        self.$getter
                            .linked_child($crate::__trax_depth!($($marker $($depth)?)?)),
                    );
                )*
                children
            }

            fn field_revision(&self, name: &str) -> ::core::option::Option<u64> {
                $(
                    if name == stringify!($getter) {
                        return ::core::option::Option::Some(self.$getter.revision());
                    }
                )*
                let _ = name;
                ::core::option::Option::None
            }

            fn to_plain(&self, ctx: &mut $crate::ConversionContext<'_>) -> $crate::Plain {
                #[allow(unused_mut)]
                let mut object = ::std::vec::Vec::new();
                $(
                    if let Some(value) = self.$getter.to_plain(
                        &self.__trax,
                        stringify!($getter),
                        $crate::__trax_has_default!($($default)?),
                        || self.$getter(),
                        ctx,
                    ) {
                        object.push((stringify!($getter).to_string(), value));
                    }
                )*
                let _ = ctx;
                $crate::Plain::Object(::std::rc::Rc::new(object))
            }
        }

        impl $crate::Hydrate for $name {
            fn empty() -> ::std::rc::Rc<Self> {
                Self::new()
            }

            fn hydrate(raw: ::std::rc::Rc<$crate::__serde_json::Value>) -> ::std::rc::Rc<Self> {
                let object = Self::new();
                object
                    .__trax
                    .install_payload(raw, <Self as $crate::DataObject>::FIELDS);
                object
            }
        }

        impl $crate::DataObject for $name {
            const FIELDS: &'static [&'static str] = &[$(stringify!($getter)),*];

            fn reset_field(&self, name: &str) -> bool {
                $(
                    if name == stringify!($getter) {
                        self.$setter($crate::__trax_default!($ty $(, $default)?));
                        return true;
                    }
                )*
                let _ = name;
                false
            }

            fn ensure_field(&self, name: &str) -> bool {
                $(
                    if name == stringify!($getter) {
                        let current = self.$getter();
                        if $crate::FieldValue::is_absent(&current) {
                            self.$setter(<$ty as $crate::FieldValue>::materialize());
                        }
                        return true;
                    }
                )*
                let _ = name;
                false
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("tracker", &self.__trax)
                    .finish()
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __trax_depth {
    () => {
        ::core::option::Option::None
    };
    (ref) => {
        ::core::option::Option::Some(1u32)
    };
    (ref $depth:expr) => {
        ::core::option::Option::Some($depth)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __trax_default {
    ($ty:ty) => {
        <$ty as $crate::FieldValue>::create_default()
    };
    ($ty:ty, $default:expr) => {{
        let value: $ty = $default;
        value
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __trax_has_default {
    () => {
        false
    };
    ($default:expr) => {
        true
    };
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use serde_json::json;

    use crate::{
        change_complete, convert_to_json, create, has_property, is_data_object, run_microtasks,
        version, DataObject, List, Trackable,
    };

    data_object! {
        struct Point {
            x, set_x: i64,
            y, set_y: i64 = 1,
            label, set_label: Option<String>,
        }
    }

    data_object! {
        struct Shape {
            origin, set_origin: Rc<Point>,
            @ref pinned, set_pinned: Option<Rc<Point>>,
            @ref(2) trail, set_trail: Rc<List<Rc<Point>>>,
        }
    }

    #[test]
    fn test_defaults_are_lazy() {
        let point = Point::new();
        assert_eq!(version(&point), 0);
        assert_eq!(point.x(), 0);
        assert_eq!(point.y(), 1);
        assert_eq!(point.label(), None);
        assert_eq!(version(&point), 0);
    }

    #[test]
    fn test_fields_and_properties() {
        let point = Point::new();
        assert_eq!(Point::FIELDS, &["x", "y", "label"]);
        assert!(has_property(&point, "label"));
        assert!(!has_property(&point, "z"));
        assert!(is_data_object(&point));
        assert!(!is_data_object(&Some(1i64)));
    }

    #[test]
    fn test_setter_accepts_into() {
        let point = Point::new();
        point.set_label("north");
        assert_eq!(point.label().as_deref(), Some("north"));
        assert_eq!(version(&point), 1);
    }

    #[test]
    fn test_ref_field_does_not_link() {
        let shape = Shape::new();
        let point = Point::new();
        shape.set_pinned(point.clone());
        let settled = change_complete(&shape);
        run_microtasks();
        assert!(settled.is_settled());

        assert!(!point.tracker().has_parents());
        point.set_x(4);
        assert_eq!(version(&shape), 2);
    }

    #[test]
    fn test_ref_depth_tracks_collection_not_items() {
        let shape = Shape::new();
        let trail = shape.trail();
        let point = Point::new();
        trail.push(point.clone());
        assert_eq!(version(&shape), 1);

        let settled = change_complete(&shape);
        run_microtasks();
        assert!(settled.is_settled());

        point.set_x(9);
        assert_eq!(version(&shape), 2);
        trail.push(Point::new());
        assert_eq!(version(&shape), 3);
    }

    #[test]
    fn test_hydrate_ignores_unknown_keys() {
        let point: Rc<Point> = create(json!({ "x": 3, "z": 1 }));
        assert_eq!(point.x(), 3);
        assert!(!point.tracker().has_payload());
        assert_eq!(convert_to_json(&point), json!({ "x": 3, "y": 1 }));
    }
}
