//! # Trax Runtime
//!
//! Fine-grained change tracking for plain data objects.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ data_object! / List / Dict                  │
//! │  - generated getters and setters            │
//! │  - lazy defaults and lazy JSON hydration    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ mutation: relink → touch                    │
//! │  - parent/child bookkeeping (weak links)    │
//! │  - generation stamps, version counter       │
//! │  - cycle-safe dirtiness propagation         │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ scheduler: refresh batches on microtasks    │
//! │  - one notification per object per batch   │
//! │  - change_complete futures                  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Reads are free**: getters never change generation state
//! 2. **One round per generation**: an object is touched at most once per
//!    generation, which also stops propagation around cycles
//! 3. **Coalesced notification**: every synchronous write lands in the open
//!    batch; writes made by watchers land in the next one
//! 4. **Nothing eager**: hydrated JSON is only read field by field
//! 5. **Depth lives on links**: a `@ref(n)` slot limits what its link
//!    carries, never the object it points to
//!
//! ## Usage
//!
//! ```rust
//! use std::rc::Rc;
//! use trax_runtime::{data_object, run_microtasks, version, watch};
//!
//! data_object! {
//!     pub struct Todo {
//!         title, set_title: String,
//!         done, set_done: bool,
//!     }
//! }
//!
//! let todo = Todo::new();
//! watch(&todo, |todo| println!("changed: {}", todo.title()));
//!
//! todo.set_title("write docs");
//! todo.set_done(true);
//! assert_eq!(version(&todo), 1);
//!
//! // Microtasks run when a change_complete future is awaited, or explicitly:
//! run_microtasks();
//! assert_eq!(version(&todo), 2);
//! ```
//!
//! State is per thread. Objects are `Rc`-based and never cross threads.

mod api;
mod computed;
pub mod config;
mod convert;
mod dict;
mod errors;
mod list;
mod macros;
mod multi_value;
mod mutation;
mod scheduler;
mod slot;
mod tracker;
mod value;

pub use api::{
    change_complete, create, create_from_str, dispose, ensure_field, has_parents, has_property,
    is_being_changed, is_data_object, is_mutating, number_of_watchers, parent_count, reset, touch,
    unwatch, version, watch,
};
pub use computed::Computed;
pub use config::{DispatchMode, RuntimeConfig};
pub use convert::{
    convert_to_json, convert_to_json_with, Conversion, ConversionContext, Converter, Plain,
};
pub use dict::Dict;
pub use errors::{TraxError, TraxResult};
pub use list::List;
pub use multi_value::MultiValue;
pub use scheduler::{
    configure, current_config, current_generation, pending_microtasks, run_microtasks,
    ChangeComplete, WatchHandle,
};
pub use slot::Slot;
pub use tracker::Tracker;
pub use value::{DataObject, FieldValue, Hydrate, Shared, Trackable};

#[doc(hidden)]
pub use serde_json as __serde_json;
