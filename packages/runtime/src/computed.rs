//! # Computed properties
//!
//! A [`Computed`] cell memoizes a derived value. While the value is being
//! produced, every field read and every trackable object reached through a
//! field is recorded as a dependency. The cached value is reused until one
//! of them moves:
//!
//! - a recorded field was written, reset or released
//! - a recorded object changed version, or is still changing
//!
//! Reads of unrelated fields of the same owner do not invalidate the cache.

use std::cell::RefCell;
use std::rc::Weak;

use tracing::trace;

use crate::tracker::Tracker;
use crate::value::Trackable;

#[derive(Clone)]
enum Dependency {
    Field {
        owner: Weak<dyn Trackable>,
        key: &'static str,
        revision: u64,
    },
    Node {
        node: Weak<dyn Trackable>,
        version: u64,
    },
}

impl Dependency {
    fn is_fresh(&self) -> bool {
        match self {
            Dependency::Field {
                owner,
                key,
                revision,
            } => owner
                .upgrade()
                .is_some_and(|owner| owner.field_revision(key) == Some(*revision)),
            Dependency::Node { node, version } => node.upgrade().is_some_and(|node| {
                let tracker = node.tracker();
                !tracker.is_mutating() && tracker.version() == *version
            }),
        }
    }

    fn same_as(&self, other: &Dependency) -> bool {
        match (self, other) {
            (
                Dependency::Field {
                    owner: a,
                    key: ka,
                    revision: ra,
                },
                Dependency::Field {
                    owner: b,
                    key: kb,
                    revision: rb,
                },
            ) => Weak::ptr_eq(a, b) && ka == kb && ra == rb,
            (
                Dependency::Node {
                    node: a,
                    version: va,
                },
                Dependency::Node {
                    node: b,
                    version: vb,
                },
            ) => Weak::ptr_eq(a, b) && va == vb,
            _ => false,
        }
    }
}

thread_local! {
    static FRAMES: RefCell<Vec<Vec<Dependency>>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn is_capturing() -> bool {
    FRAMES.with(|frames| !frames.borrow().is_empty())
}

fn record(dependency: Dependency) {
    FRAMES.with(|frames| {
        if let Some(top) = frames.borrow_mut().last_mut() {
            if !top.iter().any(|known| known.same_as(&dependency)) {
                top.push(dependency);
            }
        }
    })
}

/// Note a read of field `key` of `owner`.
pub(crate) fn record_field(owner: &Tracker, key: &'static str, revision: u64) {
    record(Dependency::Field {
        owner: owner.weak(),
        key,
        revision,
    });
}

/// Note that the object behind `node` was read.
pub(crate) fn record_node(node: &Tracker) {
    if !is_capturing() {
        return;
    }
    record(Dependency::Node {
        node: node.weak(),
        version: node.version(),
    });
}

/// Pops the capture frame even if the computation panics.
struct Capture {
    finished: bool,
}

impl Capture {
    fn start() -> Self {
        FRAMES.with(|frames| frames.borrow_mut().push(Vec::new()));
        Capture { finished: false }
    }

    fn finish(mut self) -> Vec<Dependency> {
        self.finished = true;
        FRAMES.with(|frames| frames.borrow_mut().pop()).unwrap_or_default()
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if !self.finished {
            FRAMES.with(|frames| frames.borrow_mut().pop());
        }
    }
}

struct Cached<T> {
    value: T,
    dependencies: Vec<Dependency>,
}

/// Memo cell behind a computed getter.
pub struct Computed<T> {
    cached: RefCell<Option<Cached<T>>>,
}

impl<T: Clone + 'static> Computed<T> {
    pub fn new() -> Self {
        Self {
            cached: RefCell::new(None),
        }
    }

    /// The cached value if every dependency is unchanged, otherwise the
    /// result of running `compute` again.
    pub fn get(&self, compute: impl FnOnce() -> T) -> T {
        let hit = self.cached.borrow().as_ref().and_then(|cached| {
            cached
                .dependencies
                .iter()
                .all(Dependency::is_fresh)
                .then(|| (cached.value.clone(), cached.dependencies.clone()))
        });
        if let Some((value, dependencies)) = hit {
            forward(dependencies);
            return value;
        }

        let capture = Capture::start();
        let value = compute();
        let dependencies = capture.finish();
        trace!(dependencies = dependencies.len(), "computed value refreshed");

        forward(dependencies.clone());
        *self.cached.borrow_mut() = Some(Cached {
            value: value.clone(),
            dependencies,
        });
        value
    }

    /// Drop the cached value so the next read recomputes.
    pub fn invalidate(&self) {
        self.cached.borrow_mut().take();
    }

    pub fn is_cached(&self) -> bool {
        self.cached.borrow().is_some()
    }
}

impl<T: Clone + 'static> Default for Computed<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A computed value read inside another computation makes the outer one
/// depend on everything the inner one depends on.
fn forward(dependencies: Vec<Dependency>) {
    for dependency in dependencies {
        record(dependency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::change_complete;
    use crate::list::List;
    use crate::scheduler::run_microtasks;
    use crate::value::Hydrate;
    use std::cell::Cell;

    #[test]
    fn test_value_is_cached_without_dependencies() {
        let cell = Computed::new();
        let runs = Cell::new(0);
        let compute = || {
            runs.set(runs.get() + 1);
            7
        };
        assert_eq!(cell.get(compute), 7);
        assert_eq!(cell.get(compute), 7);
        assert_eq!(runs.get(), 1);

        cell.invalidate();
        assert!(!cell.is_cached());
        assert_eq!(cell.get(compute), 7);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_node_dependency_reruns_while_changing() {
        let list = List::<i64>::empty();
        let cell = Computed::new();
        let runs = Cell::new(0);
        let compute = || {
            runs.set(runs.get() + 1);
            record_node(list.tracker());
            list.len()
        };
        assert_eq!(cell.get(compute), 0);
        assert_eq!(cell.get(compute), 0);
        assert_eq!(runs.get(), 1);

        list.push(1);
        assert_eq!(cell.get(compute), 1);
        assert_eq!(cell.get(compute), 1);
        assert_eq!(runs.get(), 3);

        let settled = change_complete(&list);
        run_microtasks();
        assert!(settled.is_settled());
        assert_eq!(cell.get(compute), 1);
        assert_eq!(cell.get(compute), 1);
        assert_eq!(runs.get(), 4);
    }

    #[test]
    fn test_panicking_computation_leaves_no_frame() {
        let cell: Computed<i64> = Computed::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cell.get(|| panic!("boom"))
        }));
        assert!(result.is_err());
        assert!(!is_capturing());
    }
}
