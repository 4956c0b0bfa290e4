//! # Mutation protocol
//!
//! Writes go through [`relink`] (ownership bookkeeping) and then [`touch`]
//! (dirtiness propagation). Reads never come through here except to
//! [`connect`] a freshly materialized child.
//!
//! `touch` walks parent links breadth first. The generation stamp on each
//! tracker is what terminates the walk on cycles: an object stamped for the
//! current generation is only visited again from a shorter distance.
//!
//! Depth is a property of links, not of objects. Every link records the
//! depth its slot grants to the child, an object's own depth is derived
//! from the links it currently has, and when that changes its children are
//! re-linked.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tracing::{trace, warn};

use crate::scheduler::with_scheduler;
use crate::tracker::{node_addr, Tracker};
use crate::value::{FieldValue, Trackable};

/// Upper bound on how often one object is re-linked by a single depth change.
const MAX_RELINK_PASSES: usize = 8;

/// Mark `node` and every ancestor dirty for the current generation.
///
/// A link that grants depth `k` only carries changes made less than `k`
/// levels below the child it points from.
pub(crate) fn touch(node: &Tracker) {
    with_scheduler(|scheduler| {
        let generation = scheduler.generation();
        if !node.mark(generation, 0) {
            return;
        }
        scheduler.register_if_watched(node);

        let mut pending: VecDeque<(Rc<dyn Trackable>, u32)> = VecDeque::new();
        enqueue_parents(&mut pending, node, 0);
        let mut visited = 1usize;
        while let Some((parent, hops)) = pending.pop_front() {
            let tracker = parent.tracker();
            if !tracker.mark(generation, hops) {
                continue;
            }
            visited += 1;
            scheduler.register_if_watched(tracker);
            enqueue_parents(&mut pending, tracker, hops);
        }
        trace!(generation, visited, "touch propagated");
    })
}

/// Queue the owners a change `hops` levels below `node` is visible to.
fn enqueue_parents(pending: &mut VecDeque<(Rc<dyn Trackable>, u32)>, node: &Tracker, hops: u32) {
    for (parent, depth) in node.parent_links() {
        if depth.map_or(true, |depth| hops < depth) {
            pending.push_back((parent, hops + 1));
        }
    }
}

fn combine_depth(owner: Option<u32>, field: Option<u32>) -> Option<u32> {
    match (owner, field) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Depth granted to a child stored in a slot declared with `field` depth
/// on an owner tracking `owner` levels, or `None` when it is not linked.
fn grant(owner: Option<u32>, field: Option<u32>) -> Option<Option<u32>> {
    match combine_depth(owner, field) {
        Some(depth) if depth <= 1 => None,
        depth => Some(depth.map(|d| d - 1)),
    }
}

/// Register `parent` as an owner of `child` unless the depth policy says
/// the child's internals are not tracked from here.
pub(crate) fn connect(parent: &Tracker, child: &Rc<dyn Trackable>, field_depth: Option<u32>) {
    let Some(granted) = grant(parent.depth(), field_depth) else {
        return;
    };
    let tracker = child.tracker();
    let before = tracker.depth();
    tracker.add_parent(parent.weak(), granted);
    relink_if_changed(child, before);
}

/// Remove the link a slot declared with `field_depth` holds from `parent`
/// to `child`.
pub(crate) fn disconnect(parent: &Tracker, child: &Rc<dyn Trackable>, field_depth: Option<u32>) {
    let Some(granted) = grant(parent.depth(), field_depth) else {
        return;
    };
    let tracker = child.tracker();
    let before = tracker.depth();
    if tracker.remove_parent(parent, granted) {
        relink_if_changed(child, before);
    }
}

/// Re-link the children of `node` after its depth moved away from `before`.
///
/// Links of every child are rewritten to what the new depth grants, which
/// can in turn change the children's own depth.
fn relink_if_changed(node: &Rc<dyn Trackable>, before: Option<u32>) {
    let after = node.tracker().depth();
    if after == before {
        return;
    }
    let mut pending = VecDeque::from([(node.clone(), before, after)]);
    let mut passes: HashMap<usize, usize> = HashMap::new();

    while let Some((owner, before, after)) = pending.pop_front() {
        let count = passes.entry(node_addr(&owner)).or_insert(0);
        *count += 1;
        if *count > MAX_RELINK_PASSES {
            warn!(
                type_name = owner.type_name(),
                "depth keeps changing, leaving links as they are"
            );
            continue;
        }
        trace!(type_name = owner.type_name(), ?before, ?after, "relinking children");

        let owner_tracker = owner.tracker();
        for (child, field_depth) in owner.linked_children() {
            let old = grant(before, field_depth);
            let new = grant(after, field_depth);
            if old == new {
                continue;
            }
            let tracker = child.tracker();
            let child_before = tracker.depth();
            if let Some(old) = old {
                tracker.remove_parent(owner_tracker, old);
            }
            if let Some(new) = new {
                tracker.add_parent(owner_tracker.weak(), new);
            }
            let child_after = tracker.depth();
            if child_after != child_before {
                pending.push_back((child, child_before, child_after));
            }
        }
    }
}

/// Rewire ownership for replacing `old` with `new` in a slot of `owner`.
///
/// Returns false, without touching anything, when the write is a no-op.
/// The caller stores the value and then calls [`touch`].
pub(crate) fn relink<T: FieldValue>(
    owner: &Tracker,
    old: Option<&T>,
    new: &T,
    depth: Option<u32>,
) -> bool {
    if let Some(old) = old {
        if old.same(new) {
            return false;
        }
        if let Some(child) = old.node() {
            disconnect(owner, &child, depth);
        }
    }
    if let Some(child) = new.node() {
        connect(owner, &child, depth);
    }
    true
}
