use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};
use trax_runtime::{convert_to_json, create, data_object, run_microtasks, watch, List};

data_object! {
    pub struct Node {
        label, set_label: String,
        child, set_child: Option<Rc<Node>>,
        items, set_items: Rc<List<Rc<Node>>>,
    }
}

/// A chain of `depth` nodes; returns (root, leaf).
fn chain(depth: usize) -> (Rc<Node>, Rc<Node>) {
    let root = Node::new();
    let mut leaf = root.clone();
    for _ in 0..depth {
        let next = Node::new();
        leaf.set_child(Some(next.clone()));
        leaf = next;
    }
    run_microtasks();
    (root, leaf)
}

fn wide_json(width: usize) -> Value {
    let items: Vec<Value> = (0..width)
        .map(|i| json!({ "label": format!("item {i}"), "items": [] }))
        .collect();
    json!({ "label": "root", "items": items })
}

fn propagate_deep_write(c: &mut Criterion) {
    let (root, leaf) = chain(100);
    watch(&root, |_| {});

    c.bench_function("propagate_deep_write", |b| {
        b.iter(|| {
            leaf.set_label(black_box("changed").to_string());
            leaf.set_label(black_box("reset").to_string());
            run_microtasks();
        })
    });
}

fn batch_many_writes(c: &mut Criterion) {
    let root = Node::new();
    let items = root.items();
    for i in 0..1_000 {
        let item = Node::new();
        item.set_label(format!("item {i}"));
        items.push(item);
    }
    watch(&root, |_| {});
    run_microtasks();

    c.bench_function("batch_many_writes", |b| {
        b.iter(|| {
            for item in items.iter() {
                item.set_label(black_box("x").to_string());
                item.set_label(black_box("y").to_string());
            }
            run_microtasks();
        })
    });
}

fn hydrate_lazily(c: &mut Criterion) {
    let raw = wide_json(1_000);

    c.bench_function("hydrate_lazily", |b| {
        b.iter(|| {
            let node: Rc<Node> = create(black_box(raw.clone()));
            node.items().get(500).map(|item| item.label())
        })
    });
}

fn convert_untouched_json(c: &mut Criterion) {
    let raw = wide_json(1_000);
    let node: Rc<Node> = create(raw);

    c.bench_function("convert_untouched_json", |b| {
        b.iter(|| convert_to_json(black_box(&node)))
    });
}

criterion_group!(
    benches,
    propagate_deep_write,
    batch_many_writes,
    hydrate_lazily,
    convert_untouched_json
);
criterion_main!(benches);
