//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::rc::Rc;

use trax_runtime::{data_object, List};

data_object! {
    pub struct TestNode {
        value, set_value: String = "v1".to_string(),
        // built on first read
        node, set_node: Rc<TestNode>,
        node2, set_node2: Option<Rc<TestNode>>,
    }
}

data_object! {
    pub struct ArrTestNode {
        name, set_name: String = "no name".to_string(),
        list, set_list: Rc<List<Option<Rc<TestNode>>>> = List::new(),
    }
}

data_object! {
    pub struct Person {
        name, set_name: String,
    }
}

/// Node with a list holding `i1`, `i2` and `i3`.
pub fn init_new_arr_test_node() -> Rc<ArrTestNode> {
    let node = ArrTestNode::new();
    let list = node.list();
    for value in ["i1", "i2", "i3"] {
        list.push(Some(test_node(value)));
    }
    node
}

pub fn test_node(value: &str) -> Rc<TestNode> {
    let node = TestNode::new();
    node.set_value(value);
    node
}

pub fn person(name: &str) -> Rc<Person> {
    let person = Person::new();
    person.set_name(name);
    person
}

/// `value` of every slot, with "null" for holes.
pub fn stringify_list(list: &List<Option<Rc<TestNode>>>) -> String {
    (0..list.len())
        .map(|index| match list.get(index).flatten() {
            Some(node) => node.value(),
            None => "null".to_string(),
        })
        .collect::<Vec<_>>()
        .join("-")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("trax_runtime=debug")
        .try_init();
}
