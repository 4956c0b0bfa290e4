//! Conversion of object graphs to plain data

mod common;

use std::rc::Rc;

use common::{init_new_arr_test_node, test_node, TestNode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use trax_runtime::{
    change_complete, convert_to_json, convert_to_json_with, create, data_object, is_mutating,
    Conversion, ConversionContext, Dict, Plain, Shared, Trackable,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Counter {
    duration: u32,
}

data_object! {
    struct ValueNode {
        message, set_message: String = "hello".to_string(),
        is_ok, set_is_ok: bool = true,
        quantity, set_quantity: i64 = 42,
        some_object, set_some_object: Value = json!({ "foo": "bar" }),
        counter, set_counter: Shared<Counter> = Shared::new(Counter { duration: 42 }),
        message2, set_message2: Option<String>,
        is_ok2, set_is_ok2: Option<bool>,
    }
}

data_object! {
    struct DictTestNode {
        name, set_name: String = "map".to_string(),
        dict, set_dict: Rc<Dict<Option<Rc<TestNode>>>>,
    }
}

/// tn1 -> tn2 -> (tn3, tn3)
fn shared_graph() -> Rc<TestNode> {
    let tn1 = TestNode::new();
    let tn2 = test_node("v2");
    let tn3 = test_node("v3");
    tn1.set_node(tn2.clone());
    tn2.set_node(tn3.clone());
    tn2.set_node2(Some(tn3));
    tn1
}

fn node_value(node: &Rc<dyn Trackable>) -> Option<String> {
    node.as_any()
        .downcast_ref::<TestNode>()
        .map(|node| node.value())
}

fn tag_nodes(node: &Rc<dyn Trackable>, ctx: &mut ConversionContext<'_>) -> Conversion {
    match node_value(node).as_deref() {
        Some("v3") => Conversion::Value(Plain::from("tn3")),
        Some("v2") => {
            let mut plain = ctx.default_conversion(node);
            plain.insert("is_v2", true);
            Conversion::Value(plain)
        }
        _ => Conversion::Default,
    }
}

fn skip_v3(node: &Rc<dyn Trackable>, _ctx: &mut ConversionContext<'_>) -> Conversion {
    match node_value(node).as_deref() {
        Some("v3") => Conversion::Skip,
        _ => Conversion::Default,
    }
}

#[tokio::test]
async fn test_unset_fields_are_left_out() {
    let sn = ValueNode::new();
    let expected = json!({
        "message": "hello",
        "is_ok": true,
        "quantity": 42,
        "some_object": { "foo": "bar" },
        "counter": { "duration": 42 },
    });
    assert_eq!(convert_to_json(&sn), expected);

    sn.set_message2("m2".to_string());
    assert!(is_mutating(&sn));
    let expected = json!({
        "message": "hello",
        "is_ok": true,
        "quantity": 42,
        "some_object": { "foo": "bar" },
        "counter": { "duration": 42 },
        "message2": "m2",
    });
    assert_eq!(convert_to_json(&sn), expected);

    change_complete(&sn).await;
    assert_eq!(convert_to_json(&sn), expected);
}

#[tokio::test]
async fn test_data_object_fields() {
    let tn = TestNode::new();
    assert_eq!(convert_to_json(&tn), json!({ "value": "v1" }));

    tn.set_node(TestNode::new());
    tn.node().set_value("v2");
    assert!(is_mutating(&tn));
    let expected = json!({ "value": "v1", "node": { "value": "v2" } });
    assert_eq!(convert_to_json(&tn), expected);

    change_complete(&tn).await;
    assert_eq!(convert_to_json(&tn), expected);
}

#[tokio::test]
async fn test_shared_node_converts_once() {
    let tn1 = shared_graph();
    let expected = json!({
        "value": "v1",
        "node": {
            "value": "v2",
            "node": { "value": "v3" },
            "node2": { "value": "v3" },
        },
    });

    let plain = convert_to_json(&tn1);
    assert_eq!(plain, expected);
    let inner = plain.get("node").unwrap();
    assert!(inner
        .get("node")
        .unwrap()
        .ptr_eq(&inner.get("node2").unwrap()));
    assert!(is_mutating(&tn1));

    change_complete(&tn1).await;
    let plain = convert_to_json(&tn1);
    assert_eq!(plain, expected);
    let inner = plain.get("node").unwrap();
    assert!(inner
        .get("node")
        .unwrap()
        .ptr_eq(&inner.get("node2").unwrap()));
}

#[tokio::test]
async fn test_custom_converter() {
    let tn1 = shared_graph();
    let expected = json!({
        "value": "v1",
        "node": {
            "value": "v2",
            "is_v2": true,
            "node": "tn3",
            "node2": "tn3",
        },
    });

    assert_eq!(convert_to_json_with(&tn1, tag_nodes), expected);
    change_complete(&tn1).await;
    assert_eq!(convert_to_json_with(&tn1, tag_nodes), expected);
}

#[tokio::test]
async fn test_converter_can_skip_nodes() {
    let tn1 = shared_graph();
    let expected = json!({ "value": "v1", "node": { "value": "v2" } });

    assert_eq!(convert_to_json_with(&tn1, skip_v3), expected);
    change_complete(&tn1).await;
    assert_eq!(convert_to_json_with(&tn1, skip_v3), expected);

    assert!(convert_to_json_with(&tn1, |_, _| Conversion::Skip).is_null());
}

#[tokio::test]
async fn test_lists() {
    let nd = init_new_arr_test_node();
    let expected = json!({
        "name": "no name",
        "list": [{ "value": "i1" }, { "value": "i2" }, { "value": "i3" }],
    });
    assert_eq!(convert_to_json(&nd), expected);

    change_complete(&nd).await;
    assert_eq!(convert_to_json(&nd), expected);
}

#[tokio::test]
async fn test_dictionaries() {
    let d = DictTestNode::new();
    d.dict().set("a", Some(test_node("item A")));
    d.dict().set("b", Some(test_node("item B")));
    d.dict().set("c", None);

    let expected = json!({
        "name": "map",
        "dict": { "a": { "value": "item A" }, "b": { "value": "item B" }, "c": null },
    });
    assert_eq!(convert_to_json(&d), expected);

    change_complete(&d).await;
    assert_eq!(convert_to_json(&d), expected);
}

#[tokio::test]
async fn test_unread_json_is_returned_as_is() {
    let raw = json!({ "value": "v2", "node": { "value": "v3", "node": { "value": "v4" } } });
    let tn: Rc<TestNode> = create(raw.clone());
    assert!(!is_mutating(&tn));

    let pending = tn.tracker().pending_payload("node").unwrap();
    let plain = convert_to_json(&tn);
    assert_eq!(plain, raw);
    assert!(Rc::ptr_eq(plain.get("node").unwrap().as_raw().unwrap(), &pending));

    tn.set_value("v3");
    assert!(is_mutating(&tn));
    let plain = convert_to_json(&tn);
    assert_eq!(plain, json!({ "value": "v3", "node": raw["node"] }));
    assert!(Rc::ptr_eq(plain.get("node").unwrap().as_raw().unwrap(), &pending));

    tn.set_node(TestNode::new());
    tn.node().set_value("v4");
    assert!(!tn.node().tracker().has_payload());
    let expected = json!({ "value": "v3", "node": { "value": "v4" } });
    assert_eq!(convert_to_json(&tn), expected);

    change_complete(&tn).await;
    assert!(!is_mutating(&tn));
    assert_eq!(convert_to_json(&tn), expected);
}

#[tokio::test]
async fn test_plain_serializes() -> anyhow::Result<()> {
    let tn = test_node("out");
    let text = serde_json::to_string(&convert_to_json(&tn))?;
    assert_eq!(text, r#"{"value":"out"}"#);
    Ok(())
}
