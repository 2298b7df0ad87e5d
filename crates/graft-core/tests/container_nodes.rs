use graft_core::{GraphError, Index, NodeContainer, NodeId, TypeRegistry, Value};
use serde_json::json;

fn build(container: &mut NodeContainer, json: serde_json::Value) -> NodeId {
    let value = container.store_mut().insert_json(&json);
    let instance = value.as_ref_id().expect("root is an instance");
    container.get_or_create(instance).expect("build node graph")
}

#[test]
fn one_node_per_instance() {
    let mut container = NodeContainer::new(TypeRegistry::new());
    let root = build(&mut container, json!({"name": "a", "child": {"name": "b"}}));

    let instance = container
        .retrieve(root, &Index::Empty)
        .expect("root value")
        .as_ref_id()
        .expect("root instance");
    let again = container.get_or_create(instance).expect("existing node");
    assert_eq!(root, again);

    let child = container.member(root, "child").expect("child member");
    let child_ref = container
        .node(child)
        .reference
        .as_ref()
        .and_then(|r| r.as_object())
        .expect("child holds an object reference");
    let target = child_ref.target.expect("resolved target");
    let child_instance = container
        .node(target)
        .instance()
        .expect("object node instance");
    assert_eq!(container.get_or_create(child_instance).expect("lookup"), target);
}

#[test]
fn member_read_write() {
    let mut container = NodeContainer::new(TypeRegistry::new());
    let root = build(&mut container, json!({"name": "a", "count": 3}));

    let count = container.member(root, "count").expect("count member");
    assert_eq!(
        container.retrieve(count, &Index::Empty).expect("read"),
        Value::Int(3)
    );
    container
        .update(count, Value::Int(7), &Index::Empty)
        .expect("write");
    assert_eq!(
        container.retrieve(count, &Index::Empty).expect("read back"),
        Value::Int(7)
    );
}

#[test]
fn object_nodes_reject_whole_value_writes() {
    let mut container = NodeContainer::new(TypeRegistry::new());
    let root = build(&mut container, json!({"name": "a"}));
    let err = container
        .update(root, Value::Null, &Index::Empty)
        .expect_err("object nodes are not assignable");
    assert!(matches!(err, GraphError::UnsupportedMutation));
}

#[test]
fn collection_items_keep_their_identity() {
    let mut container = NodeContainer::new(TypeRegistry::new());
    let root = build(&mut container, json!({"tags": [1, 2, 3]}));
    let tags = container.member(root, "tags").expect("tags member");

    let collection = container.collection_of(tags).expect("collection instance");
    let id_1 = container
        .store()
        .item_ids(collection)
        .and_then(|ids| ids.get(&Index::Num(1)))
        .expect("tracked item id");

    container.move_item(tags, 1, 0).expect("move item");
    assert_eq!(
        container
            .store()
            .item_ids(collection)
            .and_then(|ids| ids.get(&Index::Num(0))),
        Some(id_1)
    );
    assert_eq!(
        container.retrieve(tags, &Index::Num(0)).expect("moved value"),
        Value::Int(2)
    );

    let added = container
        .add_item(tags, &Index::Empty, Value::Int(4))
        .expect("append")
        .expect("identity assigned");
    let (removed, removed_id) = container
        .remove_item(tags, &Index::Num(3))
        .expect("remove appended item");
    assert_eq!(removed, Value::Int(4));
    assert_eq!(removed_id, Some(added));
}

#[test]
fn self_referential_value_type_fails_construction() {
    let mut registry = TypeRegistry::new();
    registry.register_value_type("looper");
    let mut container = NodeContainer::new(registry);

    let inst = container
        .store_mut()
        .new_object("looper", indexmap::IndexMap::new());
    container
        .store_mut()
        .set_member(inst, "me", Value::Ref(inst))
        .expect("wire self reference");

    let err = container
        .get_or_create(inst)
        .expect_err("construction cannot terminate");
    assert!(matches!(err, GraphError::ReEntrantConstruction(_)));
}

#[test]
fn map_insert_rejects_duplicate_keys() {
    let mut container = NodeContainer::new(TypeRegistry::new());
    let value = container
        .store_mut()
        .insert_json_map("settings", &json!({"a": 1}));
    let instance = value.as_ref_id().expect("map instance");
    let node = container.get_or_create(instance).expect("map node");

    let err = container
        .add_item(node, &Index::Key("a".into()), Value::Int(2))
        .expect_err("duplicate key");
    assert!(matches!(err, GraphError::InvalidIndex { .. }));
}
