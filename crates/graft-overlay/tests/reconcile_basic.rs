use graft_core::{Index, NodeContainer, TypeRegistry, Value};
use graft_overlay::{DefaultPolicy, PropertyGraphContainer};
use serde_json::json;
use uuid::Uuid;

fn setup(base: serde_json::Value) -> (PropertyGraphContainer, Uuid, Uuid) {
    let mut pg = PropertyGraphContainer::new(NodeContainer::new(TypeRegistry::new()));
    let base_value = pg.nodes_mut().store_mut().insert_json(&base);
    let base_inst = base_value.as_ref_id().expect("base instance");
    let base_id = pg.register_root(base_inst, None).expect("register base");

    let derived_value = pg.nodes_mut().store_mut().derive_clone(&base_value);
    let derived_inst = derived_value.as_ref_id().expect("derived instance");
    let derived_id = pg
        .register_root(derived_inst, Some(base_id))
        .expect("register derived");
    (pg, base_id, derived_id)
}

fn export(pg: &PropertyGraphContainer, root: Uuid) -> serde_json::Value {
    let instance = pg.graph(root).expect("graph").root_instance();
    pg.nodes()
        .store()
        .export_json(&graft_core::Value::Ref(instance))
}

#[test]
fn base_changes_flow_into_derived() {
    let (mut pg, base_id, derived_id) =
        setup(json!({"name": "a", "tags": [1, 2, 3], "child": {"x": 1}}));

    let tags = pg.member_at(base_id, &["tags"]).expect("base tags");
    pg.add_item(base_id, tags, &Index::Empty, Value::Int(4))
        .expect("append to base");
    let child_x = pg.member_at(base_id, &["child", "x"]).expect("base child.x");
    pg.update_member(base_id, child_x, Value::Int(5), &Index::Empty)
        .expect("update base child");

    pg.reconcile(derived_id, &DefaultPolicy).expect("reconcile");
    assert_eq!(
        export(&pg, derived_id),
        json!({"name": "a", "tags": [1, 2, 3, 4], "child": {"x": 5}})
    );
}

#[test]
fn overrides_survive_reconciliation() {
    let (mut pg, base_id, derived_id) = setup(json!({"name": "a", "tags": [1, 2, 3]}));

    let derived_name = pg.member_at(derived_id, &["name"]).expect("derived name");
    pg.update_member(derived_id, derived_name, Value::Str("local".into()), &Index::Empty)
        .expect("override name");
    let derived_tags = pg.member_at(derived_id, &["tags"]).expect("derived tags");
    pg.update_member(derived_id, derived_tags, Value::Int(9), &Index::Num(0))
        .expect("override first tag");

    let base_name = pg.member_at(base_id, &["name"]).expect("base name");
    pg.update_member(base_id, base_name, Value::Str("renamed".into()), &Index::Empty)
        .expect("rename base");
    let base_tags = pg.member_at(base_id, &["tags"]).expect("base tags");
    pg.update_member(base_id, base_tags, Value::Int(100), &Index::Num(0))
        .expect("update base tag");
    pg.update_member(base_id, base_tags, Value::Int(200), &Index::Num(2))
        .expect("update base tag");

    pg.reconcile(derived_id, &DefaultPolicy).expect("reconcile");
    assert_eq!(
        export(&pg, derived_id),
        json!({"name": "local", "tags": [9, 2, 200]})
    );
}

#[test]
fn reconciliation_is_idempotent() {
    let (mut pg, base_id, derived_id) = setup(json!({"name": "a", "tags": [1, 2], "child": {"x": 1}}));

    let base_name = pg.member_at(base_id, &["name"]).expect("base name");
    pg.update_member(base_id, base_name, Value::Str("b".into()), &Index::Empty)
        .expect("rename base");
    let derived_x = pg
        .member_at(derived_id, &["child", "x"])
        .expect("derived child.x");
    pg.update_member(derived_id, derived_x, Value::Int(42), &Index::Empty)
        .expect("override child");

    pg.reconcile(derived_id, &DefaultPolicy).expect("first pass");
    let snapshot = export(&pg, derived_id);
    pg.reconcile(derived_id, &DefaultPolicy).expect("second pass");
    assert_eq!(export(&pg, derived_id), snapshot);
    assert_eq!(snapshot, json!({"name": "b", "tags": [1, 2], "child": {"x": 42}}));
}

#[test]
fn nested_object_replacement_is_pulled_in() {
    let (mut pg, base_id, derived_id) = setup(json!({"child": {"x": 1}}));

    let replacement = pg
        .nodes_mut()
        .store_mut()
        .insert_json(&json!({"x": 7, "y": 8}));
    let base_child = pg.member_at(base_id, &["child"]).expect("base child");
    pg.update_member(base_id, base_child, replacement, &Index::Empty)
        .expect("replace base child");

    pg.reconcile(derived_id, &DefaultPolicy).expect("reconcile");
    assert_eq!(export(&pg, derived_id), json!({"child": {"x": 7, "y": 8}}));
}

#[test]
fn reconcile_without_registered_base_is_a_no_op() {
    let mut pg = PropertyGraphContainer::new(NodeContainer::new(TypeRegistry::new()));
    let value = pg.nodes_mut().store_mut().insert_json(&json!({"a": 1}));
    let inst = value.as_ref_id().expect("instance");
    let root = pg
        .register_root(inst, Some(Uuid::new_v4()))
        .expect("register with absent base");

    pg.reconcile(root, &DefaultPolicy).expect("no-op reconcile");
    assert_eq!(export(&pg, root), json!({"a": 1}));
}
