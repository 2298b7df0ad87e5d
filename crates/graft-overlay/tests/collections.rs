use graft_core::{Index, NodeContainer, TypeRegistry, Value};
use graft_overlay::{DefaultPolicy, PropertyGraphContainer};
use serde_json::json;
use uuid::Uuid;

fn setup_with(
    registry: TypeRegistry,
    base: serde_json::Value,
) -> (PropertyGraphContainer, Uuid, Uuid) {
    let mut pg = PropertyGraphContainer::new(NodeContainer::new(registry));
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

fn setup(base: serde_json::Value) -> (PropertyGraphContainer, Uuid, Uuid) {
    setup_with(TypeRegistry::new(), base)
}

fn export(pg: &PropertyGraphContainer, root: Uuid) -> serde_json::Value {
    let instance = pg.graph(root).expect("graph").root_instance();
    pg.nodes().store().export_json(&Value::Ref(instance))
}

#[test]
fn locally_deleted_items_stay_deleted() {
    let (mut pg, _base_id, derived_id) = setup(json!({"tags": [1, 2, 3]}));

    let tags = pg.member_at(derived_id, &["tags"]).expect("derived tags");
    pg.remove_item(derived_id, tags, &Index::Num(1))
        .expect("delete inherited item");
    assert_eq!(export(&pg, derived_id), json!({"tags": [1, 3]}));

    pg.reconcile(derived_id, &DefaultPolicy).expect("reconcile");
    assert_eq!(export(&pg, derived_id), json!({"tags": [1, 3]}));
}

#[test]
fn base_removal_drops_inherited_items_but_not_local_ones() {
    let (mut pg, base_id, derived_id) = setup(json!({"tags": [1, 2, 3]}));

    let derived_tags = pg.member_at(derived_id, &["tags"]).expect("derived tags");
    pg.add_item(derived_id, derived_tags, &Index::Empty, Value::Int(99))
        .expect("append local item");

    let base_tags = pg.member_at(base_id, &["tags"]).expect("base tags");
    pg.remove_item(base_id, base_tags, &Index::Num(0))
        .expect("remove from base");

    pg.reconcile(derived_id, &DefaultPolicy).expect("reconcile");
    assert_eq!(export(&pg, derived_id), json!({"tags": [2, 3, 99]}));
}

#[test]
fn map_key_collision_marks_base_item_deleted() {
    let (mut pg, base_id, derived_id) = setup(json!({"settings": {"a": 1}}));
    // Object members and map entries are distinct shapes; rebuild the member
    // as a map on both sides.
    let base_map = pg
        .nodes_mut()
        .store_mut()
        .insert_json_map("settings-map", &json!({"a": 1}));
    let base_member = pg.member_at(base_id, &["settings"]).expect("base settings");
    pg.update_member(base_id, base_member, base_map, &Index::Empty)
        .expect("base map");
    let derived_map = pg
        .nodes_mut()
        .store_mut()
        .insert_json_map("settings-map", &json!({"a": 1}));
    let derived_member = pg
        .member_at(derived_id, &["settings"])
        .expect("derived settings");
    pg.update_member(derived_id, derived_member, derived_map, &Index::Empty)
        .expect("derived map");
    // The replacement marked the member overridden; the collision scenario
    // needs it inherited again.
    pg.graph_mut(derived_id)
        .expect("derived graph")
        .set_content_override(derived_member, graft_overlay::OverrideKind::Base);

    pg.add_item(
        derived_id,
        derived_member,
        &Index::Key("b".into()),
        Value::Int(10),
    )
    .expect("local b");
    pg.add_item(base_id, base_member, &Index::Key("b".into()), Value::Int(5))
        .expect("base b");

    pg.reconcile(derived_id, &DefaultPolicy).expect("reconcile");
    // The local item wins the key; the base item is remembered as deleted so
    // the next pass does not retry it.
    assert_eq!(
        export(&pg, derived_id),
        json!({"settings": {"a": 1, "b": 10}})
    );
    pg.reconcile(derived_id, &DefaultPolicy).expect("second pass");
    assert_eq!(
        export(&pg, derived_id),
        json!({"settings": {"a": 1, "b": 10}})
    );
}

#[test]
fn non_identifiable_collections_keep_local_content() {
    let mut registry = TypeRegistry::new();
    registry.register_non_identifiable_items("raw-seq");
    let mut pg = PropertyGraphContainer::new(NodeContainer::new(registry));

    let base_items = pg
        .nodes_mut()
        .store_mut()
        .new_sequence("raw-seq", vec![Value::Int(1), Value::Int(2)]);
    let base_inst = {
        let mut members = indexmap::IndexMap::new();
        members.insert("data".to_owned(), Value::Ref(base_items));
        pg.nodes_mut().store_mut().new_object("holder", members)
    };
    let base_id = pg.register_root(base_inst, None).expect("register base");

    let derived_value = pg
        .nodes_mut()
        .store_mut()
        .derive_clone(&Value::Ref(base_inst));
    let derived_inst = derived_value.as_ref_id().expect("derived instance");
    let derived_id = pg
        .register_root(derived_inst, Some(base_id))
        .expect("register derived");

    let base_data = pg.member_at(base_id, &["data"]).expect("base data");
    pg.add_item(base_id, base_data, &Index::Empty, Value::Int(3))
        .expect("append to base");

    pg.reconcile(derived_id, &DefaultPolicy).expect("reconcile");
    assert_eq!(export(&pg, derived_id), json!({"data": [1, 2]}));
}

#[test]
fn base_reorder_does_not_duplicate_items() {
    let (mut pg, base_id, derived_id) = setup(json!({"tags": [1, 2, 3]}));

    let base_tags = pg.member_at(base_id, &["tags"]).expect("base tags");
    pg.move_item(base_id, base_tags, 0, 2).expect("reorder base");

    pg.reconcile(derived_id, &DefaultPolicy).expect("reconcile");
    let tags = export(&pg, derived_id)["tags"].clone();
    let mut sorted: Vec<i64> = tags
        .as_array()
        .expect("array")
        .iter()
        .map(|v| v.as_i64().expect("int"))
        .collect();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 2, 3]);
}
