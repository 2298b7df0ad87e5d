use graft_core::{Index, InstanceData, InstanceId, NodeContainer, ObjectStore, TypeRegistry, Value};
use graft_overlay::{CompositePolicy, CompositeSchema, PropertyGraphContainer};
use indexmap::IndexMap;
use uuid::Uuid;

fn schema() -> CompositeSchema {
    CompositeSchema {
        part_type: "part".into(),
        design_type: "part-design".into(),
        parts_path: vec!["parts".into()],
        part_member: "part".into(),
        base_member: "base".into(),
        record_type: "base-record".into(),
        base_root_member: "base_root".into(),
        base_part_member: "base_part".into(),
        instance_member: "instance".into(),
    }
}

fn new_part(store: &mut ObjectStore, name: &str, next: Value) -> InstanceId {
    let mut members = IndexMap::new();
    members.insert("name".to_owned(), Value::Str(name.to_owned()));
    members.insert("next".to_owned(), next);
    let part = store.new_object("part", members);
    store.make_identifiable(part).expect("part id");
    part
}

fn new_design(store: &mut ObjectStore, part: InstanceId) -> InstanceId {
    let mut members = IndexMap::new();
    members.insert("part".to_owned(), Value::Ref(part));
    members.insert("base".to_owned(), Value::Null);
    store.new_object("part-design", members)
}

/// Two-part base hierarchy: p1 and p2, p1.next initially null.
fn build_base(pg: &mut PropertyGraphContainer) -> (Uuid, InstanceId) {
    let store = pg.nodes_mut().store_mut();
    let p1 = new_part(store, "first", Value::Null);
    let p2 = new_part(store, "second", Value::Null);
    let d1 = new_design(store, p1);
    let d2 = new_design(store, p2);
    let parts = store.new_sequence("design-list", vec![Value::Ref(d1), Value::Ref(d2)]);
    let root = {
        let mut members = IndexMap::new();
        members.insert("parts".to_owned(), Value::Ref(parts));
        store.new_object("composite", members)
    };
    let base_id = pg.register_root(root, None).expect("register base");
    (base_id, root)
}

fn designs(pg: &PropertyGraphContainer, root: InstanceId) -> Vec<InstanceId> {
    let store = pg.nodes().store();
    let parts = store
        .member(root, "parts")
        .and_then(Value::as_ref_id)
        .expect("parts collection");
    match &store.get(parts).expect("parts instance").data {
        InstanceData::Sequence(v) => v.iter().filter_map(Value::as_ref_id).collect(),
        _ => panic!("parts is a sequence"),
    }
}

fn part_of(pg: &PropertyGraphContainer, design: InstanceId) -> InstanceId {
    pg.nodes()
        .store()
        .member(design, "part")
        .and_then(Value::as_ref_id)
        .expect("design part")
}

/// Clones the base hierarchy into a new instantiation and wires each design's
/// base record to its base counterpart.
fn instantiate(
    pg: &mut PropertyGraphContainer,
    base_id: Uuid,
    base_root: InstanceId,
    instance_id: Uuid,
) -> (Uuid, InstanceId) {
    let derived_value = pg
        .nodes_mut()
        .store_mut()
        .derive_clone(&Value::Ref(base_root));
    let derived_root = derived_value.as_ref_id().expect("derived root");

    let base_designs = designs(pg, base_root);
    let derived_designs = designs(pg, derived_root);
    for (bd, dd) in base_designs.iter().zip(derived_designs.iter()) {
        let base_part = part_of(pg, *bd);
        let base_part_id = pg
            .nodes()
            .store()
            .stable_id(base_part)
            .expect("base part id");
        let store = pg.nodes_mut().store_mut();
        let mut members = IndexMap::new();
        members.insert("base_root".to_owned(), Value::Id(base_id));
        members.insert("base_part".to_owned(), Value::Id(base_part_id));
        members.insert("instance".to_owned(), Value::Id(instance_id));
        let record = store.new_object("base-record", members);
        store
            .set_member(*dd, "base", Value::Ref(record))
            .expect("wire base record");
    }
    let derived_id = pg
        .register_root(derived_root, Some(base_id))
        .expect("register instantiation");
    (derived_id, derived_root)
}

fn part_name(pg: &PropertyGraphContainer, part: InstanceId) -> Value {
    pg.nodes()
        .store()
        .member(part, "name")
        .cloned()
        .expect("part name")
}

#[test]
fn base_part_changes_reach_each_instantiation() {
    let mut pg = PropertyGraphContainer::new(NodeContainer::new(TypeRegistry::new()));
    let (base_id, base_root) = build_base(&mut pg);
    let (i1, root1) = instantiate(&mut pg, base_id, base_root, Uuid::new_v4());
    let (i2, root2) = instantiate(&mut pg, base_id, base_root, Uuid::new_v4());

    let p1 = part_of(&pg, designs(&pg, base_root)[0]);
    let node = pg.nodes_mut().get_or_create(p1).expect("base part node");
    let name = pg.nodes().member(node, "name").expect("name member");
    pg.update_member(base_id, name, Value::Str("renamed".into()), &Index::Empty)
        .expect("rename base part");

    let policy = CompositePolicy::new(schema());
    pg.reconcile(i1, &policy).expect("reconcile first");
    pg.reconcile(i2, &policy).expect("reconcile second");

    let local1 = part_of(&pg, designs(&pg, root1)[0]);
    let local2 = part_of(&pg, designs(&pg, root2)[0]);
    assert_ne!(local1, p1);
    assert_ne!(local1, local2);
    assert_eq!(part_name(&pg, local1), Value::Str("renamed".into()));
    assert_eq!(part_name(&pg, local2), Value::Str("renamed".into()));
}

#[test]
fn overridden_instantiation_keeps_its_name() {
    let mut pg = PropertyGraphContainer::new(NodeContainer::new(TypeRegistry::new()));
    let (base_id, base_root) = build_base(&mut pg);
    let (i1, root1) = instantiate(&mut pg, base_id, base_root, Uuid::new_v4());
    let (i2, root2) = instantiate(&mut pg, base_id, base_root, Uuid::new_v4());

    let local2 = part_of(&pg, designs(&pg, root2)[0]);
    let node2 = pg.nodes_mut().get_or_create(local2).expect("local part node");
    let name2 = pg.nodes().member(node2, "name").expect("name member");
    pg.update_member(i2, name2, Value::Str("custom".into()), &Index::Empty)
        .expect("override in second instantiation");

    let p1 = part_of(&pg, designs(&pg, base_root)[0]);
    let base_node = pg.nodes_mut().get_or_create(p1).expect("base part node");
    let base_name = pg.nodes().member(base_node, "name").expect("name member");
    pg.update_member(base_id, base_name, Value::Str("renamed".into()), &Index::Empty)
        .expect("rename base part");

    let policy = CompositePolicy::new(schema());
    pg.reconcile(i1, &policy).expect("reconcile first");
    pg.reconcile(i2, &policy).expect("reconcile second");

    let local1 = part_of(&pg, designs(&pg, root1)[0]);
    assert_eq!(part_name(&pg, local1), Value::Str("renamed".into()));
    assert_eq!(part_name(&pg, local2), Value::Str("custom".into()));
}

#[test]
fn part_references_land_on_local_parts() {
    let mut pg = PropertyGraphContainer::new(NodeContainer::new(TypeRegistry::new()));
    let (base_id, base_root) = build_base(&mut pg);
    let (i1, root1) = instantiate(&mut pg, base_id, base_root, Uuid::new_v4());

    let p1 = part_of(&pg, designs(&pg, base_root)[0]);
    let p2 = part_of(&pg, designs(&pg, base_root)[1]);
    let node = pg.nodes_mut().get_or_create(p1).expect("base part node");
    let next = pg.nodes().member(node, "next").expect("next member");
    pg.update_member(base_id, next, Value::Ref(p2), &Index::Empty)
        .expect("base reference between parts");

    pg.reconcile(i1, &CompositePolicy::new(schema()))
        .expect("reconcile");

    let local1 = part_of(&pg, designs(&pg, root1)[0]);
    let local2 = part_of(&pg, designs(&pg, root1)[1]);
    assert_eq!(
        pg.nodes().store().member(local1, "next").cloned(),
        Some(Value::Ref(local2))
    );
}

#[test]
fn reference_to_a_part_removed_locally_becomes_null() {
    let mut pg = PropertyGraphContainer::new(NodeContainer::new(TypeRegistry::new()));
    let (base_id, base_root) = build_base(&mut pg);
    let (i1, root1) = instantiate(&mut pg, base_id, base_root, Uuid::new_v4());

    let parts1 = pg.member_at(i1, &["parts"]).expect("derived parts");
    pg.remove_item(i1, parts1, &Index::Num(1))
        .expect("remove second design locally");

    let p1 = part_of(&pg, designs(&pg, base_root)[0]);
    let p2 = part_of(&pg, designs(&pg, base_root)[1]);
    let node = pg.nodes_mut().get_or_create(p1).expect("base part node");
    let next = pg.nodes().member(node, "next").expect("next member");
    pg.update_member(base_id, next, Value::Ref(p2), &Index::Empty)
        .expect("base reference between parts");

    pg.reconcile(i1, &CompositePolicy::new(schema()))
        .expect("reconcile");

    assert_eq!(designs(&pg, root1).len(), 1);
    let local1 = part_of(&pg, designs(&pg, root1)[0]);
    assert_eq!(
        pg.nodes().store().member(local1, "next").cloned(),
        Some(Value::Null)
    );
}

#[test]
fn new_base_parts_are_instantiated_with_fresh_identity() {
    let mut pg = PropertyGraphContainer::new(NodeContainer::new(TypeRegistry::new()));
    let (base_id, base_root) = build_base(&mut pg);
    let (i1, root1) = instantiate(&mut pg, base_id, base_root, Uuid::new_v4());

    let (p3, d3) = {
        let store = pg.nodes_mut().store_mut();
        let p3 = new_part(store, "third", Value::Null);
        let d3 = new_design(store, p3);
        (p3, d3)
    };
    let base_parts = pg.member_at(base_id, &["parts"]).expect("base parts");
    pg.add_item(base_id, base_parts, &Index::Empty, Value::Ref(d3))
        .expect("grow the base");

    pg.reconcile(i1, &CompositePolicy::new(schema()))
        .expect("reconcile");

    let derived_designs = designs(&pg, root1);
    assert_eq!(derived_designs.len(), 3);
    let new_design_inst = derived_designs[2];
    let new_part_inst = part_of(&pg, new_design_inst);
    assert_eq!(part_name(&pg, new_part_inst), Value::Str("third".into()));

    let p3_id = pg.nodes().store().stable_id(p3).expect("base part id");
    let local_id = pg
        .nodes()
        .store()
        .stable_id(new_part_inst)
        .expect("local part id");
    assert_ne!(local_id, p3_id);

    let record = pg
        .nodes()
        .store()
        .member(new_design_inst, "base")
        .and_then(Value::as_ref_id)
        .expect("base record written");
    assert_eq!(
        pg.nodes().store().member(record, "base_part").cloned(),
        Some(Value::Id(p3_id))
    );
    assert_eq!(
        pg.nodes().store().member(record, "base_root").cloned(),
        Some(Value::Id(base_id))
    );
}
