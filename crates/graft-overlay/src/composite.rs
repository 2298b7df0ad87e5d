//! Composite hierarchies: parts owned by designs.
//!
//! A composite root owns a collection of design records, each wrapping one
//! part object plus a base-linkage record naming the base graph, the base
//! part and the instantiation the design belongs to. The policy here
//! redirects linking and cloning through that record: a derived part links to
//! the part its design names as base, a cloned reference to a base part lands
//! on the local part of the same instantiation, and parts encountered outside
//! their owning design are treated as references rather than content.

use tracing::debug;
use uuid::Uuid;

use graft_core::{InstanceData, InstanceId, NodeContainer, NodeId, Value};

use crate::error::OverlayError;
use crate::policy::{GraphPolicy, PolicyContext};

/// Where the composite structure lives in the value model.
#[derive(Debug, Clone)]
pub struct CompositeSchema {
    /// Type name of part objects.
    pub part_type: String,
    /// Type name of design records.
    pub design_type: String,
    /// Member path from the root object to the designs collection.
    pub parts_path: Vec<String>,
    /// Design member holding the part object.
    pub part_member: String,
    /// Design member holding the base-linkage record.
    pub base_member: String,
    /// Type name given to base-linkage records created by the policy.
    pub record_type: String,
    /// Base-linkage member naming the base graph root.
    pub base_root_member: String,
    /// Base-linkage member naming the base part.
    pub base_part_member: String,
    /// Base-linkage member naming the instantiation.
    pub instance_member: String,
}

impl CompositeSchema {
    /// The designs collection of a root instance, through `parts_path`.
    fn designs_of(&self, nodes: &NodeContainer, root: InstanceId) -> Option<InstanceId> {
        let mut current = root;
        for name in &self.parts_path {
            current = nodes.store().member(current, name)?.as_ref_id()?;
        }
        nodes
            .store()
            .get(current)
            .filter(|i| i.data.is_collection())
            .map(|_| current)
    }

    fn design_values(&self, nodes: &NodeContainer, designs: InstanceId) -> Vec<InstanceId> {
        match nodes.store().get(designs).map(|i| &i.data) {
            Some(InstanceData::Sequence(v)) => v.iter().filter_map(Value::as_ref_id).collect(),
            Some(InstanceData::Map(m)) => m.values().filter_map(Value::as_ref_id).collect(),
            _ => Vec::new(),
        }
    }

    fn part_of(&self, nodes: &NodeContainer, design: InstanceId) -> Option<InstanceId> {
        nodes
            .store()
            .member(design, &self.part_member)?
            .as_ref_id()
    }

    fn base_record(&self, nodes: &NodeContainer, design: InstanceId) -> Option<BaseRecord> {
        let record = nodes
            .store()
            .member(design, &self.base_member)?
            .as_ref_id()?;
        Some(BaseRecord {
            root: nodes
                .store()
                .member(record, &self.base_root_member)?
                .as_id()?,
            part: nodes
                .store()
                .member(record, &self.base_part_member)?
                .as_id()?,
            instance: nodes
                .store()
                .member(record, &self.instance_member)
                .and_then(Value::as_id),
        })
    }

    /// The design of a root whose part carries the given stable identifier.
    fn design_by_part(
        &self,
        nodes: &NodeContainer,
        root: InstanceId,
        part_id: Uuid,
    ) -> Option<InstanceId> {
        let designs = self.designs_of(nodes, root)?;
        self.design_values(nodes, designs).into_iter().find(|d| {
            self.part_of(nodes, *d)
                .and_then(|p| nodes.store().stable_id(p))
                == Some(part_id)
        })
    }

    /// The design of a root whose base record names the given base part and
    /// instantiation.
    fn design_by_base(
        &self,
        nodes: &NodeContainer,
        root: InstanceId,
        base_part: Uuid,
        instance: Option<Uuid>,
    ) -> Option<InstanceId> {
        let designs = self.designs_of(nodes, root)?;
        self.design_values(nodes, designs).into_iter().find(|d| {
            self.base_record(nodes, *d).is_some_and(|record| {
                record.part == base_part
                    && (instance.is_none() || record.instance == instance)
            })
        })
    }

    fn is_part(&self, nodes: &NodeContainer, node: NodeId) -> Option<InstanceId> {
        let instance = nodes.node(node).instance()?;
        (nodes.store().type_name(instance) == Some(self.part_type.as_str())).then_some(instance)
    }

    fn is_design(&self, nodes: &NodeContainer, node: NodeId) -> Option<InstanceId> {
        let instance = nodes.node(node).instance()?;
        (nodes.store().type_name(instance) == Some(self.design_type.as_str())).then_some(instance)
    }
}

struct BaseRecord {
    root: Uuid,
    part: Uuid,
    instance: Option<Uuid>,
}

pub struct CompositePolicy {
    schema: CompositeSchema,
}

impl CompositePolicy {
    pub fn new(schema: CompositeSchema) -> Self {
        CompositePolicy { schema }
    }

    pub fn schema(&self) -> &CompositeSchema {
        &self.schema
    }

    /// The base part instance a derived part should pair with, through its
    /// design's base record. Any missing link resolves to `None`.
    fn base_part_of(&self, cx: &PolicyContext<'_>, part: InstanceId) -> Option<InstanceId> {
        let schema = &self.schema;
        let part_id = cx.nodes.store().stable_id(part)?;
        let graph = cx.graph()?;
        let design = schema.design_by_part(cx.nodes, graph.root_instance(), part_id)?;
        let record = schema.base_record(cx.nodes, design)?;
        let base_graph = cx.graphs.get(&record.root)?;
        let base_design =
            schema.design_by_part(cx.nodes, base_graph.root_instance(), record.part)?;
        schema.part_of(cx.nodes, base_design)
    }
}

impl GraphPolicy for CompositePolicy {
    fn find_target(
        &self,
        cx: &mut PolicyContext<'_>,
        source: NodeId,
        default: Option<NodeId>,
    ) -> Result<Option<NodeId>, OverlayError> {
        let Some(part) = self.schema.is_part(cx.nodes, source) else {
            return Ok(default);
        };
        match self.base_part_of(cx, part) {
            Some(instance) => {
                // The node may not be built yet on the base side.
                let node = cx.nodes.get_or_create(instance)?;
                debug!(source = ?source, target = ?node, "part redirected to its base part");
                Ok(Some(node))
            }
            None => Ok(default),
        }
    }

    fn clone_value_from_base(
        &self,
        cx: &mut PolicyContext<'_>,
        value: &Value,
        owner: Option<InstanceId>,
    ) -> Result<Value, OverlayError> {
        let schema = &self.schema;
        let Some(source) = value.as_ref_id() else {
            return Ok(cx.nodes.store_mut().deep_clone(value));
        };
        let type_name = cx.nodes.store().type_name(source).map(str::to_owned);

        if type_name.as_deref() == Some(schema.part_type.as_str()) {
            // A reference to a base part lands on this instantiation's local
            // part for it, or null when the part was removed here.
            let base_part_id = cx.nodes.store().stable_id(source);
            let instance = owner
                .and_then(|o| schema.base_record(cx.nodes, o))
                .and_then(|record| record.instance);
            let local = match (base_part_id, cx.graph()) {
                (Some(base_part_id), Some(graph)) => schema
                    .design_by_base(cx.nodes, graph.root_instance(), base_part_id, instance)
                    .and_then(|design| schema.part_of(cx.nodes, design)),
                _ => None,
            };
            return Ok(local.map(Value::Ref).unwrap_or(Value::Null));
        }

        if type_name.as_deref() == Some(schema.design_type.as_str()) {
            // A whole design coming in from the base becomes a new
            // instantiated design: fresh stable identifiers, base record
            // pointing back at the base part.
            let base_part_id = schema
                .part_of(cx.nodes, source)
                .and_then(|p| cx.nodes.store().stable_id(p));
            let base_root = cx.graph().and_then(|g| g.base_root());
            let instance = owner
                .and_then(|o| schema.base_record(cx.nodes, o))
                .and_then(|record| record.instance)
                .unwrap_or_else(Uuid::new_v4);

            let cloned = cx.nodes.store_mut().derive_clone(value);
            if let (Some(design), Some(base_part_id), Some(base_root)) =
                (cloned.as_ref_id(), base_part_id, base_root)
            {
                let record_value = cx
                    .nodes
                    .store()
                    .member(design, &schema.base_member)
                    .cloned();
                let store = cx.nodes.store_mut();
                let record = match record_value.and_then(|v| v.as_ref_id()) {
                    Some(record) => record,
                    None => {
                        let record = store.new_object(&schema.record_type, Default::default());
                        store.set_member(design, &schema.base_member, Value::Ref(record))?;
                        record
                    }
                };
                store.set_member(record, &schema.base_root_member, Value::Id(base_root))?;
                store.set_member(record, &schema.base_part_member, Value::Id(base_part_id))?;
                store.set_member(record, &schema.instance_member, Value::Id(instance))?;
            }
            return Ok(cloned);
        }

        Ok(cx.nodes.store_mut().deep_clone(value))
    }

    fn is_referenced_part(
        &self,
        cx: &PolicyContext<'_>,
        member: Option<NodeId>,
        target: NodeId,
    ) -> bool {
        if self.schema.is_part(cx.nodes, target).is_none() {
            return false;
        }
        let Some(member) = member else {
            return false;
        };
        // A part is content only inside its design; anywhere else it is a
        // cross-reference.
        let owner = match &cx.nodes.node(member).kind {
            graft_core::NodeKind::Member(m) => m.owner,
            _ => return false,
        };
        let owned = self.schema.is_design(cx.nodes, owner).is_some()
            && cx.nodes.node(member).member_name() == Some(self.schema.part_member.as_str());
        !owned
    }

    fn should_visit(
        &self,
        cx: &PolicyContext<'_>,
        member: Option<NodeId>,
        target: NodeId,
    ) -> bool {
        !self.is_referenced_part(cx, member, target)
    }

    fn instantiation_owner(&self, cx: &PolicyContext<'_>, node: NodeId) -> Option<InstanceId> {
        self.schema.is_design(cx.nodes, node)
    }
}
