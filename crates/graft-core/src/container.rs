//! Node construction and the read/write surface.
//!
//! The [`NodeContainer`] owns the store, the registry and every node built so
//! far. Reference-type instances map to exactly one node for the lifetime of
//! the container; value-semantic instances get one boxed node per owning
//! slot. References are refreshed lazily after every write, so a node graph
//! is always consistent with the values underneath it by the time a caller
//! reads it back.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::trace;
use uuid::Uuid;

use crate::error::GraphError;
use crate::index::Index;
use crate::item_ids::ItemId;
use crate::node::{BoxedNode, MemberNode, NodeId, NodeKind, NodeState, ObjectNode};
use crate::reference::{ObjectRef, Reference};
use crate::schema::{TypeRegistry, TypeShape};
use crate::value::{InstanceData, InstanceId, ObjectStore, Value};

enum DesiredRef {
    None,
    Object,
    Enumerable(Vec<Index>),
}

pub struct NodeContainer {
    store: ObjectStore,
    registry: TypeRegistry,
    nodes: Vec<NodeState>,
    by_instance: HashMap<InstanceId, NodeId>,
    in_flight: HashSet<InstanceId>,
}

impl NodeContainer {
    pub fn new(registry: TypeRegistry) -> Self {
        NodeContainer {
            store: ObjectStore::new(),
            registry,
            nodes: Vec::new(),
            by_instance: HashMap::new(),
            in_flight: HashSet::new(),
        }
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ObjectStore {
        &mut self.store
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    /// Drops every node; the store and registry are kept.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_instance.clear();
        self.in_flight.clear();
    }

    pub fn node(&self, id: NodeId) -> &NodeState {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeState {
        &mut self.nodes[id.index()]
    }

    /// The node already built for an instance, if any.
    pub fn get(&self, instance: InstanceId) -> Option<NodeId> {
        self.by_instance.get(&instance).copied()
    }

    /// Returns the node for an instance, building the subtree on first use.
    pub fn get_or_create(&mut self, instance: InstanceId) -> Result<NodeId, GraphError> {
        let mut visited = HashSet::new();
        self.get_or_create_inner(instance, &mut visited)
    }

    fn get_or_create_inner(
        &mut self,
        instance: InstanceId,
        visited: &mut HashSet<NodeId>,
    ) -> Result<NodeId, GraphError> {
        if let Some(existing) = self.by_instance.get(&instance) {
            return Ok(*existing);
        }
        if !self.in_flight.insert(instance) {
            return Err(GraphError::ReEntrantConstruction(instance));
        }
        let result = self.build_node(instance, visited);
        self.in_flight.remove(&instance);
        result
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeState {
            guid: Uuid::new_v4(),
            kind,
            reference: None,
        });
        id
    }

    fn build_node(
        &mut self,
        instance: InstanceId,
        visited: &mut HashSet<NodeId>,
    ) -> Result<NodeId, GraphError> {
        let inst = self
            .store
            .get(instance)
            .ok_or(GraphError::MissingInstance(instance))?;
        let type_name = inst.type_name.clone();
        let member_names: Vec<String> = match &inst.data {
            InstanceData::Object(m) => m.keys().cloned().collect(),
            _ => Vec::new(),
        };
        let boxed = self.registry.is_value_type(&type_name);

        let id = self.alloc(if boxed {
            NodeKind::Boxed(BoxedNode {
                instance,
                members: IndexMap::new(),
                owner: None,
            })
        } else {
            NodeKind::Object(ObjectNode {
                instance,
                members: IndexMap::new(),
            })
        });
        // Reference types are registered before members are built so
        // self-referential values resolve back to this node instead of
        // recursing forever. Boxed nodes are per-slot and never shared
        // through the instance map.
        if !boxed {
            self.by_instance.insert(instance, id);
        }
        trace!(node = ?id, instance = %instance, type_name = %type_name, "node built");

        if self.registry.is_identifiable(&type_name) {
            self.store.make_identifiable(instance)?;
        }

        let mut members = IndexMap::new();
        for name in member_names {
            let member_id = self.alloc(NodeKind::Member(MemberNode {
                owner: id,
                name: name.clone(),
            }));
            members.insert(name, member_id);
        }
        match &mut self.node_mut(id).kind {
            NodeKind::Object(n) => n.members = members,
            NodeKind::Boxed(n) => n.members = members,
            NodeKind::Member(_) => {}
        }

        self.update_refs_inner(id, visited)?;
        Ok(id)
    }

    pub fn member(&self, node: NodeId, name: &str) -> Result<NodeId, GraphError> {
        self.node(node)
            .member(name)
            .ok_or_else(|| GraphError::MissingMember { name: name.to_owned() })
    }

    /// Named member nodes of an object or boxed node, in declaration order.
    pub fn children(&self, node: NodeId) -> Vec<(String, NodeId)> {
        self.node(node)
            .members()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    }

    /// Re-resolves the references reachable from `node`: each slot is read
    /// back from the store and its edge retargeted when the value changed.
    pub fn update_references(&mut self, node: NodeId) -> Result<(), GraphError> {
        let mut visited = HashSet::new();
        self.update_refs_inner(node, &mut visited)
    }

    fn update_refs_inner(
        &mut self,
        node: NodeId,
        visited: &mut HashSet<NodeId>,
    ) -> Result<(), GraphError> {
        if !visited.insert(node) {
            return Ok(());
        }
        self.refresh_node_reference(node, visited)?;
        if self.node(node).reference.is_none() && self.node(node).is_object() {
            let children: Vec<NodeId> = self
                .node(node)
                .members()
                .map(|m| m.values().copied().collect())
                .unwrap_or_default();
            for child in children {
                self.update_refs_inner(child, visited)?;
            }
        }
        Ok(())
    }

    /// The collection instance a node's indexed slots address: the node's own
    /// instance for object/boxed nodes over collections, the referenced
    /// collection for member slots holding one.
    pub fn collection_of(&self, node: NodeId) -> Result<InstanceId, GraphError> {
        let state = self.node(node);
        let candidate = match &state.kind {
            NodeKind::Object(n) => Some(n.instance),
            NodeKind::Boxed(n) => Some(n.instance),
            NodeKind::Member(n) => {
                let owner_inst = self
                    .node(n.owner)
                    .instance()
                    .ok_or(GraphError::MissingNode(n.owner))?;
                self.store
                    .member(owner_inst, &n.name)
                    .and_then(Value::as_ref_id)
            }
        };
        match candidate {
            Some(id)
                if self
                    .store
                    .get(id)
                    .map(|i| i.data.is_collection())
                    .unwrap_or(false) =>
            {
                Ok(id)
            }
            _ => Err(GraphError::ShapeMismatch {
                expected: "a collection-valued node".into(),
                found: "a scalar-valued node".into(),
            }),
        }
    }

    /// The value a node presents: its instance reference for object nodes,
    /// the slot value for member nodes, the element for indexed reads.
    pub fn retrieve(&self, node: NodeId, index: &Index) -> Result<Value, GraphError> {
        let state = self.node(node);
        match (&state.kind, index) {
            (NodeKind::Object(n), Index::Empty) => Ok(Value::Ref(n.instance)),
            (NodeKind::Boxed(n), Index::Empty) => Ok(Value::Ref(n.instance)),
            (NodeKind::Object(n), _) => self.store.read_index(n.instance, index),
            (NodeKind::Boxed(n), _) => self.store.read_index(n.instance, index),
            (NodeKind::Member(n), _) => {
                let owner_inst = self
                    .node(n.owner)
                    .instance()
                    .ok_or(GraphError::MissingNode(n.owner))?;
                let value = self
                    .store
                    .member(owner_inst, &n.name)
                    .cloned()
                    .ok_or_else(|| GraphError::MissingMember {
                        name: n.name.clone(),
                    })?;
                if index.is_empty() {
                    Ok(value)
                } else {
                    let collection = value.as_ref_id().ok_or_else(|| GraphError::InvalidIndex {
                        index: index.clone(),
                    })?;
                    self.store.read_index(collection, index)
                }
            }
        }
    }

    /// Value-semantic instances are copied on assignment so every slot owns
    /// its box.
    fn coerce_assign(&mut self, value: Value) -> Value {
        if let Some(id) = value.as_ref_id() {
            let value_type = self
                .store
                .type_name(id)
                .map(|t| self.registry.is_value_type(t))
                .unwrap_or(false);
            if value_type {
                return self.store.deep_clone(&value);
            }
        }
        value
    }

    /// Writes a value into a node's slot, then refreshes the references the
    /// write may have invalidated. Whole-object replacement is not a node
    /// operation; object nodes only take indexed writes.
    pub fn update(&mut self, node: NodeId, value: Value, index: &Index) -> Result<(), GraphError> {
        enum Write {
            Indexed(InstanceId),
            Slot(InstanceId, String),
            Forward(NodeId, Index),
        }
        let value = self.coerce_assign(value);
        let write = match (&self.node(node).kind, index) {
            (NodeKind::Object(_), Index::Empty) => return Err(GraphError::UnsupportedMutation),
            (NodeKind::Object(n), _) => Write::Indexed(n.instance),
            (NodeKind::Boxed(n), Index::Empty) => {
                // Whole-box replacement flows through the owning slot so the
                // owner's reference rebinding sees it.
                let Some((owner, owner_index)) = n.owner.clone() else {
                    return Err(GraphError::UnsupportedMutation);
                };
                Write::Forward(owner, owner_index)
            }
            (NodeKind::Boxed(n), _) => Write::Indexed(n.instance),
            (NodeKind::Member(n), _) => {
                let owner_inst = self
                    .node(n.owner)
                    .instance()
                    .ok_or(GraphError::MissingNode(n.owner))?;
                if index.is_empty() {
                    Write::Slot(owner_inst, n.name.clone())
                } else {
                    let collection = self
                        .store
                        .member(owner_inst, &n.name)
                        .and_then(Value::as_ref_id)
                        .ok_or_else(|| GraphError::InvalidIndex {
                            index: index.clone(),
                        })?;
                    Write::Indexed(collection)
                }
            }
        };
        match write {
            Write::Indexed(instance) => self.store.write_index(instance, index, value)?,
            Write::Slot(instance, name) => self.store.set_member(instance, &name, value)?,
            Write::Forward(owner, owner_index) => return self.update(owner, value, &owner_index),
        }
        self.update_references(node)
    }

    /// Inserts into the collection behind `node`. Returns the item identity
    /// assigned to the new element, when the collection tracks them.
    pub fn add_item(
        &mut self,
        node: NodeId,
        index: &Index,
        value: Value,
    ) -> Result<Option<ItemId>, GraphError> {
        let value = self.coerce_assign(value);
        let collection = self.collection_of(node)?;
        let item = self.store.insert_index(collection, index, value)?;
        self.update_references(node)?;
        Ok(item)
    }

    /// Inserts an element that keeps an identity minted elsewhere.
    pub fn add_item_with_id(
        &mut self,
        node: NodeId,
        index: &Index,
        value: Value,
        item: ItemId,
    ) -> Result<(), GraphError> {
        let value = self.coerce_assign(value);
        let collection = self.collection_of(node)?;
        self.store.insert_index_with_id(collection, index, value, item)?;
        self.update_references(node)
    }

    pub fn remove_item(
        &mut self,
        node: NodeId,
        index: &Index,
    ) -> Result<(Value, Option<ItemId>), GraphError> {
        let collection = self.collection_of(node)?;
        let removed = self.store.remove_index(collection, index)?;
        self.update_references(node)?;
        Ok(removed)
    }

    pub fn move_item(&mut self, node: NodeId, from: usize, to: usize) -> Result<(), GraphError> {
        let collection = self.collection_of(node)?;
        self.store.move_index(collection, from, to)?;
        self.update_references(node)
    }

    fn desired_reference(&self, node: NodeId) -> DesiredRef {
        let state = self.node(node);
        match &state.kind {
            NodeKind::Object(n) => self.desired_for_instance(n.instance),
            NodeKind::Boxed(n) => self.desired_for_instance(n.instance),
            NodeKind::Member(n) => {
                let Some(owner_inst) = self.node(n.owner).instance() else {
                    return DesiredRef::None;
                };
                let Some(value) = self.store.member(owner_inst, &n.name) else {
                    return DesiredRef::None;
                };
                let Some(target) = value.as_ref_id() else {
                    return DesiredRef::None;
                };
                if !self.store.contains(target) {
                    // Dangling reference; the edge parks the value as orphan.
                    return DesiredRef::Object;
                }
                match self.registry.shape(value, &self.store) {
                    TypeShape::Primitive => DesiredRef::None,
                    TypeShape::Object => DesiredRef::Object,
                    TypeShape::Sequence | TypeShape::Map => self.enumerable_edges(target),
                }
            }
        }
    }

    fn desired_for_instance(&self, instance: InstanceId) -> DesiredRef {
        match self.store.get(instance).map(|i| &i.data) {
            Some(InstanceData::Sequence(_)) | Some(InstanceData::Map(_)) => {
                self.enumerable_edges(instance)
            }
            _ => DesiredRef::None,
        }
    }

    /// Edge set for a collection: one edge per element whose value is a
    /// non-primitive instance. A collection with no such elements carries no
    /// reference until one appears.
    fn enumerable_edges(&self, collection: InstanceId) -> DesiredRef {
        let Some(instance) = self.store.get(collection) else {
            return DesiredRef::None;
        };
        let entries: Vec<(Index, &Value)> = match &instance.data {
            InstanceData::Sequence(v) => v
                .iter()
                .enumerate()
                .map(|(i, x)| (Index::Num(i), x))
                .collect(),
            InstanceData::Map(m) => m
                .iter()
                .map(|(k, x)| (Index::Key(k.clone()), x))
                .collect(),
            InstanceData::Object(_) => return DesiredRef::None,
        };
        let indices: Vec<Index> = entries
            .into_iter()
            .filter(|(_, v)| match v.as_ref_id() {
                Some(id) if !self.store.contains(id) => true,
                Some(_) => self.registry.shape(v, &self.store) != TypeShape::Primitive,
                None => false,
            })
            .map(|(i, _)| i)
            .collect();
        if indices.is_empty() {
            DesiredRef::None
        } else {
            DesiredRef::Enumerable(indices)
        }
    }

    fn refresh_node_reference(
        &mut self,
        node: NodeId,
        visited: &mut HashSet<NodeId>,
    ) -> Result<(), GraphError> {
        // Any collection this node exposes keeps its item identity table in
        // sync, unless the type opts out of item identity.
        if let Ok(collection) = self.collection_of(node) {
            let tracked = self
                .store
                .type_name(collection)
                .map(|t| !self.registry.non_identifiable_items(t))
                .unwrap_or(false);
            if tracked {
                self.store.ensure_item_ids(collection)?;
            }
        }
        let desired = self.desired_reference(node);
        let previous = self.node_mut(node).reference.take();
        let refreshed = match desired {
            DesiredRef::None => None,
            DesiredRef::Object => {
                let mut edge = match previous {
                    Some(Reference::Object(e)) => e,
                    _ => ObjectRef::new(Index::Empty),
                };
                self.refresh_edge(node, &mut edge, visited)?;
                Some(Reference::Object(edge))
            }
            DesiredRef::Enumerable(indices) => {
                let old: Vec<ObjectRef> = match previous {
                    Some(Reference::Enumerable(v)) => v,
                    _ => Vec::new(),
                };
                let mut edges = Vec::with_capacity(indices.len());
                for index in indices {
                    let mut edge = old
                        .iter()
                        .find(|e| e.index == index)
                        .cloned()
                        .unwrap_or_else(|| ObjectRef::new(index.clone()));
                    edge.index = index;
                    self.refresh_edge(node, &mut edge, visited)?;
                    edges.push(edge);
                }
                Some(Reference::Enumerable(edges))
            }
        };
        self.node_mut(node).reference = refreshed;
        Ok(())
    }

    fn refresh_edge(
        &mut self,
        node: NodeId,
        edge: &mut ObjectRef,
        visited: &mut HashSet<NodeId>,
    ) -> Result<(), GraphError> {
        let value = self.retrieve(node, &edge.index)?;
        let Some(target_inst) = value.as_ref_id() else {
            edge.target = None;
            edge.target_guid = None;
            edge.orphan = None;
            return Ok(());
        };
        if !self.store.contains(target_inst) {
            edge.target = None;
            edge.target_guid = None;
            edge.orphan = Some(value);
            return Ok(());
        }

        if let Some(current) = edge.target {
            if self.node(current).instance() == Some(target_inst) {
                return Ok(());
            }
        }
        edge.orphan = None;

        let type_name = self
            .store
            .type_name(target_inst)
            .map(str::to_owned)
            .unwrap_or_default();
        let target = if self.registry.is_value_type(&type_name) {
            self.bind_box(node, edge, target_inst, &type_name, visited)?
        } else {
            self.get_or_create_inner(target_inst, visited)?
        };
        edge.target = Some(target);
        edge.target_guid = Some(self.node(target).guid);
        Ok(())
    }

    /// Resolves a value-semantic slot: rebind the slot's existing boxed node
    /// to the new instance when the type matches (the node keeps its guid),
    /// otherwise build a fresh box. Either way the box learns its owner slot.
    fn bind_box(
        &mut self,
        owner: NodeId,
        edge: &ObjectRef,
        instance: InstanceId,
        type_name: &str,
        visited: &mut HashSet<NodeId>,
    ) -> Result<NodeId, GraphError> {
        let reuse = edge.target.filter(|t| {
            matches!(&self.node(*t).kind, NodeKind::Boxed(b)
                if self.store.type_name(b.instance) == Some(type_name))
        });
        let target = match reuse {
            Some(boxed) => {
                if let NodeKind::Boxed(b) = &mut self.node_mut(boxed).kind {
                    b.instance = instance;
                }
                trace!(node = ?boxed, instance = %instance, "boxed node rebound");
                visited.remove(&boxed);
                self.update_refs_inner(boxed, visited)?;
                boxed
            }
            None => self.get_or_create_inner(instance, visited)?,
        };
        if let NodeKind::Boxed(b) = &mut self.node_mut(target).kind {
            b.owner = Some((owner, edge.index.clone()));
        }
        Ok(target)
    }
}
