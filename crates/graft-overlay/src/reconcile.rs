//! Reconciliation: pulling base changes into a derived graph.
//!
//! The pass walks every linked, non-overridden slot of the derived graph and
//! brings it back in line with its base counterpart. Overridden content and
//! overridden items are left untouched, deleted items stay deleted, and a
//! clone failure is isolated to its subtree rather than aborting the pass.
//! Running the pass twice with no intervening change is a no-op.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};
use uuid::Uuid;

use graft_core::{
    Index, InstanceId, ItemId, NodeContainer, NodeId, TypeShape, Value,
};

use crate::error::OverlayError;
use crate::overrides::{OverrideKind, OverrideMap};
use crate::policy::{GraphPolicy, PolicyContext};
use crate::property_graph::PropertyGraph;

pub(crate) struct Reconciler<'a> {
    nodes: &'a mut NodeContainer,
    graphs: &'a HashMap<Uuid, PropertyGraph>,
    policy: &'a dyn GraphPolicy,
    root: Uuid,
    links: &'a HashMap<NodeId, NodeId>,
    overrides: &'a OverrideMap,
    visited: HashSet<NodeId>,
    owners: Vec<InstanceId>,
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(
        nodes: &'a mut NodeContainer,
        graphs: &'a HashMap<Uuid, PropertyGraph>,
        policy: &'a dyn GraphPolicy,
        root: Uuid,
        links: &'a HashMap<NodeId, NodeId>,
        overrides: &'a OverrideMap,
    ) -> Self {
        Reconciler {
            nodes,
            graphs,
            policy,
            root,
            links,
            overrides,
            visited: HashSet::new(),
            owners: Vec::new(),
        }
    }

    pub(crate) fn run(mut self, derived_root: NodeId) -> Result<(), OverlayError> {
        self.visit_object(derived_root)?;
        debug!(root = %self.root, "reconciliation pass done");
        Ok(())
    }

    fn cx_owner(&self) -> Option<InstanceId> {
        self.owners.last().copied()
    }

    fn visit_object(&mut self, node: NodeId) -> Result<(), OverlayError> {
        if !self.visited.insert(node) {
            return Ok(());
        }
        let policy = self.policy;
        let owner = {
            let cx = PolicyContext {
                nodes: &mut *self.nodes,
                graphs: self.graphs,
                root: self.root,
            };
            policy.instantiation_owner(&cx, node)
        };
        if let Some(owner) = owner {
            self.owners.push(owner);
        }

        if let Some(base) = self.links.get(&node).copied() {
            if self.nodes.collection_of(node).is_ok() {
                self.reconcile_collection(node, base)?;
            }
        }
        for (_, member) in self.nodes.children(node) {
            self.reconcile_member(member)?;
        }

        if owner.is_some() {
            self.owners.pop();
        }
        Ok(())
    }

    fn reconcile_member(&mut self, member: NodeId) -> Result<(), OverlayError> {
        let Some(base) = self.links.get(&member).copied() else {
            return Ok(());
        };
        if self.overrides.content(member) == OverrideKind::New {
            return Ok(());
        }

        let base_value = self.nodes.retrieve(base, &Index::Empty)?;
        let derived_value = self.nodes.retrieve(member, &Index::Empty)?;
        let base_shape = self.nodes.registry().shape(&base_value, self.nodes.store());
        let derived_shape = self
            .nodes
            .registry()
            .shape(&derived_value, self.nodes.store());

        match base_shape {
            TypeShape::Primitive => {
                if derived_shape != TypeShape::Primitive {
                    // Shape divergence on a non-overridden slot is kept as a
                    // local decision; it is not an error.
                    return Ok(());
                }
                if derived_value != base_value {
                    self.nodes.update(member, base_value, &Index::Empty)?;
                }
            }
            TypeShape::Object => {
                self.reconcile_object_slot(member, base, &base_value, &derived_value)?;
            }
            TypeShape::Sequence | TypeShape::Map => {
                if derived_shape == base_shape {
                    self.reconcile_collection(member, base)?;
                } else if matches!(derived_value, Value::Null) {
                    self.pull_from_base(member, &Index::Empty, &base_value)?;
                }
            }
        }
        Ok(())
    }

    fn reconcile_object_slot(
        &mut self,
        member: NodeId,
        base: NodeId,
        base_value: &Value,
        derived_value: &Value,
    ) -> Result<(), OverlayError> {
        let base_target = self
            .nodes
            .node(base)
            .reference
            .as_ref()
            .and_then(|r| r.find(&Index::Empty))
            .and_then(|e| e.target);
        let derived_target = self
            .nodes
            .node(member)
            .reference
            .as_ref()
            .and_then(|r| r.find(&Index::Empty))
            .and_then(|e| e.target);

        match (derived_target, base_target) {
            (Some(dt), Some(bt)) if self.links.get(&dt) == Some(&bt) => {
                if !self.covers_base_members(dt, bt) {
                    // The base object grew members the derived clone never
                    // had; member-wise descent cannot introduce them.
                    self.pull_from_base(member, &Index::Empty, base_value)?;
                    return Ok(());
                }
                let descend = {
                    let cx = PolicyContext {
                        nodes: &mut *self.nodes,
                        graphs: self.graphs,
                        root: self.root,
                    };
                    self.policy.should_visit(&cx, Some(member), dt)
                };
                if descend {
                    self.visit_object(dt)?;
                }
            }
            _ => {
                if matches!(derived_value, Value::Null) || derived_target.is_some() {
                    self.pull_from_base(member, &Index::Empty, base_value)?;
                }
                // A derived primitive where the base holds an object is a
                // shape divergence; left alone like the primitive case.
            }
        }
        Ok(())
    }

    /// Whether every member of the base object exists on the derived side.
    /// Derived-only members are local additions and do not count against it.
    fn covers_base_members(&self, derived: NodeId, base: NodeId) -> bool {
        self.nodes
            .children(base)
            .iter()
            .all(|(name, _)| self.nodes.node(derived).member(name).is_some())
    }

    /// Clones a base value through the policy and writes it into a derived
    /// slot. A clone failure is logged and the slot left as-is.
    fn pull_from_base(
        &mut self,
        member: NodeId,
        index: &Index,
        base_value: &Value,
    ) -> Result<(), OverlayError> {
        let policy = self.policy;
        let owner = self.cx_owner();
        let cloned = {
            let mut cx = PolicyContext {
                nodes: &mut *self.nodes,
                graphs: self.graphs,
                root: self.root,
            };
            policy.clone_value_from_base(&mut cx, base_value, owner)
        };
        match cloned {
            Ok(value) => self.nodes.update(member, value, index)?,
            Err(err) => {
                warn!(node = ?member, index = %index, error = %err, "clone from base failed, subtree kept as overridden");
            }
        }
        Ok(())
    }

    fn reconcile_collection(&mut self, member: NodeId, base: NodeId) -> Result<(), OverlayError> {
        let Ok(derived_collection) = self.nodes.collection_of(member) else {
            return Ok(());
        };
        let Ok(base_collection) = self.nodes.collection_of(base) else {
            return Ok(());
        };
        let non_identifiable = self
            .nodes
            .store()
            .type_name(derived_collection)
            .map(|t| self.nodes.registry().non_identifiable_items(t))
            .unwrap_or(true);
        if non_identifiable {
            // No identity to match on; the collection content is local.
            return Ok(());
        }
        let Some(base_ids) = self.nodes.store().item_ids(base_collection) else {
            return Ok(());
        };
        let base_items: Vec<(Index, ItemId)> = base_ids.iter();
        let base_item_set: HashSet<ItemId> = base_items.iter().map(|(_, id)| *id).collect();

        // Deleted marks for items the base no longer has serve no purpose.
        if let Some(ids) = self.nodes.store().item_ids(derived_collection) {
            let stale: Vec<ItemId> = ids
                .deleted()
                .filter(|id| !base_item_set.contains(id))
                .collect();
            if let Some(ids) = self.nodes.store_mut().item_ids_mut(derived_collection) {
                for id in stale {
                    ids.unmark_deleted(id);
                }
            }
        }

        for (base_index, item) in &base_items {
            self.reconcile_item(member, base, derived_collection, base_index, *item)?;
        }

        // Local inherited items whose base counterpart disappeared go away.
        let leftovers: Vec<ItemId> = self
            .nodes
            .store()
            .item_ids(derived_collection)
            .map(|ids| {
                ids.iter()
                    .into_iter()
                    .map(|(_, id)| id)
                    .filter(|id| {
                        !base_item_set.contains(id)
                            && self.overrides.item(member, *id) != OverrideKind::New
                    })
                    .collect()
            })
            .unwrap_or_default();
        for item in leftovers {
            let index = self
                .nodes
                .store()
                .item_ids(derived_collection)
                .and_then(|ids| ids.key_of(item));
            if let Some(index) = index {
                self.nodes.remove_item(member, &index)?;
            }
        }
        Ok(())
    }

    fn reconcile_item(
        &mut self,
        member: NodeId,
        base: NodeId,
        derived_collection: InstanceId,
        base_index: &Index,
        item: ItemId,
    ) -> Result<(), OverlayError> {
        let Some(derived_ids) = self.nodes.store().item_ids(derived_collection) else {
            return Ok(());
        };
        if derived_ids.is_deleted(item) {
            return Ok(());
        }
        let derived_index = derived_ids.key_of(item);
        let base_value = self.nodes.retrieve(base, base_index)?;

        match derived_index {
            Some(index) => {
                if self.overrides.item(member, item) == OverrideKind::New {
                    return Ok(());
                }
                self.reconcile_present_item(member, base, base_index, &index, &base_value)?;
            }
            None => {
                self.insert_missing_item(member, base_index, item, &base_value)?;
            }
        }
        Ok(())
    }

    fn reconcile_present_item(
        &mut self,
        member: NodeId,
        base: NodeId,
        base_index: &Index,
        derived_index: &Index,
        base_value: &Value,
    ) -> Result<(), OverlayError> {
        let shape = self.nodes.registry().shape(base_value, self.nodes.store());
        if shape == TypeShape::Primitive {
            let derived_value = self.nodes.retrieve(member, derived_index)?;
            if derived_value != *base_value && derived_value.is_primitive() {
                self.nodes.update(member, base_value.clone(), derived_index)?;
            }
            return Ok(());
        }

        let base_target = self
            .nodes
            .node(base)
            .reference
            .as_ref()
            .and_then(|r| r.find(base_index))
            .and_then(|e| e.target);
        let derived_target = self
            .nodes
            .node(member)
            .reference
            .as_ref()
            .and_then(|r| r.find(derived_index))
            .and_then(|e| e.target);
        match (derived_target, base_target) {
            (Some(dt), Some(bt)) if self.links.get(&dt) == Some(&bt) => {
                if !self.covers_base_members(dt, bt) {
                    self.pull_from_base(member, derived_index, base_value)?;
                    return Ok(());
                }
                let descend = {
                    let cx = PolicyContext {
                        nodes: &mut *self.nodes,
                        graphs: self.graphs,
                        root: self.root,
                    };
                    self.policy.should_visit(&cx, Some(member), dt)
                };
                if descend {
                    self.visit_object(dt)?;
                }
            }
            _ => {
                self.pull_from_base(member, derived_index, base_value)?;
            }
        }
        Ok(())
    }

    /// A base item absent from the derived collection comes in as a clone
    /// carrying the base item's identity. A map key already taken locally is
    /// a collision: an overridden local item wins and the base id is marked
    /// deleted, an inherited one is replaced and rebound to the base id.
    fn insert_missing_item(
        &mut self,
        member: NodeId,
        base_index: &Index,
        item: ItemId,
        base_value: &Value,
    ) -> Result<(), OverlayError> {
        let derived_collection = match self.nodes.collection_of(member) {
            Ok(c) => c,
            Err(_) => return Ok(()),
        };

        if let Index::Key(_) = base_index {
            let local = self
                .nodes
                .store()
                .item_ids(derived_collection)
                .and_then(|ids| ids.get(base_index));
            if let Some(local_item) = local {
                if self.overrides.item(member, local_item) == OverrideKind::New {
                    if let Some(ids) = self.nodes.store_mut().item_ids_mut(derived_collection) {
                        ids.mark_deleted(item);
                    }
                    return Ok(());
                }
                let policy = self.policy;
                let owner = self.cx_owner();
                let cloned = {
                    let mut cx = PolicyContext {
                        nodes: &mut *self.nodes,
                        graphs: self.graphs,
                        root: self.root,
                    };
                    policy.clone_value_from_base(&mut cx, base_value, owner)
                };
                match cloned {
                    Ok(value) => {
                        self.nodes.update(member, value, base_index)?;
                        if let Some(ids) = self.nodes.store_mut().item_ids_mut(derived_collection) {
                            ids.remove(base_index);
                            ids.insert_with(base_index, item);
                        }
                    }
                    Err(err) => {
                        warn!(node = ?member, index = %base_index, error = %err, "clone from base failed, item kept");
                    }
                }
                return Ok(());
            }
        }

        let insert_at = match base_index {
            Index::Num(n) => {
                let len = self
                    .nodes
                    .store()
                    .item_ids(derived_collection)
                    .map(|ids| ids.len())
                    .unwrap_or(0);
                Index::Num((*n).min(len))
            }
            other => other.clone(),
        };
        let policy = self.policy;
        let owner = self.cx_owner();
        let cloned = {
            let mut cx = PolicyContext {
                nodes: &mut *self.nodes,
                graphs: self.graphs,
                root: self.root,
            };
            policy.clone_value_from_base(&mut cx, base_value, owner)
        };
        match cloned {
            Ok(value) => self.nodes.add_item_with_id(member, &insert_at, value, item)?,
            Err(err) => {
                warn!(node = ?member, index = %base_index, error = %err, "clone from base failed, item skipped");
            }
        }
        Ok(())
    }
}
