//! The property-graph container: the owner of the shared node container and
//! every registered root, and the edit surface that records overrides.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use graft_core::{Index, InstanceId, ItemId, NodeContainer, NodeId, Value};

use crate::error::OverlayError;
use crate::linker::Linker;
use crate::overrides::OverrideKind;
use crate::policy::GraphPolicy;
use crate::property_graph::PropertyGraph;
use crate::reconcile::Reconciler;

pub struct PropertyGraphContainer {
    nodes: NodeContainer,
    graphs: HashMap<Uuid, PropertyGraph>,
}

impl PropertyGraphContainer {
    pub fn new(nodes: NodeContainer) -> Self {
        PropertyGraphContainer {
            nodes,
            graphs: HashMap::new(),
        }
    }

    pub fn nodes(&self) -> &NodeContainer {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut NodeContainer {
        &mut self.nodes
    }

    pub fn graph(&self, root: Uuid) -> Result<&PropertyGraph, OverlayError> {
        self.graphs.get(&root).ok_or(OverlayError::UnknownRoot(root))
    }

    pub fn graph_mut(&mut self, root: Uuid) -> Result<&mut PropertyGraph, OverlayError> {
        self.graphs
            .get_mut(&root)
            .ok_or(OverlayError::UnknownRoot(root))
    }

    /// Registers a root instance as a property graph, building its node
    /// subtree. The root becomes identifiable; its stable identifier is the
    /// graph's key. `base_root` names the graph this one derives from.
    pub fn register_root(
        &mut self,
        instance: InstanceId,
        base_root: Option<Uuid>,
    ) -> Result<Uuid, OverlayError> {
        let root_id = self.nodes.store_mut().make_identifiable(instance)?;
        let root_node = self.nodes.get_or_create(instance)?;
        self.graphs.insert(
            root_id,
            PropertyGraph::new(root_id, instance, root_node, base_root),
        );
        debug!(root = %root_id, base = ?base_root, "property graph registered");
        Ok(root_id)
    }

    fn resolve_member(&self, root: Uuid, path: &[&str]) -> Result<NodeId, OverlayError> {
        let graph = self.graph(root)?;
        let mut node = graph.root_node();
        let mut walked = graph.root_node();
        for (i, name) in path.iter().enumerate() {
            let member = self.nodes.member(walked, name)?;
            node = member;
            if i + 1 < path.len() {
                let target = self
                    .nodes
                    .node(member)
                    .reference
                    .as_ref()
                    .and_then(|r| r.find(&Index::Empty))
                    .and_then(|e| e.target);
                walked = target.ok_or_else(|| {
                    OverlayError::Graph(graft_core::GraphError::MissingMember {
                        name: (*name).to_owned(),
                    })
                })?;
            }
        }
        Ok(node)
    }

    /// Resolves a member node by path from the root, following object
    /// references between segments.
    pub fn member_at(&self, root: Uuid, path: &[&str]) -> Result<NodeId, OverlayError> {
        self.resolve_member(root, path)
    }

    /// Writes a member slot (or one of its collection elements) and records
    /// the override. Graphs with no base record nothing.
    pub fn update_member(
        &mut self,
        root: Uuid,
        member: NodeId,
        value: Value,
        index: &Index,
    ) -> Result<(), OverlayError> {
        self.nodes.update(member, value, index)?;
        let tracked = self.graph(root)?.base_root().is_some();
        if !tracked {
            return Ok(());
        }
        if index.is_empty() {
            self.graph_mut(root)?
                .set_content_override(member, OverrideKind::New);
        } else if let Ok(collection) = self.nodes.collection_of(member) {
            let item = self
                .nodes
                .store()
                .item_ids(collection)
                .and_then(|ids| ids.get(index));
            if let Some(item) = item {
                self.graph_mut(root)?
                    .set_item_override(member, item, OverrideKind::New);
            }
        }
        Ok(())
    }

    /// Inserts a collection element and records it as a local (`New`) item.
    pub fn add_item(
        &mut self,
        root: Uuid,
        member: NodeId,
        index: &Index,
        value: Value,
    ) -> Result<Option<ItemId>, OverlayError> {
        let item = self.nodes.add_item(member, index, value)?;
        let tracked = self.graph(root)?.base_root().is_some();
        if tracked {
            if let Some(item) = item {
                self.graph_mut(root)?
                    .set_item_override(member, item, OverrideKind::New);
            }
        }
        Ok(item)
    }

    /// Removes a collection element. When the item came from the base, its
    /// id is marked deleted so reconciliation does not bring it back.
    pub fn remove_item(
        &mut self,
        root: Uuid,
        member: NodeId,
        index: &Index,
    ) -> Result<Value, OverlayError> {
        let from_base = {
            let graph = self.graph(root)?;
            graph.base_root().is_some()
                && self
                    .nodes
                    .collection_of(member)
                    .ok()
                    .and_then(|c| self.nodes.store().item_ids(c))
                    .and_then(|ids| ids.get(index))
                    .map(|item| graph.item_override(member, item) == OverrideKind::Base)
                    .unwrap_or(false)
        };
        let collection = self.nodes.collection_of(member).ok();
        let (value, item) = self.nodes.remove_item(member, index)?;
        if from_base {
            if let (Some(collection), Some(item)) = (collection, item) {
                if let Some(ids) = self.nodes.store_mut().item_ids_mut(collection) {
                    ids.mark_deleted(item);
                }
            }
        }
        Ok(value)
    }

    pub fn move_item(
        &mut self,
        _root: Uuid,
        member: NodeId,
        from: usize,
        to: usize,
    ) -> Result<(), OverlayError> {
        Ok(self.nodes.move_item(member, from, to)?)
    }

    /// Recomputes the derived-to-base node links for one graph. A base root
    /// that is not registered clears the links and succeeds; the graph is
    /// simply unlinked until its base shows up.
    pub fn link_to_base(
        &mut self,
        root: Uuid,
        policy: &dyn GraphPolicy,
    ) -> Result<(), OverlayError> {
        let graph = self.graph(root)?;
        let derived_root = graph.root_node();
        let Some(base_id) = graph.base_root() else {
            return Err(OverlayError::NotLinked(root));
        };
        let Some(base_graph) = self.graphs.get(&base_id) else {
            self.graph_mut(root)?.base_links.clear();
            return Ok(());
        };
        let base_root = base_graph.root_node();

        self.nodes.update_references(derived_root)?;
        self.nodes.update_references(base_root)?;
        let linker = Linker::new(&mut self.nodes, &self.graphs, policy, root);
        let links = linker.run(derived_root, base_root)?;
        self.graph_mut(root)?.base_links = links;
        Ok(())
    }

    /// Links and then reconciles one graph against its base: non-overridden
    /// content is brought back in line with the base, overridden content and
    /// deleted items are preserved.
    pub fn reconcile(&mut self, root: Uuid, policy: &dyn GraphPolicy) -> Result<(), OverlayError> {
        self.link_to_base(root, policy)?;
        let graph = self.graph(root)?;
        if graph.base_links.is_empty() {
            return Ok(());
        }
        let derived_root = graph.root_node();
        // Links and overrides are read-only during the pass; moving them out
        // keeps the graph table borrowable by the policy.
        let links = std::mem::take(&mut self.graph_mut(root)?.base_links);
        let overrides = std::mem::take(&mut self.graph_mut(root)?.overrides);
        let result = {
            let reconciler = Reconciler::new(
                &mut self.nodes,
                &self.graphs,
                policy,
                root,
                &links,
                &overrides,
            );
            reconciler.run(derived_root)
        };
        if let Ok(graph) = self.graph_mut(root) {
            graph.base_links = links;
            graph.overrides = overrides;
        }
        result?;
        // Structure may have changed; recompute the links so callers observe
        // a fully linked graph.
        self.link_to_base(root, policy)
    }
}
