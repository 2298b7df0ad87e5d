//! Lock-step linking of a derived graph against its base.
//!
//! The linker walks the derived node graph and the base node graph together,
//! producing one derived-to-base link per matched node. Members match by
//! name, referenced objects match through the owning slot's reference, and
//! collection elements match by item identity so reordering on either side
//! does not break the pairing. The policy can redirect any match before it is
//! recorded.

use std::collections::{HashMap, HashSet};

use tracing::debug;
use uuid::Uuid;

use graft_core::{Index, NodeContainer, NodeId, NodeKind};

use crate::error::OverlayError;
use crate::policy::{GraphPolicy, PolicyContext};
use crate::property_graph::PropertyGraph;

pub(crate) struct Linker<'a> {
    nodes: &'a mut NodeContainer,
    graphs: &'a HashMap<Uuid, PropertyGraph>,
    policy: &'a dyn GraphPolicy,
    root: Uuid,
    pending: HashMap<NodeId, Option<NodeId>>,
    done: HashSet<NodeId>,
    links: HashMap<NodeId, NodeId>,
}

impl<'a> Linker<'a> {
    pub(crate) fn new(
        nodes: &'a mut NodeContainer,
        graphs: &'a HashMap<Uuid, PropertyGraph>,
        policy: &'a dyn GraphPolicy,
        root: Uuid,
    ) -> Self {
        Linker {
            nodes,
            graphs,
            policy,
            root,
            pending: HashMap::new(),
            done: HashSet::new(),
            links: HashMap::new(),
        }
    }

    pub(crate) fn run(
        mut self,
        derived_root: NodeId,
        base_root: NodeId,
    ) -> Result<HashMap<NodeId, NodeId>, OverlayError> {
        self.pending.insert(derived_root, Some(base_root));
        self.visit(derived_root)?;
        debug!(root = %self.root, links = self.links.len(), "graphs linked");
        Ok(self.links)
    }

    fn visit(&mut self, node: NodeId) -> Result<(), OverlayError> {
        if !self.done.insert(node) {
            return Ok(());
        }
        let policy = self.policy;
        let default = self.pending.get(&node).copied().flatten();
        let target = {
            let mut cx = PolicyContext {
                nodes: &mut *self.nodes,
                graphs: self.graphs,
                root: self.root,
            };
            policy.find_target(&mut cx, node, default)?
        };
        if let Some(target) = target {
            self.links.insert(node, target);
        }

        for (name, child) in self.nodes.children(node) {
            let child_target = target.and_then(|t| self.nodes.node(t).member(&name));
            self.pending.insert(child, child_target);
            let descend = {
                let cx = PolicyContext {
                    nodes: &mut *self.nodes,
                    graphs: self.graphs,
                    root: self.root,
                };
                policy.should_visit(&cx, Some(child), child)
            };
            if descend {
                self.visit(child)?;
            }
        }

        let edges: Vec<(Index, NodeId)> = self
            .nodes
            .node(node)
            .reference
            .as_ref()
            .map(|r| r.targets())
            .unwrap_or_default();
        let member = matches!(self.nodes.node(node).kind, NodeKind::Member(_)).then_some(node);
        for (index, ref_target) in edges {
            let descend = {
                let cx = PolicyContext {
                    nodes: &mut *self.nodes,
                    graphs: self.graphs,
                    root: self.root,
                };
                policy.should_visit(&cx, member, ref_target)
            };
            if !descend {
                continue;
            }
            // A target reached through a second path keeps its first pairing.
            if self.done.contains(&ref_target) {
                continue;
            }
            let base_ref_target = self.match_reference(node, target, &index);
            self.pending.insert(ref_target, base_ref_target);
            self.visit(ref_target)?;
        }
        Ok(())
    }

    /// The base node a referenced target should pair with: the base slot's
    /// own reference for plain members, the identity-matched element for
    /// collection slots. Collections registered as carrying no item identity
    /// never match content.
    fn match_reference(
        &self,
        node: NodeId,
        base: Option<NodeId>,
        index: &Index,
    ) -> Option<NodeId> {
        let base = base?;
        let base_index = if index.is_empty() {
            Index::Empty
        } else {
            let derived_collection = self.nodes.collection_of(node).ok()?;
            let type_name = self.nodes.store().type_name(derived_collection)?;
            if self.nodes.registry().non_identifiable_items(type_name) {
                return None;
            }
            let item = self
                .nodes
                .store()
                .item_ids(derived_collection)
                .and_then(|ids| ids.get(index))?;
            let base_collection = self.nodes.collection_of(base).ok()?;
            self.nodes
                .store()
                .item_ids(base_collection)
                .and_then(|ids| ids.key_of(item))?
        };
        self.nodes
            .node(base)
            .reference
            .as_ref()
            .and_then(|r| r.find(&base_index))
            .and_then(|edge| edge.target)
    }
}
