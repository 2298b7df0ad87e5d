//! Per-root overlay state.

use std::collections::HashMap;

use uuid::Uuid;

use graft_core::{InstanceId, ItemId, NodeId};

use crate::overrides::{OverrideKind, OverrideMap};

/// Everything the overlay layer tracks for one registered root: the root
/// node, the base it derives from (if any), the override table, and the
/// derived-to-base node links computed by the last linking pass.
#[derive(Debug)]
pub struct PropertyGraph {
    pub(crate) root_id: Uuid,
    pub(crate) root_instance: InstanceId,
    pub(crate) root_node: NodeId,
    pub(crate) base_root: Option<Uuid>,
    pub(crate) overrides: OverrideMap,
    pub(crate) base_links: HashMap<NodeId, NodeId>,
}

impl PropertyGraph {
    pub(crate) fn new(
        root_id: Uuid,
        root_instance: InstanceId,
        root_node: NodeId,
        base_root: Option<Uuid>,
    ) -> Self {
        PropertyGraph {
            root_id,
            root_instance,
            root_node,
            base_root,
            overrides: OverrideMap::new(),
            base_links: HashMap::new(),
        }
    }

    pub fn root_id(&self) -> Uuid {
        self.root_id
    }

    pub fn root_instance(&self) -> InstanceId {
        self.root_instance
    }

    pub fn root_node(&self) -> NodeId {
        self.root_node
    }

    pub fn base_root(&self) -> Option<Uuid> {
        self.base_root
    }

    /// The base node a derived node was matched to by the last linking pass.
    pub fn base_node(&self, node: NodeId) -> Option<NodeId> {
        self.base_links.get(&node).copied()
    }

    pub fn content_override(&self, node: NodeId) -> OverrideKind {
        self.overrides.content(node)
    }

    pub fn item_override(&self, node: NodeId, item: ItemId) -> OverrideKind {
        self.overrides.item(node, item)
    }

    /// Marks a slot overridden or re-inherited by hand, outside the edit API.
    pub fn set_content_override(&mut self, node: NodeId, kind: OverrideKind) {
        self.overrides.set_content(node, kind);
    }

    pub fn set_item_override(&mut self, node: NodeId, item: ItemId, kind: OverrideKind) {
        self.overrides.set_item(node, item, kind);
    }
}
