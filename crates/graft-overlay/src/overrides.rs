//! Override tracking.
//!
//! An override marks the places where a derived graph deliberately diverges
//! from its base. Content overrides attach to member nodes (the whole slot is
//! local); item overrides attach to `(member node, item id)` pairs so they
//! survive reordering and index shifts.

use std::collections::HashSet;

use graft_core::{ItemId, NodeId};

/// How a slot relates to its base counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideKind {
    /// Inherited; reconciliation keeps it in sync with the base.
    Base,
    /// Locally overridden; reconciliation leaves it alone.
    New,
}

#[derive(Debug, Default)]
pub struct OverrideMap {
    content: HashSet<NodeId>,
    items: HashSet<(NodeId, ItemId)>,
}

impl OverrideMap {
    pub fn new() -> Self {
        OverrideMap::default()
    }

    pub fn set_content(&mut self, node: NodeId, kind: OverrideKind) {
        match kind {
            OverrideKind::New => {
                self.content.insert(node);
            }
            OverrideKind::Base => {
                self.content.remove(&node);
            }
        }
    }

    pub fn content(&self, node: NodeId) -> OverrideKind {
        if self.content.contains(&node) {
            OverrideKind::New
        } else {
            OverrideKind::Base
        }
    }

    pub fn set_item(&mut self, node: NodeId, item: ItemId, kind: OverrideKind) {
        match kind {
            OverrideKind::New => {
                self.items.insert((node, item));
            }
            OverrideKind::Base => {
                self.items.remove(&(node, item));
            }
        }
    }

    pub fn item(&self, node: NodeId, item: ItemId) -> OverrideKind {
        if self.items.contains(&(node, item)) {
            OverrideKind::New
        } else {
            OverrideKind::Base
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.items.is_empty()
    }
}
