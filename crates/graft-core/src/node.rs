//! Node shapes.
//!
//! Nodes form the overlay the tooling walks instead of the raw value tree.
//! An object node wraps one stored instance; a member node wraps one named
//! slot of an object node; a boxed node wraps a value-semantic instance and
//! remembers which slot owns it so writes flow back through the owner.

use indexmap::IndexMap;
use uuid::Uuid;

use crate::index::Index;
use crate::reference::Reference;
use crate::value::InstanceId;

/// Container-scoped node handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub struct ObjectNode {
    pub instance: InstanceId,
    pub members: IndexMap<String, NodeId>,
}

/// A value-semantic instance's node, with a write-through link to its owner
/// slot. The owner is absent while the box is being constructed and for
/// orphaned boxes that lost their slot to a newer value.
#[derive(Debug)]
pub struct BoxedNode {
    pub instance: InstanceId,
    pub members: IndexMap<String, NodeId>,
    pub owner: Option<(NodeId, Index)>,
}

#[derive(Debug)]
pub struct MemberNode {
    pub owner: NodeId,
    pub name: String,
}

#[derive(Debug)]
pub enum NodeKind {
    Object(ObjectNode),
    Boxed(BoxedNode),
    Member(MemberNode),
}

#[derive(Debug)]
pub struct NodeState {
    /// Per-node identity, stable across reference refreshes.
    pub guid: Uuid,
    pub kind: NodeKind,
    pub reference: Option<Reference>,
}

impl NodeState {
    pub fn is_object(&self) -> bool {
        matches!(self.kind, NodeKind::Object(_) | NodeKind::Boxed(_))
    }

    pub fn is_member(&self) -> bool {
        matches!(self.kind, NodeKind::Member(_))
    }

    /// The wrapped instance, for object and boxed nodes.
    pub fn instance(&self) -> Option<InstanceId> {
        match &self.kind {
            NodeKind::Object(n) => Some(n.instance),
            NodeKind::Boxed(n) => Some(n.instance),
            NodeKind::Member(_) => None,
        }
    }

    pub fn members(&self) -> Option<&IndexMap<String, NodeId>> {
        match &self.kind {
            NodeKind::Object(n) => Some(&n.members),
            NodeKind::Boxed(n) => Some(&n.members),
            NodeKind::Member(_) => None,
        }
    }

    pub fn member(&self, name: &str) -> Option<NodeId> {
        self.members().and_then(|m| m.get(name)).copied()
    }

    pub fn member_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Member(n) => Some(&n.name),
            _ => None,
        }
    }
}
