//! References between nodes.
//!
//! A member or collection slot whose value is an instance does not hold the
//! target node directly; it holds a reference that is refreshed lazily from
//! the live value. A refresh retargets the reference when the slot's value
//! changed, without touching slots that still point at the same instance.

use uuid::Uuid;

use crate::index::Index;
use crate::node::NodeId;
use crate::value::Value;

/// One slot-to-node edge. `target` is `None` when the slot currently holds
/// null or a primitive. `target_guid` remembers the last resolved node so a
/// refresh can tell retargeting from a plain revisit. A slot value that
/// cannot resolve to a node (its instance left the store) is parked in
/// `orphan` until a later refresh resolves it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRef {
    pub index: Index,
    pub target: Option<NodeId>,
    pub target_guid: Option<Uuid>,
    pub orphan: Option<Value>,
}

impl ObjectRef {
    pub fn new(index: Index) -> Self {
        ObjectRef {
            index,
            target: None,
            target_guid: None,
            orphan: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// A single member slot pointing at an object.
    Object(ObjectRef),
    /// One edge per collection element that holds an instance.
    Enumerable(Vec<ObjectRef>),
}

impl Reference {
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Reference::Object(r) => Some(r),
            Reference::Enumerable(_) => None,
        }
    }

    pub fn as_enumerable(&self) -> Option<&[ObjectRef]> {
        match self {
            Reference::Object(_) => None,
            Reference::Enumerable(v) => Some(v),
        }
    }

    /// The edge addressed by `index`: the lone edge for an object reference
    /// when `index` is empty, the matching element edge otherwise.
    pub fn find(&self, index: &Index) -> Option<&ObjectRef> {
        match self {
            Reference::Object(r) if index.is_empty() => Some(r),
            Reference::Object(_) => None,
            Reference::Enumerable(v) => v.iter().find(|r| r.index == *index),
        }
    }

    pub fn targets(&self) -> Vec<(Index, NodeId)> {
        let edges: &[ObjectRef] = match self {
            Reference::Object(r) => std::slice::from_ref(r),
            Reference::Enumerable(v) => v,
        };
        edges
            .iter()
            .filter_map(|r| r.target.map(|t| (r.index.clone(), t)))
            .collect()
    }
}
