//! The customization seam of the overlay layer.
//!
//! Linking and reconciliation take a [`GraphPolicy`] that can redirect the
//! base counterpart of a node, control how base values are cloned into the
//! derived graph, and prune subtrees from the walk. The default policy is
//! purely structural.

use std::collections::HashMap;

use uuid::Uuid;

use graft_core::{InstanceId, NodeContainer, NodeId, Value};

use crate::error::OverlayError;
use crate::property_graph::PropertyGraph;

/// What a policy sees while a pass runs: the shared container, every
/// registered graph, and the root the pass was started on.
pub struct PolicyContext<'a> {
    pub nodes: &'a mut NodeContainer,
    pub graphs: &'a HashMap<Uuid, PropertyGraph>,
    pub root: Uuid,
}

impl PolicyContext<'_> {
    pub fn graph(&self) -> Option<&PropertyGraph> {
        self.graphs.get(&self.root)
    }
}

pub trait GraphPolicy {
    /// Redirects the base counterpart of a derived node. `default` is the
    /// structurally matched candidate; returning it unchanged keeps the
    /// structural walk.
    fn find_target(
        &self,
        _cx: &mut PolicyContext<'_>,
        _source: NodeId,
        default: Option<NodeId>,
    ) -> Result<Option<NodeId>, OverlayError> {
        Ok(default)
    }

    /// Produces the derived-side value for a base value being pulled in.
    /// `owner` is the nearest enclosing instantiation owner, when the walk
    /// tracked one.
    fn clone_value_from_base(
        &self,
        cx: &mut PolicyContext<'_>,
        value: &Value,
        _owner: Option<InstanceId>,
    ) -> Result<Value, OverlayError> {
        Ok(cx.nodes.store_mut().deep_clone(value))
    }

    /// Whether a target reached through `member` is a reference to a part
    /// owned elsewhere, rather than content of this subtree.
    fn is_referenced_part(
        &self,
        _cx: &PolicyContext<'_>,
        _member: Option<NodeId>,
        _target: NodeId,
    ) -> bool {
        false
    }

    /// Whether the walk descends into `target`.
    fn should_visit(
        &self,
        _cx: &PolicyContext<'_>,
        _member: Option<NodeId>,
        _target: NodeId,
    ) -> bool {
        true
    }

    /// Marks nodes whose subtree belongs to one instantiation, so clones
    /// performed underneath can be redirected per instantiation.
    fn instantiation_owner(&self, _cx: &PolicyContext<'_>, _node: NodeId) -> Option<InstanceId> {
        None
    }
}

/// Structural defaults: match by shape, clone deeply, visit everything.
#[derive(Debug, Default)]
pub struct DefaultPolicy;

impl GraphPolicy for DefaultPolicy {}
