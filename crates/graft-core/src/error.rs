use thiserror::Error;

use crate::index::Index;
use crate::node::NodeId;
use crate::value::InstanceId;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("re-entrant node construction for instance {0}")]
    ReEntrantConstruction(InstanceId),
    #[error("an object node value cannot be modified after construction")]
    UnsupportedMutation,
    #[error("index {index} does not address an element of this collection")]
    InvalidIndex { index: Index },
    #[error("instance {0} is not in the store")]
    MissingInstance(InstanceId),
    #[error("node {0:?} is not in the container")]
    MissingNode(NodeId),
    #[error("no member named `{name}`")]
    MissingMember { name: String },
    #[error("expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },
}
