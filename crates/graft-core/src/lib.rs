//! Node graphs over dynamic object trees.
//!
//! `graft-core` wraps a store of plain objects, sequences and maps in a graph
//! of nodes that editing tools can walk, observe and mutate uniformly. On top
//! of instance identity it layers stable identifiers for whole objects and
//! identity maps for collection items, the two anchors the `graft-overlay`
//! crate uses to match a derived object graph against the base it was cloned
//! from.

pub mod container;
pub mod error;
pub mod index;
pub mod item_ids;
pub mod node;
pub mod reference;
pub mod schema;
pub mod value;

pub use container::NodeContainer;
pub use error::GraphError;
pub use index::Index;
pub use item_ids::{ItemId, ItemIds};
pub use node::{NodeId, NodeKind, NodeState};
pub use reference::{ObjectRef, Reference};
pub use schema::{TypeInfo, TypeRegistry, TypeShape};
pub use value::{Instance, InstanceData, InstanceId, ObjectStore, Value};
