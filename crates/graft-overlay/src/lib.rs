//! Base/derived overlay over `graft-core` node graphs.
//!
//! A derived object graph stays live-linked to the base it was cloned from:
//! the linker pairs derived nodes with their base counterparts, the override
//! table records where the derived graph deliberately diverges, and the
//! reconciliation pass pulls base changes into everything that is still
//! inherited. The [`policy::GraphPolicy`] trait is the seam where composite
//! hierarchies (parts owned by designs) redirect linking and cloning.

pub mod composite;
pub mod error;
mod linker;
pub mod overrides;
pub mod policy;
pub mod property_graph;
mod reconcile;
pub mod registry;

pub use composite::{CompositePolicy, CompositeSchema};
pub use error::OverlayError;
pub use overrides::{OverrideKind, OverrideMap};
pub use policy::{DefaultPolicy, GraphPolicy, PolicyContext};
pub use property_graph::PropertyGraph;
pub use registry::PropertyGraphContainer;
