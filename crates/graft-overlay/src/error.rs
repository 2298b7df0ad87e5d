use thiserror::Error;
use uuid::Uuid;

use graft_core::GraphError;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("no property graph registered for root {0}")]
    UnknownRoot(Uuid),
    #[error("property graph {0} has no base to link against")]
    NotLinked(Uuid),
    #[error(transparent)]
    Graph(#[from] GraphError),
}
