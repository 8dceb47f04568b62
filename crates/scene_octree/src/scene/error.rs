//! Scene errors

use thiserror::Error;

use super::HierarchyError;
use crate::config::ConfigError;
use crate::foundation::collections::{DrawableId, NodeId};

/// Scene-level errors
#[derive(Error, Debug)]
pub enum SceneError {
    /// Node handle is stale or foreign
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Drawable handle is stale or foreign
    #[error("Drawable not found: {0:?}")]
    DrawableNotFound(DrawableId),

    /// Batch, geometry or material slot outside the drawable's range
    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of slots
        len: usize,
    },

    /// The permanent scene root cannot be removed or reparented
    #[error("Operation not allowed on the scene root")]
    RootNode,

    /// Rejected hierarchy change
    #[error("Hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),

    /// Invalid scene configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
