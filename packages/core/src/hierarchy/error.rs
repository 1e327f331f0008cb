//! Error types for nested-set operations

use crate::models::NodeId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    /// Node is not part of the arena
    #[error("Node {0} not found in hierarchy")]
    NotFound(NodeId),

    /// Node id is already used by another interval
    #[error("Node {0} already exists in hierarchy")]
    DuplicateNode(NodeId),

    /// Target lies inside the moved subtree
    #[error("Cannot move node {node} into its own subtree (target {target})")]
    Cycle { node: NodeId, target: NodeId },

    /// Sibling reference that does not match the requested parent
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Intervals overlap, invert or leave gaps
    #[error("Hierarchy integrity violated: {0}")]
    Integrity(String),
}

impl HierarchyError {
    pub fn invalid_position(msg: impl Into<String>) -> Self {
        Self::InvalidPosition(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }
}
