//! Page Tree Node Structures
//!
//! A `Node` is the structural record of a page or navigation entry. It only
//! carries its position in the tenant's nested-set numbering and the soft
//! delete marker; everything editorial (title, path, content, ...) lives in
//! the page's versions.
//!
//! # Nested-set numbering
//!
//! Each node owns the closed interval `[left, right]`. A node's subtree is
//! exactly the set of nodes whose interval lies inside its own, so ancestor,
//! descendant and containment checks are plain integer comparisons.
//!
//! ```rust
//! # use pagetree_core::models::Node;
//! let parent = Node::detached(1, 1, 4, 0, None);
//! let child = Node::detached(2, 2, 3, 1, Some(1));
//!
//! assert!(child.is_self_or_descendant_of(&parent));
//! assert!(!parent.is_self_or_descendant_of(&child));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Node identifier (database row id)
pub type NodeId = i64;

/// Structural page record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,

    pub tenant_id: String,

    /// Parent page, `None` for root level pages
    pub parent_id: Option<NodeId>,

    /// Nested-set bounds, `left < right`
    pub left: i64,
    pub right: i64,

    /// Number of ancestors
    pub depth: i64,

    pub created_at: DateTime<Utc>,

    /// Soft delete marker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Node {
    /// Node that is not backed by a stored row (tests, previews)
    pub fn detached(
        id: NodeId,
        left: i64,
        right: i64,
        depth: i64,
        parent_id: Option<NodeId>,
    ) -> Self {
        Self {
            id,
            tenant_id: String::new(),
            parent_id,
            left,
            right,
            depth,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// True if `self` is `other` or lies inside its subtree
    pub fn is_self_or_descendant_of(&self, other: &Node) -> bool {
        self.tenant_id == other.tenant_id && self.left >= other.left && self.right <= other.right
    }

    /// Number of descendants
    pub fn descendant_count(&self) -> i64 {
        (self.right - self.left - 1) / 2
    }
}

/// Unique address of a page within a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub node_id: NodeId,
    pub tenant_id: String,
    pub domain: String,
    pub path: String,
}
