//! Domain Events
//!
//! Events are emitted on a tokio broadcast channel once the transaction that
//! caused them has committed, so observers (cache purgers, search indexers,
//! notification hooks) never see changes that were rolled back.

use crate::models::{NodeId, Versionable};
use serde::{Deserialize, Serialize};

/// Domain-level change notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    #[serde(rename_all = "camelCase")]
    PageCreated { tenant_id: String, page_id: NodeId },

    #[serde(rename_all = "camelCase")]
    PageMoved { tenant_id: String, page_id: NodeId },

    /// Page and its descendants moved to the trash
    #[serde(rename_all = "camelCase")]
    PagesTrashed {
        tenant_id: String,
        page_ids: Vec<NodeId>,
    },

    #[serde(rename_all = "camelCase")]
    PagesRestored {
        tenant_id: String,
        page_ids: Vec<NodeId>,
    },

    #[serde(rename_all = "camelCase")]
    PagesPurged {
        tenant_id: String,
        page_ids: Vec<NodeId>,
    },

    /// New version appended to a page, element or file
    #[serde(rename_all = "camelCase")]
    VersionCreated {
        tenant_id: String,
        versionable: Versionable,
        versionable_id: String,
        version_id: i64,
    },

    #[serde(rename_all = "camelCase")]
    VersionPublished {
        versionable: Versionable,
        versionable_id: String,
        version_id: i64,
    },

    #[serde(rename_all = "camelCase")]
    VersionsPruned {
        versionable: Versionable,
        versionable_id: String,
        removed: u64,
    },

    #[serde(rename_all = "camelCase")]
    EntityTrashed {
        tenant_id: String,
        versionable: Versionable,
        id: String,
    },
}

impl DomainEvent {
    /// Stable name of the event type for logs and subscribers
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::PageCreated { .. } => "page:created",
            DomainEvent::PageMoved { .. } => "page:moved",
            DomainEvent::PagesTrashed { .. } => "page:trashed",
            DomainEvent::PagesRestored { .. } => "page:restored",
            DomainEvent::PagesPurged { .. } => "page:purged",
            DomainEvent::VersionCreated { .. } => "version:created",
            DomainEvent::VersionPublished { .. } => "version:published",
            DomainEvent::VersionsPruned { .. } => "version:pruned",
            DomainEvent::EntityTrashed { .. } => "entity:trashed",
        }
    }
}
