//! Hierarchy Store
//!
//! Persists the page forest of each tenant as nested-set intervals. A
//! structural change loads the tenant's arena inside a `BEGIN IMMEDIATE`
//! transaction, applies one [`NestedSet`] operation and writes back only the
//! rows whose bounds changed. Every write is guarded by the bounds it was
//! computed from, so a concurrent renumbering surfaces as a retryable
//! structural-integrity error and the whole attempt is replayed.
//!
//! Reads are plain interval comparisons and do not lock anything.

use crate::db::events::DomainEvent;
use crate::db::{node_store, transaction, version_store, with_retry, DatabaseService};
use crate::hierarchy::{Interval, NestedSet, Position};
use crate::models::{Node, NodeId, Versionable};
use crate::services::error::{CmsError, Result};
use chrono::{DateTime, Utc};
use libsql::Connection;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Broadcast channel capacity for domain events
pub(crate) const DOMAIN_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Load a tenant's arena, skipping the row `exclude` that is not yet numbered
pub(crate) async fn load_set(
    conn: &Connection,
    tenant: &str,
    exclude: Option<NodeId>,
) -> Result<NestedSet> {
    let nodes = node_store::load_arena(conn, tenant, exclude).await?;
    let set = NestedSet::from_intervals(nodes.into_iter().map(|n| {
        (
            n.id,
            Interval {
                left: n.left,
                right: n.right,
                depth: n.depth,
                parent_id: n.parent_id,
            },
        )
    }))?;
    Ok(set)
}

async fn require_node(conn: &Connection, tenant: &str, id: NodeId) -> Result<Node> {
    node_store::get_node(conn, tenant, id)
        .await?
        .ok_or_else(|| CmsError::not_found(format!("page {}", id)))
}

/// Insert a node inside an open transaction
pub(crate) async fn insert_in_tx(
    conn: &Connection,
    tenant: &str,
    parent: Option<NodeId>,
    position: Position,
    now: DateTime<Utc>,
) -> Result<Node> {
    let id = node_store::insert_placeholder(conn, tenant, now).await?;
    let mut set = load_set(conn, tenant, Some(id)).await?;

    let change = set.insert(id, parent, position)?;
    node_store::apply_renumbering(conn, tenant, &change).await?;

    tracing::debug!(
        "Inserted node {} for tenant '{}', {} row(s) renumbered",
        id,
        tenant,
        change.touched()
    );

    require_node(conn, tenant, id).await
}

pub(crate) async fn move_in_tx(
    conn: &Connection,
    tenant: &str,
    id: NodeId,
    new_parent: Option<NodeId>,
    position: Position,
) -> Result<Node> {
    let mut set = load_set(conn, tenant, None).await?;

    let change = set.move_subtree(id, new_parent, position)?;
    node_store::apply_renumbering(conn, tenant, &change).await?;

    tracing::debug!(
        "Moved node {} under {:?}, {} row(s) renumbered",
        id,
        new_parent,
        change.touched()
    );

    require_node(conn, tenant, id).await
}

/// Hard delete a subtree with its versions, returns the removed ids
pub(crate) async fn remove_in_tx(conn: &Connection, tenant: &str, id: NodeId) -> Result<Vec<NodeId>> {
    let mut set = load_set(conn, tenant, None).await?;
    let change = set.remove_subtree(id)?;

    for removed in &change.removed {
        version_store::delete_all(conn, Versionable::Page, &removed.to_string()).await?;
    }
    node_store::apply_renumbering(conn, tenant, &change).await?;

    Ok(change.removed)
}

/// Page tree persistence
#[derive(Clone)]
pub struct HierarchyStore {
    db: Arc<DatabaseService>,
    retry_attempts: usize,
    event_tx: broadcast::Sender<DomainEvent>,
}

impl HierarchyStore {
    pub fn new(db: Arc<DatabaseService>, retry_attempts: usize) -> Self {
        let (event_tx, _) = broadcast::channel(DOMAIN_EVENT_CHANNEL_CAPACITY);
        Self {
            db,
            retry_attempts,
            event_tx,
        }
    }

    /// Share an event channel with other services
    pub fn with_event_sender(mut self, event_tx: broadcast::Sender<DomainEvent>) -> Self {
        self.event_tx = event_tx;
        self
    }

    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: DomainEvent) {
        let _ = self.event_tx.send(event);
    }

    async fn create(
        &self,
        label: &str,
        tenant: &str,
        parent: Option<NodeId>,
        position: Position,
    ) -> Result<Node> {
        let node = with_retry(label, self.retry_attempts, || async move {
            let conn = self.db.connect_with_timeout().await?;
            transaction::begin(&conn).await?;
            let result = insert_in_tx(&conn, tenant, parent, position, Utc::now()).await;
            transaction::finish(&conn, result).await
        })
        .await?;

        self.emit_event(DomainEvent::PageCreated {
            tenant_id: tenant.to_string(),
            page_id: node.id,
        });
        Ok(node)
    }

    /// New last child of `parent`
    pub async fn append_child(&self, tenant: &str, parent: NodeId) -> Result<Node> {
        self.create("append_child", tenant, Some(parent), Position::Last)
            .await
    }

    /// New node directly before `sibling`, under the sibling's parent
    pub async fn insert_before(&self, tenant: &str, sibling: NodeId) -> Result<Node> {
        let parent = self.get(tenant, sibling).await?.parent_id;
        self.create("insert_before", tenant, parent, Position::Before(sibling))
            .await
    }

    /// New root level node after every existing tree
    pub async fn create_root(&self, tenant: &str) -> Result<Node> {
        self.create("create_root", tenant, None, Position::Last).await
    }

    /// Move a node and its subtree, `new_parent = None` moves to root level
    pub async fn move_subtree(
        &self,
        tenant: &str,
        id: NodeId,
        new_parent: Option<NodeId>,
        position: Position,
    ) -> Result<Node> {
        let node = with_retry("move_subtree", self.retry_attempts, || async move {
            let conn = self.db.connect_with_timeout().await?;
            transaction::begin(&conn).await?;
            let result = move_in_tx(&conn, tenant, id, new_parent, position).await;
            transaction::finish(&conn, result).await
        })
        .await
        .inspect_err(|e| {
            if matches!(e, CmsError::StructuralIntegrity { .. }) {
                tracing::warn!("Aborted move of node {}: {}", id, e);
            }
        })?;

        self.emit_event(DomainEvent::PageMoved {
            tenant_id: tenant.to_string(),
            page_id: id,
        });
        Ok(node)
    }

    async fn mark_subtree(
        &self,
        label: &str,
        tenant: &str,
        id: NodeId,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<NodeId>> {
        with_retry(label, self.retry_attempts, || async move {
            let conn = self.db.connect_with_timeout().await?;
            transaction::begin(&conn).await?;
            let result: Result<Vec<NodeId>> = async {
                let node = require_node(&conn, tenant, id).await?;
                node_store::set_deleted_range(&conn, tenant, node.left, node.right, deleted_at)
                    .await?;
                let ids: Vec<NodeId> = node_store::nodes_in_range(&conn, tenant, node.left, node.right)
                    .await?
                    .into_iter()
                    .map(|n| n.id)
                    .collect();
                Ok(ids)
            }
            .await;
            transaction::finish(&conn, result).await
        })
        .await
    }

    /// Soft delete a node and its descendants
    pub async fn trash(&self, tenant: &str, id: NodeId) -> Result<Vec<NodeId>> {
        let ids = self.mark_subtree("trash", tenant, id, Some(Utc::now())).await?;
        tracing::info!("Trashed {} page(s) below and including {}", ids.len(), id);

        self.emit_event(DomainEvent::PagesTrashed {
            tenant_id: tenant.to_string(),
            page_ids: ids.clone(),
        });
        Ok(ids)
    }

    /// Clear the soft delete marker of a node and its descendants
    pub async fn restore(&self, tenant: &str, id: NodeId) -> Result<Vec<NodeId>> {
        let ids = self.mark_subtree("restore", tenant, id, None).await?;

        self.emit_event(DomainEvent::PagesRestored {
            tenant_id: tenant.to_string(),
            page_ids: ids.clone(),
        });
        Ok(ids)
    }

    /// Hard delete a subtree, its routes and versions, closing the gap
    pub async fn purge(&self, tenant: &str, id: NodeId) -> Result<Vec<NodeId>> {
        let ids = with_retry("purge", self.retry_attempts, || async move {
            let conn = self.db.connect_with_timeout().await?;
            transaction::begin(&conn).await?;
            let result = remove_in_tx(&conn, tenant, id).await;
            transaction::finish(&conn, result).await
        })
        .await?;

        tracing::info!("Purged {} page(s) below and including {}", ids.len(), id);
        self.emit_event(DomainEvent::PagesPurged {
            tenant_id: tenant.to_string(),
            page_ids: ids.clone(),
        });
        Ok(ids)
    }

    //
    // Reads. Trashed nodes are included, callers filter on `deleted_at`.
    //

    pub async fn get(&self, tenant: &str, id: NodeId) -> Result<Node> {
        let conn = self.db.connect_with_timeout().await?;
        require_node(&conn, tenant, id).await
    }

    pub async fn find(&self, tenant: &str, id: NodeId) -> Result<Option<Node>> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(node_store::get_node(&conn, tenant, id).await?)
    }

    /// Ancestors from the root down
    pub async fn ancestors(&self, tenant: &str, id: NodeId) -> Result<Vec<Node>> {
        let conn = self.db.connect_with_timeout().await?;
        let node = require_node(&conn, tenant, id).await?;
        Ok(node_store::ancestors_of(&conn, &node).await?)
    }

    /// Descendants in document order
    pub async fn descendants(&self, tenant: &str, id: NodeId) -> Result<Vec<Node>> {
        let conn = self.db.connect_with_timeout().await?;
        let node = require_node(&conn, tenant, id).await?;
        Ok(node_store::descendants_of(&conn, &node).await?)
    }

    pub async fn children(&self, tenant: &str, id: NodeId) -> Result<Vec<Node>> {
        let conn = self.db.connect_with_timeout().await?;
        let node = require_node(&conn, tenant, id).await?;
        Ok(node_store::children_of(&conn, &node).await?)
    }

    /// Other nodes below the same parent, in order
    pub async fn siblings(&self, tenant: &str, id: NodeId) -> Result<Vec<Node>> {
        let conn = self.db.connect_with_timeout().await?;
        let node = require_node(&conn, tenant, id).await?;

        let all = match node.parent_id {
            Some(parent) => {
                let parent = require_node(&conn, tenant, parent).await?;
                node_store::children_of(&conn, &parent).await?
            }
            None => node_store::roots(&conn, tenant).await?,
        };
        Ok(all.into_iter().filter(|n| n.id != id).collect())
    }

    pub async fn roots(&self, tenant: &str) -> Result<Vec<Node>> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(node_store::roots(&conn, tenant).await?)
    }

    pub async fn is_self_or_descendant_of(&self, tenant: &str, a: NodeId, b: NodeId) -> Result<bool> {
        let conn = self.db.connect_with_timeout().await?;
        let a = require_node(&conn, tenant, a).await?;
        let b = require_node(&conn, tenant, b).await?;
        Ok(a.is_self_or_descendant_of(&b))
    }

    /// Node owning `(domain, path)`
    pub async fn find_by_path(&self, tenant: &str, domain: &str, path: &str) -> Result<Option<Node>> {
        let conn = self.db.connect_with_timeout().await?;
        match node_store::find_by_path(&conn, tenant, domain, path).await? {
            Some(id) => Ok(node_store::get_node(&conn, tenant, id).await?),
            None => Ok(None),
        }
    }

    /// Audit the stored numbering of a tenant
    pub async fn validate_tree(&self, tenant: &str) -> Result<usize> {
        let conn = self.db.connect_with_timeout().await?;
        let set = load_set(&conn, tenant, None).await.inspect_err(|e| {
            tracing::warn!("Tree of tenant '{}' failed validation: {}", tenant, e);
        })?;
        Ok(set.len())
    }
}
