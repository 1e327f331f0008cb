//! Node and route persistence
//!
//! Low level reads and writes of the structural `nodes` rows and their
//! `routes`. Functions take a connection so callers can group several of
//! them into one transaction.

use super::codec::{column, parse_optional_timestamp, parse_timestamp, timestamp};
use super::error::{DatabaseError, SqlContext};
use crate::hierarchy::{Interval, Renumbering};
use crate::models::{Node, NodeId, Route};
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row};

const NODE_COLUMNS: &str = "id, tenant_id, parent_id, lft, rgt, depth, created_at, deleted_at";

fn node_from_row(row: &Row) -> Result<Node, DatabaseError> {
    Ok(Node {
        id: column(row, 0, "id")?,
        tenant_id: column(row, 1, "tenant_id")?,
        parent_id: column::<Option<i64>>(row, 2, "parent_id")?,
        left: column(row, 3, "lft")?,
        right: column(row, 4, "rgt")?,
        depth: column(row, 5, "depth")?,
        created_at: parse_timestamp(&column::<String>(row, 6, "created_at")?)?,
        deleted_at: parse_optional_timestamp(column(row, 7, "deleted_at")?)?,
    })
}

async fn collect_nodes(mut rows: libsql::Rows) -> Result<Vec<Node>, DatabaseError> {
    let mut nodes = Vec::new();
    while let Some(row) = rows.next().await.sql_context("Failed to read node row")? {
        nodes.push(node_from_row(&row)?);
    }
    Ok(nodes)
}

/// Every node of a tenant (trashed ones included), in document order
///
/// `exclude` skips a row that has been inserted but not yet numbered.
pub async fn load_arena(
    conn: &Connection,
    tenant: &str,
    exclude: Option<NodeId>,
) -> Result<Vec<Node>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM nodes WHERE tenant_id = ? AND id != ? ORDER BY lft",
        NODE_COLUMNS
    );
    let rows = conn
        .query(&sql, params![tenant, exclude.unwrap_or(0)])
        .await
        .sql_context("Failed to load node arena")?;
    collect_nodes(rows).await
}

pub async fn get_node(
    conn: &Connection,
    tenant: &str,
    id: NodeId,
) -> Result<Option<Node>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM nodes WHERE tenant_id = ? AND id = ?",
        NODE_COLUMNS
    );
    let rows = conn
        .query(&sql, params![tenant, id])
        .await
        .sql_context("Failed to get node")?;
    Ok(collect_nodes(rows).await?.into_iter().next())
}

/// Nodes whose interval lies within `[left, right]`, in document order
pub async fn nodes_in_range(
    conn: &Connection,
    tenant: &str,
    left: i64,
    right: i64,
) -> Result<Vec<Node>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM nodes WHERE tenant_id = ? AND lft >= ? AND rgt <= ? ORDER BY lft",
        NODE_COLUMNS
    );
    let rows = conn
        .query(&sql, params![tenant, left, right])
        .await
        .sql_context("Failed to load subtree")?;
    collect_nodes(rows).await
}

/// Insert an unnumbered row and return its id
///
/// The row keeps `lft = rgt = 0` until `apply_renumbering` writes the
/// interval computed for it in the same transaction.
pub async fn insert_placeholder(
    conn: &Connection,
    tenant: &str,
    now: DateTime<Utc>,
) -> Result<NodeId, DatabaseError> {
    conn.execute(
        "INSERT INTO nodes (tenant_id, parent_id, lft, rgt, depth, created_at)
         VALUES (?, NULL, 0, 0, 0, ?)",
        params![tenant, timestamp(now)],
    )
    .await
    .sql_context("Failed to insert node")?;

    Ok(conn.last_insert_rowid())
}

/// Write a renumbering computed against the arena read in this transaction
///
/// Each update is guarded by the bounds it was computed from. A row that
/// changed in between fails the write with `StaleWrite`.
pub async fn apply_renumbering(
    conn: &Connection,
    tenant: &str,
    change: &Renumbering,
) -> Result<(), DatabaseError> {
    for (id, before, after) in &change.updated {
        let affected = conn
            .execute(
                "UPDATE nodes SET lft = ?, rgt = ?, depth = ?, parent_id = ?
                 WHERE tenant_id = ? AND id = ? AND lft = ? AND rgt = ?",
                params![
                    after.left,
                    after.right,
                    after.depth,
                    after.parent_id,
                    tenant,
                    *id,
                    before.left,
                    before.right
                ],
            )
            .await
            .sql_context("Failed to renumber node")?;

        if affected == 0 {
            return Err(DatabaseError::stale_write(format!(
                "node {} no longer at [{}, {}]",
                id, before.left, before.right
            )));
        }
    }

    if let Some((id, interval)) = &change.inserted {
        write_interval(conn, tenant, *id, interval).await?;
    }

    for id in &change.removed {
        conn.execute(
            "DELETE FROM nodes WHERE tenant_id = ? AND id = ?",
            params![tenant, *id],
        )
        .await
        .sql_context("Failed to delete node")?;
    }

    Ok(())
}

async fn write_interval(
    conn: &Connection,
    tenant: &str,
    id: NodeId,
    interval: &Interval,
) -> Result<(), DatabaseError> {
    let affected = conn
        .execute(
            "UPDATE nodes SET lft = ?, rgt = ?, depth = ?, parent_id = ?
             WHERE tenant_id = ? AND id = ?",
            params![
                interval.left,
                interval.right,
                interval.depth,
                interval.parent_id,
                tenant,
                id
            ],
        )
        .await
        .sql_context("Failed to number new node")?;

    if affected == 0 {
        return Err(DatabaseError::stale_write(format!("node {} vanished", id)));
    }
    Ok(())
}

/// Set or clear the soft delete marker of every node in `[left, right]`
pub async fn set_deleted_range(
    conn: &Connection,
    tenant: &str,
    left: i64,
    right: i64,
    deleted_at: Option<DateTime<Utc>>,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE nodes SET deleted_at = ? WHERE tenant_id = ? AND lft >= ? AND rgt <= ?",
        params![deleted_at.map(timestamp), tenant, left, right],
    )
    .await
    .sql_context("Failed to update soft delete marker")
}

/// Strict ancestors of a node, root first
pub async fn ancestors_of(conn: &Connection, node: &Node) -> Result<Vec<Node>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM nodes WHERE tenant_id = ? AND lft < ? AND rgt > ? ORDER BY lft",
        NODE_COLUMNS
    );
    let rows = conn
        .query(&sql, params![node.tenant_id.as_str(), node.left, node.right])
        .await
        .sql_context("Failed to load ancestors")?;
    collect_nodes(rows).await
}

/// Strict descendants of a node in document order
pub async fn descendants_of(conn: &Connection, node: &Node) -> Result<Vec<Node>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM nodes WHERE tenant_id = ? AND lft > ? AND rgt < ? ORDER BY lft",
        NODE_COLUMNS
    );
    let rows = conn
        .query(&sql, params![node.tenant_id.as_str(), node.left, node.right])
        .await
        .sql_context("Failed to load descendants")?;
    collect_nodes(rows).await
}

/// Direct children: one level deeper inside the interval
pub async fn children_of(conn: &Connection, node: &Node) -> Result<Vec<Node>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM nodes WHERE tenant_id = ? AND lft > ? AND rgt < ? AND depth = ? ORDER BY lft",
        NODE_COLUMNS
    );
    let rows = conn
        .query(
            &sql,
            params![node.tenant_id.as_str(), node.left, node.right, node.depth + 1],
        )
        .await
        .sql_context("Failed to load children")?;
    collect_nodes(rows).await
}

pub async fn roots(conn: &Connection, tenant: &str) -> Result<Vec<Node>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM nodes WHERE tenant_id = ? AND parent_id IS NULL AND lft > 0 ORDER BY lft",
        NODE_COLUMNS
    );
    let rows = conn
        .query(&sql, params![tenant])
        .await
        .sql_context("Failed to load root nodes")?;
    collect_nodes(rows).await
}

//
// ROUTES
//

/// Claim `(domain, path)` for a node, replacing its previous route
///
/// Fails with `UniqueViolation` when another node of the tenant owns the
/// address.
pub async fn upsert_route(conn: &Connection, route: &Route) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO routes (node_id, tenant_id, domain, path) VALUES (?, ?, ?, ?)
         ON CONFLICT(node_id) DO UPDATE SET domain = excluded.domain, path = excluded.path",
        params![
            route.node_id,
            route.tenant_id.as_str(),
            route.domain.as_str(),
            route.path.as_str()
        ],
    )
    .await
    .sql_context("Failed to store route")?;
    Ok(())
}

pub async fn get_route(
    conn: &Connection,
    tenant: &str,
    node_id: NodeId,
) -> Result<Option<Route>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT node_id, tenant_id, domain, path FROM routes WHERE tenant_id = ? AND node_id = ?",
            params![tenant, node_id],
        )
        .await
        .sql_context("Failed to get route")?;

    match rows.next().await.sql_context("Failed to read route")? {
        Some(row) => Ok(Some(Route {
            node_id: column(&row, 0, "node_id")?,
            tenant_id: column(&row, 1, "tenant_id")?,
            domain: column(&row, 2, "domain")?,
            path: column(&row, 3, "path")?,
        })),
        None => Ok(None),
    }
}

/// Node owning an address, trashed pages included
pub async fn find_by_path(
    conn: &Connection,
    tenant: &str,
    domain: &str,
    path: &str,
) -> Result<Option<NodeId>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT node_id FROM routes WHERE tenant_id = ? AND domain = ? AND path = ?",
            params![tenant, domain, path],
        )
        .await
        .sql_context("Failed to look up route")?;

    match rows.next().await.sql_context("Failed to read route")? {
        Some(row) => Ok(Some(column(&row, 0, "node_id")?)),
        None => Ok(None),
    }
}
