//! Identity rows of reusable elements and files
//!
//! Their content lives in versions like the content of pages; the rows here
//! only anchor ownership and the soft delete marker.

use super::codec::{column, parse_optional_timestamp, parse_timestamp, timestamp};
use super::error::{DatabaseError, SqlContext};
use crate::models::Versionable;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    pub id: String,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

fn table(kind: Versionable) -> Result<&'static str, DatabaseError> {
    match kind {
        Versionable::Element | Versionable::File => Ok(kind.table()),
        Versionable::Page => Err(DatabaseError::invalid_data(
            "pages are stored as nodes, not entity rows",
        )),
    }
}

pub async fn insert_entity(
    conn: &Connection,
    kind: Versionable,
    tenant: &str,
    id: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let sql = format!(
        "INSERT INTO {} (id, tenant_id, created_at) VALUES (?, ?, ?)",
        table(kind)?
    );
    conn.execute(&sql, params![id, tenant, timestamp(now)])
        .await
        .sql_context("Failed to insert entity")?;
    Ok(())
}

pub async fn get_entity(
    conn: &Connection,
    kind: Versionable,
    tenant: &str,
    id: &str,
) -> Result<Option<EntityRow>, DatabaseError> {
    let sql = format!(
        "SELECT id, tenant_id, created_at, deleted_at FROM {} WHERE tenant_id = ? AND id = ?",
        table(kind)?
    );
    let mut rows = conn
        .query(&sql, params![tenant, id])
        .await
        .sql_context("Failed to get entity")?;

    match rows.next().await.sql_context("Failed to read entity")? {
        Some(row) => Ok(Some(EntityRow {
            id: column(&row, 0, "id")?,
            tenant_id: column(&row, 1, "tenant_id")?,
            created_at: parse_timestamp(&column::<String>(&row, 2, "created_at")?)?,
            deleted_at: parse_optional_timestamp(column(&row, 3, "deleted_at")?)?,
        })),
        None => Ok(None),
    }
}

/// Subset of `ids` that exist for the tenant, in input order
pub async fn existing_ids(
    conn: &Connection,
    kind: Versionable,
    tenant: &str,
    ids: &[String],
) -> Result<Vec<String>, DatabaseError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT id FROM {} WHERE tenant_id = ? AND id IN ({})",
        table(kind)?,
        vec!["?"; ids.len()].join(", ")
    );
    let mut values: Vec<Value> = vec![tenant.into()];
    values.extend(ids.iter().map(|id| Value::from(id.as_str())));

    let mut rows = conn
        .query(&sql, libsql::params::Params::Positional(values))
        .await
        .sql_context("Failed to check entity ids")?;

    let mut found = std::collections::HashSet::new();
    while let Some(row) = rows.next().await.sql_context("Failed to read entity id")? {
        found.insert(column::<String>(&row, 0, "id")?);
    }

    let mut seen = std::collections::HashSet::new();
    Ok(ids
        .iter()
        .filter(|id| found.contains(*id) && seen.insert(id.as_str()))
        .cloned()
        .collect())
}

pub async fn set_entity_deleted(
    conn: &Connection,
    kind: Versionable,
    tenant: &str,
    id: &str,
    deleted_at: Option<DateTime<Utc>>,
) -> Result<u64, DatabaseError> {
    let sql = format!(
        "UPDATE {} SET deleted_at = ? WHERE tenant_id = ? AND id = ?",
        table(kind)?
    );
    conn.execute(&sql, params![deleted_at.map(timestamp), tenant, id])
        .await
        .sql_context("Failed to update soft delete marker")
}
