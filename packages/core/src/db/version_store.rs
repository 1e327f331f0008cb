//! Version persistence
//!
//! Versions are append-only. Apart from inserts, the only writes are the
//! publish flags of the latest version, the promotion of due scheduled
//! versions and pruning.

use super::codec::{column, json_map, json_text, parse_optional_timestamp, parse_timestamp, timestamp};
use super::error::{DatabaseError, SqlContext};
use crate::models::{NewVersion, Version, Versionable};
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row, Value};

pub(crate) const VERSION_COLUMNS: &str = "v.id, v.versionable_type, v.versionable_id, v.lang, v.editor, \
     v.published, v.publish_at, v.data, v.aux, v.created_at, v.deleted_at";

/// Effective version condition on alias `v`, binds one timestamp
pub(crate) const EFFECTIVE_CONDITION: &str =
    "v.deleted_at IS NULL AND v.published = 1 AND (v.publish_at IS NULL OR v.publish_at <= ?)";

pub(crate) fn version_from_row(row: &Row) -> Result<Version, DatabaseError> {
    let kind: String = column(row, 1, "versionable_type")?;

    Ok(Version {
        id: column(row, 0, "id")?,
        versionable: kind.parse().map_err(DatabaseError::invalid_data)?,
        versionable_id: column(row, 2, "versionable_id")?,
        lang: column(row, 3, "lang")?,
        editor: column(row, 4, "editor")?,
        published: column::<i64>(row, 5, "published")? != 0,
        publish_at: parse_optional_timestamp(column(row, 6, "publish_at")?)?,
        data: json_map(&column::<String>(row, 7, "data")?)?,
        aux: json_map(&column::<String>(row, 8, "aux")?)?,
        created_at: parse_timestamp(&column::<String>(row, 9, "created_at")?)?,
        deleted_at: parse_optional_timestamp(column(row, 10, "deleted_at")?)?,
    })
}

pub(crate) async fn collect_versions(mut rows: libsql::Rows) -> Result<Vec<Version>, DatabaseError> {
    let mut versions = Vec::new();
    while let Some(row) = rows.next().await.sql_context("Failed to read version row")? {
        versions.push(version_from_row(&row)?);
    }
    Ok(versions)
}

/// Append a version and attach its elements and files
pub async fn insert_version(
    conn: &Connection,
    tenant: &str,
    kind: Versionable,
    entity_id: &str,
    input: &NewVersion,
    now: DateTime<Utc>,
) -> Result<Version, DatabaseError> {
    let published = input.published && input.publish_at.is_none();

    conn.execute(
        "INSERT INTO versions
            (tenant_id, versionable_type, versionable_id, lang, editor, published, publish_at, data, aux, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            tenant,
            kind.as_str(),
            entity_id,
            input.lang.clone(),
            input.editor.as_str(),
            i64::from(published),
            input.publish_at.map(timestamp),
            json_text(&input.data)?,
            json_text(&input.aux)?,
            timestamp(now)
        ],
    )
    .await
    .sql_context("Failed to insert version")?;

    let id = conn.last_insert_rowid();

    for (position, element_id) in input.elements.iter().enumerate() {
        conn.execute(
            "INSERT OR IGNORE INTO version_elements (version_id, element_id, position) VALUES (?, ?, ?)",
            params![id, element_id.as_str(), position as i64],
        )
        .await
        .sql_context("Failed to attach element")?;
    }

    for (position, file_id) in input.files.iter().enumerate() {
        conn.execute(
            "INSERT OR IGNORE INTO version_files (version_id, file_id, position) VALUES (?, ?, ?)",
            params![id, file_id.as_str(), position as i64],
        )
        .await
        .sql_context("Failed to attach file")?;
    }

    Ok(Version {
        id,
        versionable: kind,
        versionable_id: entity_id.to_string(),
        lang: input.lang.clone(),
        editor: input.editor.clone(),
        published,
        publish_at: input.publish_at,
        data: input.data.clone(),
        aux: input.aux.clone(),
        created_at: now,
        deleted_at: None,
    })
}

pub async fn get_version(conn: &Connection, id: i64) -> Result<Option<Version>, DatabaseError> {
    let sql = format!("SELECT {} FROM versions v WHERE v.id = ?", VERSION_COLUMNS);
    let rows = conn
        .query(&sql, params![id])
        .await
        .sql_context("Failed to get version")?;
    Ok(collect_versions(rows).await?.into_iter().next())
}

/// Most recently created, non-deleted version
pub async fn latest(
    conn: &Connection,
    kind: Versionable,
    entity_id: &str,
) -> Result<Option<Version>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM versions v
         WHERE v.versionable_type = ? AND v.versionable_id = ? AND v.deleted_at IS NULL
         ORDER BY v.id DESC LIMIT 1",
        VERSION_COLUMNS
    );
    let rows = conn
        .query(&sql, params![kind.as_str(), entity_id])
        .await
        .sql_context("Failed to get latest version")?;
    Ok(collect_versions(rows).await?.into_iter().next())
}

/// Greatest id among published versions whose `publish_at` has passed
pub async fn effective(
    conn: &Connection,
    kind: Versionable,
    entity_id: &str,
    lang: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<Version>, DatabaseError> {
    let mut sql = format!(
        "SELECT {} FROM versions v
         WHERE v.versionable_type = ? AND v.versionable_id = ? AND {}",
        VERSION_COLUMNS, EFFECTIVE_CONDITION
    );
    let mut values: Vec<Value> = vec![
        kind.as_str().into(),
        entity_id.into(),
        timestamp(now).into(),
    ];

    if let Some(lang) = lang {
        sql.push_str(" AND v.lang = ?");
        values.push(lang.into());
    }
    sql.push_str(" ORDER BY v.id DESC LIMIT 1");

    let rows = conn
        .query(&sql, libsql::params::Params::Positional(values))
        .await
        .sql_context("Failed to get effective version")?;
    Ok(collect_versions(rows).await?.into_iter().next())
}

/// Latest or effective version of many entities at once
pub async fn current_for_many(
    conn: &Connection,
    kind: Versionable,
    ids: &[String],
    effective_at: Option<DateTime<Utc>>,
) -> Result<Vec<Version>, DatabaseError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut values: Vec<Value> = vec![kind.as_str().into()];
    values.extend(ids.iter().map(|id| Value::from(id.as_str())));

    let condition = match effective_at {
        Some(now) => {
            values.push(timestamp(now).into());
            EFFECTIVE_CONDITION
        }
        None => "v.deleted_at IS NULL",
    };

    let sql = format!(
        "SELECT {cols} FROM versions v WHERE v.id IN (
            SELECT MAX(v.id) FROM versions v
            WHERE v.versionable_type = ? AND v.versionable_id IN ({placeholders}) AND {condition}
            GROUP BY v.versionable_id
         )",
        cols = VERSION_COLUMNS,
        placeholders = placeholders,
        condition = condition,
    );

    let rows = conn
        .query(&sql, libsql::params::Params::Positional(values))
        .await
        .sql_context("Failed to load current versions")?;
    collect_versions(rows).await
}

/// Non-deleted versions, newest first
pub async fn history(
    conn: &Connection,
    kind: Versionable,
    entity_id: &str,
    limit: usize,
) -> Result<Vec<Version>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM versions v
         WHERE v.versionable_type = ? AND v.versionable_id = ? AND v.deleted_at IS NULL
         ORDER BY v.id DESC LIMIT ?",
        VERSION_COLUMNS
    );
    let rows = conn
        .query(&sql, params![kind.as_str(), entity_id, limit as i64])
        .await
        .sql_context("Failed to load version history")?;
    collect_versions(rows).await
}

/// Publish now (`at = None`) or schedule a version
pub async fn set_publication(
    conn: &Connection,
    version_id: i64,
    at: Option<DateTime<Utc>>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE versions SET published = ?, publish_at = ? WHERE id = ?",
        params![i64::from(at.is_none()), at.map(timestamp), version_id],
    )
    .await
    .sql_context("Failed to update publication")?;
    Ok(())
}

/// Scheduled versions of one tenant whose time has come
pub async fn due_versions(
    conn: &Connection,
    tenant: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Version>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM versions v
         WHERE v.tenant_id = ? AND v.published = 0
           AND v.publish_at IS NOT NULL AND v.publish_at <= ?
           AND v.deleted_at IS NULL
         ORDER BY v.id",
        VERSION_COLUMNS
    );
    let rows = conn
        .query(&sql, params![tenant, timestamp(now)])
        .await
        .sql_context("Failed to load due versions")?;
    collect_versions(rows).await
}

pub async fn mark_published(conn: &Connection, version_id: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE versions SET published = 1 WHERE id = ? AND published = 0",
        params![version_id],
    )
    .await
    .sql_context("Failed to promote version")?;
    Ok(())
}

/// Ids of an entity's versions, newest first
pub async fn version_ids(
    conn: &Connection,
    kind: Versionable,
    entity_id: &str,
) -> Result<Vec<i64>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id FROM versions
             WHERE versionable_type = ? AND versionable_id = ? AND deleted_at IS NULL
             ORDER BY id DESC",
            params![kind.as_str(), entity_id],
        )
        .await
        .sql_context("Failed to list versions")?;

    let mut ids = Vec::new();
    while let Some(row) = rows.next().await.sql_context("Failed to read version id")? {
        ids.push(column(&row, 0, "id")?);
    }
    Ok(ids)
}

/// Hard delete versions, join rows cascade
pub async fn delete_versions(conn: &Connection, ids: &[i64]) -> Result<u64, DatabaseError> {
    let mut removed = 0;
    for id in ids {
        removed += conn
            .execute("DELETE FROM versions WHERE id = ?", params![*id])
            .await
            .sql_context("Failed to delete version")?;
    }
    Ok(removed)
}

/// Delete every version of an entity
pub async fn delete_all(
    conn: &Connection,
    kind: Versionable,
    entity_id: &str,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "DELETE FROM versions WHERE versionable_type = ? AND versionable_id = ?",
        params![kind.as_str(), entity_id],
    )
    .await
    .sql_context("Failed to delete versions")
}

async fn attached(
    conn: &Connection,
    table: &str,
    column_name: &str,
    version_id: i64,
) -> Result<Vec<String>, DatabaseError> {
    let sql = format!(
        "SELECT {col} FROM {table} WHERE version_id = ? ORDER BY position",
        col = column_name,
        table = table
    );
    let mut rows = conn
        .query(&sql, params![version_id])
        .await
        .sql_context("Failed to load attachments")?;

    let mut ids = Vec::new();
    while let Some(row) = rows.next().await.sql_context("Failed to read attachment")? {
        ids.push(column(&row, 0, column_name)?);
    }
    Ok(ids)
}

pub async fn attached_elements(
    conn: &Connection,
    version_id: i64,
) -> Result<Vec<String>, DatabaseError> {
    attached(conn, "version_elements", "element_id", version_id).await
}

pub async fn attached_files(
    conn: &Connection,
    version_id: i64,
) -> Result<Vec<String>, DatabaseError> {
    attached(conn, "version_files", "file_id", version_id).await
}
