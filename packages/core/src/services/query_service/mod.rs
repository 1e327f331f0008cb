//! Query Service
//!
//! Executes listing requests for pages, elements and files:
//!
//! 1. the filter builder turns the request into a `QueryPlan`
//! 2. `db::sql::compile` produces the id and count statements
//! 3. the matching entities are hydrated with their latest version
//!
//! Listings are lock-free reads. An entity that vanishes between the id
//! query and hydration is left out of the page.

use crate::db::sql::{compile, CompiledQuery};
use crate::db::{codec, node_store, version_store, DatabaseService, SqlContext};
use crate::models::{Element, File, Node, NodeId, Version, Versionable};
use crate::query::{
    build_element_plan, build_file_plan, build_page_plan, ElementFilter, FileFilter, PageFilter,
    PageLimits, Paginated, QueryPlan, QueryRequest,
};
use crate::services::error::Result;
use chrono::Utc;
use libsql::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Page node with its latest version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageItem {
    pub node: Node,
    pub latest: Option<Version>,
}

impl PageItem {
    /// Core field of the latest version, empty when missing
    pub fn field(&self, key: &str) -> &str {
        self.latest.as_ref().map(|v| v.data_str(key)).unwrap_or_default()
    }
}

async fn run_ids(conn: &Connection, compiled: CompiledQuery) -> Result<(Vec<String>, u64)> {
    let mut rows = conn
        .query(
            &compiled.count_sql,
            libsql::params::Params::Positional(compiled.count_params),
        )
        .await
        .sql_context("Failed to count query results")?;
    let total = match rows.next().await.sql_context("Failed to read count")? {
        Some(row) => codec::column::<i64>(&row, 0, "count")?.max(0) as u64,
        None => 0,
    };

    let mut rows = conn
        .query(
            &compiled.select_sql,
            libsql::params::Params::Positional(compiled.select_params),
        )
        .await
        .sql_context("Failed to run query")?;

    let mut ids = Vec::new();
    while let Some(row) = rows.next().await.sql_context("Failed to read query row")? {
        ids.push(codec::column::<String>(&row, 0, "id")?);
    }
    Ok((ids, total))
}

fn by_entity(versions: Vec<Version>) -> HashMap<String, Version> {
    versions
        .into_iter()
        .map(|v| (v.versionable_id.clone(), v))
        .collect()
}

#[derive(Clone)]
pub struct QueryService {
    db: Arc<DatabaseService>,
    limits: PageLimits,
}

impl QueryService {
    pub fn new(db: Arc<DatabaseService>, limits: PageLimits) -> Self {
        Self { db, limits }
    }

    async fn matching(&self, tenant: &str, plan: &QueryPlan) -> Result<(Connection, Vec<String>, u64)> {
        tracing::debug!(
            "Listing {} with {} sort key(s), page {}",
            plan.entity,
            plan.sort.len(),
            plan.paging.page
        );

        let conn = self.db.connect_with_timeout().await?;
        let compiled = compile(plan, tenant, Utc::now());
        let (ids, total) = run_ids(&conn, compiled).await?;
        Ok((conn, ids, total))
    }

    pub async fn pages(
        &self,
        tenant: &str,
        request: &QueryRequest<PageFilter>,
    ) -> Result<Paginated<PageItem>> {
        let plan = build_page_plan(request, &self.limits)?;
        let (conn, ids, total) = self.matching(tenant, &plan).await?;

        let mut versions = by_entity(
            version_store::current_for_many(&conn, Versionable::Page, &ids, None).await?,
        );

        let mut items = Vec::with_capacity(ids.len());
        for id in &ids {
            let Ok(node_id) = id.parse::<NodeId>() else {
                continue;
            };
            if let Some(node) = node_store::get_node(&conn, tenant, node_id).await? {
                items.push(PageItem {
                    node,
                    latest: versions.remove(id),
                });
            }
        }

        Ok(Paginated {
            items,
            page: plan.paging.page,
            per_page: plan.paging.per_page,
            total,
        })
    }

    /// Reusable elements with their latest version, unversioned rows skipped
    pub async fn elements(
        &self,
        tenant: &str,
        request: &QueryRequest<ElementFilter>,
    ) -> Result<Paginated<Element>> {
        let plan = build_element_plan(request, &self.limits)?;
        let (conn, ids, total) = self.matching(tenant, &plan).await?;

        let versions = by_entity(
            version_store::current_for_many(&conn, Versionable::Element, &ids, None).await?,
        );

        let mut items = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(version) = versions.get(id) {
                let files = version_store::attached_files(&conn, version.id).await?;
                items.push(Element::from_version(version, files));
            }
        }

        Ok(Paginated {
            items,
            page: plan.paging.page,
            per_page: plan.paging.per_page,
            total,
        })
    }

    pub async fn files(
        &self,
        tenant: &str,
        request: &QueryRequest<FileFilter>,
    ) -> Result<Paginated<File>> {
        let plan = build_file_plan(request, &self.limits)?;
        let (conn, ids, total) = self.matching(tenant, &plan).await?;

        let versions = by_entity(
            version_store::current_for_many(&conn, Versionable::File, &ids, None).await?,
        );

        let items = ids
            .iter()
            .filter_map(|id| versions.get(id))
            .map(File::from_version)
            .collect();

        Ok(Paginated {
            items,
            page: plan.paging.page,
            per_page: plan.paging.per_page,
            total,
        })
    }
}

#[cfg(test)]
mod query_service_test;
