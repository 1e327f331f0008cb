//! Blog listing action
//!
//! Lists the child pages of `data.parent-page` (the current page when
//! unset) with status 1, ordered by `data.order` (`-id` by default, a
//! leading `-` sorts descending) and limited to `data.limit` entries
//! (default 10). Each entry keeps only its `article` elements and the files
//! they use.

use super::{ActionInput, ContentAction};
use crate::db::{version_store, DatabaseService};
use crate::models::{ContentElement, ElementKind, NodeId, Versionable};
use crate::query::{PageFilter, PublishFilter, QueryRequest, SortSpec};
use crate::services::content_resolver::{collect_files, resolve, version_lang, ContentView};
use crate::services::content_service::load_pools;
use crate::services::error::Result;
use crate::services::query_service::QueryService;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const DEFAULT_LIMIT: u32 = 10;

pub struct BlogAction {
    db: Arc<DatabaseService>,
    queries: QueryService,
}

impl BlogAction {
    pub fn new(db: Arc<DatabaseService>, queries: QueryService) -> Self {
        Self { db, queries }
    }
}

/// `parent-page` is stored as a `{value, label}` pair by the editor
fn parent_page(data: &Map<String, Value>) -> Option<NodeId> {
    let value = data.get("parent-page")?;
    let value = value.get("value").unwrap_or(value);
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn sort_spec(data: &Map<String, Value>) -> SortSpec {
    let order = data
        .get("order")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("-id");

    match order.strip_prefix('-') {
        Some(column) => SortSpec::desc(column),
        None => SortSpec::asc(order),
    }
}

fn positive(data: &Map<String, Value>, key: &str) -> Option<u32> {
    let value = data.get(key)?;
    let n = value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))?;
    u32::try_from(n).ok().filter(|n| *n > 0)
}

#[async_trait]
impl ContentAction for BlogAction {
    async fn run(&self, input: ActionInput<'_>) -> Result<Value> {
        let data = &input.item.data;
        let parent = parent_page(data).unwrap_or(input.page.id);

        let mut request = QueryRequest::new(PageFilter {
            parent_id: Some(Some(parent)),
            status: Some(1),
            ..Default::default()
        })
        .sorted_by(sort_spec(data))
        .page(
            positive(data, "page").unwrap_or(1),
            positive(data, "limit").unwrap_or(DEFAULT_LIMIT),
        );
        if input.view == ContentView::Published {
            request = request.publish(PublishFilter::Published);
        }

        let listing = self.queries.pages(&input.page.tenant_id, &request).await?;
        let conn = self.db.connect_with_timeout().await?;
        let now = Utc::now();

        let mut entries = Vec::with_capacity(listing.items.len());
        for item in listing.items {
            let version = match input.view {
                ContentView::Preview => item.latest,
                ContentView::Published => {
                    version_store::effective(&conn, Versionable::Page, &item.node.id.to_string(), None, now)
                        .await?
                }
            };
            let Some(version) = version else {
                continue;
            };

            let articles: Vec<ContentElement> =
                ContentElement::list_from_value(version.aux.get("content"))
                    .into_iter()
                    .filter(|e| e.kind == ElementKind::Article)
                    .collect();

            let (elements, files) = load_pools(&conn, &version, input.view, now).await?;
            let sections = resolve(&articles, &elements, &files, version_lang(&version));
            let content: Vec<_> = sections.iter().flat_map(|s| s.elements.clone()).collect();

            entries.push(json!({
                "id": item.node.id,
                "lang": version.lang,
                "path": version.data_str("path"),
                "name": version.data_str("name"),
                "title": version.data_str("title"),
                "to": version.data_str("to"),
                "domain": version.data_str("domain"),
                "content": content,
                "files": collect_files(&sections),
            }));
        }

        tracing::debug!(
            "Blog action listed {} of {} page(s) below {}",
            entries.len(),
            listing.total,
            parent
        );

        Ok(json!({
            "data": entries,
            "page": listing.page,
            "perPage": listing.per_page,
            "total": listing.total,
        }))
    }
}
