//! Agent Tools
//!
//! In-process tools offered to the model during synthesize and manage runs:
//!
//! - `get-locales`: languages pages may be written in
//! - `pages`: page tree listing, one level at a time
//! - `create-page`: adds one page with a single text element
//!
//! Tool results are JSON strings handed back to the model. A registry lives
//! for one run; `create-page` refuses a second page within the same run.

use crate::auth::{capability, AccessContext};
use crate::models::{ContentElement, ElementKind, NodeId, Versionable};
use crate::query::{PageFilter, QueryRequest, SortSpec};
use crate::services::error::{CmsError, Result};
use crate::services::page_service::{PageService, Placement};
use crate::services::query_service::{PageItem, QueryService};
use crate::utils::{slugify, uid};
use async_trait::async_trait;
use pagetree_ai::{ParameterKind, ToolCall, ToolSpec};
use serde_json::{json, Map, Value};

pub const CREATE_PAGE: &str = "create-page";
pub const GET_LOCALES: &str = "get-locales";
pub const PAGES: &str = "pages";

const PAGES_LIMIT: u32 = 100;

/// Tools the orchestrator dispatches calls to
#[async_trait]
pub trait ToolRegistry: Send {
    fn specs(&self) -> Vec<ToolSpec>;

    /// Run one call and return the text handed back to the model
    async fn call(&mut self, call: &ToolCall) -> Result<String>;
}

pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            GET_LOCALES,
            "Returns the ISO language codes pages can be written in.",
        ),
        ToolSpec::new(
            PAGES,
            "Lists pages of the page tree as JSON array. Without parent_id the root pages are returned.",
        )
        .with_parameter(
            "parent_id",
            ParameterKind::Number,
            "ID of the page whose child pages are listed.",
            false,
        )
        .with_parameter(
            "title",
            ParameterKind::String,
            "Only pages whose title starts with this text.",
            false,
        ),
        ToolSpec::new(
            CREATE_PAGE,
            "Creates a new page and adds it to the page tree. Returns the added page and its content as JSON object.",
        )
        .with_parameter(
            "lang",
            ParameterKind::String,
            "ISO language code from the get-locales tool, e.g. \"en\" or \"en-GB\".",
            true,
        )
        .with_parameter(
            "title",
            ParameterKind::String,
            "SEO optimized page title in the language of the page. Must be unique for each page.",
            true,
        )
        .with_parameter(
            "name",
            ParameterKind::String,
            "Short menu name in the language of the page, at most 30 characters.",
            true,
        )
        .with_parameter(
            "content",
            ParameterKind::String,
            "Page content in the language of the page, formatted as markdown.",
            true,
        )
        .with_parameter(
            "parent_id",
            ParameterKind::Number,
            "ID of the parent page from the pages tool the new page is added below.",
            false,
        ),
    ]
}

fn string_arg<'a>(arguments: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| CmsError::validation(format!("Missing tool argument '{}'", name)))
}

fn id_arg(arguments: &Map<String, Value>, name: &str) -> Option<NodeId> {
    match arguments.get(name)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Page as the model sees it: core fields of the latest version plus ids
pub fn page_json(item: &PageItem) -> Value {
    let mut page = item
        .latest
        .as_ref()
        .map(|v| v.data.clone())
        .unwrap_or_default();
    page.insert("id".to_string(), json!(item.node.id));
    page.insert("parent_id".to_string(), json!(item.node.parent_id));
    if let Some(content) = item.latest.as_ref().and_then(|v| v.aux.get("content")) {
        page.insert("content".to_string(), content.clone());
    }
    Value::Object(page)
}

/// Tools backed by the page and query services, one instance per run
pub struct CmsTools {
    pages: PageService,
    queries: QueryService,
    access: AccessContext,
    created: usize,
}

impl CmsTools {
    pub fn new(pages: PageService, queries: QueryService, access: AccessContext) -> Self {
        Self {
            pages,
            queries,
            access,
            created: 0,
        }
    }

    pub fn pages_created(&self) -> usize {
        self.created
    }

    fn locales(&self) -> Value {
        json!(self.pages.config().locales)
    }

    async fn list_pages(&self, arguments: &Map<String, Value>) -> Result<Value> {
        self.access.require(capability::PAGE_VIEW)?;

        let filter = PageFilter {
            parent_id: Some(id_arg(arguments, "parent_id")),
            title: arguments
                .get("title")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            ..Default::default()
        };
        let request = QueryRequest::new(filter)
            .sorted_by(SortSpec::asc("id"))
            .page(1, PAGES_LIMIT);

        let listing = self.queries.pages(&self.access.tenant_id, &request).await?;
        let pages: Vec<Value> = listing
            .items
            .iter()
            .map(|item| {
                json!({
                    "id": item.node.id,
                    "parent_id": item.node.parent_id,
                    "lang": item.field("lang"),
                    "name": item.field("name"),
                    "title": item.field("title"),
                    "path": item.field("path"),
                    "domain": item.field("domain"),
                    "has_children": item.node.descendant_count() > 0,
                })
            })
            .collect();

        Ok(Value::Array(pages))
    }

    async fn create_page(&mut self, arguments: &Map<String, Value>) -> Result<Value> {
        if self.created > 0 {
            return Ok(json!({ "error": "Only one page can be created at a time." }));
        }

        let lang = string_arg(arguments, "lang")?;
        let title = string_arg(arguments, "title")?;
        let name = string_arg(arguments, "name")?;
        let content = string_arg(arguments, "content")?;

        let tenant = self.access.tenant_id.as_str();
        let hierarchy = self.pages.hierarchy();

        let parent = match id_arg(arguments, "parent_id") {
            Some(id) => hierarchy.find(tenant, id).await?,
            None => None,
        };

        let (placement, domain, theme) = match &parent {
            Some(parent) => {
                let latest = self
                    .pages
                    .ledger()
                    .latest(Versionable::Page, &parent.id.to_string())
                    .await?;
                let inherited = |key: &str| {
                    latest
                        .as_ref()
                        .and_then(|v| v.data.get(key).cloned())
                        .unwrap_or(Value::Null)
                };

                let placement = match hierarchy.children(tenant, parent.id).await?.first() {
                    Some(first) => Placement::Before(first.id),
                    None => Placement::Child(parent.id),
                };
                (placement, inherited("domain"), inherited("theme"))
            }
            None => (Placement::Root, Value::Null, Value::Null),
        };

        let element = ContentElement::new(uid(), ElementKind::Text)
            .with_group("main")
            .with_data("text", content);

        let mut input = Map::new();
        input.insert("lang".to_string(), json!(lang));
        input.insert("name".to_string(), json!(name));
        input.insert("title".to_string(), json!(title));
        input.insert("path".to_string(), json!(slugify(title)));
        input.insert("domain".to_string(), domain);
        input.insert("theme".to_string(), theme);
        input.insert("content".to_string(), serde_json::to_value(vec![element])?);

        let page = self.pages.create_page(&self.access, &input, placement).await?;
        self.created += 1;

        tracing::info!(
            "Agent created page {} '{}' below {:?}",
            page.node.id,
            title,
            page.node.parent_id
        );
        Ok(page_json(&page))
    }
}

#[async_trait]
impl ToolRegistry for CmsTools {
    fn specs(&self) -> Vec<ToolSpec> {
        tool_specs()
    }

    async fn call(&mut self, call: &ToolCall) -> Result<String> {
        tracing::debug!("Tool call {} ({} argument(s))", call.name, call.arguments.len());

        let result = match call.name.as_str() {
            GET_LOCALES => self.locales(),
            PAGES => self.list_pages(&call.arguments).await?,
            CREATE_PAGE => self.create_page(&call.arguments).await?,
            unknown => json!({ "error": format!("Unknown tool '{}'", unknown) }),
        };

        Ok(serde_json::to_string(&result)?)
    }
}
