//! Structured filter requests and their translation into plans
//!
//! Translation is pure: no storage access, no side effects. A missing
//! filter key adds no constraint.

use super::plan::{Field, Paging, Predicate, QueryPlan, Sort, SortDirection};
use crate::models::{NodeId, Versionable};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unknown sort column '{column}' for {entity}")]
    UnknownSortColumn { entity: Versionable, column: String },
}

/// Soft delete visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trashed {
    #[default]
    Without,
    With,
    Only,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PublishFilter {
    Published,
    Draft,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Distinguishes `"parent_id": null` from a missing key
fn explicit<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageFilter {
    pub id: Option<Vec<NodeId>>,
    /// `Some(None)` selects root pages
    #[serde(deserialize_with = "explicit")]
    pub parent_id: Option<Option<NodeId>>,
    pub lang: Option<String>,
    pub editor: Option<String>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub to: Option<String>,
    pub tag: Option<String>,
    pub theme: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<i64>,
    pub cache: Option<i64>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub meta: Option<String>,
    pub config: Option<String>,
    pub content: Option<String>,
    pub any: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementFilter {
    pub id: Option<Vec<String>>,
    pub lang: Option<String>,
    pub editor: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub any: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileFilter {
    pub id: Option<Vec<String>>,
    pub lang: Option<String>,
    pub editor: Option<String>,
    pub mime: Option<String>,
    pub name: Option<String>,
    pub any: Option<String>,
}

/// One listing request: filter plus visibility, sort and paging
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest<F> {
    pub filter: F,
    pub sort: Vec<SortSpec>,
    /// Page size
    pub first: Option<u32>,
    /// 1-based page number
    pub page: Option<u32>,
    pub trashed: Trashed,
    pub publish: Option<PublishFilter>,
}

impl<F: Default> QueryRequest<F> {
    pub fn new(filter: F) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn sorted_by(mut self, sort: SortSpec) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn page(mut self, page: u32, first: u32) -> Self {
        self.page = Some(page);
        self.first = Some(first);
        self
    }

    pub fn trashed(mut self, trashed: Trashed) -> Self {
        self.trashed = trashed;
        self
    }

    pub fn publish(mut self, publish: PublishFilter) -> Self {
        self.publish = Some(publish);
        self
    }
}

/// Page size bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_size: u32,
    pub max_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_size: 100,
            max_size: 100,
        }
    }
}

impl PageLimits {
    pub fn paging(&self, page: Option<u32>, first: Option<u32>) -> Paging {
        let max = self.max_size.max(1);
        Paging {
            page: page.unwrap_or(1).max(1),
            per_page: first.unwrap_or(self.default_size).clamp(1, max),
        }
    }
}

fn data(key: &str) -> Field {
    Field::Data(key.to_string())
}

fn aux(key: &str) -> Field {
    Field::Aux(key.to_string())
}

/// Predicates shared by every entity kind
fn visibility(trashed: Trashed, publish: Option<PublishFilter>) -> Vec<Predicate> {
    let mut all = Vec::new();

    match trashed {
        Trashed::Without => all.push(Predicate::NotDeleted),
        Trashed::Only => all.push(Predicate::Deleted),
        Trashed::With => {}
    }

    match publish {
        Some(PublishFilter::Published) => all.push(Predicate::Effective),
        Some(PublishFilter::Draft) => all.push(Predicate::eq(Field::Published, false)),
        Some(PublishFilter::Scheduled) => {
            all.push(Predicate::NotNull(Field::PublishAt));
            all.push(Predicate::eq(Field::Published, false));
        }
        None => {}
    }

    all
}

fn any_of(fields: &[Field], needle: &str) -> Predicate {
    Predicate::Any(
        fields
            .iter()
            .map(|field| Predicate::contains(field.clone(), needle))
            .collect(),
    )
}

fn sort_order(
    entity: Versionable,
    specs: &[SortSpec],
    column: fn(&str) -> Option<Field>,
) -> Result<Vec<Sort>, QueryError> {
    if specs.is_empty() {
        return Ok(vec![Sort {
            field: Field::Id,
            direction: SortDirection::Asc,
        }]);
    }

    specs
        .iter()
        .map(|spec| {
            column(&spec.column.to_ascii_lowercase())
                .map(|field| Sort {
                    field,
                    direction: spec.direction,
                })
                .ok_or_else(|| QueryError::UnknownSortColumn {
                    entity,
                    column: spec.column.clone(),
                })
        })
        .collect()
}

fn page_sort_column(column: &str) -> Option<Field> {
    Some(match column {
        "id" => Field::Id,
        "parent_id" => Field::ParentId,
        "position" | "_lft" => Field::Position,
        "created_at" => Field::CreatedAt,
        "lang" => Field::Lang,
        "editor" => Field::Editor,
        "published" => Field::Published,
        "publish_at" => Field::PublishAt,
        "name" | "title" | "path" | "domain" | "type" | "status" | "theme" | "tag" => data(column),
        _ => return None,
    })
}

fn element_sort_column(column: &str) -> Option<Field> {
    Some(match column {
        "id" => Field::Id,
        "created_at" => Field::CreatedAt,
        "lang" => Field::Lang,
        "editor" => Field::Editor,
        "name" | "type" => data(column),
        _ => return None,
    })
}

fn file_sort_column(column: &str) -> Option<Field> {
    Some(match column {
        "id" => Field::Id,
        "created_at" => Field::CreatedAt,
        "lang" => Field::Lang,
        "editor" => Field::Editor,
        "name" | "mime" => data(column),
        _ => return None,
    })
}

pub fn build_page_plan(
    request: &QueryRequest<PageFilter>,
    limits: &PageLimits,
) -> Result<QueryPlan, QueryError> {
    let filter = &request.filter;
    let mut all = visibility(request.trashed, request.publish);

    if let Some(ids) = &filter.id {
        all.push(Predicate::In {
            field: Field::Id,
            values: ids.iter().map(|id| (*id).into()).collect(),
        });
    }

    match filter.parent_id {
        Some(Some(parent)) => all.push(Predicate::eq(Field::ParentId, parent)),
        Some(None) => all.push(Predicate::IsNull(Field::ParentId)),
        None => {}
    }

    if let Some(lang) = &filter.lang {
        all.push(Predicate::eq(Field::Lang, lang.as_str()));
    }
    if let Some(editor) = &filter.editor {
        all.push(Predicate::prefix(Field::Editor, editor.as_str()));
    }

    let exact = [
        ("path", &filter.path),
        ("domain", &filter.domain),
        ("to", &filter.to),
        ("tag", &filter.tag),
        ("theme", &filter.theme),
        ("type", &filter.kind),
    ];
    for (key, value) in exact {
        if let Some(value) = value {
            all.push(Predicate::eq(data(key), value.as_str()));
        }
    }

    if let Some(status) = filter.status {
        all.push(Predicate::eq(data("status"), status));
    }
    if let Some(cache) = filter.cache {
        all.push(Predicate::eq(data("cache"), cache));
    }

    if let Some(name) = &filter.name {
        all.push(Predicate::prefix(data("name"), name.as_str()));
    }
    if let Some(title) = &filter.title {
        all.push(Predicate::prefix(data("title"), title.as_str()));
    }

    for (key, value) in [
        ("meta", &filter.meta),
        ("config", &filter.config),
        ("content", &filter.content),
    ] {
        if let Some(value) = value {
            all.push(Predicate::contains(aux(key), value.as_str()));
        }
    }

    if let Some(needle) = &filter.any {
        all.push(any_of(
            &[aux("config"), aux("content"), aux("meta"), data("name"), data("title")],
            needle,
        ));
    }

    Ok(QueryPlan {
        entity: Versionable::Page,
        predicate: Predicate::All(all).simplify(),
        sort: sort_order(Versionable::Page, &request.sort, page_sort_column)?,
        paging: limits.paging(request.page, request.first),
    })
}

pub fn build_element_plan(
    request: &QueryRequest<ElementFilter>,
    limits: &PageLimits,
) -> Result<QueryPlan, QueryError> {
    let filter = &request.filter;
    let mut all = visibility(request.trashed, request.publish);

    if let Some(ids) = &filter.id {
        all.push(Predicate::In {
            field: Field::Id,
            values: ids.iter().map(|id| id.as_str().into()).collect(),
        });
    }
    if let Some(lang) = &filter.lang {
        all.push(Predicate::eq(Field::Lang, lang.as_str()));
    }
    if let Some(editor) = &filter.editor {
        all.push(Predicate::prefix(Field::Editor, editor.as_str()));
    }
    if let Some(kind) = &filter.kind {
        all.push(Predicate::eq(data("type"), kind.as_str()));
    }
    if let Some(name) = &filter.name {
        all.push(Predicate::prefix(data("name"), name.as_str()));
    }
    if let Some(needle) = &filter.any {
        all.push(any_of(&[data("name"), data("data")], needle));
    }

    Ok(QueryPlan {
        entity: Versionable::Element,
        predicate: Predicate::All(all).simplify(),
        sort: sort_order(Versionable::Element, &request.sort, element_sort_column)?,
        paging: limits.paging(request.page, request.first),
    })
}

pub fn build_file_plan(
    request: &QueryRequest<FileFilter>,
    limits: &PageLimits,
) -> Result<QueryPlan, QueryError> {
    let filter = &request.filter;
    let mut all = visibility(request.trashed, request.publish);

    if let Some(ids) = &filter.id {
        all.push(Predicate::In {
            field: Field::Id,
            values: ids.iter().map(|id| id.as_str().into()).collect(),
        });
    }
    if let Some(lang) = &filter.lang {
        all.push(Predicate::eq(Field::Lang, lang.as_str()));
    }
    if let Some(editor) = &filter.editor {
        all.push(Predicate::prefix(Field::Editor, editor.as_str()));
    }
    if let Some(mime) = &filter.mime {
        all.push(Predicate::prefix(data("mime"), mime.as_str()));
    }
    if let Some(name) = &filter.name {
        all.push(Predicate::prefix(data("name"), name.as_str()));
    }
    if let Some(needle) = &filter.any {
        all.push(any_of(
            &[data("name"), data("description"), data("transcription")],
            needle,
        ));
    }

    Ok(QueryPlan {
        entity: Versionable::File,
        predicate: Predicate::All(all).simplify(),
        sort: sort_order(Versionable::File, &request.sort, file_sort_column)?,
        paging: limits.paging(request.page, request.first),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pages(filter: PageFilter) -> QueryPlan {
        build_page_plan(&QueryRequest::new(filter), &PageLimits::default()).unwrap()
    }

    #[test]
    fn test_empty_filter_only_hides_trash() {
        let plan = pages(PageFilter::default());
        assert_eq!(plan.predicate, Predicate::NotDeleted);
        assert_eq!(
            plan.sort,
            vec![Sort {
                field: Field::Id,
                direction: SortDirection::Asc
            }]
        );
        assert_eq!(plan.paging, Paging { page: 1, per_page: 100 });
    }

    #[test]
    fn test_trashed_visibility() {
        let limits = PageLimits::default();
        let with = build_page_plan(
            &QueryRequest::new(PageFilter::default()).trashed(Trashed::With),
            &limits,
        )
        .unwrap();
        assert_eq!(with.predicate, Predicate::All(vec![]));

        let only = build_page_plan(
            &QueryRequest::new(PageFilter::default()).trashed(Trashed::Only),
            &limits,
        )
        .unwrap();
        assert_eq!(only.predicate, Predicate::Deleted);
    }

    #[test]
    fn test_publish_states() {
        let limits = PageLimits::default();
        let plan = |publish| {
            build_page_plan(
                &QueryRequest::new(PageFilter::default())
                    .trashed(Trashed::With)
                    .publish(publish),
                &limits,
            )
            .unwrap()
            .predicate
        };

        assert_eq!(plan(PublishFilter::Published), Predicate::Effective);
        assert_eq!(
            plan(PublishFilter::Draft),
            Predicate::eq(Field::Published, false)
        );
        assert_eq!(
            plan(PublishFilter::Scheduled),
            Predicate::All(vec![
                Predicate::NotNull(Field::PublishAt),
                Predicate::eq(Field::Published, false),
            ])
        );
    }

    #[test]
    fn test_field_filters_are_anded() {
        let plan = pages(PageFilter {
            editor: Some("ali".to_string()),
            title: Some("Welcome".to_string()),
            status: Some(1),
            ..Default::default()
        });

        assert_eq!(
            plan.predicate,
            Predicate::All(vec![
                Predicate::NotDeleted,
                Predicate::prefix(Field::Editor, "ali"),
                Predicate::eq(Field::Data("status".to_string()), 1),
                Predicate::prefix(Field::Data("title".to_string()), "Welcome"),
            ])
        );
    }

    #[test]
    fn test_explicit_null_parent_selects_roots() {
        let filter: PageFilter = serde_json::from_value(json!({ "parent_id": null })).unwrap();
        assert_eq!(filter.parent_id, Some(None));

        let missing: PageFilter = serde_json::from_value(json!({})).unwrap();
        assert_eq!(missing.parent_id, None);

        let plan = pages(filter);
        assert_eq!(
            plan.predicate,
            Predicate::All(vec![Predicate::NotDeleted, Predicate::IsNull(Field::ParentId)])
        );
    }

    #[test]
    fn test_any_spans_fixed_fields() {
        let plan = build_file_plan(
            &QueryRequest::new(FileFilter {
                any: Some("fox".to_string()),
                ..Default::default()
            })
            .trashed(Trashed::With),
            &PageLimits::default(),
        )
        .unwrap();

        match plan.predicate {
            Predicate::Any(items) => assert_eq!(items.len(), 3),
            other => panic!("expected disjunction, got {:?}", other),
        }
    }

    #[test]
    fn test_paging_is_clamped() {
        let limits = PageLimits::default();
        assert_eq!(limits.paging(Some(0), Some(0)), Paging { page: 1, per_page: 1 });
        assert_eq!(limits.paging(Some(4), Some(500)), Paging { page: 4, per_page: 100 });
        assert_eq!(limits.paging(None, None), Paging { page: 1, per_page: 100 });
    }

    #[test]
    fn test_unknown_sort_column_is_rejected() {
        let request = QueryRequest::new(ElementFilter::default()).sorted_by(SortSpec::desc("password"));
        let err = build_element_plan(&request, &PageLimits::default()).unwrap_err();
        assert_eq!(
            err,
            QueryError::UnknownSortColumn {
                entity: Versionable::Element,
                column: "password".to_string()
            }
        );
    }

    #[test]
    fn test_sort_columns_map_to_fields() {
        let request = QueryRequest::new(PageFilter::default())
            .sorted_by(SortSpec::desc("title"))
            .sorted_by(SortSpec::asc("ID"));
        let plan = build_page_plan(&request, &PageLimits::default()).unwrap();

        assert_eq!(plan.sort[0].field, Field::Data("title".to_string()));
        assert_eq!(plan.sort[0].direction, SortDirection::Desc);
        assert_eq!(plan.sort[1].field, Field::Id);
    }
}
