//! Storage independent query plans
//!
//! A plan is the triple of predicate, sort order and paging. Field
//! references always point at the entity row or at its latest version.

use crate::models::Versionable;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column a predicate or sort refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Entity id
    Id,
    /// Parent page (pages only)
    ParentId,
    /// Document order in the tree (pages only)
    Position,
    /// Creation time of the entity
    CreatedAt,
    Lang,
    Editor,
    Published,
    PublishAt,
    /// Key of the latest version's `data`
    Data(String),
    /// Key of the latest version's `aux`
    Aux(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Prefix,
    Contains,
}

/// Composable filter expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Conjunction, empty means true
    All(Vec<Predicate>),
    /// Disjunction, empty means false
    Any(Vec<Predicate>),
    NotDeleted,
    Deleted,
    /// Entity has an effective published version
    Effective,
    Compare {
        field: Field,
        op: CompareOp,
        value: Value,
    },
    In {
        field: Field,
        values: Vec<Value>,
    },
    IsNull(Field),
    NotNull(Field),
}

impl Predicate {
    pub fn eq(field: Field, value: impl Into<Value>) -> Self {
        Self::Compare {
            field,
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    pub fn prefix(field: Field, value: impl Into<Value>) -> Self {
        Self::Compare {
            field,
            op: CompareOp::Prefix,
            value: value.into(),
        }
    }

    pub fn contains(field: Field, value: impl Into<Value>) -> Self {
        Self::Compare {
            field,
            op: CompareOp::Contains,
            value: value.into(),
        }
    }

    /// Flatten nested conjunctions
    pub fn simplify(self) -> Self {
        match self {
            Self::All(items) => {
                let mut flat = Vec::new();
                for item in items.into_iter().map(Self::simplify) {
                    match item {
                        Self::All(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                if flat.len() == 1 {
                    flat.remove(0)
                } else {
                    Self::All(flat)
                }
            }
            Self::Any(items) => {
                let items: Vec<_> = items.into_iter().map(Self::simplify).collect();
                if items.len() == 1 {
                    items.into_iter().next().unwrap_or(Self::Any(Vec::new()))
                } else {
                    Self::Any(items)
                }
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: Field,
    pub direction: SortDirection,
}

/// 1-based page and page size, already clamped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub page: u32,
    pub per_page: u32,
}

impl Paging {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub entity: Versionable,
    pub predicate: Predicate,
    pub sort: Vec<Sort>,
    pub paging: Paging,
}
