//! Query Filter Builder
//!
//! Turns listing requests for pages, elements and files into a
//! storage-independent `QueryPlan`. The libsql compiler in `db::sql` is the
//! only consumer that knows about tables.

mod filter;
mod plan;

pub use filter::{
    build_element_plan, build_file_plan, build_page_plan, ElementFilter, FileFilter, PageFilter,
    PageLimits, PublishFilter, QueryError, QueryRequest, SortSpec, Trashed,
};
pub use plan::{CompareOp, Field, Paging, Predicate, QueryPlan, Sort, SortDirection};

use serde::{Deserialize, Serialize};

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Paginated<T> {
    pub fn last_page(&self) -> u64 {
        if self.total == 0 {
            1
        } else {
            self.total.div_ceil(u64::from(self.per_page.max(1)))
        }
    }
}
