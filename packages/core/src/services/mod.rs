//! Business Services
//!
//! This module contains the core business logic services:
//!
//! - `HierarchyStore` - nested-set page tree persistence
//! - `VersionLedger` - append-only versions and publication
//! - `PageService` - page, element and file mutations
//! - `ContentService` - page rendering through the content resolver
//! - `QueryService` - filtered, sorted and paginated listings
//! - `GenerationService` - text, image, structured, audio and translation operations
//!
//! Services coordinate between the database layer and application logic.
//! Writes that span several stores share one transaction through the
//! crate-level `*_in_tx` functions of the store services.

pub mod config;
pub mod content_resolver;
pub mod content_service;
pub mod error;
pub mod generation_service;
pub mod hierarchy_service;
pub mod page_service;
pub mod query_service;
pub mod version_ledger;

pub use config::CmsConfig;
pub use content_resolver::{
    collect_files, resolve, ContentView, ResolvedDocument, ResolvedElement, Section,
};
pub use content_service::ContentService;
pub use error::{CmsError, FieldErrors, Result, CONFLICT_MESSAGE, GENERIC_FAILURE};
pub use generation_service::GenerationService;
pub use hierarchy_service::HierarchyStore;
pub use page_service::{PageService, Placement};
pub use query_service::{PageItem, QueryService};
pub use version_ledger::VersionLedger;
