//! Pagetree Core Business Logic Layer
//!
//! This crate provides the data management, page tree operations and service
//! orchestration of a multi-language, versioned content management system.
//!
//! # Architecture
//!
//! - **Nested-set tree**: pages are intervals in a per-tenant arena, moves
//!   renumber only the rows whose bounds change
//! - **Append-only versions**: every save writes a new version; publication
//!   and scheduling only flip state on existing ones
//! - **Content resolution**: element references, shared files and language
//!   fallback are resolved at render time
//! - **libsql**: embedded SQLite-compatible database
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, Version, Element, File)
//! - [`hierarchy`] - Pure nested-set algorithms
//! - [`query`] - Filter builder producing storage independent query plans
//! - [`services`] - Business services (PageService, ContentService, etc.)
//! - [`db`] - Database layer with libsql integration
//! - [`actions`] - Server side actions run while rendering content
//! - [`agent`] - Tool registry and bounded loop of generation agents

pub mod actions;
pub mod agent;
pub mod auth;
pub mod db;
pub mod hierarchy;
pub mod models;
pub mod query;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use auth::{capability, AccessContext};
pub use models::*;
pub use services::*;
