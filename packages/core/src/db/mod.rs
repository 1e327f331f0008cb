//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management
//! - Node, route, version and entity row stores
//! - SQL compilation of query plans
//! - Transaction boundaries and bounded retry
//! - Domain events emitted after commit
//!
//! Store functions take a `libsql::Connection` so the service layer decides
//! which of them share a transaction.

pub mod codec;
mod database;
pub mod entity_store;
mod error;
pub mod events;
pub mod node_store;
pub mod retry;
pub mod sql;
pub mod transaction;
pub mod version_store;

pub use database::DatabaseService;
pub use error::DatabaseError;
pub(crate) use error::SqlContext;
pub use events::DomainEvent;
pub use retry::{with_retry, Retryable};
