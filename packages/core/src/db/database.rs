//! Database Connection Management
//!
//! This module provides the core database connection and initialization
//! functionality using libsql for the page tree store.
//!
//! # Architecture
//!
//! - **Structural nodes**: `nodes` only holds nested-set bounds, tenant and
//!   soft delete marker
//! - **Routes**: `(tenant_id, domain, path)` is unique per page
//! - **Versions**: every editorial field lives in append-only `versions` rows
//!   shared by pages, elements and files
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Foreign keys**: Enabled on every connection for the join tables
//!
//! # Database Connection Patterns
//!
//! **Use `connect_with_timeout()` in async functions.** The 5-second busy
//! timeout lets concurrent writers wait for the lock instead of failing with
//! `SQLITE_BUSY` right away.
//!
//! ```no_run
//! # use pagetree_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/pages.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database connection (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

const TABLES: &[(&str, &str)] = &[
    (
        "nodes",
        "CREATE TABLE IF NOT EXISTS nodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id TEXT NOT NULL,
            parent_id INTEGER,
            lft INTEGER NOT NULL,
            rgt INTEGER NOT NULL,
            depth INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            deleted_at TEXT,
            FOREIGN KEY (parent_id) REFERENCES nodes(id) ON DELETE CASCADE
        )",
    ),
    (
        "routes",
        "CREATE TABLE IF NOT EXISTS routes (
            node_id INTEGER PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            domain TEXT NOT NULL DEFAULT '',
            path TEXT NOT NULL,
            UNIQUE (tenant_id, domain, path),
            FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE CASCADE
        )",
    ),
    (
        "elements",
        "CREATE TABLE IF NOT EXISTS elements (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            deleted_at TEXT
        )",
    ),
    (
        "files",
        "CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            deleted_at TEXT
        )",
    ),
    (
        "versions",
        "CREATE TABLE IF NOT EXISTS versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id TEXT NOT NULL,
            versionable_type TEXT NOT NULL,
            versionable_id TEXT NOT NULL,
            lang TEXT,
            editor TEXT NOT NULL,
            published INTEGER NOT NULL DEFAULT 0,
            publish_at TEXT,
            data TEXT NOT NULL DEFAULT '{}',
            aux TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            deleted_at TEXT
        )",
    ),
    (
        "version_elements",
        "CREATE TABLE IF NOT EXISTS version_elements (
            version_id INTEGER NOT NULL,
            element_id TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (version_id, element_id),
            FOREIGN KEY (version_id) REFERENCES versions(id) ON DELETE CASCADE,
            FOREIGN KEY (element_id) REFERENCES elements(id) ON DELETE CASCADE
        )",
    ),
    (
        "version_files",
        "CREATE TABLE IF NOT EXISTS version_files (
            version_id INTEGER NOT NULL,
            file_id TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (version_id, file_id),
            FOREIGN KEY (version_id) REFERENCES versions(id) ON DELETE CASCADE,
            FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
        )",
    ),
];

const INDEXES: &[(&str, &str)] = &[
    (
        "idx_nodes_tenant_lft",
        "CREATE INDEX IF NOT EXISTS idx_nodes_tenant_lft ON nodes(tenant_id, lft)",
    ),
    (
        "idx_nodes_parent",
        "CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id)",
    ),
    (
        "idx_versions_entity",
        "CREATE INDEX IF NOT EXISTS idx_versions_entity
            ON versions(versionable_type, versionable_id, id)",
    ),
    (
        "idx_versions_scheduled",
        "CREATE INDEX IF NOT EXISTS idx_versions_scheduled
            ON versions(published, publish_at)",
    ),
    (
        "idx_version_files_file",
        "CREATE INDEX IF NOT EXISTS idx_version_files_file ON version_files(file_id)",
    ),
];

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the directory cannot be created, the
    /// connection fails or schema initialization fails.
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(is_new_database).await?;
        tracing::debug!("Database ready at {}", service.db_path.display());

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent, safe to call on every start.
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        for (table, ddl) in TABLES {
            conn.execute(ddl, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create {} table: {}",
                    table, e
                ))
            })?;
        }

        for (index, ddl) in INDEXES {
            conn.execute(ddl, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index '{}': {}",
                    index, e
                ))
            })?;
        }

        // Flush the schema so a fresh file never shows "no such table" to a
        // second connection
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Get a connection without per-connection settings
    ///
    /// Only for synchronous, single-threaded use. Async code should call
    /// `connect_with_timeout()`.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout and foreign keys configured
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }
}
