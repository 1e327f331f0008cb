//! Database Error Types
//!
//! This module defines error types for database operations, providing
//! clear error handling for connection, initialization, and query failures.
//! Constraint and lock failures get their own variants because the service
//! layer treats them differently from other SQL errors.

use std::path::PathBuf;
use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// UNIQUE or PRIMARY KEY constraint violated
    #[error("Unique constraint violated: {context}")]
    UniqueViolation { context: String },

    /// Database locked by another writer
    #[error("Database busy: {context}")]
    Busy { context: String },

    /// Guarded write found the row changed by another writer
    #[error("Stale write: {context}")]
    StaleWrite { context: String },

    /// Stored value could not be decoded
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    pub fn stale_write(context: impl Into<String>) -> Self {
        Self::StaleWrite {
            context: context.into(),
        }
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Classify a libsql error raised while doing `context`
    pub fn from_libsql(context: &str, error: libsql::Error) -> Self {
        let message = error.to_string();
        let context = format!("{}: {}", context, message);

        if is_unique_message(&message) {
            Self::UniqueViolation { context }
        } else if is_busy_message(&message) {
            Self::Busy { context }
        } else {
            Self::SqlExecutionError { context }
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    pub fn is_busy(&self) -> bool {
        match self {
            Self::Busy { .. } => true,
            Self::LibsqlError(e) => is_busy_message(&e.to_string()),
            _ => false,
        }
    }
}

fn is_unique_message(message: &str) -> bool {
    message.contains("UNIQUE constraint failed") || message.contains("PRIMARY KEY constraint")
}

fn is_busy_message(message: &str) -> bool {
    message.contains("database is locked") || message.contains("database is busy")
}

/// Map a libsql result into `DatabaseError` with a context label
pub(crate) trait SqlContext<T> {
    fn sql_context(self, context: &str) -> Result<T, DatabaseError>;
}

impl<T> SqlContext<T> for Result<T, libsql::Error> {
    fn sql_context(self, context: &str) -> Result<T, DatabaseError> {
        self.map_err(|e| DatabaseError::from_libsql(context, e))
    }
}
