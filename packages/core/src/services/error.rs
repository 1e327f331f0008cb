//! Service Layer Error Types
//!
//! `CmsError` is what every service returns. It separates failures a user
//! may see verbatim (validation, provider) from internal ones that only
//! cross the trust boundary as a generic message.

use crate::db::{DatabaseError, Retryable};
use crate::hierarchy::HierarchyError;
use crate::query::QueryError;
use pagetree_ai::ProviderError;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Generic indicator shown instead of internal error details
pub const GENERIC_FAILURE: &str = "Operation failed";

/// Shown for unique constraint hits, the constraint text stays in the logs
pub const CONFLICT_MESSAGE: &str = "Already exists";

/// Validation messages keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Service operation errors
#[derive(Error, Debug)]
pub enum CmsError {
    /// Rejected input, nothing was changed
    #[error("{message}")]
    Validation {
        message: String,
        fields: FieldErrors,
    },

    /// Renumbering would violate the nested-set invariants
    #[error("Structural integrity violated: {context}")]
    StructuralIntegrity { context: String, retryable: bool },

    /// Unique constraint hit on create
    #[error("Already exists: {0}")]
    Conflict(String),

    /// External generation or translation backend failed
    #[error("{0}")]
    ProviderFailure(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Database operation failed: {0}")]
    Database(DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CmsError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            fields: FieldErrors::new(),
        }
    }

    /// Validation failure carrying per-field messages
    pub fn fields(message: impl Into<String>, fields: FieldErrors) -> Self {
        Self::Validation {
            message: message.into(),
            fields,
        }
    }

    pub fn integrity(context: impl Into<String>) -> Self {
        Self::StructuralIntegrity {
            context: context.into(),
            retryable: true,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn permission_denied(capability: impl Into<String>) -> Self {
        Self::PermissionDenied(capability.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::ProviderFailure(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Transient failures worth another attempt in a fresh transaction
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StructuralIntegrity { retryable, .. } => *retryable,
            Self::Database(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Message safe to show to end users
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation { .. } | Self::ProviderFailure(_) => self.to_string(),
            Self::NotFound(_) | Self::PermissionDenied(_) => self.to_string(),
            Self::Conflict(_) => CONFLICT_MESSAGE.to_string(),
            _ => GENERIC_FAILURE.to_string(),
        }
    }

    /// Per-field messages of a validation error
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation { fields, .. } if !fields.is_empty() => Some(fields),
            _ => None,
        }
    }
}

impl Retryable for CmsError {
    fn is_retryable(&self) -> bool {
        CmsError::is_retryable(self)
    }
}

impl From<DatabaseError> for CmsError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::UniqueViolation { context } => {
                tracing::debug!("Unique constraint violated: {}", context);
                Self::Conflict(context)
            }
            DatabaseError::StaleWrite { context } => Self::StructuralIntegrity {
                context,
                retryable: true,
            },
            other => Self::Database(other),
        }
    }
}

impl From<HierarchyError> for CmsError {
    fn from(error: HierarchyError) -> Self {
        match error {
            HierarchyError::NotFound(id) => Self::not_found(format!("page {}", id)),
            HierarchyError::InvalidPosition(message) => Self::validation(message),
            HierarchyError::DuplicateNode(id) => Self::integrity(format!("node {} exists twice", id)),
            cycle @ HierarchyError::Cycle { .. } => Self::StructuralIntegrity {
                context: cycle.to_string(),
                retryable: false,
            },
            HierarchyError::Integrity(context) => Self::integrity(context),
        }
    }
}

impl From<QueryError> for CmsError {
    fn from(error: QueryError) -> Self {
        Self::validation(error.to_string())
    }
}

impl From<ProviderError> for CmsError {
    fn from(error: ProviderError) -> Self {
        Self::ProviderFailure(error.to_string())
    }
}

impl From<serde_json::Error> for CmsError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CmsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_errors_are_masked() {
        let err = CmsError::from(DatabaseError::sql_execution("no such column: secret"));
        assert_eq!(err.public_message(), GENERIC_FAILURE);

        let err = CmsError::integrity("node 4 overlaps node 2");
        assert_eq!(err.public_message(), GENERIC_FAILURE);
    }

    #[test]
    fn test_user_facing_errors_pass_through() {
        assert_eq!(
            CmsError::validation("Prompt must not be empty").public_message(),
            "Prompt must not be empty"
        );
        assert_eq!(
            CmsError::provider("Provider call timed out after 60s").public_message(),
            "Provider call timed out after 60s"
        );
    }

    #[test]
    fn test_conflict_hides_constraint_details() {
        let err = CmsError::from(DatabaseError::UniqueViolation {
            context: "Failed to store route: UNIQUE constraint failed: routes.tenant_id, routes.path"
                .to_string(),
        });
        assert!(err.is_conflict());
        assert_eq!(err.public_message(), CONFLICT_MESSAGE);
        assert!(!err.public_message().contains("UNIQUE"));
    }

    #[test]
    fn test_retry_classification() {
        assert!(CmsError::integrity("stale").is_retryable());
        assert!(CmsError::from(DatabaseError::stale_write("node 3")).is_retryable());
        assert!(!CmsError::from(HierarchyError::Cycle { node: 1, target: 2 }).is_retryable());
        assert!(!CmsError::provider("boom").is_retryable());
        assert!(CmsError::from(DatabaseError::UniqueViolation {
            context: "routes".to_string()
        })
        .is_conflict());
    }

    #[test]
    fn test_field_errors() {
        let mut fields = FieldErrors::new();
        fields.add("texts.1", "empty text");
        fields.add("texts.1", "too long");
        fields.add("to", "missing");

        let err = CmsError::fields("Invalid translation request", fields);
        let fields = err.field_errors().unwrap();
        assert_eq!(fields.get("texts.1").unwrap().len(), 2);
        assert_eq!(fields.fields().collect::<Vec<_>>(), vec!["texts.1", "to"]);
    }
}
