use crate::db::errors::DbError;
use crate::types::{Operation, Permission};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Caller lacks required permissions for the operation
    #[error("Insufficient permissions to {action:?} {resource}")]
    InsufficientPermissions {
        required: Permission,
        action: Operation,
        resource: String,
    },

    /// Authenticated, but the account may not act (e.g. suspended)
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Resource existed but is no longer available (expired affiliate links)
    #[error("{resource} {id} is no longer available")]
    Gone { resource: String, id: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// Conflict with the current state of a resource
    #[error("Conflict: {message}")]
    Conflict { message: String },
}

/// Friendly message and resource name for known unique constraints.
fn describe_unique_violation(table: Option<&str>, constraint: Option<&str>) -> (&'static str, &'static str) {
    match (table, constraint) {
        (Some("profiles"), Some(c)) if c.contains("email") => ("An account with this email address already exists", "profile"),
        (Some("profiles"), Some(c)) if c.contains("username") => ("This username is already taken", "profile"),
        (Some("bookmarks"), Some("bookmarks_owner_url_key")) => ("You have already bookmarked this URL", "bookmark"),
        (Some("collections"), Some("collections_owner_name_key")) => ("You already have a collection with this name", "collection"),
        (Some("affiliate_links"), Some("affiliate_links_short_code_key")) => ("This short code is already in use", "affiliate_link"),
        (Some("reports"), Some("reports_one_pending_per_target")) => ("You have already reported this content", "report"),
        (Some("collection_items"), _) => ("This bookmark is already in the collection", "collection"),
        _ => ("Resource already exists", "unknown"),
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Gone { .. } => StatusCode::GONE,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::ProtectedEntity { .. } => StatusCode::FORBIDDEN,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Conflict { .. } => StatusCode::CONFLICT,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InsufficientPermissions { action, resource, .. } => {
                format!("Insufficient permissions to {action} {resource}")
            }
            Error::Forbidden { message } => message.clone(),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => {
                format!("{resource} with ID {id} not found")
            }
            Error::Gone { resource, id } => format!("{resource} {id} is no longer available"),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, table, .. } => {
                    describe_unique_violation(table.as_deref(), constraint.as_deref()).0.to_string()
                }
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::ProtectedEntity {
                    operation,
                    entity_type,
                    reason,
                    ..
                } => {
                    format!("Cannot {operation:?} {entity_type}: {reason}")
                }
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
            Error::Conflict { message } => message.clone(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::InsufficientPermissions { .. } | Error::Forbidden { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } | Error::Gone { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            Error::Conflict { message } => {
                let body = serde_json::json!({ "message": message });
                (status, axum::response::Json(body)).into_response()
            }
            // Database unique violations get minimal structured JSON
            Error::Database(DbError::UniqueViolation { constraint, table, .. }) => {
                let (message, resource) = describe_unique_violation(table.as_deref(), constraint.as_deref());
                let body = serde_json::json!({
                    "message": message,
                    "resource": resource
                });

                (status, axum::response::Json(body)).into_response()
            }
            _ => {
                let user_message = self.user_message();
                (status, user_message).into_response()
            }
        }
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Unauthenticated { message: None }.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::Gone {
                resource: "Affiliate link".to_string(),
                id: "abc".to_string()
            }
            .status_code(),
            StatusCode::GONE
        );
        assert_eq!(Error::Database(DbError::NotFound).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::Conflict {
                message: "already resolved".to_string()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err = Error::Internal {
            operation: "connect to smtp.internal:25 with password hunter2".to_string(),
        };
        assert_eq!(err.user_message(), "Internal server error");
    }

    #[test]
    fn test_unique_violation_messages() {
        let err = Error::Database(DbError::UniqueViolation {
            constraint: Some("profiles_username_key".to_string()),
            table: Some("profiles".to_string()),
            message: String::new(),
            conflicting_value: None,
        });
        assert_eq!(err.user_message(), "This username is already taken");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err = Error::Database(DbError::UniqueViolation {
            constraint: Some("affiliate_links_short_code_key".to_string()),
            table: Some("affiliate_links".to_string()),
            message: String::new(),
            conflicting_value: Some("sale".to_string()),
        });
        assert_eq!(err.user_message(), "This short code is already in use");
    }
}
