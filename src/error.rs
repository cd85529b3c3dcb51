//! Application error types.
//!
//! These errors are serializable so a caller can record or forward the
//! failure of a refresh (per merge request) without losing its structure.

use serde::Serialize;
use thiserror::Error;

/// Errors produced while refreshing merge requests.
///
/// All variants serialize to a structured JSON object.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },

    /// Repository read failed (missing object, I/O, timeout).
    #[error("Repository error: {message}")]
    Repository {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },

    /// A hook handler failed.
    #[error("Hook error: {message}")]
    Hook {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        handler: Option<String>,
    },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: None,
        }
    }

    /// Create a repository error.
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository {
            message: message.into(),
            operation: None,
        }
    }

    /// Create a repository error naming the failed operation.
    pub fn repository_with_op(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Repository {
            message: message.into(),
            operation: Some(operation.into()),
        }
    }

    /// Create a hook error for the named handler.
    pub fn hook(message: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
            handler: Some(handler.into()),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a later retry of the same push could succeed.
    ///
    /// The refresh engine never retries on its own; this is for callers that
    /// keep a retry policy.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database { .. } | Self::Repository { .. })
    }
}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::database(err.to_string())
    }
}

impl From<git2::Error> for AppError {
    fn from(err: git2::Error) -> Self {
        Self::repository(err.message().to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        Self::database(err.to_string())
    }
}
