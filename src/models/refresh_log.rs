//! Refresh log: recent per-merge-request refresh outcomes.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::pool::DbPool;

/// Status of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
}

impl From<&str> for LogStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "success" => Self::Success,
            _ => Self::Error,
        }
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One logged refresh operation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshLog {
    pub id: i64,

    /// Operation: `update`, `merge`, `noop`, `branch_removed`, ...
    pub operation: String,

    /// Status: `success`, `error`.
    pub status: String,

    /// Related MR ID (optional).
    pub mr_id: Option<i64>,

    /// Details or error message.
    pub message: Option<String>,

    /// Operation duration in milliseconds.
    pub duration_ms: Option<i64>,

    /// When the operation occurred (Unix).
    pub timestamp: i64,
}

impl RefreshLog {
    /// Parse the status string into an enum.
    pub fn status_enum(&self) -> LogStatus {
        LogStatus::from(self.status.as_str())
    }

    /// Check if this log entry represents an error.
    pub fn is_error(&self) -> bool {
        self.status_enum() == LogStatus::Error
    }
}

/// A log entry to be written.
#[derive(Debug, Clone)]
pub struct NewRefreshLog {
    pub operation: String,
    pub status: LogStatus,
    pub mr_id: Option<i64>,
    pub message: Option<String>,
    pub duration_ms: Option<i64>,
}

/// Write a log entry and prune everything beyond the newest `retention` rows.
pub async fn insert_log(
    pool: &DbPool,
    entry: &NewRefreshLog,
    timestamp: i64,
    retention: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO refresh_log (operation, status, mr_id, message, duration_ms, timestamp)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.operation)
    .bind(entry.status.to_string())
    .bind(entry.mr_id)
    .bind(&entry.message)
    .bind(entry.duration_ms)
    .bind(timestamp)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM refresh_log WHERE id NOT IN (
            SELECT id FROM refresh_log ORDER BY timestamp DESC, id DESC LIMIT ?
        )
        "#,
    )
    .bind(retention.max(1))
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent log entries, newest first.
pub async fn recent(pool: &DbPool, limit: i64) -> Result<Vec<RefreshLog>, sqlx::Error> {
    sqlx::query_as::<_, RefreshLog>(
        "SELECT id, operation, status, mr_id, message, duration_ms, timestamp
         FROM refresh_log ORDER BY timestamp DESC, id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
