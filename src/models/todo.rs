//! Todo model: per-user pending actions on a merge request.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::pool::DbPool;

/// Why a todo was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoAction {
    Assigned,
    Mentioned,
    BuildFailed,
    Marked,
    Unmergeable,
}

impl From<&str> for TodoAction {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "assigned" => Self::Assigned,
            "build_failed" => Self::BuildFailed,
            "marked" => Self::Marked,
            "unmergeable" => Self::Unmergeable,
            _ => Self::Mentioned,
        }
    }
}

impl std::fmt::Display for TodoAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assigned => write!(f, "assigned"),
            Self::Mentioned => write!(f, "mentioned"),
            Self::BuildFailed => write!(f, "build_failed"),
            Self::Marked => write!(f, "marked"),
            Self::Unmergeable => write!(f, "unmergeable"),
        }
    }
}

/// Status of a todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoState {
    Pending,
    Done,
}

impl From<&str> for TodoState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "done" => Self::Done,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for TodoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// A todo targeting a merge request.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Todo {
    pub id: i64,

    /// Owner of the todo.
    pub user_id: i64,

    pub author_id: i64,
    pub project_id: i64,

    /// Merge request the todo points at.
    pub target_id: i64,

    /// Action: `assigned`, `mentioned`, `build_failed`, `marked`, `unmergeable`.
    pub action: String,

    /// State: `pending`, `done`.
    pub state: String,

    /// Commit whose pipeline failed, for `build_failed` todos.
    pub commit_id: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Todo {
    /// Parse the action string into an enum.
    pub fn action_enum(&self) -> TodoAction {
        TodoAction::from(self.action.as_str())
    }

    /// Parse the state string into an enum.
    pub fn state_enum(&self) -> TodoState {
        TodoState::from(self.state.as_str())
    }

    pub fn is_pending(&self) -> bool {
        self.state_enum() == TodoState::Pending
    }

    pub fn is_done(&self) -> bool {
        self.state_enum() == TodoState::Done
    }

    /// Whether the branch head has moved on from the commit that failed.
    pub fn resolved_by_head(&self, head_sha: &str) -> bool {
        self.commit_id.as_deref() != Some(head_sha)
    }
}

/// Data required to create a todo.
#[derive(Debug, Clone)]
pub struct NewTodo {
    pub user_id: i64,
    pub author_id: i64,
    pub project_id: i64,
    pub target_id: i64,
    pub action: TodoAction,
    pub commit_id: Option<String>,
}

const SELECT_COLUMNS: &str = "SELECT id, user_id, author_id, project_id, target_id, action, state,
    commit_id, created_at, updated_at FROM todos";

/// Create a pending todo.
pub async fn insert_todo(pool: &DbPool, todo: &NewTodo) -> Result<Todo, sqlx::Error> {
    sqlx::query_as::<_, Todo>(
        r#"
        INSERT INTO todos (user_id, author_id, project_id, target_id, action, state, commit_id)
        VALUES (?, ?, ?, ?, ?, 'pending', ?)
        RETURNING id, user_id, author_id, project_id, target_id, action, state, commit_id, created_at, updated_at
        "#,
    )
    .bind(todo.user_id)
    .bind(todo.author_id)
    .bind(todo.project_id)
    .bind(todo.target_id)
    .bind(todo.action.to_string())
    .bind(&todo.commit_id)
    .fetch_one(pool)
    .await
}

/// Look up a todo by ID.
pub async fn get_todo(pool: &DbPool, id: i64) -> Result<Option<Todo>, sqlx::Error> {
    sqlx::query_as::<_, Todo>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Pending todos with `action` on a merge request, optionally for one user.
pub async fn pending_for_target(
    pool: &DbPool,
    target_id: i64,
    action: TodoAction,
    user_id: Option<i64>,
) -> Result<Vec<Todo>, sqlx::Error> {
    sqlx::query_as::<_, Todo>(&format!(
        "{} WHERE target_id = ? AND action = ? AND state = 'pending' AND (? IS NULL OR user_id = ?) ORDER BY id",
        SELECT_COLUMNS
    ))
    .bind(target_id)
    .bind(action.to_string())
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Mark todos done; already-done todos are left untouched.
pub async fn mark_done(pool: &DbPool, ids: &[i64]) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
    let query = format!(
        "UPDATE todos SET state = 'done', updated_at = strftime('%s', 'now')
         WHERE state = 'pending' AND id IN ({})",
        placeholders.join(", ")
    );

    let mut q = sqlx::query(&query);
    for id in ids {
        q = q.bind(*id);
    }

    Ok(q.execute(pool).await?.rows_affected())
}
