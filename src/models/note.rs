//! Note model: the append-only discussion log of a merge request.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

use crate::db::pool::DbPool;

/// A note on a merge request.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub id: i64,

    /// Merge request the note belongs to.
    pub merge_request_id: i64,

    pub author_id: i64,

    /// Note content (Markdown).
    pub body: String,

    /// System-generated note (not user-authored).
    pub system: bool,

    /// Commit the note refers to, if any.
    pub commit_id: Option<String>,

    /// Creation timestamp (Unix).
    pub created_at: i64,
}

/// Data required to append a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNote {
    pub author_id: i64,
    pub body: String,
    pub system: bool,
    pub commit_id: Option<String>,
}

impl NewNote {
    /// A system note authored on behalf of `author_id`.
    pub fn system(author_id: i64, body: impl Into<String>) -> Self {
        Self {
            author_id,
            body: body.into(),
            system: true,
            commit_id: None,
        }
    }

    /// Attach the commit this note talks about.
    pub fn with_commit(mut self, commit_id: impl Into<String>) -> Self {
        self.commit_id = Some(commit_id.into());
        self
    }
}

/// Append a note inside an open transaction.
pub async fn insert_note(
    conn: &mut SqliteConnection,
    merge_request_id: i64,
    note: &NewNote,
    created_at: i64,
) -> Result<i64, sqlx::Error> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO notes (merge_request_id, author_id, body, system, commit_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(merge_request_id)
    .bind(note.author_id)
    .bind(&note.body)
    .bind(note.system)
    .bind(&note.commit_id)
    .bind(created_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

/// Notes of a merge request in the order they were appended.
pub async fn list_notes(pool: &DbPool, merge_request_id: i64) -> Result<Vec<Note>, sqlx::Error> {
    sqlx::query_as::<_, Note>(
        "SELECT id, merge_request_id, author_id, body, system, commit_id, created_at
         FROM notes WHERE merge_request_id = ? ORDER BY id",
    )
    .bind(merge_request_id)
    .fetch_all(pool)
    .await
}
