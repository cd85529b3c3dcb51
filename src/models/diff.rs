//! Merge request diff models.
//!
//! A merge request has one current diff: the comparison between its target
//! branch and its source head, together with the commits it contains.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use std::sync::Arc;

use crate::db::pool::DbPool;
use crate::models::commit::Commit;
use crate::models::diff_line::{DiffFile, LineRenderer};

/// Type of file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl From<&str> for ChangeType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "added" => Self::Added,
            "deleted" => Self::Deleted,
            "renamed" => Self::Renamed,
            _ => Self::Modified,
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
            Self::Renamed => write!(f, "renamed"),
        }
    }
}

/// One file of a repository comparison, as produced by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub old_path: String,
    pub new_path: String,
    pub new_file: bool,
    pub deleted_file: bool,
    pub renamed_file: bool,

    /// Unified patch text starting at the first `@@` hunk header.
    pub diff: String,
}

impl FileDiff {
    pub fn change_type(&self) -> ChangeType {
        if self.new_file {
            ChangeType::Added
        } else if self.deleted_file {
            ChangeType::Deleted
        } else if self.renamed_file {
            ChangeType::Renamed
        } else {
            ChangeType::Modified
        }
    }

    /// Added and removed line counts of the patch.
    pub fn line_stats(&self) -> (i64, i64) {
        count_changes(&self.diff)
    }
}

/// Count `+`/`-` lines of a patch, ignoring file headers.
pub fn count_changes(patch: &str) -> (i64, i64) {
    let mut additions = 0i64;
    let mut deletions = 0i64;
    for line in patch.lines() {
        if line.starts_with('+') && !line.starts_with("+++") {
            additions += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            deletions += 1;
        }
    }
    (additions, deletions)
}

/// A freshly computed diff to persist for a merge request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMergeRequestDiff {
    /// Merge base of target branch and head (`None` when unrelated).
    pub base_sha: Option<String>,

    /// Revision the comparison starts from; same as `base_sha` for refreshes.
    pub start_sha: Option<String>,

    /// Source head the diff was computed for.
    pub head_sha: String,

    /// Commits of the merge request, newest first.
    pub commits: Vec<Commit>,

    pub files: Vec<FileDiff>,
}

/// Stored diff summary of a merge request.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MergeRequestDiff {
    pub merge_request_id: i64,
    pub base_sha: Option<String>,
    pub start_sha: Option<String>,
    pub head_sha: String,
    pub commits_count: i64,
    pub file_count: i64,
    pub additions: i64,
    pub deletions: i64,

    /// Complete unified diff text.
    pub content: String,

    pub created_at: i64,
}

/// Stored per-file change of a merge request diff.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MergeRequestDiffFile {
    pub id: i64,
    pub merge_request_id: i64,

    /// Previous file path (for renames/deletes).
    pub old_path: Option<String>,

    pub new_path: String,

    /// Type of change: `added`, `modified`, `deleted`, `renamed`.
    pub change_type: String,

    pub additions: i64,
    pub deletions: i64,

    /// Order in diff for navigation.
    pub file_position: i64,

    /// Per-file unified diff content.
    pub diff_content: Option<String>,
}

impl MergeRequestDiffFile {
    /// Parse the change type string into an enum.
    pub fn change_type_enum(&self) -> ChangeType {
        ChangeType::from(self.change_type.as_str())
    }

    /// Path shown for the file; renames read "old → new".
    pub fn display_path(&self) -> String {
        if let (Some(old), ChangeType::Renamed) = (&self.old_path, self.change_type_enum()) {
            format!("{} → {}", old, self.new_path)
        } else {
            self.new_path.clone()
        }
    }
}

/// Replace the current diff of a merge request inside an open transaction.
pub async fn replace_diff(
    conn: &mut SqliteConnection,
    merge_request_id: i64,
    diff: &NewMergeRequestDiff,
    created_at: i64,
) -> Result<(), sqlx::Error> {
    let mut additions = 0i64;
    let mut deletions = 0i64;
    let mut combined_content = String::new();

    for file in &diff.files {
        let (file_additions, file_deletions) = file.line_stats();
        additions += file_additions;
        deletions += file_deletions;

        combined_content.push_str(&format!("--- a/{}\n", file.old_path));
        combined_content.push_str(&format!("+++ b/{}\n", file.new_path));
        combined_content.push_str(&file.diff);
        if !file.diff.ends_with('\n') {
            combined_content.push('\n');
        }
    }

    sqlx::query(
        r#"
        INSERT INTO merge_request_diffs (
            merge_request_id, base_sha, start_sha, head_sha, commits_count,
            file_count, additions, deletions, content, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(merge_request_id) DO UPDATE SET
            base_sha = excluded.base_sha,
            start_sha = excluded.start_sha,
            head_sha = excluded.head_sha,
            commits_count = excluded.commits_count,
            file_count = excluded.file_count,
            additions = excluded.additions,
            deletions = excluded.deletions,
            content = excluded.content,
            created_at = excluded.created_at
        "#,
    )
    .bind(merge_request_id)
    .bind(&diff.base_sha)
    .bind(&diff.start_sha)
    .bind(&diff.head_sha)
    .bind(diff.commits.len() as i64)
    .bind(diff.files.len() as i64)
    .bind(additions)
    .bind(deletions)
    .bind(&combined_content)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM merge_request_diff_commits WHERE merge_request_id = ?")
        .bind(merge_request_id)
        .execute(&mut *conn)
        .await?;

    for (order, commit) in diff.commits.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO merge_request_diff_commits (
                merge_request_id, relative_order, sha, title, author_name, author_email, committed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(merge_request_id)
        .bind(order as i64)
        .bind(&commit.id)
        .bind(commit.title())
        .bind(&commit.author_name)
        .bind(&commit.author_email)
        .bind(commit.committed_at)
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query("DELETE FROM merge_request_diff_files WHERE merge_request_id = ?")
        .bind(merge_request_id)
        .execute(&mut *conn)
        .await?;

    for (position, file) in diff.files.iter().enumerate() {
        let (file_additions, file_deletions) = file.line_stats();

        sqlx::query(
            r#"
            INSERT INTO merge_request_diff_files (
                merge_request_id, old_path, new_path, change_type, additions, deletions, file_position, diff_content
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(merge_request_id)
        .bind(&file.old_path)
        .bind(&file.new_path)
        .bind(file.change_type().to_string())
        .bind(file_additions)
        .bind(file_deletions)
        .bind(position as i64)
        .bind(&file.diff)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Current diff summary of a merge request.
pub async fn get_diff(
    pool: &DbPool,
    merge_request_id: i64,
) -> Result<Option<MergeRequestDiff>, sqlx::Error> {
    sqlx::query_as::<_, MergeRequestDiff>(
        "SELECT merge_request_id, base_sha, start_sha, head_sha, commits_count, file_count,
                additions, deletions, content, created_at
         FROM merge_request_diffs WHERE merge_request_id = ?",
    )
    .bind(merge_request_id)
    .fetch_optional(pool)
    .await
}

/// Shas of the commits in the current diff, newest first.
pub async fn get_commit_shas(
    pool: &DbPool,
    merge_request_id: i64,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT sha FROM merge_request_diff_commits WHERE merge_request_id = ? ORDER BY relative_order",
    )
    .bind(merge_request_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(sha,)| sha).collect())
}

/// Stored files of the current diff in display order.
pub async fn get_diff_files(
    pool: &DbPool,
    merge_request_id: i64,
) -> Result<Vec<MergeRequestDiffFile>, sqlx::Error> {
    sqlx::query_as::<_, MergeRequestDiffFile>(
        "SELECT id, merge_request_id, old_path, new_path, change_type, additions, deletions,
                file_position, diff_content
         FROM merge_request_diff_files WHERE merge_request_id = ? ORDER BY file_position",
    )
    .bind(merge_request_id)
    .fetch_all(pool)
    .await
}

/// Parse the stored files of a merge request into line-level diff files.
///
/// `renderer` becomes the rendering context of every file; lines render
/// lazily on first access.
pub async fn load_diff_files(
    pool: &DbPool,
    merge_request_id: i64,
    renderer: Option<Arc<dyn LineRenderer>>,
) -> Result<Vec<Arc<DiffFile>>, sqlx::Error> {
    let files = get_diff_files(pool, merge_request_id).await?;

    Ok(files
        .iter()
        .map(|file| {
            DiffFile::parse(
                &file.new_path,
                file.diff_content.as_deref().unwrap_or(""),
                renderer.clone(),
            )
        })
        .collect())
}
