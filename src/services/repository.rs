//! Repository port used by the refresh engine.
//!
//! The engine never touches git directly; it asks a [`Repository`] for the
//! handful of reads it needs. [`super::git_repository::GitRepository`] is the
//! on-disk implementation.

use crate::error::AppError;
use crate::models::{Commit, FileDiff};

#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    /// Commits reachable from `to` but not from `from`, newest first.
    ///
    /// With `from` set to `None` every commit reachable from `to` is returned.
    async fn commits_between(&self, from: Option<&str>, to: &str) -> Result<Vec<Commit>, AppError>;

    /// Best common ancestor of two revisions, `None` for unrelated histories
    /// or unknown revisions.
    async fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, AppError>;

    async fn branch_exists(&self, name: &str) -> Result<bool, AppError>;

    /// File changes between `base` and `head`. A missing base compares
    /// against the empty tree.
    async fn compare(&self, base: Option<&str>, head: &str) -> Result<Vec<FileDiff>, AppError>;
}
