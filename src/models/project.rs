//! Project model and queries.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::pool::DbPool;

/// A project hosting a repository, possibly a fork of another project.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project ID.
    pub id: i64,

    /// Short project name.
    pub name: String,

    /// Path with namespace (e.g., "group/project").
    pub path_with_namespace: String,

    /// Default branch, if the repository has one.
    pub default_branch: Option<String>,

    /// Upstream project when this project is a fork.
    pub forked_from_project_id: Option<i64>,

    /// Soft-deleted projects keep their row but are ignored by refreshes.
    pub deleted: bool,
}

impl Project {
    /// Whether this project is a fork.
    pub fn is_fork(&self) -> bool {
        self.forked_from_project_id.is_some()
    }

    /// Default branch, or `fallback` when none is recorded.
    pub fn default_branch_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.default_branch.as_deref().unwrap_or(fallback)
    }
}

/// Look up a live (not deleted) project.
pub async fn get_project(pool: &DbPool, project_id: i64) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "SELECT id, name, path_with_namespace, default_branch, forked_from_project_id, deleted
         FROM projects WHERE id = ? AND deleted = 0",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await
}

/// Upsert a project (insert or update on conflict).
pub async fn upsert_project(pool: &DbPool, project: &Project) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO projects (id, name, path_with_namespace, default_branch, forked_from_project_id, deleted)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           path_with_namespace = excluded.path_with_namespace,
           default_branch = excluded.default_branch,
           forked_from_project_id = excluded.forked_from_project_id,
           deleted = excluded.deleted",
    )
    .bind(project.id)
    .bind(&project.name)
    .bind(&project.path_with_namespace)
    .bind(&project.default_branch)
    .bind(project.forked_from_project_id)
    .bind(project.deleted)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a project deleted. Its merge requests stay but are skipped.
pub async fn mark_deleted(pool: &DbPool, project_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE projects SET deleted = 1 WHERE id = ?")
        .bind(project_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::{tempdir, TempDir};

    async fn setup_test_db() -> (TempDir, DbPool) {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();
        (dir, pool)
    }

    fn project(id: i64, forked_from: Option<i64>) -> Project {
        Project {
            id,
            name: format!("project-{}", id),
            path_with_namespace: format!("group/project-{}", id),
            default_branch: Some("master".to_string()),
            forked_from_project_id: forked_from,
            deleted: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get_project() {
        let (_dir, pool) = setup_test_db().await;

        upsert_project(&pool, &project(42, None)).await.unwrap();

        let fetched = get_project(&pool, 42).await.unwrap().unwrap();
        assert_eq!(fetched.path_with_namespace, "group/project-42");
        assert!(!fetched.is_fork());
        assert_eq!(fetched.default_branch_or("main"), "master");
    }

    #[tokio::test]
    async fn test_deleted_project_is_hidden() {
        let (_dir, pool) = setup_test_db().await;

        upsert_project(&pool, &project(1, None)).await.unwrap();
        upsert_project(&pool, &project(2, Some(1))).await.unwrap();
        assert!(get_project(&pool, 2).await.unwrap().unwrap().is_fork());

        assert!(mark_deleted(&pool, 2).await.unwrap());
        assert!(get_project(&pool, 2).await.unwrap().is_none());
        assert!(get_project(&pool, 1).await.unwrap().is_some());
        assert!(!mark_deleted(&pool, 99).await.unwrap());
    }
}
