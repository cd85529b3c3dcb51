//! Persistence port of the refresh engine and its SQLite implementation.

use chrono::Utc;

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::diff::{self, NewMergeRequestDiff};
use crate::models::merge_request::{self, MergeRequest, MergeRequestState};
use crate::models::note::{self, NewNote, Note};
use crate::models::project::{self, Project};
use crate::models::refresh_log::{self, NewRefreshLog};
use crate::models::todo::{self, Todo, TodoAction};

/// All state changes one refresh makes to one merge request.
///
/// Applied as a unit: either everything lands or nothing does.
#[derive(Debug, Clone, Default)]
pub struct MergeRequestUpdate {
    pub merge_request_id: i64,

    /// Replacement diff; also moves `diff_head_sha` to its head.
    pub diff: Option<NewMergeRequestDiff>,

    /// System notes to append, in order.
    pub notes: Vec<NewNote>,

    pub state: Option<MergeRequestState>,
    pub title: Option<String>,
    pub work_in_progress: Option<bool>,

    /// Clear merge-when-pipeline-succeeds and the user who set it.
    pub reset_merge_when_pipeline_succeeds: bool,

    /// Issues this merge request closes. Already linked issues are ignored.
    pub closing_issue_ids: Vec<i64>,

    pub merged_at: Option<i64>,
}

impl MergeRequestUpdate {
    pub fn new(merge_request_id: i64) -> Self {
        Self {
            merge_request_id,
            ..Default::default()
        }
    }

    /// Whether applying this update would change anything.
    pub fn is_empty(&self) -> bool {
        self.diff.is_none()
            && self.notes.is_empty()
            && self.state.is_none()
            && self.title.is_none()
            && self.work_in_progress.is_none()
            && !self.reset_merge_when_pipeline_succeeds
            && self.closing_issue_ids.is_empty()
            && self.merged_at.is_none()
    }
}

/// Storage used by the refresh engine.
#[async_trait::async_trait]
pub trait MergeRequestStore: Send + Sync {
    /// Live project by ID; deleted projects read as missing.
    async fn find_project(&self, project_id: i64) -> Result<Option<Project>, AppError>;

    async fn find_by_source_branch(
        &self,
        project_id: i64,
        branch: &str,
    ) -> Result<Vec<MergeRequest>, AppError>;

    async fn find_by_target_branch(
        &self,
        project_id: i64,
        branch: &str,
    ) -> Result<Vec<MergeRequest>, AppError>;

    /// Commits of the merge request's current diff, newest first.
    async fn merge_request_commit_shas(
        &self,
        merge_request_id: i64,
    ) -> Result<Vec<String>, AppError>;

    async fn apply_update(&self, update: &MergeRequestUpdate) -> Result<(), AppError>;

    /// Pending build-failure todos of a merge request, optionally for one user.
    async fn pending_build_failed_todos(
        &self,
        merge_request_id: i64,
        user_id: Option<i64>,
    ) -> Result<Vec<Todo>, AppError>;

    async fn mark_todos_done(&self, ids: &[i64]) -> Result<u64, AppError>;

    async fn log_operation(&self, entry: &NewRefreshLog) -> Result<(), AppError>;
}

/// [`MergeRequestStore`] backed by the local SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
    log_retention: i64,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            log_retention: crate::config::DEFAULT_LOG_RETENTION,
        }
    }

    pub fn with_log_retention(mut self, retention: i64) -> Self {
        self.log_retention = retention;
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn get_merge_request(&self, id: i64) -> Result<Option<MergeRequest>, AppError> {
        Ok(merge_request::get_merge_request(&self.pool, id).await?)
    }

    pub async fn notes(&self, merge_request_id: i64) -> Result<Vec<Note>, AppError> {
        Ok(note::list_notes(&self.pool, merge_request_id).await?)
    }

    /// Issue IDs linked as closed by a merge request, ascending.
    pub async fn closing_issue_ids(&self, merge_request_id: i64) -> Result<Vec<i64>, AppError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT issue_id FROM merge_requests_closing_issues WHERE merge_request_id = ? ORDER BY issue_id",
        )
        .bind(merge_request_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait::async_trait]
impl MergeRequestStore for SqliteStore {
    async fn find_project(&self, project_id: i64) -> Result<Option<Project>, AppError> {
        Ok(project::get_project(&self.pool, project_id).await?)
    }

    async fn find_by_source_branch(
        &self,
        project_id: i64,
        branch: &str,
    ) -> Result<Vec<MergeRequest>, AppError> {
        Ok(merge_request::find_by_source_branch(&self.pool, project_id, branch).await?)
    }

    async fn find_by_target_branch(
        &self,
        project_id: i64,
        branch: &str,
    ) -> Result<Vec<MergeRequest>, AppError> {
        Ok(merge_request::find_by_target_branch(&self.pool, project_id, branch).await?)
    }

    async fn merge_request_commit_shas(
        &self,
        merge_request_id: i64,
    ) -> Result<Vec<String>, AppError> {
        Ok(diff::get_commit_shas(&self.pool, merge_request_id).await?)
    }

    async fn apply_update(&self, update: &MergeRequestUpdate) -> Result<(), AppError> {
        if update.is_empty() {
            return Ok(());
        }

        let now = Utc::now().timestamp();
        let id = update.merge_request_id;
        let mut tx = self.pool.begin().await?;

        if let Some(new_diff) = &update.diff {
            diff::replace_diff(&mut tx, id, new_diff, now).await?;

            sqlx::query("UPDATE merge_requests SET diff_head_sha = ? WHERE id = ?")
                .bind(&new_diff.head_sha)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        for new_note in &update.notes {
            note::insert_note(&mut tx, id, new_note, now).await?;
        }

        if let Some(state) = update.state {
            sqlx::query("UPDATE merge_requests SET state = ? WHERE id = ?")
                .bind(state.to_string())
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(title) = &update.title {
            sqlx::query("UPDATE merge_requests SET title = ? WHERE id = ?")
                .bind(title)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(wip) = update.work_in_progress {
            sqlx::query("UPDATE merge_requests SET work_in_progress = ? WHERE id = ?")
                .bind(wip)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        if update.reset_merge_when_pipeline_succeeds {
            sqlx::query(
                "UPDATE merge_requests SET merge_when_pipeline_succeeds = 0, merge_user_id = NULL WHERE id = ?",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        for issue_id in &update.closing_issue_ids {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO merge_requests_closing_issues (merge_request_id, issue_id, created_at)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(issue_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(merged_at) = update.merged_at {
            sqlx::query("UPDATE merge_requests SET merged_at = ? WHERE id = ?")
                .bind(merged_at)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE merge_requests SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn pending_build_failed_todos(
        &self,
        merge_request_id: i64,
        user_id: Option<i64>,
    ) -> Result<Vec<Todo>, AppError> {
        let todos = todo::pending_for_target(
            &self.pool,
            merge_request_id,
            TodoAction::BuildFailed,
            user_id,
        )
        .await?;
        Ok(todos)
    }

    async fn mark_todos_done(&self, ids: &[i64]) -> Result<u64, AppError> {
        Ok(todo::mark_done(&self.pool, ids).await?)
    }

    async fn log_operation(&self, entry: &NewRefreshLog) -> Result<(), AppError> {
        let now = Utc::now().timestamp();
        Ok(refresh_log::insert_log(&self.pool, entry, now, self.log_retention).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::merge_request::NewMergeRequest;
    use crate::models::Commit;
    use tempfile::{tempdir, TempDir};

    async fn setup() -> (TempDir, SqliteStore, MergeRequest) {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();

        let mr = merge_request::insert_merge_request(
            &pool,
            &NewMergeRequest {
                iid: 1,
                title: "Add feature".to_string(),
                author_id: 1,
                source_project_id: 1,
                source_branch: "feature".to_string(),
                target_project_id: 1,
                target_branch: "master".to_string(),
                merge_when_pipeline_succeeds: true,
                merge_user_id: Some(1),
                diff_head_sha: None,
            },
        )
        .await
        .unwrap();

        (dir, SqliteStore::new(pool), mr)
    }

    fn commit(id: &str) -> Commit {
        Commit {
            id: id.to_string(),
            message: format!("Commit {}\n\nbody", id),
            author_name: "Dev".to_string(),
            author_email: "dev@example.com".to_string(),
            committer_email: "dev@example.com".to_string(),
            committed_at: 0,
        }
    }

    #[tokio::test]
    async fn test_apply_update_writes_everything() {
        let (_dir, store, mr) = setup().await;

        let mut update = MergeRequestUpdate::new(mr.id);
        update.diff = Some(NewMergeRequestDiff {
            base_sha: Some("base".to_string()),
            start_sha: Some("base".to_string()),
            head_sha: "bbbb".to_string(),
            commits: vec![commit("bbbb"), commit("aaaa")],
            files: vec![],
        });
        update.notes.push(NewNote::system(1, "added 2 commits"));
        update.title = Some(mr.wip_title());
        update.work_in_progress = Some(true);
        update.reset_merge_when_pipeline_succeeds = true;
        update.closing_issue_ids = vec![3, 3, 5];

        store.apply_update(&update).await.unwrap();

        let mr = store.get_merge_request(mr.id).await.unwrap().unwrap();
        assert_eq!(mr.diff_head_sha.as_deref(), Some("bbbb"));
        assert_eq!(mr.title, "WIP: Add feature");
        assert!(mr.work_in_progress);
        assert!(!mr.merge_when_pipeline_succeeds);
        assert!(mr.merge_user_id.is_none());

        assert_eq!(store.merge_request_commit_shas(mr.id).await.unwrap(), vec!["bbbb", "aaaa"]);
        assert_eq!(store.notes(mr.id).await.unwrap().len(), 1);
        assert_eq!(store.closing_issue_ids(mr.id).await.unwrap(), vec![3, 5]);

        // Linking the same issue again is absorbed
        let mut again = MergeRequestUpdate::new(mr.id);
        again.closing_issue_ids = vec![3];
        store.apply_update(&again).await.unwrap();
        assert_eq!(store.closing_issue_ids(mr.id).await.unwrap(), vec![3, 5]);
    }

    #[tokio::test]
    async fn test_apply_update_rolls_back_on_failure() {
        let (_dir, store, mr) = setup().await;

        // Notes for a missing merge request violate the foreign key
        let mut update = MergeRequestUpdate::new(mr.id + 100);
        update.notes.push(NewNote::system(1, "merged"));
        update.state = Some(MergeRequestState::Merged);
        assert!(store.apply_update(&update).await.is_err());

        let mut update = MergeRequestUpdate::new(mr.id);
        update.state = Some(MergeRequestState::Merged);
        update.notes.push(NewNote::system(1, "merged"));
        store.apply_update(&update).await.unwrap();

        let mr = store.get_merge_request(mr.id).await.unwrap().unwrap();
        assert_eq!(mr.state_enum(), MergeRequestState::Merged);
        assert_eq!(store.notes(mr.id).await.unwrap().len(), 1);
    }

    #[test]
    fn test_empty_update() {
        assert!(MergeRequestUpdate::new(1).is_empty());

        let mut update = MergeRequestUpdate::new(1);
        update.reset_merge_when_pipeline_succeeds = true;
        assert!(!update.is_empty());
    }
}
