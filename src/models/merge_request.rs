//! Merge request model and queries.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::pool::DbPool;

/// Title prefix applied when a merge request is marked work in progress.
pub const WIP_PREFIX: &str = "WIP: ";

/// State of a merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeRequestState {
    Opened,
    Merged,
    Closed,
}

impl From<&str> for MergeRequestState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "merged" => Self::Merged,
            "closed" => Self::Closed,
            _ => Self::Opened,
        }
    }
}

impl std::fmt::Display for MergeRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened => write!(f, "opened"),
            Self::Merged => write!(f, "merged"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A merge request from a source branch into a target branch, possibly
/// across projects of one fork network.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MergeRequest {
    /// Global ID.
    pub id: i64,

    /// Project-scoped number.
    pub iid: i64,

    pub title: String,

    pub author_id: i64,

    /// Project holding the source branch.
    pub source_project_id: i64,

    /// Branch being merged.
    pub source_branch: String,

    /// Project receiving the merge.
    pub target_project_id: i64,

    /// Destination branch.
    pub target_branch: String,

    /// Current state: `opened`, `merged`, `closed`.
    pub state: String,

    pub work_in_progress: bool,

    /// Merge automatically once the pipeline passes.
    pub merge_when_pipeline_succeeds: bool,

    /// User who enabled the automatic merge.
    pub merge_user_id: Option<i64>,

    /// Head sha of the latest computed diff.
    pub diff_head_sha: Option<String>,

    /// Creation timestamp (Unix).
    pub created_at: i64,

    /// Last update timestamp (Unix).
    pub updated_at: i64,

    /// Merge timestamp (Unix, if merged).
    pub merged_at: Option<i64>,
}

impl MergeRequest {
    /// Parse the state string into an enum.
    pub fn state_enum(&self) -> MergeRequestState {
        MergeRequestState::from(self.state.as_str())
    }

    /// Check if the MR is open.
    pub fn is_open(&self) -> bool {
        self.state_enum() == MergeRequestState::Opened
    }

    /// Whether source and target live in different projects.
    pub fn for_fork(&self) -> bool {
        self.source_project_id != self.target_project_id
    }

    /// Title with the work-in-progress prefix applied once.
    pub fn wip_title(&self) -> String {
        let lower = self.title.to_lowercase();
        if lower.starts_with("wip:") || lower.starts_with("[wip]") {
            self.title.clone()
        } else {
            format!("{}{}", WIP_PREFIX, self.title)
        }
    }
}

/// Data required to create a merge request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMergeRequest {
    pub iid: i64,
    pub title: String,
    pub author_id: i64,
    pub source_project_id: i64,
    pub source_branch: String,
    pub target_project_id: i64,
    pub target_branch: String,
    pub merge_when_pipeline_succeeds: bool,
    pub merge_user_id: Option<i64>,
    pub diff_head_sha: Option<String>,
}

const SELECT_COLUMNS: &str = "SELECT id, iid, title, author_id, source_project_id, source_branch,
    target_project_id, target_branch, state, work_in_progress, merge_when_pipeline_succeeds,
    merge_user_id, diff_head_sha, created_at, updated_at, merged_at FROM merge_requests";

/// Insert a merge request and return it.
pub async fn insert_merge_request(
    pool: &DbPool,
    mr: &NewMergeRequest,
) -> Result<MergeRequest, sqlx::Error> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO merge_requests (
            iid, title, author_id, source_project_id, source_branch,
            target_project_id, target_branch, merge_when_pipeline_succeeds,
            merge_user_id, diff_head_sha
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(mr.iid)
    .bind(&mr.title)
    .bind(mr.author_id)
    .bind(mr.source_project_id)
    .bind(&mr.source_branch)
    .bind(mr.target_project_id)
    .bind(&mr.target_branch)
    .bind(mr.merge_when_pipeline_succeeds)
    .bind(mr.merge_user_id)
    .bind(&mr.diff_head_sha)
    .fetch_one(pool)
    .await?;

    get_merge_request(pool, id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

/// Look up a merge request by ID.
pub async fn get_merge_request(
    pool: &DbPool,
    id: i64,
) -> Result<Option<MergeRequest>, sqlx::Error> {
    sqlx::query_as::<_, MergeRequest>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Merge requests of any state whose source is `branch` of `project_id`.
pub async fn find_by_source_branch(
    pool: &DbPool,
    project_id: i64,
    branch: &str,
) -> Result<Vec<MergeRequest>, sqlx::Error> {
    sqlx::query_as::<_, MergeRequest>(&format!(
        "{} WHERE source_project_id = ? AND source_branch = ? ORDER BY id",
        SELECT_COLUMNS
    ))
    .bind(project_id)
    .bind(branch)
    .fetch_all(pool)
    .await
}

/// Merge requests of any state targeting `branch` of `project_id`.
pub async fn find_by_target_branch(
    pool: &DbPool,
    project_id: i64,
    branch: &str,
) -> Result<Vec<MergeRequest>, sqlx::Error> {
    sqlx::query_as::<_, MergeRequest>(&format!(
        "{} WHERE target_project_id = ? AND target_branch = ? ORDER BY id",
        SELECT_COLUMNS
    ))
    .bind(project_id)
    .bind(branch)
    .fetch_all(pool)
    .await
}

/// Set the state of a merge request (used for user-driven close/reopen).
pub async fn set_state(
    pool: &DbPool,
    id: i64,
    state: MergeRequestState,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE merge_requests SET state = ?, updated_at = strftime('%s', 'now') WHERE id = ?",
    )
    .bind(state.to_string())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mr(title: &str) -> MergeRequest {
        MergeRequest {
            id: 1,
            iid: 1,
            title: title.to_string(),
            author_id: 1,
            source_project_id: 1,
            source_branch: "feature".to_string(),
            target_project_id: 1,
            target_branch: "master".to_string(),
            state: "opened".to_string(),
            work_in_progress: false,
            merge_when_pipeline_succeeds: false,
            merge_user_id: None,
            diff_head_sha: None,
            created_at: 0,
            updated_at: 0,
            merged_at: None,
        }
    }

    #[test]
    fn test_state_from_str() {
        assert_eq!(MergeRequestState::from("opened"), MergeRequestState::Opened);
        assert_eq!(MergeRequestState::from("MERGED"), MergeRequestState::Merged);
        assert_eq!(MergeRequestState::from("Closed"), MergeRequestState::Closed);
        assert_eq!(MergeRequestState::from("unknown"), MergeRequestState::Opened);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(MergeRequestState::Opened.to_string(), "opened");
        assert_eq!(MergeRequestState::Merged.to_string(), "merged");
        assert_eq!(MergeRequestState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_wip_title_applied_once() {
        assert_eq!(mr("Add feature").wip_title(), "WIP: Add feature");
        assert_eq!(mr("WIP: Add feature").wip_title(), "WIP: Add feature");
        assert_eq!(mr("[WIP] Add feature").wip_title(), "[WIP] Add feature");
    }

    #[test]
    fn test_for_fork() {
        let mut m = mr("x");
        assert!(!m.for_fork());
        m.source_project_id = 2;
        assert!(m.for_fork());
        assert!(m.is_open());
    }
}
