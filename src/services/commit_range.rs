//! Commit range resolution for a push.

use crate::error::AppError;
use crate::models::push::Push;
use crate::models::Commit;
use crate::services::repository::Repository;

/// Commits introduced by a push, newest first.
#[derive(Debug, Clone, Default)]
pub struct CommitRange {
    pub commits: Vec<Commit>,

    /// Revision the range was computed from (`None` when it reaches the root).
    pub base: Option<String>,

    /// The push created the branch and the range was recovered by a merge
    /// base against the default branch instead of the previous tip.
    pub recovered_from_merge_base: bool,
}

impl CommitRange {
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn contains(&self, sha: &str) -> bool {
        self.commits.iter().any(|c| c.id == sha)
    }

    /// Newest commit of the range.
    pub fn head(&self) -> Option<&Commit> {
        self.commits.first()
    }
}

/// Resolves the range of a push against a repository.
pub struct CommitRangeResolver<'a> {
    repository: &'a dyn Repository,
    default_branch: &'a str,
}

impl<'a> CommitRangeResolver<'a> {
    pub fn new(repository: &'a dyn Repository, default_branch: &'a str) -> Self {
        Self {
            repository,
            default_branch,
        }
    }

    /// Resolve the commits a push introduced.
    ///
    /// # Arguments
    /// * `push` - Parsed push; a removed branch yields an empty range
    ///
    /// # Returns
    /// Commits reachable from the new revision and not from the previous tip.
    /// For a new branch the previous tip is the merge base with the default
    /// branch, or nothing when the default branch is the one being pushed.
    pub async fn resolve(&self, push: &Push) -> Result<CommitRange, AppError> {
        if push.is_branch_removed() {
            return Ok(CommitRange::default());
        }

        if !push.is_branch_created() {
            let commits = self
                .repository
                .commits_between(Some(&push.old_rev), &push.new_rev)
                .await?;

            return Ok(CommitRange {
                commits,
                base: Some(push.old_rev.clone()),
                recovered_from_merge_base: false,
            });
        }

        let base = if push.branch != self.default_branch
            && self.repository.branch_exists(self.default_branch).await?
        {
            self.repository
                .merge_base(self.default_branch, &push.new_rev)
                .await?
        } else {
            None
        };

        let commits = self
            .repository
            .commits_between(base.as_deref(), &push.new_rev)
            .await?;

        log::debug!(
            "Branch {} created with {} commit(s) (base: {})",
            push.branch,
            commits.len(),
            base.as_deref().unwrap_or("none")
        );

        Ok(CommitRange {
            recovered_from_merge_base: base.is_some(),
            commits,
            base,
        })
    }
}
