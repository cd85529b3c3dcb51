//! Finds the merge requests a push can affect.

use std::collections::HashSet;

use crate::error::AppError;
use crate::models::{MergeRequest, Project};
use crate::services::store::MergeRequestStore;

/// Merge requests touched by a push, split by how they matched.
#[derive(Debug, Clone, Default)]
pub struct LocatedMergeRequests {
    /// Source branch is the pushed branch of the pushed project. Includes
    /// merge requests from this project into any other project (fork
    /// merge requests opened from here).
    pub by_source: Vec<MergeRequest>,

    /// Target branch is the pushed branch of the pushed project. Includes
    /// merge requests opened from forks.
    pub by_target: Vec<MergeRequest>,
}

impl LocatedMergeRequests {
    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty() && self.by_target.is_empty()
    }

    /// Every located merge request once, source matches first.
    pub fn all(&self) -> Vec<&MergeRequest> {
        let mut seen = HashSet::new();
        self.by_source
            .iter()
            .chain(self.by_target.iter())
            .filter(|mr| seen.insert(mr.id))
            .collect()
    }

    pub fn is_source_match(&self, merge_request_id: i64) -> bool {
        self.by_source.iter().any(|mr| mr.id == merge_request_id)
    }

    pub fn is_target_match(&self, merge_request_id: i64) -> bool {
        self.by_target.iter().any(|mr| mr.id == merge_request_id)
    }
}

pub struct MergeRequestLocator<'a> {
    store: &'a dyn MergeRequestStore,
}

impl<'a> MergeRequestLocator<'a> {
    pub fn new(store: &'a dyn MergeRequestStore) -> Self {
        Self { store }
    }

    /// Locate merge requests of any state for `branch` of `project`.
    ///
    /// Merge requests whose other side lives in a deleted project are dropped.
    pub async fn locate(
        &self,
        project: &Project,
        branch: &str,
    ) -> Result<LocatedMergeRequests, AppError> {
        let by_source = self
            .store
            .find_by_source_branch(project.id, branch)
            .await?;
        let by_target = self
            .store
            .find_by_target_branch(project.id, branch)
            .await?;

        Ok(LocatedMergeRequests {
            by_source: self.live_only(dedup(by_source)).await?,
            by_target: self.live_only(dedup(by_target)).await?,
        })
    }

    async fn live_only(&self, mrs: Vec<MergeRequest>) -> Result<Vec<MergeRequest>, AppError> {
        let mut live = Vec::with_capacity(mrs.len());

        for mr in mrs {
            if self.projects_exist(&mr).await? {
                live.push(mr);
            } else {
                log::debug!("Skipping MR {}: source or target project is gone", mr.id);
            }
        }

        Ok(live)
    }

    async fn projects_exist(&self, mr: &MergeRequest) -> Result<bool, AppError> {
        if self.store.find_project(mr.source_project_id).await?.is_none() {
            return Ok(false);
        }
        if mr.for_fork() && self.store.find_project(mr.target_project_id).await?.is_none() {
            return Ok(false);
        }
        Ok(true)
    }
}

fn dedup(mrs: Vec<MergeRequest>) -> Vec<MergeRequest> {
    let mut seen = HashSet::new();
    mrs.into_iter().filter(|mr| seen.insert(mr.id)).collect()
}
