//! Merge request refresh after a push.
//!
//! A push to a branch can:
//! - update the source branch of open merge requests (new diff, commits note,
//!   WIP marking, closing issue links, auto-merge reset)
//! - land merge requests in their target branch (merged state and note)
//! - delete a source branch (note only)
//!
//! Each located merge request is processed independently. A failure aborts
//! that merge request only; its writes are applied in one transaction, so it
//! is left as it was before the push. Hooks and todo updates run after the
//! merge request's changes are committed.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::config::RefreshConfig;
use crate::error::AppError;
use crate::models::push::Push;
use crate::models::refresh_log::{LogStatus, NewRefreshLog};
use crate::models::{Commit, MergeRequest, MergeRequestState, NewMergeRequestDiff, NewNote, Project};
use crate::services::commit_range::{CommitRange, CommitRangeResolver};
use crate::services::events::HookAction;
use crate::services::hooks::{HookDispatcher, HookRegistry, HookReport};
use crate::services::locator::{LocatedMergeRequests, MergeRequestLocator};
use crate::services::references::{ClosingPatternExtractor, ReferenceExtractor};
use crate::services::repository::Repository;
use crate::services::store::{MergeRequestStore, MergeRequestUpdate};
use crate::services::system_notes;
use crate::services::todos::{TodoTrigger, TodoUpdater};

/// What a refresh did to one merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    NoOp,
    SourceUpdated,
    TargetMerged,
    SourceRemoved,
}

impl Transition {
    /// Operation name written to the refresh log.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::NoOp => "noop",
            Self::SourceUpdated => "update",
            Self::TargetMerged => "merge",
            Self::SourceRemoved => "branch_removed",
        }
    }
}

/// Result of refreshing merge requests for one push.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshResult {
    /// Pushed branch, `None` when the ref was not a branch.
    pub branch: Option<String>,

    /// Number of commits the push introduced.
    pub commit_count: usize,

    /// Merge requests whose source branch was updated.
    pub updated: Vec<i64>,

    /// Merge requests merged by this push.
    pub merged: Vec<i64>,

    /// Merge requests whose source branch was deleted.
    pub source_removed: Vec<i64>,

    /// Merge requests located but left untouched.
    pub unchanged: Vec<i64>,

    /// Hook handlers that failed.
    pub hook_failures: usize,

    /// Per merge request errors.
    pub errors: Vec<String>,

    /// Duration of the refresh in milliseconds.
    pub duration_ms: i64,
}

impl RefreshResult {
    fn record(&mut self, mr_id: i64, transition: Transition) {
        match transition {
            Transition::NoOp => self.unchanged.push(mr_id),
            Transition::SourceUpdated => self.updated.push(mr_id),
            Transition::TargetMerged => self.merged.push(mr_id),
            Transition::SourceRemoved => self.source_removed.push(mr_id),
        }
    }
}

struct Processed {
    transition: Transition,
    hooks: HookReport,
}

impl Processed {
    fn no_op() -> Self {
        Self {
            transition: Transition::NoOp,
            hooks: HookReport::default(),
        }
    }
}

/// Refreshes the merge requests of one project after pushes to it.
pub struct RefreshService {
    project: Project,
    current_user_id: i64,
    store: Arc<dyn MergeRequestStore>,
    repository: Arc<dyn Repository>,
    config: RefreshConfig,
    hooks: HookDispatcher,
    references: Arc<dyn ReferenceExtractor>,
}

impl RefreshService {
    /// Create a refresh service for pushes to `project` by `current_user_id`.
    ///
    /// # Arguments
    /// * `project` - Project that received the push
    /// * `current_user_id` - Pushing user; authors the system notes
    /// * `store` - Merge request storage
    /// * `repository` - Repository of `project`
    pub fn new(
        project: Project,
        current_user_id: i64,
        store: Arc<dyn MergeRequestStore>,
        repository: Arc<dyn Repository>,
    ) -> Self {
        Self {
            project,
            current_user_id,
            store,
            repository,
            config: RefreshConfig::default(),
            hooks: HookDispatcher::default(),
            references: Arc::new(ClosingPatternExtractor),
        }
    }

    pub fn with_config(mut self, config: RefreshConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_hooks(mut self, registry: HookRegistry) -> Self {
        self.hooks = HookDispatcher::new(registry);
        self
    }

    pub fn with_reference_extractor(mut self, extractor: Arc<dyn ReferenceExtractor>) -> Self {
        self.references = extractor;
        self
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    fn default_branch(&self) -> &str {
        self.project.default_branch_or(&self.config.fallback_default_branch)
    }

    /// Refresh merge requests for a push of `ref_name` from `old_rev` to `new_rev`.
    ///
    /// Failing to resolve the pushed commits aborts the whole refresh. Failures
    /// of individual merge requests are logged and returned in
    /// [`RefreshResult::errors`] while the others are still processed.
    pub async fn execute(
        &self,
        old_rev: &str,
        new_rev: &str,
        ref_name: &str,
    ) -> Result<RefreshResult, AppError> {
        let start = Instant::now();
        let mut result = RefreshResult::default();

        let Some(push) = Push::parse(old_rev, new_rev, ref_name) else {
            log::debug!("Ignoring push to {}: not a branch", ref_name);
            return Ok(result);
        };
        result.branch = Some(push.branch.clone());

        log::info!(
            "Refreshing merge requests of project {} for {} ({} -> {})",
            self.project.path_with_namespace,
            push.branch,
            push.old_rev,
            push.new_rev
        );

        if push.is_branch_removed() {
            let located = MergeRequestLocator::new(self.store.as_ref())
                .locate(&self.project, &push.branch)
                .await?;
            self.remove_source_branch(&push, &located, &mut result).await;

            result.duration_ms = start.elapsed().as_millis() as i64;
            return Ok(result);
        }

        let range = CommitRangeResolver::new(self.repository.as_ref(), self.default_branch())
            .resolve(&push)
            .await?;
        result.commit_count = range.len();

        if range.is_empty() {
            log::debug!("Push to {} introduced no commits", push.branch);
            result.duration_ms = start.elapsed().as_millis() as i64;
            return Ok(result);
        }

        let located = MergeRequestLocator::new(self.store.as_ref())
            .locate(&self.project, &push.branch)
            .await?;

        let mut outcomes: Vec<(i64, Result<Processed, AppError>, i64)> =
            stream::iter(located.all())
                .map(|mr| {
                    let push = &push;
                    let range = &range;
                    let located = &located;
                    async move {
                        let mr_start = Instant::now();
                        let outcome = self.refresh_merge_request(mr, push, range, located).await;
                        (mr.id, outcome, mr_start.elapsed().as_millis() as i64)
                    }
                })
                .buffer_unordered(self.config.concurrency())
                .collect()
                .await;

        outcomes.sort_by_key(|(id, _, _)| *id);

        for (mr_id, outcome, duration_ms) in outcomes {
            match outcome {
                Ok(processed) => {
                    result.record(mr_id, processed.transition);
                    result.hook_failures += processed.hooks.failed;
                    self.log_outcome(mr_id, processed.transition.operation(), None, duration_ms)
                        .await;
                }
                Err(e) => {
                    log::warn!("Failed to refresh MR {}: {}", mr_id, e);
                    result.errors.push(format!("MR {}: {}", mr_id, e));
                    self.log_outcome(mr_id, "refresh", Some(e.to_string()), duration_ms)
                        .await;
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as i64;

        log::info!(
            "Refresh of {} done: {} updated, {} merged, {} error(s) in {}ms",
            push.branch,
            result.updated.len(),
            result.merged.len(),
            result.errors.len(),
            result.duration_ms
        );

        Ok(result)
    }

    async fn refresh_merge_request(
        &self,
        mr: &MergeRequest,
        push: &Push,
        range: &CommitRange,
        located: &LocatedMergeRequests,
    ) -> Result<Processed, AppError> {
        // Closed and merged merge requests are never changed by a push
        if !mr.is_open() {
            return Ok(Processed::no_op());
        }

        if located.is_target_match(mr.id) && self.merged_by_push(mr, push, range).await? {
            return self.mark_merged(mr, push, range).await;
        }

        if located.is_source_match(mr.id) {
            if mr.diff_head_sha.as_deref() == Some(push.new_rev.as_str()) {
                log::debug!("MR {} is already at {}", mr.id, push.new_rev);
                return Ok(Processed::no_op());
            }
            return self.update_source(mr, push, range).await;
        }

        Ok(Processed::no_op())
    }

    /// Whether this push brought the MR's head into the target branch.
    ///
    /// A head that was already reachable from the previous tip was merged
    /// (or never diverged) before this push and doesn't count.
    async fn merged_by_push(
        &self,
        mr: &MergeRequest,
        push: &Push,
        range: &CommitRange,
    ) -> Result<bool, AppError> {
        let Some(head) = mr.diff_head_sha.as_deref() else {
            return Ok(false);
        };

        if range.contains(head) {
            return Ok(true);
        }

        if !self.is_ancestor(head, &push.new_rev).await? {
            return Ok(false);
        }

        if push.is_branch_created() {
            return Ok(true);
        }
        Ok(!self.is_ancestor(head, &push.old_rev).await?)
    }

    async fn is_ancestor(&self, commit: &str, of: &str) -> Result<bool, AppError> {
        let base = self.repository.merge_base(commit, of).await?;
        Ok(base.as_deref() == Some(commit))
    }

    async fn mark_merged(
        &self,
        mr: &MergeRequest,
        push: &Push,
        range: &CommitRange,
    ) -> Result<Processed, AppError> {
        let own: HashSet<String> = self
            .store
            .merge_request_commit_shas(mr.id)
            .await?
            .into_iter()
            .collect();
        let landed: Vec<&Commit> = range.commits.iter().filter(|c| own.contains(&c.id)).collect();

        let mut update = MergeRequestUpdate::new(mr.id);
        update.state = Some(MergeRequestState::Merged);
        update.notes.push(NewNote::system(self.current_user_id, system_notes::merged()));
        update.closing_issue_ids = self.closing_issues(&landed).await;
        update.merged_at = Some(Utc::now().timestamp());

        self.store.apply_update(&update).await?;

        let mut merged = mr.clone();
        merged.state = MergeRequestState::Merged.to_string();
        merged.merged_at = update.merged_at;

        let hooks = self
            .hooks
            .execute_hooks(&merged, HookAction::Merge, &push.old_rev)
            .await;

        self.todo_updater().resolve(&merged, TodoTrigger::Merged).await?;

        Ok(Processed {
            transition: Transition::TargetMerged,
            hooks,
        })
    }

    /// Revision the MR diff is computed from: where the source branch forked
    /// off the target branch (or the default branch when the target is
    /// missing from this repository).
    async fn diff_base(
        &self,
        mr: &MergeRequest,
        push: &Push,
        range: &CommitRange,
    ) -> Result<Option<String>, AppError> {
        for branch in [mr.target_branch.as_str(), self.default_branch()] {
            if branch != push.branch && self.repository.branch_exists(branch).await? {
                return self.repository.merge_base(branch, &push.new_rev).await;
            }
        }
        Ok(range.base.clone())
    }

    async fn update_source(
        &self,
        mr: &MergeRequest,
        push: &Push,
        range: &CommitRange,
    ) -> Result<Processed, AppError> {
        let base = self.diff_base(mr, push, range).await?;
        let mr_commits = self
            .repository
            .commits_between(base.as_deref(), &push.new_rev)
            .await?;
        let files = self.repository.compare(base.as_deref(), &push.new_rev).await?;

        let own: HashSet<&str> = mr_commits.iter().map(|c| c.id.as_str()).collect();
        let (new_commits, existing_commits): (Vec<&Commit>, Vec<&Commit>) = range
            .commits
            .iter()
            .partition(|c| own.contains(c.id.as_str()));

        let mut update = MergeRequestUpdate::new(mr.id);

        if push.is_branch_created() && range.recovered_from_merge_base {
            update.notes.push(NewNote::system(
                self.current_user_id,
                system_notes::restored_source_branch(&push.branch),
            ));
        }

        update.notes.push(NewNote::system(
            self.current_user_id,
            system_notes::added_commits(&new_commits, &existing_commits, &mr.target_branch),
        ));

        // Only the newest commit of the MR decides; older fixups don't count
        if self.config.mark_wip_from_commits && !mr.work_in_progress {
            if let Some(newest) = new_commits.first().filter(|c| c.work_in_progress()) {
                update.work_in_progress = Some(true);
                update.title = Some(mr.wip_title());
                let body = system_notes::marked_wip_from_commit(newest);
                update.notes.push(
                    NewNote::system(self.current_user_id, body).with_commit(newest.id.clone()),
                );
            }
        }

        update.closing_issue_ids = self.closing_issues(&new_commits).await;
        update.reset_merge_when_pipeline_succeeds =
            mr.merge_when_pipeline_succeeds || mr.merge_user_id.is_some();
        update.diff = Some(NewMergeRequestDiff {
            base_sha: base.clone(),
            start_sha: base,
            head_sha: push.new_rev.clone(),
            commits: mr_commits,
            files,
        });

        self.store.apply_update(&update).await?;

        let mut refreshed = mr.clone();
        refreshed.diff_head_sha = Some(push.new_rev.clone());
        if let Some(title) = &update.title {
            refreshed.title = title.clone();
        }
        if let Some(wip) = update.work_in_progress {
            refreshed.work_in_progress = wip;
        }
        if update.reset_merge_when_pipeline_succeeds {
            refreshed.merge_when_pipeline_succeeds = false;
            refreshed.merge_user_id = None;
        }

        let hooks = self
            .hooks
            .execute_hooks(&refreshed, HookAction::Update, &push.old_rev)
            .await;

        self.todo_updater()
            .resolve(&refreshed, TodoTrigger::SourceUpdated(&push.new_rev))
            .await?;

        Ok(Processed {
            transition: Transition::SourceUpdated,
            hooks,
        })
    }

    async fn remove_source_branch(
        &self,
        push: &Push,
        located: &LocatedMergeRequests,
        result: &mut RefreshResult,
    ) {
        for mr in located.by_source.iter().filter(|mr| mr.is_open()) {
            let mr_start = Instant::now();

            let mut update = MergeRequestUpdate::new(mr.id);
            update.notes.push(NewNote::system(
                self.current_user_id,
                system_notes::deleted_source_branch(&push.branch),
            ));

            let operation = Transition::SourceRemoved.operation();
            let duration_ms = || mr_start.elapsed().as_millis() as i64;
            match self.store.apply_update(&update).await {
                Ok(()) => {
                    result.record(mr.id, Transition::SourceRemoved);
                    self.log_outcome(mr.id, operation, None, duration_ms()).await;
                }
                Err(e) => {
                    log::warn!("Failed to note branch removal on MR {}: {}", mr.id, e);
                    result.errors.push(format!("MR {}: {}", mr.id, e));
                    self.log_outcome(mr.id, operation, Some(e.to_string()), duration_ms())
                        .await;
                }
            }
        }
    }

    /// Issues closed by `commits`, each once. Extraction failures are skipped.
    async fn closing_issues(&self, commits: &[&Commit]) -> Vec<i64> {
        let mut issues = Vec::new();

        for commit in commits {
            match self.references.closed_issues(&self.project, commit).await {
                Ok(ids) => {
                    for id in ids {
                        if !issues.contains(&id) {
                            issues.push(id);
                        }
                    }
                }
                Err(e) => {
                    log::warn!(
                        "Failed to extract issue references from {}: {}",
                        commit.short_id(),
                        e
                    );
                }
            }
        }

        issues
    }

    fn todo_updater(&self) -> TodoUpdater<'_> {
        TodoUpdater::new(self.store.as_ref(), self.config.todo_scope, self.current_user_id)
    }

    async fn log_outcome(
        &self,
        mr_id: i64,
        operation: &str,
        error: Option<String>,
        duration_ms: i64,
    ) {
        let entry = NewRefreshLog {
            operation: operation.to_string(),
            status: if error.is_some() {
                LogStatus::Error
            } else {
                LogStatus::Success
            },
            mr_id: Some(mr_id),
            message: error,
            duration_ms: Some(duration_ms),
        };

        if let Err(e) = self.store.log_operation(&entry).await {
            log::warn!("Failed to write refresh log for MR {}: {}", mr_id, e);
        }
    }
}
