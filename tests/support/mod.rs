//! Shared fixtures for the integration tests.
//!
//! `FakeRepository` is an in-memory commit graph. Commit `n` gets the sha
//! `sha(n)` and timestamp `n`, so higher numbers are newer.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use mr_refresh_lib::db;
use mr_refresh_lib::error::AppError;
use mr_refresh_lib::models::merge_request::{self, NewMergeRequest};
use mr_refresh_lib::models::project::{self, Project};
use mr_refresh_lib::models::todo::{self, NewTodo, Todo, TodoAction};
use mr_refresh_lib::models::{Commit, FileDiff, MergeRequest};
use mr_refresh_lib::services::events::HookAction;
use mr_refresh_lib::services::{HookHandler, Repository, SqliteStore};
use tempfile::{tempdir, TempDir};

pub const USER: i64 = 1;
pub const OTHER_USER: i64 = 2;

pub fn sha(n: u8) -> String {
    format!("{:02x}", n).repeat(20)
}

pub fn short(n: u8) -> String {
    sha(n)[..8].to_string()
}

#[derive(Default)]
pub struct FakeRepository {
    commits: HashMap<String, (Commit, Vec<String>)>,
    branches: HashMap<String, String>,
    broken_branches: HashSet<String>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add commit `n` with the given parents and message.
    pub fn commit(mut self, n: u8, parents: &[u8], message: &str) -> Self {
        let commit = Commit {
            id: sha(n),
            message: message.to_string(),
            author_name: "Dev".to_string(),
            author_email: "dev@example.com".to_string(),
            committer_email: "dev@example.com".to_string(),
            committed_at: n as i64,
        };
        let parents = parents.iter().map(|p| sha(*p)).collect();
        self.commits.insert(sha(n), (commit, parents));
        self
    }

    pub fn branch(mut self, name: &str, n: u8) -> Self {
        self.branches.insert(name.to_string(), sha(n));
        self
    }

    /// Make every lookup of `name` fail like an unavailable repository.
    pub fn broken_branch(mut self, name: &str) -> Self {
        self.broken_branches.insert(name.to_string());
        self
    }

    fn resolve(&self, rev: &str) -> Option<String> {
        if let Some(sha) = self.branches.get(rev) {
            return Some(sha.clone());
        }
        self.commits.contains_key(rev).then(|| rev.to_string())
    }

    fn ancestors(&self, sha: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack = vec![sha.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some((_, parents)) = self.commits.get(&current) {
                stack.extend(parents.iter().cloned());
            }
        }
        seen
    }

    fn sorted(&self, shas: HashSet<String>) -> Vec<Commit> {
        let mut commits: Vec<Commit> = shas
            .iter()
            .filter_map(|sha| self.commits.get(sha).map(|(c, _)| c.clone()))
            .collect();
        commits.sort_by(|a, b| b.committed_at.cmp(&a.committed_at));
        commits
    }

    fn check(&self, rev: &str) -> Result<(), AppError> {
        if self.broken_branches.contains(rev) {
            return Err(AppError::repository_with_op(
                format!("repository unavailable while reading {}", rev),
                "fake",
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Repository for FakeRepository {
    async fn commits_between(&self, from: Option<&str>, to: &str) -> Result<Vec<Commit>, AppError> {
        self.check(to)?;
        let to = self
            .resolve(to)
            .ok_or_else(|| AppError::repository(format!("Unknown revision {}", to)))?;

        let mut reachable = self.ancestors(&to);
        if let Some(from) = from.and_then(|f| self.resolve(f)) {
            for hidden in self.ancestors(&from) {
                reachable.remove(&hidden);
            }
        }
        Ok(self.sorted(reachable))
    }

    async fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, AppError> {
        self.check(a)?;
        self.check(b)?;
        let (Some(a), Some(b)) = (self.resolve(a), self.resolve(b)) else {
            return Ok(None);
        };

        let theirs = self.ancestors(&b);
        let common: HashSet<String> = self
            .ancestors(&a)
            .into_iter()
            .filter(|sha| theirs.contains(sha))
            .collect();
        Ok(self.sorted(common).first().map(|c| c.id.clone()))
    }

    async fn branch_exists(&self, name: &str) -> Result<bool, AppError> {
        self.check(name)?;
        Ok(self.branches.contains_key(name))
    }

    async fn compare(&self, base: Option<&str>, head: &str) -> Result<Vec<FileDiff>, AppError> {
        let commits = self.commits_between(base, head).await?;
        Ok(commits
            .iter()
            .rev()
            .map(|c| FileDiff {
                old_path: format!("{}.txt", c.short_id()),
                new_path: format!("{}.txt", c.short_id()),
                new_file: true,
                deleted_file: false,
                renamed_file: false,
                diff: format!("@@ -0,0 +1 @@\n+{}\n", c.title()),
            })
            .collect())
    }
}

/// Hook handler that records every call.
#[derive(Default)]
pub struct RecordingHook {
    calls: Mutex<Vec<(i64, HookAction, String, String)>>,
}

impl RecordingHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Recorded `(mr_id, action, old_rev, state)` tuples.
    pub fn calls(&self) -> Vec<(i64, HookAction, String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, mr_id: i64) -> Vec<(HookAction, String)> {
        self.calls()
            .into_iter()
            .filter(|(id, _, _, _)| *id == mr_id)
            .map(|(_, action, old_rev, _)| (action, old_rev))
            .collect()
    }
}

#[async_trait::async_trait]
impl HookHandler for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_hook(
        &self,
        mr: &MergeRequest,
        action: HookAction,
        old_rev: &str,
    ) -> Result<(), AppError> {
        self.calls
            .lock()
            .unwrap()
            .push((mr.id, action, old_rev.to_string(), mr.state.clone()));
        Ok(())
    }
}

/// Hook handler that always fails.
pub struct FailingHook;

#[async_trait::async_trait]
impl HookHandler for FailingHook {
    fn name(&self) -> &str {
        "failing"
    }

    async fn on_hook(
        &self,
        _mr: &MergeRequest,
        _action: HookAction,
        _old_rev: &str,
    ) -> Result<(), AppError> {
        Err(AppError::hook("endpoint unreachable", "failing"))
    }
}

pub async fn setup_store() -> (TempDir, SqliteStore) {
    let dir = tempdir().unwrap();
    let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();
    (dir, SqliteStore::new(pool))
}

/// Insert project 1 and its fork, project 2.
pub async fn seed_projects(store: &SqliteStore) -> (Project, Project) {
    let origin = Project {
        id: 1,
        name: "gitlabhq".to_string(),
        path_with_namespace: "group/gitlabhq".to_string(),
        default_branch: Some("master".to_string()),
        forked_from_project_id: None,
        deleted: false,
    };
    let fork = Project {
        id: 2,
        name: "gitlabhq".to_string(),
        path_with_namespace: "dev/gitlabhq".to_string(),
        default_branch: Some("master".to_string()),
        forked_from_project_id: Some(1),
        deleted: false,
    };

    project::upsert_project(store.pool(), &origin).await.unwrap();
    project::upsert_project(store.pool(), &fork).await.unwrap();
    (origin, fork)
}

pub struct MrSpec<'a> {
    pub iid: i64,
    pub source_project_id: i64,
    pub source_branch: &'a str,
    pub target_project_id: i64,
    pub target_branch: &'a str,
    pub diff_head: Option<u8>,
}

pub async fn create_mr(store: &SqliteStore, spec: MrSpec<'_>) -> MergeRequest {
    merge_request::insert_merge_request(
        store.pool(),
        &NewMergeRequest {
            iid: spec.iid,
            title: format!("Merge request {}", spec.iid),
            author_id: USER,
            source_project_id: spec.source_project_id,
            source_branch: spec.source_branch.to_string(),
            target_project_id: spec.target_project_id,
            target_branch: spec.target_branch.to_string(),
            merge_when_pipeline_succeeds: true,
            merge_user_id: Some(USER),
            diff_head_sha: spec.diff_head.map(sha),
        },
    )
    .await
    .unwrap()
}

pub async fn build_failed_todo(
    store: &SqliteStore,
    user_id: i64,
    mr: &MergeRequest,
    commit: Option<u8>,
) -> Todo {
    todo::insert_todo(
        store.pool(),
        &NewTodo {
            user_id,
            author_id: user_id,
            project_id: mr.target_project_id,
            target_id: mr.id,
            action: TodoAction::BuildFailed,
            commit_id: commit.map(sha),
        },
    )
    .await
    .unwrap()
}

pub async fn reload_todo(store: &SqliteStore, id: i64) -> Todo {
    todo::get_todo(store.pool(), id).await.unwrap().unwrap()
}

pub async fn reload_mr(store: &SqliteStore, id: i64) -> MergeRequest {
    store.get_merge_request(id).await.unwrap().unwrap()
}

pub async fn note_bodies(store: &SqliteStore, mr_id: i64) -> Vec<String> {
    store
        .notes(mr_id)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.body)
        .collect()
}
