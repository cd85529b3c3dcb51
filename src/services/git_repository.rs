//! On-disk repository backed by libgit2.
//!
//! libgit2 handles are not `Send`, so every operation opens the repository on
//! a blocking worker thread and converts results into owned values before
//! returning.

use git2::{BranchType, DiffFindOptions, ErrorCode, Oid, Sort};
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::models::{Commit, FileDiff};
use crate::services::repository::Repository;

/// A git repository on the local filesystem.
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
}

impl GitRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_repo<T, F>(&self, operation: &'static str, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&git2::Repository) -> Result<T, git2::Error> + Send + 'static,
    {
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let repo = git2::Repository::open(&path)?;
            f(&repo)
        })
        .await
        .map_err(|e| AppError::internal(format!("Repository task failed: {}", e)))?
        .map_err(|e| AppError::repository_with_op(e.message(), operation))
    }
}

/// Resolve a revision to a commit id, `None` if it doesn't exist.
fn resolve(repo: &git2::Repository, rev: &str) -> Result<Option<Oid>, git2::Error> {
    match repo.revparse_single(rev) {
        Ok(object) => Ok(Some(object.peel_to_commit()?.id())),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn to_commit(commit: &git2::Commit<'_>) -> Commit {
    let author = commit.author();
    let committer = commit.committer();

    Commit {
        id: commit.id().to_string(),
        message: commit.message().unwrap_or("").to_string(),
        author_name: author.name().unwrap_or("").to_string(),
        author_email: author.email().unwrap_or("").to_string(),
        committer_email: committer.email().unwrap_or("").to_string(),
        committed_at: committer.when().seconds(),
    }
}

fn file_path(file: &git2::DiffFile<'_>) -> String {
    file.path()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Patch text from the first hunk header on; file headers are dropped.
fn hunks_only(patch: &str) -> String {
    if patch.starts_with("@@") {
        return patch.to_string();
    }
    match patch.find("\n@@") {
        Some(start) => patch[start + 1..].to_string(),
        None => String::new(),
    }
}

#[async_trait::async_trait]
impl Repository for GitRepository {
    async fn commits_between(&self, from: Option<&str>, to: &str) -> Result<Vec<Commit>, AppError> {
        let from = from.map(String::from);
        let to = to.to_string();

        self.with_repo("commits_between", move |repo| {
            let to_oid = resolve(repo, &to)?
                .ok_or_else(|| git2::Error::from_str(&format!("Unknown revision {}", to)))?;

            let mut walk = repo.revwalk()?;
            walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
            walk.push(to_oid)?;

            if let Some(from) = from {
                if let Some(from_oid) = resolve(repo, &from)? {
                    walk.hide(from_oid)?;
                }
            }

            let mut commits = Vec::new();
            for oid in walk {
                let commit = repo.find_commit(oid?)?;
                commits.push(to_commit(&commit));
            }
            Ok(commits)
        })
        .await
    }

    async fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, AppError> {
        let a = a.to_string();
        let b = b.to_string();

        self.with_repo("merge_base", move |repo| {
            let (Some(a), Some(b)) = (resolve(repo, &a)?, resolve(repo, &b)?) else {
                return Ok(None);
            };

            match repo.merge_base(a, b) {
                Ok(oid) => Ok(Some(oid.to_string())),
                Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn branch_exists(&self, name: &str) -> Result<bool, AppError> {
        let name = name.to_string();

        self.with_repo("branch_exists", move |repo| {
            match repo.find_branch(&name, BranchType::Local) {
                Ok(_) => Ok(true),
                Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn compare(&self, base: Option<&str>, head: &str) -> Result<Vec<FileDiff>, AppError> {
        let base = base.map(String::from);
        let head = head.to_string();

        self.with_repo("compare", move |repo| {
            let head_oid = resolve(repo, &head)?
                .ok_or_else(|| git2::Error::from_str(&format!("Unknown revision {}", head)))?;
            let head_tree = repo.find_commit(head_oid)?.tree()?;

            let base_tree = match base {
                Some(base) => match resolve(repo, &base)? {
                    Some(oid) => Some(repo.find_commit(oid)?.tree()?),
                    None => None,
                },
                None => None,
            };

            let mut diff = repo.diff_tree_to_tree(base_tree.as_ref(), Some(&head_tree), None)?;
            diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;

            let mut files = Vec::new();
            for (idx, delta) in diff.deltas().enumerate() {
                let old_path = file_path(&delta.old_file());
                let new_path = file_path(&delta.new_file());

                let text = match git2::Patch::from_diff(&diff, idx)? {
                    Some(mut patch) => {
                        let buf = patch.to_buf()?;
                        hunks_only(&String::from_utf8_lossy(&buf))
                    }
                    None => String::new(),
                };

                files.push(FileDiff {
                    old_path,
                    new_path,
                    new_file: delta.status() == git2::Delta::Added,
                    deleted_file: delta.status() == git2::Delta::Deleted,
                    renamed_file: delta.status() == git2::Delta::Renamed,
                    diff: text,
                });
            }
            Ok(files)
        })
        .await
    }
}
