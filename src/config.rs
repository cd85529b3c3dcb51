//! Refresh engine configuration.
//!
//! Settings are read from a JSON file. A missing or unreadable file falls back
//! to defaults so a misconfigured host never blocks push processing.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of merge requests refreshed concurrently for one push.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Maximum number of refresh log entries to keep.
pub const DEFAULT_LOG_RETENTION: i64 = 50;

/// Which users' build-failure todos a push may resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoScope {
    /// Only todos owned by the user who pushed.
    PushingUser,
    /// Todos of every user on the affected merge request.
    AllUsers,
}

/// Refresh engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Mark merge requests as work in progress from fixup commits.
    pub mark_wip_from_commits: bool,

    /// Whose build-failure todos get resolved.
    pub todo_scope: TodoScope,

    /// Merge requests processed in parallel per push.
    pub concurrency: usize,

    /// Refresh log entries kept in the database.
    pub log_retention: i64,

    /// Branch used as comparison base when a project records no default branch.
    pub fallback_default_branch: String,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            mark_wip_from_commits: true,
            todo_scope: TodoScope::PushingUser,
            concurrency: DEFAULT_CONCURRENCY,
            log_retention: DEFAULT_LOG_RETENTION,
            fallback_default_branch: "master".to_string(),
        }
    }
}

impl RefreshConfig {
    /// Effective concurrency, never below one.
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// Load configuration from a JSON file, using defaults if absent or invalid.
pub fn load(path: &Path) -> RefreshConfig {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            log::debug!("No refresh config at {}: {}", path.display(), e);
            return RefreshConfig::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Invalid refresh config {}: {}", path.display(), e);
            RefreshConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = RefreshConfig::default();
        assert!(config.mark_wip_from_commits);
        assert_eq!(config.todo_scope, TodoScope::PushingUser);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.log_retention, DEFAULT_LOG_RETENTION);
        assert_eq!(config.fallback_default_branch, "master");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: RefreshConfig =
            serde_json::from_str(r#"{"todo_scope":"all_users","concurrency":0}"#).unwrap();
        assert_eq!(config.todo_scope, TodoScope::AllUsers);
        assert_eq!(config.concurrency(), 1);
        assert!(config.mark_wip_from_commits);
    }

    #[test]
    fn test_load_missing_and_invalid_files() {
        let dir = tempdir().unwrap();

        let missing = load(&dir.path().join("nope.json"));
        assert_eq!(missing.log_retention, DEFAULT_LOG_RETENTION);

        let invalid_path = dir.path().join("bad.json");
        std::fs::write(&invalid_path, "{not json").unwrap();
        let invalid = load(&invalid_path);
        assert!(invalid.mark_wip_from_commits);

        let valid_path = dir.path().join("ok.json");
        std::fs::write(&valid_path, r#"{"mark_wip_from_commits":false}"#).unwrap();
        assert!(!load(&valid_path).mark_wip_from_commits);
    }
}
