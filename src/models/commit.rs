//! Commit model as exposed by a repository.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Number of hex characters in a short commit id.
pub const SHORT_ID_LENGTH: usize = 8;

/// Titles that flag a commit as work in progress: WIP markers and
/// `fixup!`/`squash!` commits produced by `git commit --fixup/--squash`.
static WIP_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\A\s*(\[WIP\]\s|WIP:\s|WIP\s|WIP\z)|\A(fixup!|squash!)\s").unwrap()
});

/// A commit read from a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit sha.
    pub id: String,

    /// Full commit message.
    pub message: String,

    pub author_name: String,
    pub author_email: String,
    pub committer_email: String,

    /// Commit timestamp (Unix).
    pub committed_at: i64,
}

impl Commit {
    /// Abbreviated sha used in notes.
    pub fn short_id(&self) -> &str {
        self.id.get(..SHORT_ID_LENGTH).unwrap_or(&self.id)
    }

    /// First line of the message.
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim_end()
    }

    /// Reference used when a note points at this commit.
    pub fn to_reference(&self) -> &str {
        self.short_id()
    }

    /// Whether the title tags this commit as a fixup/WIP commit.
    pub fn work_in_progress(&self) -> bool {
        WIP_TITLE.is_match(self.title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(id: &str, message: &str) -> Commit {
        Commit {
            id: id.to_string(),
            message: message.to_string(),
            author_name: "Dev".to_string(),
            author_email: "dev@example.com".to_string(),
            committer_email: "dev@example.com".to_string(),
            committed_at: 0,
        }
    }

    #[test]
    fn test_short_id_and_title() {
        let c = commit("498214de67004b1da3d820901307bed2a68a8ef6", "Fix issue\n\nLonger body");
        assert_eq!(c.short_id(), "498214de");
        assert_eq!(c.to_reference(), "498214de");
        assert_eq!(c.title(), "Fix issue");

        let short = commit("bbbbbbb", "");
        assert_eq!(short.short_id(), "bbbbbbb");
        assert_eq!(short.title(), "");
    }

    #[test]
    fn test_work_in_progress_titles() {
        assert!(commit("a", "fixup! Fix issue").work_in_progress());
        assert!(commit("a", "squash! Fix issue").work_in_progress());
        assert!(commit("a", "WIP: part one").work_in_progress());
        assert!(commit("a", "[wip] part one").work_in_progress());
        assert!(commit("a", "wip").work_in_progress());

        assert!(!commit("a", "Fix issue").work_in_progress());
        assert!(!commit("a", "Wipe cache").work_in_progress());
        assert!(!commit("a", "Revert fixup! thing").work_in_progress());
        assert!(!commit("a", "fixup!no-space").work_in_progress());
    }
}
