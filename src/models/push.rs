//! A push to a repository ref.

use serde::Serialize;

/// Sha used by git for "no revision": the old side of a branch creation and
/// the new side of a branch deletion.
pub const BLANK_SHA: &str = "0000000000000000000000000000000000000000";

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Whether a revision is the blank sentinel.
pub fn is_blank_ref(rev: &str) -> bool {
    rev.is_empty() || rev.bytes().all(|b| b == b'0')
}

/// Branch name of a fully qualified branch ref, `None` for tags and other refs.
pub fn branch_name(ref_name: &str) -> Option<&str> {
    ref_name
        .strip_prefix(BRANCH_REF_PREFIX)
        .filter(|name| !name.is_empty())
}

/// An update of one branch from `old_rev` to `new_rev`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Push {
    pub old_rev: String,
    pub new_rev: String,
    pub branch: String,
}

impl Push {
    /// Build a push for a branch ref; other refs yield `None`.
    pub fn parse(old_rev: &str, new_rev: &str, ref_name: &str) -> Option<Self> {
        branch_name(ref_name).map(|branch| Self {
            old_rev: old_rev.to_string(),
            new_rev: new_rev.to_string(),
            branch: branch.to_string(),
        })
    }

    /// The branch did not exist before this push.
    pub fn is_branch_created(&self) -> bool {
        is_blank_ref(&self.old_rev)
    }

    /// The branch was deleted by this push.
    pub fn is_branch_removed(&self) -> bool {
        is_blank_ref(&self.new_rev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_ref() {
        assert!(is_blank_ref(BLANK_SHA));
        assert!(is_blank_ref(""));
        assert!(!is_blank_ref("5937ac0a7beb003549fc5fd26fc247adbce4a52e"));
    }

    #[test]
    fn test_branch_name() {
        assert_eq!(branch_name("refs/heads/master"), Some("master"));
        assert_eq!(branch_name("refs/heads/feature/nested"), Some("feature/nested"));
        assert_eq!(branch_name("refs/tags/v1.0"), None);
        assert_eq!(branch_name("refs/heads/"), None);
        assert_eq!(branch_name("master"), None);
    }

    #[test]
    fn test_push_parse() {
        let push = Push::parse(BLANK_SHA, "abc", "refs/heads/feature").unwrap();
        assert_eq!(push.branch, "feature");
        assert!(push.is_branch_created());
        assert!(!push.is_branch_removed());

        let removed = Push::parse("abc", BLANK_SHA, "refs/heads/feature").unwrap();
        assert!(removed.is_branch_removed());

        assert!(Push::parse("abc", "def", "refs/tags/v1").is_none());
    }
}
