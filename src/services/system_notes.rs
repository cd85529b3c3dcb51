//! Bodies of the system notes a refresh appends.

use crate::models::Commit;

fn pluralize(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

/// Note listing the commits a push added to a merge request.
///
/// # Arguments
/// * `new_commits` - Commits that belong to the merge request, newest first
/// * `existing_commits` - Pushed commits already present in the target branch
/// * `target_branch` - Target branch name, used in the summary line
pub fn added_commits(
    new_commits: &[&Commit],
    existing_commits: &[&Commit],
    target_branch: &str,
) -> String {
    let total = new_commits.len() + existing_commits.len();
    let mut body = format!("added {}\n\n", pluralize(total, "commit"));

    if let (Some(first), Some(last)) = (existing_commits.first(), existing_commits.last()) {
        let ids = if existing_commits.len() == 1 {
            first.short_id().to_string()
        } else {
            format!("{}...{}", last.short_id(), first.short_id())
        };

        body.push_str(&format!(
            "* {} - {} from branch `{}`\n",
            ids,
            pluralize(existing_commits.len(), "commit"),
            target_branch
        ));
    }

    for commit in new_commits {
        body.push_str(&format!("* {} - {}\n", commit.short_id(), commit.title()));
    }

    body
}

pub fn restored_source_branch(branch: &str) -> String {
    format!("restored source branch `{}`", branch)
}

pub fn deleted_source_branch(branch: &str) -> String {
    format!("deleted source branch `{}`", branch)
}

pub fn merged() -> String {
    "merged".to_string()
}

/// Note recording which commit flagged the merge request as work in progress.
pub fn marked_wip_from_commit(commit: &Commit) -> String {
    format!("marked as a **Work In Progress** from {}", commit.to_reference())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(id: &str, title: &str) -> Commit {
        Commit {
            id: id.to_string(),
            message: title.to_string(),
            author_name: "Dev".to_string(),
            author_email: "dev@example.com".to_string(),
            committer_email: "dev@example.com".to_string(),
            committed_at: 0,
        }
    }

    #[test]
    fn test_added_commits_lists_own_commits() {
        let second = commit("bbbbbbbbbbbb", "Second change");
        let first = commit("aaaaaaaaaaaa", "First change");
        let body = added_commits(&[&second, &first], &[], "master");

        assert_eq!(
            body,
            "added 2 commits\n\n* bbbbbbbb - Second change\n* aaaaaaaa - First change\n"
        );
    }

    #[test]
    fn test_added_commits_summarises_target_commits() {
        let own = commit("cccccccccccc", "Own");
        let newer = commit("bbbbbbbbbbbb", "Newer");
        let older = commit("aaaaaaaaaaaa", "Older");
        let body = added_commits(&[&own], &[&newer, &older], "master");

        assert!(body.starts_with("added 3 commits\n\n"));
        assert!(body.contains("* aaaaaaaa...bbbbbbbb - 2 commits from branch `master`\n"));
        assert!(body.ends_with("* cccccccc - Own\n"));

        let single = added_commits(&[], &[&older], "feature");
        assert_eq!(single, "added 1 commit\n\n* aaaaaaaa - 1 commit from branch `feature`\n");
    }

    #[test]
    fn test_simple_notes() {
        assert_eq!(restored_source_branch("master"), "restored source branch `master`");
        assert_eq!(deleted_source_branch("fix"), "deleted source branch `fix`");
        assert_eq!(merged(), "merged");
        assert_eq!(
            marked_wip_from_commit(&commit("bbbbbbbbbbbb", "fixup! Fix issue")),
            "marked as a **Work In Progress** from bbbbbbbb"
        );
    }
}
