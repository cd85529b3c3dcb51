//! Issue references that a commit closes.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::AppError;
use crate::models::{Commit, Project};

/// Closing keyword followed by a list of issue references, e.g.
/// `Fixes #12, #13 and #14`.
static CLOSING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:close[sd]?|closing|fix(?:e[sd]|ing)?|resolve[sd]?|resolving):?\s+(#\d+(?:(?:\s*,\s*|\s+and\s+|\s*,\s*and\s+)#\d+)*)",
    )
    .unwrap()
});

static ISSUE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\d+)").unwrap());

/// Extracts the issues a commit closes once it lands.
///
/// Implementations decide which references count (for example by checking
/// the committer may close the issue); the refresh engine only records the
/// result.
#[async_trait::async_trait]
pub trait ReferenceExtractor: Send + Sync {
    async fn closed_issues(
        &self,
        project: &Project,
        commit: &Commit,
    ) -> Result<Vec<i64>, AppError>;
}

/// Extractor that reads closing keywords from the commit message.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClosingPatternExtractor;

impl ClosingPatternExtractor {
    /// Issue numbers closed by `message`, in order of appearance, without duplicates.
    pub fn parse(message: &str) -> Vec<i64> {
        let mut issues = Vec::new();

        for captures in CLOSING_PATTERN.captures_iter(message) {
            let Some(list) = captures.get(1) else {
                continue;
            };
            for reference in ISSUE_REFERENCE.captures_iter(list.as_str()) {
                if let Ok(id) = reference[1].parse::<i64>() {
                    if !issues.contains(&id) {
                        issues.push(id);
                    }
                }
            }
        }

        issues
    }
}

#[async_trait::async_trait]
impl ReferenceExtractor for ClosingPatternExtractor {
    async fn closed_issues(
        &self,
        _project: &Project,
        commit: &Commit,
    ) -> Result<Vec<i64>, AppError> {
        Ok(Self::parse(&commit.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords() {
        assert_eq!(ClosingPatternExtractor::parse("Closes #1"), vec![1]);
        assert_eq!(ClosingPatternExtractor::parse("fixed #2"), vec![2]);
        assert_eq!(ClosingPatternExtractor::parse("Resolving: #3"), vec![3]);
        assert_eq!(ClosingPatternExtractor::parse("FIXES #4"), vec![4]);
    }

    #[test]
    fn test_parse_lists_and_duplicates() {
        assert_eq!(
            ClosingPatternExtractor::parse("Fix login\n\nCloses #12, #13 and #14. Also fixes #12"),
            vec![12, 13, 14]
        );
    }

    #[test]
    fn test_parse_ignores_plain_mentions() {
        assert!(ClosingPatternExtractor::parse("Related to #5").is_empty());
        assert!(ClosingPatternExtractor::parse("prefixes #6").is_empty());
        assert!(ClosingPatternExtractor::parse("").is_empty());
    }
}
