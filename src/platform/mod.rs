// Hosting-platform interface
//
// The pipeline only ever talks to a ChangeSource; GitHub and GitLab are
// interchangeable behind it. Adapters are thin plumbing: pagination and
// response mapping, no decision logic.

pub mod github;
pub mod gitlab;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::review::types::{ReviewComment, ReviewStats, Severity};

pub use github::GitHubClient;
pub use gitlab::GitLabClient;

/// Embedded in every body this bot posts, so its own comments can be found
/// and deleted on the next run without touching human-authored ones.
pub const BOT_MARKER: &str = "<!-- ai-review-bot -->";

/// One changed file in a pull/merge request. Immutable for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub filepath: String,
    pub diff: String,
    #[serde(default)]
    pub binary: bool,
    pub base_ref: String,
    pub head_ref: String,
}

/// A file or directory inside a repository tree listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub name: String,
    /// "blob" for files, "tree" for directories.
    pub kind: String,
}

#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// List the changed files of a pull/merge request.
    async fn get_changes(&self, id: &str) -> anyhow::Result<Vec<Change>>;

    /// Fetch file content at a specific ref; absent on any failure.
    async fn get_file_content(&self, path: &str, git_ref: &str) -> Option<String>;

    /// List a directory at a specific ref; empty on any failure.
    async fn get_directory_tree(&self, directory: &str, git_ref: &str) -> Vec<TreeEntry>;

    /// Post inline review comments. Individual rejections are logged and
    /// skipped inside the adapter; the call fails only when nothing could
    /// be attempted at all.
    async fn post_comments(&self, id: &str, comments: &[ReviewComment]) -> anyhow::Result<()>;

    /// Post the aggregate summary comment.
    async fn post_summary(
        &self,
        id: &str,
        stats: &ReviewStats,
        comments: &[ReviewComment],
    ) -> anyhow::Result<()>;

    /// Delete all comments previously posted by this bot. Returns the count.
    async fn clear_bot_comments(&self, id: &str) -> anyhow::Result<usize>;
}

pub(crate) fn severity_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🚨",
        Severity::Major => "⚠️",
        Severity::Minor => "💡",
        Severity::Suggestion => "💭",
    }
}

/// Inline comment body, carrying the bot marker.
pub(crate) fn format_comment_body(comment: &ReviewComment) -> String {
    let mut body = format!(
        "{} **{}**: {}",
        severity_emoji(comment.severity),
        comment.severity.as_str().to_uppercase(),
        comment.comment
    );
    if comment.linter_confirmed == Some(true) {
        if let Some(evidence) = &comment.linter_evidence {
            body.push_str(&format!(
                "\n\n> Linter agrees ({}): {}",
                evidence.rule, evidence.message
            ));
        }
    }
    body.push_str(&format!("\n\n{}", BOT_MARKER));
    body
}

/// Summary body shared by both adapters.
pub(crate) fn render_summary(stats: &ReviewStats, comments: &[ReviewComment]) -> String {
    let count = |severity: Severity| {
        comments
            .iter()
            .filter(|c| c.severity == severity)
            .count()
    };

    let summary = if comments.is_empty() {
        format!(
            "## 🤖 AI Code Review\n\n\
             ### Review Statistics\n\
             - **Files Reviewed**: {}\n\
             - **Files Skipped**: {}\n\
             - **Files Excluded**: {}\n\n\
             ✅ **No issues found**. Code looks good!",
            stats.files_reviewed, stats.files_skipped, stats.files_excluded
        )
    } else {
        format!(
            "## 🤖 AI Code Review Summary\n\n\
             ### Review Statistics\n\
             - **Files Reviewed**: {}\n\
             - **Files Skipped**: {}\n\
             - **Files Excluded**: {}\n\
             - **Total Comments**: {}\n\n\
             ### Findings by Severity\n\
             - 🚨 **Critical**: {}\n\
             - ⚠️ **Major**: {}\n\
             - 💡 **Minor**: {}\n\
             - 💭 **Suggestions**: {}\n\n\
             Please review the inline comments for details.",
            stats.files_reviewed,
            stats.files_skipped,
            stats.files_excluded,
            comments.len(),
            count(Severity::Critical),
            count(Severity::Major),
            count(Severity::Minor),
            count(Severity::Suggestion),
        )
    };

    format!("{}\n\n{}", summary, BOT_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(severity: Severity) -> ReviewComment {
        ReviewComment {
            filepath: "src/app.py".to_string(),
            line: 3,
            comment: "check this".to_string(),
            severity,
            linter_confirmed: None,
            linter_evidence: None,
            verified: None,
            verification_reasoning: None,
        }
    }

    #[test]
    fn test_comment_body_carries_marker() {
        let body = format_comment_body(&comment(Severity::Critical));
        assert!(body.contains(BOT_MARKER));
        assert!(body.contains("CRITICAL"));
        assert!(body.contains("🚨"));
    }

    #[test]
    fn test_summary_counts_by_severity() {
        let comments = vec![
            comment(Severity::Critical),
            comment(Severity::Major),
            comment(Severity::Major),
            comment(Severity::Suggestion),
        ];
        let stats = ReviewStats {
            files_reviewed: 2,
            ..Default::default()
        };
        let summary = render_summary(&stats, &comments);
        assert!(summary.contains("**Critical**: 1"));
        assert!(summary.contains("**Major**: 2"));
        assert!(summary.contains("**Suggestions**: 1"));
        assert!(summary.contains(BOT_MARKER));
    }

    #[test]
    fn test_summary_without_comments() {
        let stats = ReviewStats {
            files_reviewed: 1,
            ..Default::default()
        };
        let summary = render_summary(&stats, &[]);
        assert!(summary.contains("No issues found"));
        assert!(summary.contains(BOT_MARKER));
    }
}
