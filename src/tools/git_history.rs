// Commit-history evidence fetcher
//
// Wraps `git log` for a single file. A file with no history is a valid
// answer (new or untracked), not an error.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::time::timeout;

use super::registry::Tool;
use super::types::{ToolInputSchema, ToolResult};

const GIT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_COMMITS: u64 = 5;

pub struct GitHistoryTool {
    repo_path: PathBuf,
}

impl GitHistoryTool {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }
}

#[async_trait]
impl Tool for GitHistoryTool {
    fn name(&self) -> &str {
        "git_history"
    }

    fn description(&self) -> &str {
        "Get recent git commit history for a file. Shows who changed it, when, \
         and why. Useful for understanding the context and intent behind \
         existing code."
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: json!({
                "filepath": {
                    "type": "string",
                    "description": "Relative path to the file from the repository root"
                },
                "max_commits": {
                    "type": "integer",
                    "description": "Maximum number of recent commits to return (default: 5)"
                }
            }),
            required: vec!["filepath".to_string()],
        }
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let filepath = match input["filepath"].as_str() {
            Some(p) => p.to_string(),
            None => return ToolResult::fail("filepath parameter is required"),
        };
        let max_commits = input["max_commits"].as_u64().unwrap_or(DEFAULT_MAX_COMMITS);

        let mut cmd = Command::new("git");
        cmd.arg("log")
            .arg(format!("-{}", max_commits))
            .arg("--pretty=format:%H|%an|%ar|%s")
            .arg("--")
            .arg(&filepath)
            .current_dir(&self.repo_path);

        let output = match timeout(GIT_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::fail(format!("Failed to run git: {}", e)),
            Err(_) => return ToolResult::fail("Git command timed out"),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return ToolResult::fail(format!("Git command failed: {}", stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return ToolResult::ok(json!({
                "filepath": filepath,
                "commits": [],
                "message": "No commit history found (new file or not tracked)",
            }));
        }

        let commits: Vec<Value> = stdout
            .trim()
            .lines()
            .filter_map(parse_commit_line)
            .collect();

        ToolResult::ok(json!({
            "filepath": filepath,
            "count": commits.len(),
            "commits": commits,
        }))
    }
}

// One line of `git log --pretty=format:%H|%an|%ar|%s`; subjects may contain
// '|', so the split is capped at four fields.
fn parse_commit_line(line: &str) -> Option<Value> {
    let parts: Vec<&str> = line.splitn(4, '|').collect();
    if parts.len() != 4 {
        return None;
    }
    let short_hash: String = parts[0].chars().take(8).collect();
    Some(json!({
        "hash": short_hash,
        "author": parts[1],
        "date": parts[2],
        "message": parts[3],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_filepath_is_declared_failure() {
        let tool = GitHistoryTool::new(".");
        let result = tool.execute(json!({})).await;
        assert!(!result.success);
        assert!(result.error.contains("filepath"));
    }

    #[tokio::test]
    async fn test_outside_a_repository_is_declared_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tool = GitHistoryTool::new(dir.path());
        let result = tool.execute(json!({"filepath": "main.rs"})).await;
        assert!(!result.success);
        assert!(result.error.contains("Git command failed"));
    }

    #[test]
    fn test_parse_commit_line() {
        let commit =
            parse_commit_line("a1b2c3d4e5f6a7b8|Jane Doe|2 days ago|Fix null check").unwrap();
        assert_eq!(commit["hash"], "a1b2c3d4");
        assert_eq!(commit["author"], "Jane Doe");
        assert_eq!(commit["date"], "2 days ago");
        assert_eq!(commit["message"], "Fix null check");
    }

    #[test]
    fn test_parse_commit_line_keeps_pipes_in_subject() {
        let commit =
            parse_commit_line("a1b2c3d4e5f6|Jane|1 hour ago|Refactor a | b | c").unwrap();
        assert_eq!(commit["message"], "Refactor a | b | c");
    }

    #[test]
    fn test_parse_commit_line_rejects_malformed() {
        assert!(parse_commit_line("only|three|fields").is_none());
        assert!(parse_commit_line("").is_none());
    }
}
