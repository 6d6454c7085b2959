// Review context assembly
//
// Builds the text handed to the AI reviewer for one file, and concatenates
// per-file contexts into a batch request. The JSON response contract at the
// end is what the comment-extraction code depends on.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::language::detect_language;
use crate::platform::{Change, ChangeSource};

const FILE_CONTENT_LIMIT: usize = 2_000;

static HUNK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@@ -\d+(?:,\d+)? \+(\d+)(?:,\d+)? @@").expect("hunk header regex")
});

/// New-side line numbers of added lines, parsed from unified diff hunks.
pub fn changed_lines(diff: &str) -> Vec<u32> {
    let mut lines = Vec::new();
    let mut new_line: Option<u32> = None;

    for line in diff.lines() {
        if let Some(captures) = HUNK_HEADER.captures(line) {
            new_line = captures[1].parse().ok();
            continue;
        }
        let Some(current) = new_line else {
            continue; // preamble before the first hunk
        };
        if line.starts_with("+++") || line.starts_with("---") {
            continue;
        }
        if line.starts_with('+') {
            lines.push(current);
            new_line = Some(current + 1);
        } else if line.starts_with('-') {
            // removed line: old side only, new counter stays
        } else {
            new_line = Some(current + 1);
        }
    }

    lines
}

// Truncate on a char boundary; the inputs are arbitrary repository content.
fn truncated(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Builds per-file review contexts, fetching before/after file content from
/// the hosting platform.
pub struct ContextBuilder {
    platform: Arc<dyn ChangeSource>,
}

impl ContextBuilder {
    pub fn new(platform: Arc<dyn ChangeSource>) -> Self {
        Self { platform }
    }

    pub async fn build(&self, change: &Change, linter_findings: Option<&Value>) -> String {
        let language = detect_language(&change.filepath);

        let before = self
            .platform
            .get_file_content(&change.filepath, &change.base_ref)
            .await;
        let after = self
            .platform
            .get_file_content(&change.filepath, &change.head_ref)
            .await;

        let mut context = format!(
            "# CODE REVIEW CONTEXT\n\n\
             ## File: {}\n\
             ## Language: {}\n\n",
            change.filepath,
            language.unwrap_or("Unknown"),
        );

        // Sibling files orient the reviewer about the module's surroundings
        // without paying for their content.
        let directory = change
            .filepath
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or("");
        let siblings = self
            .platform
            .get_directory_tree(directory, &change.head_ref)
            .await;
        let names: Vec<&str> = siblings
            .iter()
            .filter(|entry| entry.kind == "blob" && entry.path != change.filepath)
            .map(|entry| entry.name.as_str())
            .take(10)
            .collect();
        if !names.is_empty() {
            context.push_str(&format!(
                "## Other Files in the Same Directory\n{}\n\n",
                names.join(", ")
            ));
        }

        if let Some(before) = &before {
            context.push_str(&format!(
                "## Full File BEFORE Changes (truncated)\n```\n{}\n{}```\n\n",
                truncated(before, FILE_CONTENT_LIMIT),
                if before.chars().count() > FILE_CONTENT_LIMIT {
                    "...[truncated]...\n"
                } else {
                    ""
                },
            ));
        }

        if let Some(after) = &after {
            context.push_str(&format!(
                "## Full File AFTER Changes (truncated)\n```\n{}\n{}```\n\n",
                truncated(after, FILE_CONTENT_LIMIT),
                if after.chars().count() > FILE_CONTENT_LIMIT {
                    "...[truncated]...\n"
                } else {
                    ""
                },
            ));
        }

        if let Some(findings) = linter_findings {
            context.push_str(&format!(
                "## Static Analysis (changed lines only)\n```json\n{}\n```\n\n",
                findings
            ));
        }

        context.push_str(&format!(
            "## DIFF (Actual Changes)\n```diff\n{}\n```\n",
            change.diff
        ));

        context
    }
}

/// Response contract for a single-file review request.
pub fn with_response_contract(context: &str) -> String {
    format!(
        "{}\n---\n\
         Provide your review as a JSON array with format:\n\
         [\n  {{\n    \"filepath\": \"<filepath>\",\n    \"line\": <line_number>,\n    \
         \"comment\": \"<your detailed comment>\",\n    \
         \"severity\": \"critical|major|minor|suggestion\"\n  }}\n]\n\n\
         Return an empty array [] if the code looks good. Be specific and constructive.",
        context
    )
}

/// One combined request for a batch of files. The reviewer must answer with
/// a single JSON array whose items carry the correct `filepath`.
pub fn build_batch_context(parts: &[(String, String)]) -> String {
    let mut batch = format!(
        "You are reviewing {} changed files from one pull request. \
         Review each file independently.\n\n",
        parts.len()
    );

    for (index, (filepath, context)) in parts.iter().enumerate() {
        batch.push_str(&format!(
            "{}\n# FILE {} of {}: {}\n{}\n",
            "=".repeat(40),
            index + 1,
            parts.len(),
            filepath,
            context
        ));
    }

    batch.push_str(
        "\n---\n\
         Provide your review as a single JSON array covering all files, with format:\n\
         [\n  {\n    \"filepath\": \"<filepath exactly as given above>\",\n    \
         \"line\": <line_number>,\n    \"comment\": \"<your detailed comment>\",\n    \
         \"severity\": \"critical|major|minor|suggestion\"\n  }\n]\n\n\
         Return an empty array [] if the code looks good. Be specific and constructive.",
    );

    batch
}
