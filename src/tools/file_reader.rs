// Bounded file-content evidence fetcher
//
// Oversize or binary content is a declared failure rather than a silent
// truncation: evidence handed to the verifier must be complete or absent.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::registry::Tool;
use super::types::{ToolInputSchema, ToolResult};

const MAX_FILE_SIZE: u64 = 50_000;

pub struct FileReaderTool {
    repo_path: PathBuf,
}

impl FileReaderTool {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }
}

#[async_trait]
impl Tool for FileReaderTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the complete contents of a file in the repository. Use this to \
         examine related files, check imports, or understand context around \
         an issue."
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::simple(vec![(
            "filepath",
            "Relative path to the file from the repository root",
        )])
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let filepath = match input["filepath"].as_str() {
            Some(p) => p.to_string(),
            None => return ToolResult::fail("filepath parameter is required"),
        };

        let full_path = self.repo_path.join(&filepath);
        let metadata = match std::fs::metadata(&full_path) {
            Ok(metadata) => metadata,
            Err(_) => return ToolResult::fail(format!("File not found: {}", filepath)),
        };

        if metadata.len() > MAX_FILE_SIZE {
            return ToolResult::fail(format!(
                "File too large: {} bytes (max {} bytes)",
                metadata.len(),
                MAX_FILE_SIZE
            ));
        }

        let bytes = match std::fs::read(&full_path) {
            Ok(bytes) => bytes,
            Err(e) => return ToolResult::fail(format!("Error reading file: {}", e)),
        };

        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(_) => return ToolResult::fail("File is binary or not UTF-8 encoded"),
        };

        ToolResult::ok(json!({
            "filepath": filepath,
            "lines": content.lines().count(),
            "size": metadata.len(),
            "content": content,
        }))
    }
}
