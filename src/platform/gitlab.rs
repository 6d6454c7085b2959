// GitLab REST v4 adapter
//
// Inline comments are positioned discussions and need the MR's diff_refs;
// summaries are plain notes. File paths are URL-encoded into the path
// segment the way the repository files API expects.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{format_comment_body, render_summary, Change, ChangeSource, TreeEntry, BOT_MARKER};
use crate::review::types::{ReviewComment, ReviewStats};

const GITLAB_DEFAULT_URL: &str = "https://gitlab.com";
const API_TIMEOUT_SECS: u64 = 30;
const PAGE_SIZE: usize = 100;

pub struct GitLabClient {
    client: Client,
    base_url: String,
    project_id: String,
}

impl GitLabClient {
    pub fn new(token: String, base_url: String, project_id: String) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "PRIVATE-TOKEN",
            HeaderValue::from_str(&token)
                .context("GITLAB_TOKEN contains invalid header characters")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            project_id,
        })
    }

    /// Create a client from GitLab CI environment variables.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("GITLAB_TOKEN")
            .context("GITLAB_TOKEN environment variable is not set")?;
        let base_url =
            std::env::var("CI_SERVER_URL").unwrap_or_else(|_| GITLAB_DEFAULT_URL.to_string());
        let project_id = std::env::var("CI_PROJECT_ID")
            .context("CI_PROJECT_ID environment variable is not set")?;
        Self::new(token, base_url, project_id)
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/api/v4/projects/{}/{}",
            self.base_url, self.project_id, path
        )
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {} returned {}", url, status);
        }
        response
            .json()
            .await
            .with_context(|| format!("GET {} returned invalid JSON", url))
    }

    async fn get_paginated(&self, path: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let sep = if path.contains('?') { '&' } else { '?' };
            let batch = self
                .get_json(&format!("{}{}per_page={}&page={}", path, sep, PAGE_SIZE, page))
                .await?;
            let Some(batch) = batch.as_array() else {
                break;
            };
            let len = batch.len();
            items.extend(batch.iter().cloned());
            if len < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    async fn diff_refs(&self, iid: &str) -> Result<Value> {
        let mr = self.get_json(&format!("merge_requests/{}", iid)).await?;
        Ok(mr["diff_refs"].clone())
    }
}

// The repository files API takes the path as a URL segment.
fn encode_path(path: &str) -> String {
    path.replace('/', "%2F").replace('.', "%2E")
}

#[async_trait]
impl ChangeSource for GitLabClient {
    async fn get_changes(&self, id: &str) -> Result<Vec<Change>> {
        let data = self
            .get_json(&format!("merge_requests/{}/changes", id))
            .await?;

        let base_ref = data["diff_refs"]["base_sha"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let head_ref = data["diff_refs"]["head_sha"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let changes = data["changes"].as_array().cloned().unwrap_or_default();
        debug!("Merge request {} has {} changed files", id, changes.len());

        Ok(changes
            .iter()
            .map(|change| Change {
                filepath: change["new_path"].as_str().unwrap_or_default().to_string(),
                diff: change["diff"].as_str().unwrap_or_default().to_string(),
                binary: change["binary"].as_bool().unwrap_or(false),
                base_ref: base_ref.clone(),
                head_ref: head_ref.clone(),
            })
            .collect())
    }

    async fn get_file_content(&self, path: &str, git_ref: &str) -> Option<String> {
        let url = self.url(&format!(
            "repository/files/{}/raw?ref={}",
            encode_path(path),
            git_ref
        ));
        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok()
    }

    async fn get_directory_tree(&self, directory: &str, git_ref: &str) -> Vec<TreeEntry> {
        let result = self
            .get_paginated(&format!("repository/tree?path={}&ref={}", directory, git_ref))
            .await;
        match result {
            Ok(items) => items
                .iter()
                .map(|item| TreeEntry {
                    path: item["path"].as_str().unwrap_or_default().to_string(),
                    name: item["name"].as_str().unwrap_or_default().to_string(),
                    kind: item["type"].as_str().unwrap_or("blob").to_string(),
                })
                .collect(),
            Err(e) => {
                warn!("Could not get directory tree for {}: {}", directory, e);
                Vec::new()
            }
        }
    }

    async fn post_comments(&self, id: &str, comments: &[ReviewComment]) -> Result<()> {
        let diff_refs = self.diff_refs(id).await?;

        for comment in comments {
            let payload = json!({
                "body": format_comment_body(comment),
                "position": {
                    "base_sha": diff_refs["base_sha"],
                    "start_sha": diff_refs["start_sha"],
                    "head_sha": diff_refs["head_sha"],
                    "position_type": "text",
                    "new_path": comment.filepath,
                    "new_line": comment.line,
                    "old_path": comment.filepath,
                },
            });

            let url = self.url(&format!("merge_requests/{}/discussions", id));
            let response = self.client.post(&url).json(&payload).send().await;
            match response {
                Ok(response) if response.status().is_success() => {
                    debug!("Posted comment on {}:{}", comment.filepath, comment.line);
                }
                Ok(response) => {
                    warn!(
                        "Error posting comment on {}:{}: {}",
                        comment.filepath,
                        comment.line,
                        response.status()
                    );
                }
                Err(e) => {
                    warn!(
                        "Error posting comment on {}:{}: {}",
                        comment.filepath, comment.line, e
                    );
                }
            }
        }
        Ok(())
    }

    async fn post_summary(
        &self,
        id: &str,
        stats: &ReviewStats,
        comments: &[ReviewComment],
    ) -> Result<()> {
        let url = self.url(&format!("merge_requests/{}/notes", id));
        let response = self
            .client
            .post(&url)
            .json(&json!({"body": render_summary(stats, comments)}))
            .send()
            .await
            .context("Failed to post summary")?;
        if !response.status().is_success() {
            anyhow::bail!("Posting summary returned {}", response.status());
        }
        debug!("Posted review summary");
        Ok(())
    }

    async fn clear_bot_comments(&self, id: &str) -> Result<usize> {
        let mut deleted = 0;
        let notes = self
            .get_paginated(&format!("merge_requests/{}/notes", id))
            .await?;
        for note in notes {
            if note["body"].as_str().unwrap_or_default().contains(BOT_MARKER) {
                if let Some(note_id) = note["id"].as_u64() {
                    let url = self.url(&format!("merge_requests/{}/notes/{}", id, note_id));
                    match self.client.delete(&url).send().await {
                        Ok(response) if response.status().is_success() => deleted += 1,
                        Ok(response) => {
                            warn!("Failed to delete note {}: {}", note_id, response.status())
                        }
                        Err(e) => warn!("Failed to delete note {}: {}", note_id, e),
                    }
                }
            }
        }
        Ok(deleted)
    }
}
