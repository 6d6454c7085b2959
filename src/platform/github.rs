// GitHub REST v3 adapter
//
// Thin plumbing over the pulls/issues endpoints. Inline comments must land
// on diff lines GitHub accepts; rejected positions are logged and skipped
// so one bad line number cannot sink the rest of the review.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{format_comment_body, render_summary, Change, ChangeSource, TreeEntry, BOT_MARKER};
use crate::review::types::{ReviewComment, ReviewStats};

const GITHUB_API_URL: &str = "https://api.github.com";
const API_TIMEOUT_SECS: u64 = 30;
const PAGE_SIZE: usize = 100;

pub struct GitHubClient {
    client: Client,
    base_url: String,
    repo: String,
}

impl GitHubClient {
    pub fn new(token: String, repo: String) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .context("GITHUB_TOKEN contains invalid header characters")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("magpie-review-bot"));

        let client = Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: GITHUB_API_URL.to_string(),
            repo,
        })
    }

    /// Create a client from `GITHUB_TOKEN` and `GITHUB_REPOSITORY`.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN")
            .context("GITHUB_TOKEN environment variable is not set")?;
        let repo = std::env::var("GITHUB_REPOSITORY")
            .context("GITHUB_REPOSITORY environment variable is not set")?;
        Self::new(token, repo)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}", self.base_url, self.repo, path)
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

    /// Fetch every page of a list endpoint.
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

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .with_context(|| format!("DELETE {} failed", url))?;
        if !response.status().is_success() {
            anyhow::bail!("DELETE {} returned {}", url, response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeSource for GitHubClient {
    async fn get_changes(&self, id: &str) -> Result<Vec<Change>> {
        let pull = self.get_json(&format!("pulls/{}", id)).await?;
        let base_ref = pull["base"]["sha"].as_str().unwrap_or_default().to_string();
        let head_ref = pull["head"]["sha"].as_str().unwrap_or_default().to_string();

        let files = self.get_paginated(&format!("pulls/{}/files", id)).await?;
        debug!("Pull request {} has {} changed files", id, files.len());

        Ok(files
            .iter()
            .map(|file| Change {
                filepath: file["filename"].as_str().unwrap_or_default().to_string(),
                diff: file["patch"].as_str().unwrap_or_default().to_string(),
                // GitHub omits the patch for binary and oversized files.
                binary: file["patch"].as_str().is_none(),
                base_ref: base_ref.clone(),
                head_ref: head_ref.clone(),
            })
            .collect())
    }

    async fn get_file_content(&self, path: &str, git_ref: &str) -> Option<String> {
        let url = self.url(&format!("contents/{}?ref={}", path, git_ref));
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github.raw")
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok()
    }

    async fn get_directory_tree(&self, directory: &str, git_ref: &str) -> Vec<TreeEntry> {
        let result = self
            .get_json(&format!("contents/{}?ref={}", directory, git_ref))
            .await;
        let items = match result {
            Ok(Value::Array(items)) => items,
            Ok(single) => vec![single],
            Err(e) => {
                warn!("Could not get directory tree for {}: {}", directory, e);
                return Vec::new();
            }
        };
        items
            .iter()
            .map(|item| TreeEntry {
                path: item["path"].as_str().unwrap_or_default().to_string(),
                name: item["name"].as_str().unwrap_or_default().to_string(),
                kind: if item["type"].as_str() == Some("file") {
                    "blob".to_string()
                } else {
                    "tree".to_string()
                },
            })
            .collect()
    }

    async fn post_comments(&self, id: &str, comments: &[ReviewComment]) -> Result<()> {
        let pull = self.get_json(&format!("pulls/{}", id)).await?;
        let commit_id = pull["head"]["sha"]
            .as_str()
            .context("Pull request has no head sha")?
            .to_string();

        for comment in comments {
            let payload = json!({
                "body": format_comment_body(comment),
                "commit_id": commit_id,
                "path": comment.filepath,
                "line": comment.line,
                "side": "RIGHT",
            });

            let url = self.url(&format!("pulls/{}/comments", id));
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
        let url = self.url(&format!("issues/{}/comments", id));
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

        // Issue comments (summaries) and review comments (inline) live on
        // different endpoints.
        let issue_comments = self
            .get_paginated(&format!("issues/{}/comments", id))
            .await?;
        for comment in issue_comments {
            if comment["body"].as_str().unwrap_or_default().contains(BOT_MARKER) {
                if let Some(cid) = comment["id"].as_u64() {
                    match self.delete(&format!("issues/comments/{}", cid)).await {
                        Ok(()) => deleted += 1,
                        Err(e) => warn!("Failed to delete issue comment {}: {}", cid, e),
                    }
                }
            }
        }

        let review_comments = self
            .get_paginated(&format!("pulls/{}/comments", id))
            .await?;
        for comment in review_comments {
            if comment["body"].as_str().unwrap_or_default().contains(BOT_MARKER) {
                if let Some(cid) = comment["id"].as_u64() {
                    match self.delete(&format!("pulls/comments/{}", cid)).await {
                        Ok(()) => deleted += 1,
                        Err(e) => warn!("Failed to delete review comment {}: {}", cid, e),
                    }
                }
            }
        }

        Ok(deleted)
    }
}
