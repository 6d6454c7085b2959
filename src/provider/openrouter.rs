// HTTP client for the OpenRouter chat-completions API

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use super::retry::with_retry;
use super::types::{parse_comment_array, parse_verdict, ChatRequest, ChatResponse};
use super::AiReviewer;
use crate::config::ProviderConfig;
use crate::review::types::{ReviewComment, VerificationVerdict};

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const REQUEST_TIMEOUT_SECS: u64 = 120;
const CONNECTION_TEST_TIMEOUT_SECS: u64 = 10;

pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenRouterClient {
    pub fn new(api_key: String, config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Create a client from the `OPENROUTER_API_KEY` environment variable.
    pub fn from_env(config: &ProviderConfig) -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .context("OPENROUTER_API_KEY environment variable is not set")?;
        Self::new(api_key, config)
    }

    /// Point the client at a different base URL (self-hosted router, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send one prompt, returning the raw message text, with retry.
    async fn chat(&self, prompt: &str) -> Result<String> {
        with_retry(|| self.chat_once(prompt)).await
    }

    async fn chat_once(&self, prompt: &str) -> Result<String> {
        let request =
            ChatRequest::user(&self.model, self.max_tokens, self.temperature, prompt);

        debug!("Calling {} ({} chars of context)", self.model, prompt.len());

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", "https://github.com/magpie-review/magpie")
            .header("X-Title", "Magpie Code Review")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to AI provider")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            anyhow::bail!(
                "AI provider request failed\n\nStatus: {}\nBody: {}",
                status,
                excerpt
            );
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse AI provider response")?;

        chat.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("AI provider response contained no choices")
    }
}

#[async_trait]
impl AiReviewer for OpenRouterClient {
    async fn review(&self, context: &str) -> Result<Vec<ReviewComment>> {
        let text = self.chat(context).await?;
        let comments = parse_comment_array(&text);
        debug!("Received {} comments from AI", comments.len());
        Ok(comments)
    }

    async fn review_batch(&self, batch_context: &str) -> Result<Vec<ReviewComment>> {
        let text = self.chat(batch_context).await?;
        let comments = parse_comment_array(&text);
        debug!("Received {} comments from AI batch", comments.len());
        Ok(comments)
    }

    async fn verify_issue(&self, prompt: &str) -> Result<VerificationVerdict> {
        let text = self.chat(prompt).await?;
        parse_verdict(&text).context("No parseable verdict in AI response")
    }

    async fn test_connection(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(Duration::from_secs(CONNECTION_TEST_TIMEOUT_SECS))
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Connection test failed: {}", e);
                false
            }
        }
    }
}
