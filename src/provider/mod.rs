// AI reviewer interface
//
// The pipeline talks to an AiReviewer trait; the OpenRouter client is the
// production implementation, tests use mocks.

pub mod openrouter;
pub mod retry;
pub mod types;

use async_trait::async_trait;

use crate::review::types::{ReviewComment, VerificationVerdict};

pub use openrouter::OpenRouterClient;

#[async_trait]
pub trait AiReviewer: Send + Sync {
    /// Review a single file context.
    async fn review(&self, context: &str) -> anyhow::Result<Vec<ReviewComment>>;

    /// Review a batch context covering several files; returned comments name
    /// their file via the `filepath` field.
    async fn review_batch(&self, batch_context: &str) -> anyhow::Result<Vec<ReviewComment>>;

    /// Re-verify one issue with gathered evidence (optional third pass).
    async fn verify_issue(&self, prompt: &str) -> anyhow::Result<VerificationVerdict>;

    /// Cheap reachability check before starting a run.
    async fn test_connection(&self) -> bool;
}
