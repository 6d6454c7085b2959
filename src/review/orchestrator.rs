// Top-level review sequencer
//
// One run over a changeset: exclusion and size filtering, cache lookup,
// linter pre-pass, batched AI review, evidence-based verification, and the
// clear-then-post comment lifecycle. Per-file failures never escape the
// loop; the run always reaches the posting phase with whatever succeeded.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use super::context::{build_batch_context, with_response_contract, changed_lines, ContextBuilder};
use super::events::{ReviewEvent, ReviewObserver, TracingObserver};
use super::exclusions::exclusion_reason;
use super::language::detect_language;
use super::types::{ReviewComment, ReviewStats};
use super::verifier::DoubleCheckVerifier;
use crate::cache::CacheStore;
use crate::config::ReviewConfig;
use crate::platform::ChangeSource;
use crate::provider::AiReviewer;
use crate::tools::ToolRegistry;

/// A cache-miss file waiting for batch review, with its pre-gathered
/// auxiliary context.
struct PendingReview {
    filepath: String,
    cache_key: String,
    language: Option<String>,
    changed_lines: Vec<u32>,
    context: String,
}

pub struct ReviewOrchestrator {
    platform: Arc<dyn ChangeSource>,
    provider: Arc<dyn AiReviewer>,
    tools: Arc<ToolRegistry>,
    cache: CacheStore,
    config: ReviewConfig,
    context_builder: ContextBuilder,
    verifier: DoubleCheckVerifier,
    observer: Arc<dyn ReviewObserver>,
}

impl ReviewOrchestrator {
    pub fn new(
        platform: Arc<dyn ChangeSource>,
        provider: Arc<dyn AiReviewer>,
        tools: Arc<ToolRegistry>,
        cache: CacheStore,
        config: ReviewConfig,
    ) -> Self {
        let observer: Arc<dyn ReviewObserver> = Arc::new(TracingObserver);
        Self {
            context_builder: ContextBuilder::new(platform.clone()),
            verifier: DoubleCheckVerifier::new(
                provider.clone(),
                tools.clone(),
                config.review.reverify_with_ai,
                observer.clone(),
            ),
            platform,
            provider,
            tools,
            cache,
            config,
            observer,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ReviewObserver>) -> Self {
        self.verifier = DoubleCheckVerifier::new(
            self.provider.clone(),
            self.tools.clone(),
            self.config.review.reverify_with_ai,
            observer.clone(),
        );
        self.observer = observer;
        self
    }

    /// Run one full review over a pull/merge request.
    pub async fn review_pull_request(&self, id: &str) -> Result<ReviewStats> {
        let started = Instant::now();

        let changes = self
            .platform
            .get_changes(id)
            .await
            .with_context(|| format!("Failed to fetch changes for {}", id))?;

        self.observer.on_event(&ReviewEvent::RunStarted {
            id: id.to_string(),
            change_count: changes.len(),
        });

        let mut stats = ReviewStats::default();
        let mut all_comments: Vec<ReviewComment> = Vec::new();
        let mut pending: Vec<PendingReview> = Vec::new();

        for change in &changes {
            if let Some(reason) = exclusion_reason(&self.config.exclusions, &change.filepath) {
                stats.files_excluded += 1;
                self.observer.on_event(&ReviewEvent::FileExcluded {
                    filepath: change.filepath.clone(),
                    reason,
                });
                continue;
            }

            if change.binary {
                stats.files_skipped += 1;
                self.observer.on_event(&ReviewEvent::FileSkipped {
                    filepath: change.filepath.clone(),
                    reason: "binary file".to_string(),
                });
                continue;
            }
            if change.diff.len() > self.config.review.max_diff_bytes {
                stats.files_skipped += 1;
                self.observer.on_event(&ReviewEvent::FileSkipped {
                    filepath: change.filepath.clone(),
                    reason: format!(
                        "diff too large ({} > {} bytes)",
                        change.diff.len(),
                        self.config.review.max_diff_bytes
                    ),
                });
                continue;
            }

            let cache_key = CacheStore::cache_key(&change.filepath, &change.diff);
            if self.config.cache.enabled {
                if let Some(cached) = self.cache.get(&cache_key) {
                    stats.cache_hits += 1;
                    stats.files_reviewed += 1;
                    self.observer.on_event(&ReviewEvent::CacheHit {
                        filepath: change.filepath.clone(),
                    });
                    all_comments.extend(cached);
                    continue;
                }
            }

            let language = detect_language(&change.filepath).map(str::to_string);
            let lines = changed_lines(&change.diff);
            let linter_findings = match &language {
                Some(language) => self.linter_prepass(&change.filepath, language, &lines).await,
                None => None,
            };

            let context = self
                .context_builder
                .build(change, linter_findings.as_ref())
                .await;

            pending.push(PendingReview {
                filepath: change.filepath.clone(),
                cache_key,
                language,
                changed_lines: lines,
                context,
            });
        }

        let batch_size = self.config.review.batch_size.max(1);
        let total_batches = pending.len().div_ceil(batch_size);

        for (index, chunk) in pending.chunks(batch_size).enumerate() {
            self.observer.on_event(&ReviewEvent::BatchStarted {
                index,
                total: total_batches,
                size: chunk.len(),
            });

            let returned = if chunk.len() == 1 {
                self.provider
                    .review(&with_response_contract(&chunk[0].context))
                    .await
            } else {
                let parts: Vec<(String, String)> = chunk
                    .iter()
                    .map(|p| (p.filepath.clone(), p.context.clone()))
                    .collect();
                self.provider.review_batch(&build_batch_context(&parts)).await
            };

            let returned = match returned {
                Ok(comments) => comments,
                Err(e) => {
                    // Only this batch is lost; later batches still run and
                    // the summary reflects partial completion.
                    self.observer.on_event(&ReviewEvent::BatchFailed {
                        index,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            for item in chunk {
                let file_comments: Vec<ReviewComment> = returned
                    .iter()
                    .filter(|c| c.filepath == item.filepath)
                    .cloned()
                    .collect();

                let file_comments = if self.config.review.verify_high_severity {
                    self.verifier
                        .verify_issues(
                            file_comments,
                            &item.context,
                            &item.filepath,
                            item.language.as_deref(),
                            &item.changed_lines,
                        )
                        .await
                } else {
                    file_comments
                };

                if self.config.cache.enabled {
                    self.cache.set(&item.cache_key, &file_comments);
                }

                stats.files_reviewed += 1;
                all_comments.extend(file_comments);
            }
        }

        stats.total_comments = all_comments.len();

        // Clearing strictly precedes posting so stale annotations from a
        // previous run never survive next to fresh ones.
        match self.platform.clear_bot_comments(id).await {
            Ok(count) => self
                .observer
                .on_event(&ReviewEvent::CommentsCleared { count }),
            Err(e) => warn!("Failed to clear previous bot comments: {}", e),
        }

        if !all_comments.is_empty() {
            if let Err(e) = self.platform.post_comments(id, &all_comments).await {
                warn!("Failed to post review comments: {}", e);
            }
        }

        if let Err(e) = self.platform.post_summary(id, &stats, &all_comments).await {
            warn!("Failed to post review summary: {}", e);
        }

        self.observer.on_event(&ReviewEvent::RunCompleted {
            stats: stats.clone(),
        });
        info!(
            "Review of {} finished in {:.1}s",
            id,
            started.elapsed().as_secs_f32()
        );

        Ok(stats)
    }

    /// Best-effort linter pre-pass; findings ride along as auxiliary context.
    async fn linter_prepass(
        &self,
        filepath: &str,
        language: &str,
        changed_lines: &[u32],
    ) -> Option<serde_json::Value> {
        let result = self
            .tools
            .execute(
                "run_linter",
                json!({
                    "filepath": filepath,
                    "language": language,
                    "changed_lines": changed_lines,
                }),
            )
            .await;

        match result {
            Ok(result) if result.success => Some(result.data),
            Ok(result) => {
                self.observer.on_event(&ReviewEvent::ToolFailure {
                    tool: "run_linter".to_string(),
                    error: result.error,
                });
                None
            }
            Err(e) => {
                warn!("Linter pre-pass unavailable: {}", e);
                None
            }
        }
    }
}
