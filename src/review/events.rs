// Pipeline status events
//
// The pipeline reports progress through an injected observer instead of
// writing text itself, so callers choose the sink. The default observer
// forwards everything to tracing.

use tracing::{debug, info, warn};

use super::types::ReviewStats;

#[derive(Debug, Clone)]
pub enum ReviewEvent {
    RunStarted {
        id: String,
        change_count: usize,
    },
    FileExcluded {
        filepath: String,
        reason: String,
    },
    FileSkipped {
        filepath: String,
        reason: String,
    },
    CacheHit {
        filepath: String,
    },
    BatchStarted {
        index: usize,
        total: usize,
        size: usize,
    },
    BatchFailed {
        index: usize,
        error: String,
    },
    ToolFailure {
        tool: String,
        error: String,
    },
    VerificationResult {
        filepath: String,
        line: u32,
        linter_confirmed: bool,
    },
    CommentsCleared {
        count: usize,
    },
    RunCompleted {
        stats: ReviewStats,
    },
}

pub trait ReviewObserver: Send + Sync {
    fn on_event(&self, event: &ReviewEvent);
}

/// Default observer: forwards events to tracing.
pub struct TracingObserver;

impl ReviewObserver for TracingObserver {
    fn on_event(&self, event: &ReviewEvent) {
        match event {
            ReviewEvent::RunStarted { id, change_count } => {
                info!("Starting review of {} ({} changed files)", id, change_count);
            }
            ReviewEvent::FileExcluded { filepath, reason } => {
                info!("Excluding {}: {}", filepath, reason);
            }
            ReviewEvent::FileSkipped { filepath, reason } => {
                info!("Skipping {}: {}", filepath, reason);
            }
            ReviewEvent::CacheHit { filepath } => {
                info!("Using cached review for {}", filepath);
            }
            ReviewEvent::BatchStarted { index, total, size } => {
                info!("Reviewing batch {}/{} ({} files)", index + 1, total, size);
            }
            ReviewEvent::BatchFailed { index, error } => {
                warn!("Batch {} failed: {}", index + 1, error);
            }
            ReviewEvent::ToolFailure { tool, error } => {
                debug!("Tool {} unavailable: {}", tool, error);
            }
            ReviewEvent::VerificationResult {
                filepath,
                line,
                linter_confirmed,
            } => {
                if *linter_confirmed {
                    info!("Issue at {}:{} confirmed by linter", filepath, line);
                } else {
                    info!(
                        "Issue at {}:{} kept without linter confirmation",
                        filepath, line
                    );
                }
            }
            ReviewEvent::CommentsCleared { count } => {
                info!("Cleared {} previous bot comments", count);
            }
            ReviewEvent::RunCompleted { stats } => {
                info!(
                    "Review complete: {} reviewed, {} skipped, {} excluded, {} comments, {} cache hits",
                    stats.files_reviewed,
                    stats.files_skipped,
                    stats.files_excluded,
                    stats.total_comments,
                    stats.cache_hits
                );
            }
        }
    }
}
