// End-to-end pipeline tests with a mock platform and a scripted AI provider

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use magpie::cache::CacheStore;
use magpie::config::ReviewConfig;
use magpie::platform::{Change, ChangeSource, TreeEntry};
use magpie::provider::AiReviewer;
use magpie::review::{
    ReviewComment, ReviewOrchestrator, ReviewStats, Severity, VerificationVerdict,
};
use magpie::tools::{Tool, ToolInputSchema, ToolRegistry, ToolResult};

const SAMPLE_DIFF: &str = "\
@@ -1,5 +1,20 @@
+import os
+
+def main():
+    value = compute()
+    print(value)
+
+def compute():
+    total = 0
+    for i in range(10):
+        total += i
+    return total
+
+def unused():
+    pass
+
+CONSTANT = 1
+OTHER = 2
+THIRD = 3
+FOURTH = 4
+FIFTH = 5
";

fn change(filepath: &str, diff: &str) -> Change {
    Change {
        filepath: filepath.to_string(),
        diff: diff.to_string(),
        binary: false,
        base_ref: "base-sha".to_string(),
        head_ref: "head-sha".to_string(),
    }
}

fn ai_comment(filepath: &str, line: u32, severity: Severity) -> ReviewComment {
    ReviewComment {
        filepath: filepath.to_string(),
        line,
        comment: "potential issue found here".to_string(),
        severity,
        linter_confirmed: None,
        linter_evidence: None,
        verified: None,
        verification_reasoning: None,
    }
}

/// Records the order of posting operations and what was posted.
struct MockPlatform {
    changes: Vec<Change>,
    ops: Mutex<Vec<String>>,
    posted: Mutex<Vec<ReviewComment>>,
    summaries: Mutex<Vec<ReviewStats>>,
}

impl MockPlatform {
    fn new(changes: Vec<Change>) -> Self {
        Self {
            changes,
            ops: Mutex::new(Vec::new()),
            posted: Mutex::new(Vec::new()),
            summaries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChangeSource for MockPlatform {
    async fn get_changes(&self, _id: &str) -> anyhow::Result<Vec<Change>> {
        Ok(self.changes.clone())
    }

    async fn get_file_content(&self, _path: &str, _git_ref: &str) -> Option<String> {
        None
    }

    async fn get_directory_tree(&self, _directory: &str, _git_ref: &str) -> Vec<TreeEntry> {
        Vec::new()
    }

    async fn post_comments(&self, _id: &str, comments: &[ReviewComment]) -> anyhow::Result<()> {
        self.ops.lock().unwrap().push("post".to_string());
        self.posted.lock().unwrap().extend(comments.to_vec());
        Ok(())
    }

    async fn post_summary(
        &self,
        _id: &str,
        stats: &ReviewStats,
        _comments: &[ReviewComment],
    ) -> anyhow::Result<()> {
        self.ops.lock().unwrap().push("summary".to_string());
        self.summaries.lock().unwrap().push(stats.clone());
        Ok(())
    }

    async fn clear_bot_comments(&self, _id: &str) -> anyhow::Result<usize> {
        self.ops.lock().unwrap().push("clear".to_string());
        Ok(2)
    }
}

enum Scripted {
    Reply(Vec<ReviewComment>),
    Fail,
}

/// Pops one scripted response per review/review_batch call; empty script
/// replies with no comments.
struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    review_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            review_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> anyhow::Result<Vec<ReviewComment>> {
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Reply(comments)) => Ok(comments),
            Some(Scripted::Fail) => anyhow::bail!("scripted provider failure"),
            None => Ok(Vec::new()),
        }
    }

    fn total_calls(&self) -> usize {
        self.review_calls.load(Ordering::SeqCst) + self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiReviewer for ScriptedProvider {
    async fn review(&self, _context: &str) -> anyhow::Result<Vec<ReviewComment>> {
        self.review_calls.fetch_add(1, Ordering::SeqCst);
        self.next()
    }

    async fn review_batch(&self, _batch_context: &str) -> anyhow::Result<Vec<ReviewComment>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.next()
    }

    async fn verify_issue(&self, _prompt: &str) -> anyhow::Result<VerificationVerdict> {
        anyhow::bail!("third pass is not enabled in these tests")
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

/// Linter stub reporting a single error on a fixed line of every file.
struct StubLinter {
    line: u32,
}

#[async_trait]
impl Tool for StubLinter {
    fn name(&self) -> &str {
        "run_linter"
    }

    fn description(&self) -> &str {
        "stub linter"
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::simple(vec![])
    }

    async fn execute(&self, input: Value) -> ToolResult {
        ToolResult::ok(json!({
            "filepath": input["filepath"],
            "total_issues": 1,
            "filtered_issues": 1,
            "issues": [{
                "line": self.line,
                "column": 1,
                "severity": "error",
                "message": "undefined variable",
                "rule": "undefined-variable"
            }],
        }))
    }
}

struct Pipeline {
    platform: Arc<MockPlatform>,
    provider: Arc<ScriptedProvider>,
    orchestrator: ReviewOrchestrator,
}

fn pipeline(
    changes: Vec<Change>,
    script: Vec<Scripted>,
    cache_dir: &std::path::Path,
    linter_line: Option<u32>,
    configure: impl FnOnce(&mut ReviewConfig),
) -> Pipeline {
    let platform = Arc::new(MockPlatform::new(changes));
    let provider = Arc::new(ScriptedProvider::new(script));

    let mut registry = ToolRegistry::new();
    if let Some(line) = linter_line {
        registry.register(Arc::new(StubLinter { line }));
    }

    let mut config = ReviewConfig::default();
    configure(&mut config);

    let cache = CacheStore::new(cache_dir, config.cache.ttl_days).unwrap();
    let orchestrator = ReviewOrchestrator::new(
        platform.clone(),
        provider.clone(),
        Arc::new(registry),
        cache,
        config,
    );

    Pipeline {
        platform,
        provider,
        orchestrator,
    }
}

#[tokio::test]
async fn test_excluded_and_eligible_files_are_counted() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(
        vec![
            change("vendor/lib.js", "@@ -1 +1 @@\n+var x = 1;\n"),
            change("src/app.py", SAMPLE_DIFF),
        ],
        vec![Scripted::Reply(vec![ai_comment(
            "src/app.py",
            4,
            Severity::Minor,
        )])],
        dir.path(),
        None,
        |_| {},
    );

    let stats = p.orchestrator.review_pull_request("1").await.unwrap();

    assert_eq!(stats.files_excluded, 1);
    assert_eq!(stats.files_reviewed, 1);
    assert_eq!(stats.files_skipped, 0);
    assert_eq!(stats.total_comments, 1);
}

#[tokio::test]
async fn test_binary_and_oversized_diffs_are_skipped_before_any_cost() {
    let dir = tempfile::tempdir().unwrap();
    let mut binary = change("logo.png", "");
    binary.binary = true;
    let oversized = change("src/gen.py", &"+x\n".repeat(6_000));

    let p = pipeline(
        vec![binary, oversized],
        vec![],
        dir.path(),
        None,
        |config| config.review.max_diff_bytes = 10_000,
    );

    let stats = p.orchestrator.review_pull_request("2").await.unwrap();

    assert_eq!(stats.files_skipped, 2);
    assert_eq!(stats.files_reviewed, 0);
    assert_eq!(p.provider.total_calls(), 0, "no AI call for skipped files");
}

#[tokio::test]
async fn test_second_run_with_identical_diff_hits_cache() {
    let dir = tempfile::tempdir().unwrap();
    let changes = vec![change("src/app.py", SAMPLE_DIFF)];
    let expected = ai_comment("src/app.py", 4, Severity::Minor);

    let first = pipeline(
        changes.clone(),
        vec![Scripted::Reply(vec![expected.clone()])],
        dir.path(),
        None,
        |_| {},
    );
    let stats = first.orchestrator.review_pull_request("3").await.unwrap();
    assert_eq!(stats.cache_hits, 0);
    assert_eq!(first.provider.total_calls(), 1);

    let second = pipeline(changes, vec![], dir.path(), None, |_| {});
    let stats = second.orchestrator.review_pull_request("3").await.unwrap();

    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.files_reviewed, 1);
    assert_eq!(
        second.provider.total_calls(),
        0,
        "cache hit must not invoke the AI reviewer"
    );

    let posted = second.platform.posted.lock().unwrap();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].filepath, expected.filepath);
    assert_eq!(posted[0].line, expected.line);
    assert_eq!(posted[0].comment, expected.comment);
}

#[tokio::test]
async fn test_changed_diff_misses_cache() {
    let dir = tempfile::tempdir().unwrap();

    let first = pipeline(
        vec![change("src/app.py", SAMPLE_DIFF)],
        vec![Scripted::Reply(vec![])],
        dir.path(),
        None,
        |_| {},
    );
    first.orchestrator.review_pull_request("4").await.unwrap();

    let second = pipeline(
        vec![change("src/app.py", "@@ -1 +1 @@\n+different\n")],
        vec![Scripted::Reply(vec![])],
        dir.path(),
        None,
        |_| {},
    );
    let stats = second.orchestrator.review_pull_request("4").await.unwrap();

    assert_eq!(stats.cache_hits, 0);
    assert_eq!(second.provider.total_calls(), 1);
}

#[tokio::test]
async fn test_linter_agreement_on_exact_line_confirms_issue() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(
        vec![change("src/app.py", SAMPLE_DIFF)],
        vec![Scripted::Reply(vec![ai_comment(
            "src/app.py",
            10,
            Severity::Critical,
        )])],
        dir.path(),
        Some(10),
        |_| {},
    );

    p.orchestrator.review_pull_request("5").await.unwrap();

    let posted = p.platform.posted.lock().unwrap();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].linter_confirmed, Some(true));
    let evidence = posted[0].linter_evidence.as_ref().unwrap();
    assert_eq!(evidence.line, 10);
    assert_eq!(evidence.message, "undefined variable");
}

#[tokio::test]
async fn test_linter_findings_elsewhere_keep_issue_unconfirmed() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(
        vec![change("src/app.py", SAMPLE_DIFF)],
        vec![Scripted::Reply(vec![ai_comment(
            "src/app.py",
            10,
            Severity::Critical,
        )])],
        dir.path(),
        Some(11),
        |_| {},
    );

    p.orchestrator.review_pull_request("6").await.unwrap();

    let posted = p.platform.posted.lock().unwrap();
    assert_eq!(posted.len(), 1, "unconfirmed issues are kept, not dropped");
    assert_eq!(posted[0].linter_confirmed, Some(false));
    assert!(posted[0].linter_evidence.is_none());
}

#[tokio::test]
async fn test_clearing_precedes_posting_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(
        vec![change("src/app.py", SAMPLE_DIFF)],
        vec![Scripted::Reply(vec![ai_comment(
            "src/app.py",
            4,
            Severity::Major,
        )])],
        dir.path(),
        None,
        |_| {},
    );

    p.orchestrator.review_pull_request("7").await.unwrap();

    let ops = p.platform.ops.lock().unwrap();
    assert_eq!(*ops, vec!["clear", "post", "summary"]);
}

#[tokio::test]
async fn test_summary_posted_even_without_comments() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(
        vec![change("src/app.py", SAMPLE_DIFF)],
        vec![Scripted::Reply(vec![])],
        dir.path(),
        None,
        |_| {},
    );

    p.orchestrator.review_pull_request("8").await.unwrap();

    let ops = p.platform.ops.lock().unwrap();
    assert_eq!(*ops, vec!["clear", "summary"]);
    let summaries = p.platform.summaries.lock().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].files_reviewed, 1);
}

#[tokio::test]
async fn test_batching_splits_files_and_redistributes_comments() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(
        vec![
            change("src/a.py", SAMPLE_DIFF),
            change("src/b.py", SAMPLE_DIFF),
            change("src/c.py", SAMPLE_DIFF),
        ],
        vec![
            Scripted::Reply(vec![
                ai_comment("src/b.py", 4, Severity::Minor),
                ai_comment("src/a.py", 6, Severity::Suggestion),
            ]),
            Scripted::Reply(vec![ai_comment("src/c.py", 8, Severity::Minor)]),
        ],
        dir.path(),
        None,
        |config| config.review.batch_size = 2,
    );

    let stats = p.orchestrator.review_pull_request("9").await.unwrap();

    // ceil(3/2) = 2 calls: one batch of two, one single review.
    assert_eq!(p.provider.batch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(p.provider.review_calls.load(Ordering::SeqCst), 1);
    assert_eq!(stats.files_reviewed, 3);
    assert_eq!(stats.total_comments, 3);

    let posted = p.platform.posted.lock().unwrap();
    let files: Vec<&str> = posted.iter().map(|c| c.filepath.as_str()).collect();
    assert!(files.contains(&"src/a.py"));
    assert!(files.contains(&"src/b.py"));
    assert!(files.contains(&"src/c.py"));
}

#[tokio::test]
async fn test_failed_batch_loses_only_its_own_files() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(
        vec![
            change("src/a.py", SAMPLE_DIFF),
            change("src/b.py", SAMPLE_DIFF),
            change("src/c.py", SAMPLE_DIFF),
        ],
        vec![
            Scripted::Reply(vec![ai_comment("src/a.py", 4, Severity::Minor)]),
            Scripted::Fail,
            Scripted::Reply(vec![ai_comment("src/c.py", 8, Severity::Minor)]),
        ],
        dir.path(),
        None,
        |config| config.review.batch_size = 1,
    );

    let stats = p.orchestrator.review_pull_request("10").await.unwrap();

    assert_eq!(stats.files_reviewed, 2, "failed batch files are not counted");
    assert_eq!(stats.total_comments, 2);

    // The run still reaches the posting phase.
    let ops = p.platform.ops.lock().unwrap();
    assert_eq!(*ops, vec!["clear", "post", "summary"]);
}

#[tokio::test]
async fn test_minor_issues_bypass_verification_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(
        vec![change("src/app.py", SAMPLE_DIFF)],
        vec![Scripted::Reply(vec![
            ai_comment("src/app.py", 3, Severity::Minor),
            ai_comment("src/app.py", 5, Severity::Suggestion),
        ])],
        dir.path(),
        Some(3),
        |_| {},
    );

    p.orchestrator.review_pull_request("11").await.unwrap();

    let posted = p.platform.posted.lock().unwrap();
    assert_eq!(posted.len(), 2);
    for comment in posted.iter() {
        assert!(
            comment.linter_confirmed.is_none(),
            "minor/suggestion issues must pass through unmodified"
        );
    }
    // Original order preserved.
    assert_eq!(posted[0].line, 3);
    assert_eq!(posted[1].line, 5);
}

#[tokio::test]
async fn test_empty_review_is_cached_too() {
    let dir = tempfile::tempdir().unwrap();
    let changes = vec![change("src/app.py", SAMPLE_DIFF)];

    let first = pipeline(
        changes.clone(),
        vec![Scripted::Reply(vec![])],
        dir.path(),
        None,
        |_| {},
    );
    first.orchestrator.review_pull_request("12").await.unwrap();

    let second = pipeline(changes, vec![], dir.path(), None, |_| {});
    let stats = second.orchestrator.review_pull_request("12").await.unwrap();

    assert_eq!(stats.cache_hits, 1);
    assert_eq!(second.provider.total_calls(), 0);
}
