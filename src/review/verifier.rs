// Two-pass (optionally three-pass) issue verification
//
// Pass 1 is the AI review itself. Pass 2 gathers tool evidence for every
// critical/major issue and checks for linter agreement on the exact line.
// Pass 3, when enabled, resubmits the issue plus evidence to the AI for a
// confirm/dismiss verdict and fails open on any call error.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::events::{ReviewEvent, ReviewObserver};
use super::types::{LinterEvidence, LinterFinding, ReviewComment};
use crate::provider::AiReviewer;
use crate::tools::ToolRegistry;

const MAX_EVIDENCE_COMMITS: u64 = 3;
const MAX_RELATED_FILES: usize = 2;
const MAX_FILE_CANDIDATES: usize = 5;
const RELATED_FILE_EXCERPT: usize = 1_000;
const CONTEXT_EXCERPT: usize = 1_500;

/// Auxiliary data gathered for one issue under verification. Ephemeral; not
/// persisted beyond the run.
#[derive(Debug, Default)]
pub struct Evidence {
    pub linter_results: Option<Value>,
    pub git_history: Option<Value>,
    pub related_files: Vec<Value>,
}

/// Finds path-like tokens in issue text. Replaceable: its precision bounds
/// how much related-file evidence the verifier sees.
pub trait FileReferenceExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<String>;
}

static PATH_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-zA-Z0-9_\-/]+\.[a-zA-Z]{2,4}\b").expect("path token regex"));

/// Default heuristic: word characters and separators ending in a short
/// extension, with at least one path separator, and not a URL.
pub struct PathTokenExtractor;

impl FileReferenceExtractor for PathTokenExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        let text = text.to_lowercase();
        let mut seen = Vec::new();
        for token in PATH_TOKEN.find_iter(&text) {
            let token = token.as_str();
            if token.starts_with("http") || token.starts_with("www.") {
                continue;
            }
            if !token.contains('/') {
                continue;
            }
            if !seen.iter().any(|s| s == token) {
                seen.push(token.to_string());
            }
            if seen.len() == MAX_FILE_CANDIDATES {
                break;
            }
        }
        seen
    }
}

pub struct DoubleCheckVerifier {
    provider: Arc<dyn AiReviewer>,
    tools: Arc<ToolRegistry>,
    extractor: Box<dyn FileReferenceExtractor>,
    reverify_with_ai: bool,
    observer: Arc<dyn ReviewObserver>,
}

impl DoubleCheckVerifier {
    pub fn new(
        provider: Arc<dyn AiReviewer>,
        tools: Arc<ToolRegistry>,
        reverify_with_ai: bool,
        observer: Arc<dyn ReviewObserver>,
    ) -> Self {
        Self {
            provider,
            tools,
            extractor: Box::new(PathTokenExtractor),
            reverify_with_ai,
            observer,
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn FileReferenceExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Run verification over one file's issue list.
    ///
    /// Critical/major issues go through evidence gathering; everything else
    /// passes through unchanged. Order is preserved within each partition.
    pub async fn verify_issues(
        &self,
        issues: Vec<ReviewComment>,
        context: &str,
        filepath: &str,
        language: Option<&str>,
        changed_lines: &[u32],
    ) -> Vec<ReviewComment> {
        if issues.is_empty() {
            return issues;
        }

        let (high_severity, other): (Vec<_>, Vec<_>) =
            issues.into_iter().partition(|i| i.severity.is_high());

        debug!(
            "Verifying {} high-severity issues ({} pass through)",
            high_severity.len(),
            other.len()
        );

        if high_severity.is_empty() {
            return other;
        }

        let mut verified = Vec::with_capacity(high_severity.len());
        for mut issue in high_severity {
            let evidence = self
                .gather_evidence(&issue, filepath, language, changed_lines)
                .await;

            match check_linter_confirmation(&issue, &evidence) {
                Some(matching) => {
                    issue.linter_confirmed = Some(true);
                    issue.linter_evidence = Some(matching);
                }
                None => {
                    // Linter absence is weaker corroboration, not proof of
                    // absence: the issue is kept.
                    issue.linter_confirmed = Some(false);
                }
            }

            self.observer.on_event(&ReviewEvent::VerificationResult {
                filepath: filepath.to_string(),
                line: issue.line,
                linter_confirmed: issue.linter_confirmed == Some(true),
            });

            if self.reverify_with_ai {
                match self.reverify_with_evidence(issue, &evidence, context, filepath).await {
                    Some(issue) => verified.push(issue),
                    None => continue, // dismissed as a false positive
                }
            } else {
                verified.push(issue);
            }
        }

        verified.extend(other);
        verified
    }

    /// Pass 2: gather evidence. Each source is best-effort; one failing does
    /// not abort the others.
    async fn gather_evidence(
        &self,
        issue: &ReviewComment,
        filepath: &str,
        language: Option<&str>,
        changed_lines: &[u32],
    ) -> Evidence {
        let mut evidence = Evidence::default();

        if let Some(language) = language {
            match self
                .tools
                .execute(
                    "run_linter",
                    json!({
                        "filepath": filepath,
                        "language": language,
                        "changed_lines": changed_lines,
                    }),
                )
                .await
            {
                Ok(result) if result.success => evidence.linter_results = Some(result.data),
                Ok(result) => self.observer.on_event(&ReviewEvent::ToolFailure {
                    tool: "run_linter".to_string(),
                    error: result.error,
                }),
                Err(e) => warn!("Linter evidence unavailable: {}", e),
            }
        }

        match self
            .tools
            .execute(
                "git_history",
                json!({"filepath": filepath, "max_commits": MAX_EVIDENCE_COMMITS}),
            )
            .await
        {
            Ok(result) if result.success => evidence.git_history = Some(result.data),
            Ok(result) => self.observer.on_event(&ReviewEvent::ToolFailure {
                tool: "git_history".to_string(),
                error: result.error,
            }),
            Err(e) => warn!("Git history evidence unavailable: {}", e),
        }

        for related in self
            .extractor
            .extract(&issue.comment)
            .into_iter()
            .take(MAX_RELATED_FILES)
        {
            match self
                .tools
                .execute("read_file", json!({"filepath": related}))
                .await
            {
                Ok(result) if result.success => evidence.related_files.push(result.data),
                Ok(_) => {} // unreadable candidate, heuristic miss
                Err(e) => warn!("Related file evidence unavailable: {}", e),
            }
        }

        evidence
    }

    /// Pass 3: ask the AI to confirm or dismiss with the evidence attached.
    /// Returns None when the issue is dismissed. Fails open: any call error
    /// keeps the issue unchanged.
    async fn reverify_with_evidence(
        &self,
        issue: ReviewComment,
        evidence: &Evidence,
        context: &str,
        filepath: &str,
    ) -> Option<ReviewComment> {
        let prompt = build_verification_prompt(&issue, evidence, context, filepath);

        let verdict = match self.provider.verify_issue(&prompt).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Re-verification call failed, keeping issue: {}", e);
                return Some(issue);
            }
        };

        if !verdict.confirmed {
            debug!(
                "AI dismissed issue at {}:{}: {}",
                filepath, issue.line, verdict.reasoning
            );
            return None;
        }

        let mut issue = issue;
        issue.verified = Some(true);
        issue.verification_reasoning = Some(verdict.reasoning);
        if let Some(severity) = verdict.updated_severity {
            if severity != issue.severity {
                debug!(
                    "Severity adjusted: {} -> {}",
                    issue.severity.as_str(),
                    severity.as_str()
                );
                issue.severity = severity;
            }
        }
        Some(issue)
    }
}

/// An issue is linter-confirmed only by a finding on the exact same line.
/// No fuzzy window: the linter pass is already scoped to changed lines.
fn check_linter_confirmation(issue: &ReviewComment, evidence: &Evidence) -> Option<LinterEvidence> {
    let findings = evidence.linter_results.as_ref()?.get("issues")?.as_array()?;

    for finding in findings {
        let Ok(finding) = serde_json::from_value::<LinterFinding>(finding.clone()) else {
            continue;
        };
        if finding.line == issue.line {
            return Some(LinterEvidence {
                line: finding.line,
                severity: finding.severity,
                message: finding.message,
                rule: finding.rule,
            });
        }
    }
    None
}

fn excerpt(text: &str, limit: usize) -> String {
    let cut: String = text.chars().take(limit).collect();
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        cut
    }
}

fn build_verification_prompt(
    issue: &ReviewComment,
    evidence: &Evidence,
    context: &str,
    filepath: &str,
) -> String {
    let mut prompt = format!(
        "You are re-verifying a potential code issue. Your job is to determine \
         if this is a REAL issue or a FALSE POSITIVE.\n\n\
         FILE: {}\n\n\
         ORIGINAL ISSUE DETECTED:\n\
         - Severity: {}\n\
         - Line: {}\n\
         - Message: {}\n\n\
         GATHERED EVIDENCE:\n",
        filepath,
        issue.severity.as_str(),
        issue.line,
        issue.comment,
    );

    if let Some(matching) = &issue.linter_evidence {
        prompt.push_str(&format!(
            "\n### Linter Agreement:\n- {} on line {}: {} ({})\n",
            matching.severity.as_str(),
            matching.line,
            matching.message,
            matching.rule
        ));
    }

    if let Some(commits) = evidence
        .git_history
        .as_ref()
        .and_then(|h| h.get("commits"))
        .and_then(|c| c.as_array())
    {
        prompt.push_str("\n### Git History:\n");
        for commit in commits.iter().take(MAX_EVIDENCE_COMMITS as usize) {
            prompt.push_str(&format!(
                "- {}: {} ({}, {})\n",
                commit["hash"].as_str().unwrap_or("?"),
                commit["message"].as_str().unwrap_or(""),
                commit["author"].as_str().unwrap_or("?"),
                commit["date"].as_str().unwrap_or("?"),
            ));
        }
    }

    if !evidence.related_files.is_empty() {
        prompt.push_str(&format!(
            "\n### Related Files ({} files):\n",
            evidence.related_files.len()
        ));
        for file in &evidence.related_files {
            prompt.push_str(&format!(
                "\n#### {}:\n```\n{}\n```\n",
                file["filepath"].as_str().unwrap_or("?"),
                excerpt(file["content"].as_str().unwrap_or(""), RELATED_FILE_EXCERPT),
            ));
        }
    }

    prompt.push_str(&format!(
        "\nORIGINAL REVIEW CONTEXT (excerpt):\n{}\n\n\
         YOUR TASK:\n\
         Carefully analyze the issue with the evidence provided. Answer these questions:\n\
         1. Is this a REAL issue that will cause problems?\n\
         2. Does the evidence (git history, related files) change your assessment?\n\
         3. Is the severity level appropriate?\n\n\
         Respond in JSON format:\n\
         {{\n\
             \"confirmed\": true/false,\n\
             \"reasoning\": \"Detailed explanation of your decision\",\n\
             \"updated_severity\": \"critical/major/minor/suggestion\" (only if you want to change it),\n\
             \"confidence\": \"high/medium/low\"\n\
         }}\n\n\
         Be strict - only confirm issues that are DEFINITELY problems. \
         When in doubt, dismiss as false positive.\n",
        excerpt(context, CONTEXT_EXCERPT),
    ));

    prompt
}
