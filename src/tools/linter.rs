// Language-dispatched static-analysis runner
//
// Findings are filtered to the caller-supplied changed-line set before they
// are returned: the linter output feeds an LLM prompt, so unchanged-code
// noise is paid for in tokens. Each table entry owns its command, its
// availability probe, and its output parser.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

use super::registry::Tool;
use super::types::{ToolInputSchema, ToolResult};
use crate::review::types::{LinterFinding, LinterSeverity};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const RUN_TIMEOUT: Duration = Duration::from_secs(30);

/// Unbounded linter output is truncated to this many findings.
const MAX_REPORTED_FINDINGS: usize = 10;

type OutputParser = fn(&str) -> Vec<LinterFinding>;

struct Fallback {
    command: &'static [&'static str],
    probe: &'static [&'static str],
}

struct LinterSpec {
    command: &'static [&'static str],
    probe: &'static [&'static str],
    fallback: Option<Fallback>,
    parse: OutputParser,
}

// New languages are new entries here, not new branches in execute().
static LINTERS: &[(&str, LinterSpec)] = &[
    (
        "python",
        LinterSpec {
            command: &["pylint", "--output-format=json"],
            probe: &["pylint", "--version"],
            fallback: Some(Fallback {
                command: &["flake8", "--format=json"],
                probe: &["flake8", "--version"],
            }),
            parse: parse_pylint,
        },
    ),
    (
        "javascript",
        LinterSpec {
            command: &["eslint", "--format=json"],
            probe: &["eslint", "--version"],
            fallback: None,
            parse: parse_eslint,
        },
    ),
    (
        "typescript",
        LinterSpec {
            command: &["eslint", "--format=json", "--ext", ".ts,.tsx"],
            probe: &["eslint", "--version"],
            fallback: None,
            parse: parse_eslint,
        },
    ),
    (
        "dart",
        LinterSpec {
            command: &["dart", "analyze", "--format=json"],
            probe: &["dart", "--version"],
            fallback: None,
            parse: parse_dart,
        },
    ),
    (
        "go",
        LinterSpec {
            command: &["golangci-lint", "run", "--out-format=json"],
            probe: &["golangci-lint", "--version"],
            fallback: Some(Fallback {
                command: &["go", "vet"],
                probe: &["go", "version"],
            }),
            parse: parse_golangci,
        },
    ),
    (
        "rust",
        LinterSpec {
            command: &["cargo", "clippy", "--message-format=json"],
            probe: &["cargo", "--version"],
            fallback: None,
            parse: parse_clippy,
        },
    ),
    (
        "php",
        LinterSpec {
            command: &["phpcs", "--report=json"],
            probe: &["phpcs", "--version"],
            fallback: Some(Fallback {
                command: &["php", "-l"],
                probe: &["php", "--version"],
            }),
            parse: parse_phpcs,
        },
    ),
];

fn spec_for(language: &str) -> Option<&'static LinterSpec> {
    LINTERS
        .iter()
        .find(|(name, _)| *name == language)
        .map(|(_, spec)| spec)
}

fn supported_languages() -> Vec<&'static str> {
    LINTERS.iter().map(|(name, _)| *name).collect()
}

/// Runs a language-appropriate linter and returns findings scoped to the
/// changed lines of the file under review.
pub struct LinterTool {
    repo_path: PathBuf,
}

impl LinterTool {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    async fn probe_ok(&self, probe: &[&str]) -> bool {
        let mut cmd = Command::new(probe[0]);
        cmd.args(&probe[1..])
            .current_dir(&self.repo_path)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        match timeout(PROBE_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            _ => false,
        }
    }

    async fn run_linter(&self, command: &[&str], filepath: &str) -> Result<String, String> {
        let mut cmd = Command::new(command[0]);
        cmd.args(&command[1..])
            .arg(filepath)
            .current_dir(&self.repo_path);

        let output = match timeout(RUN_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("failed to run {}: {}", command[0], e)),
            Err(_) => return Err(format!("{} timed out after {:?}", command[0], RUN_TIMEOUT)),
        };

        // Most linters exit non-zero when they find issues; that is a
        // result, not a failure. Prefer stdout, fall back to stderr.
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            Ok(String::from_utf8_lossy(&output.stderr).into_owned())
        } else {
            Ok(stdout)
        }
    }
}

#[async_trait]
impl Tool for LinterTool {
    fn name(&self) -> &str {
        "run_linter"
    }

    fn description(&self) -> &str {
        "Run a language-specific linter on a file and return issues only for \
         the changed lines. Filtering out issues from unchanged code keeps \
         the evidence payload small."
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: json!({
                "filepath": {
                    "type": "string",
                    "description": "Path to the file to lint, relative to the repository root"
                },
                "language": {
                    "type": "string",
                    "description": "Programming language (python, javascript, typescript, dart, go, rust, php)"
                },
                "changed_lines": {
                    "type": "array",
                    "description": "Changed line numbers; only issues on these lines are returned"
                }
            }),
            required: vec!["filepath".to_string(), "language".to_string()],
        }
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let filepath = match input["filepath"].as_str() {
            Some(p) => p.to_string(),
            None => return ToolResult::fail("filepath parameter is required"),
        };
        let language = input["language"].as_str().unwrap_or("").to_lowercase();
        let changed_lines: HashSet<u32> = input["changed_lines"]
            .as_array()
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|v| v.as_u64().map(|n| n as u32))
                    .collect()
            })
            .unwrap_or_default();

        let spec = match spec_for(&language) {
            Some(spec) => spec,
            None => {
                return ToolResult::fail(format!(
                    "Unsupported language: {}. Supported: {}",
                    language,
                    supported_languages().join(", ")
                ))
            }
        };

        // Pick the first available command: primary, then fallback.
        let command = if self.probe_ok(spec.probe).await {
            spec.command
        } else if let Some(fallback) = &spec.fallback {
            if self.probe_ok(fallback.probe).await {
                fallback.command
            } else {
                return ToolResult::fail(format!("Linter not installed for {}", language));
            }
        } else {
            return ToolResult::fail(format!("Linter not installed for {}", language));
        };

        let output = match self.run_linter(command, &filepath).await {
            Ok(output) => output,
            Err(e) => return ToolResult::fail(format!("Linter execution failed: {}", e)),
        };

        let findings = (spec.parse)(&output);
        let total_issues = findings.len();

        let filtered: Vec<LinterFinding> = if changed_lines.is_empty() {
            findings
        } else {
            findings
                .into_iter()
                .filter(|f| changed_lines.contains(&f.line))
                .collect()
        };

        let summary = aggregate_findings(&filtered);
        let filtered_count = filtered.len();
        let reported: Vec<&LinterFinding> =
            filtered.iter().take(MAX_REPORTED_FINDINGS).collect();

        ToolResult::ok(json!({
            "filepath": filepath,
            "language": language,
            "total_issues": total_issues,
            "filtered_issues": filtered_count,
            "changed_lines_count": if changed_lines.is_empty() {
                Value::from("all")
            } else {
                Value::from(changed_lines.len())
            },
            "summary": summary,
            "issues": reported,
            "token_saved": format!("{} issues filtered out", total_issues - filtered_count),
        }))
    }
}

fn aggregate_findings(findings: &[LinterFinding]) -> Value {
    let mut errors = 0usize;
    let mut warnings = 0usize;
    let mut infos = 0usize;
    for finding in findings {
        match finding.severity {
            LinterSeverity::Error => errors += 1,
            LinterSeverity::Warning => warnings += 1,
            LinterSeverity::Info => infos += 1,
        }
    }
    json!({
        "error": errors,
        "warning": warnings,
        "info": infos,
        "total": findings.len(),
    })
}

fn as_line(value: &Value) -> u32 {
    value.as_u64().unwrap_or(0) as u32
}

// Severity fields arrive as strings or numbers depending on the linter.
fn severity_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn parse_pylint(output: &str) -> Vec<LinterFinding> {
    if output.trim().is_empty() {
        return Vec::new();
    }
    let items: Vec<Value> = match serde_json::from_str(output) {
        Ok(items) => items,
        Err(e) => {
            warn!("Failed to parse pylint output: {}", e);
            return Vec::new();
        }
    };
    items
        .iter()
        .map(|item| LinterFinding {
            line: as_line(&item["line"]),
            column: as_line(&item["column"]),
            severity: LinterSeverity::normalize(&severity_label(&item["type"])),
            message: item["message"].as_str().unwrap_or("").to_string(),
            rule: item["symbol"].as_str().unwrap_or("").to_string(),
        })
        .collect()
}

fn parse_eslint(output: &str) -> Vec<LinterFinding> {
    if output.trim().is_empty() {
        return Vec::new();
    }
    let files: Vec<Value> = match serde_json::from_str(output) {
        Ok(files) => files,
        Err(e) => {
            warn!("Failed to parse eslint output: {}", e);
            return Vec::new();
        }
    };
    let mut findings = Vec::new();
    for file in &files {
        if let Some(messages) = file["messages"].as_array() {
            for msg in messages {
                findings.push(LinterFinding {
                    line: as_line(&msg["line"]),
                    column: as_line(&msg["column"]),
                    severity: LinterSeverity::normalize(&severity_label(&msg["severity"])),
                    message: msg["message"].as_str().unwrap_or("").to_string(),
                    rule: msg["ruleId"].as_str().unwrap_or("").to_string(),
                });
            }
        }
    }
    findings
}

fn parse_dart(output: &str) -> Vec<LinterFinding> {
    if output.trim().is_empty() {
        return Vec::new();
    }
    let data: Value = match serde_json::from_str(output) {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to parse dart analyze output: {}", e);
            return Vec::new();
        }
    };
    data["diagnostics"]
        .as_array()
        .map(|diagnostics| {
            diagnostics
                .iter()
                .map(|d| LinterFinding {
                    line: as_line(&d["location"]["startLine"]),
                    column: as_line(&d["location"]["startColumn"]),
                    severity: LinterSeverity::normalize(&severity_label(&d["severity"])),
                    message: d["message"].as_str().unwrap_or("").to_string(),
                    rule: d["code"].as_str().unwrap_or("").to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_golangci(output: &str) -> Vec<LinterFinding> {
    if output.trim().is_empty() {
        return Vec::new();
    }
    let data: Value = match serde_json::from_str(output) {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to parse golangci-lint output: {}", e);
            return Vec::new();
        }
    };
    data["Issues"]
        .as_array()
        .map(|issues| {
            issues
                .iter()
                .map(|issue| {
                    let severity = severity_label(&issue["Severity"]);
                    LinterFinding {
                        line: as_line(&issue["Pos"]["Line"]),
                        column: as_line(&issue["Pos"]["Column"]),
                        severity: if severity.is_empty() {
                            LinterSeverity::Warning
                        } else {
                            LinterSeverity::normalize(&severity)
                        },
                        message: issue["Text"].as_str().unwrap_or("").to_string(),
                        rule: issue["FromLinter"].as_str().unwrap_or("").to_string(),
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

// Clippy emits line-delimited JSON; non-message lines are skipped.
fn parse_clippy(output: &str) -> Vec<LinterFinding> {
    let mut findings = Vec::new();
    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let data: Value = match serde_json::from_str(line) {
            Ok(data) => data,
            Err(_) => continue,
        };
        if data["reason"].as_str() != Some("compiler-message") {
            continue;
        }
        let message = &data["message"];
        let Some(span) = message["spans"].as_array().and_then(|s| s.first()) else {
            continue;
        };
        findings.push(LinterFinding {
            line: as_line(&span["line_start"]),
            column: as_line(&span["column_start"]),
            severity: LinterSeverity::normalize(&severity_label(&message["level"])),
            message: message["message"].as_str().unwrap_or("").to_string(),
            rule: message["code"]["code"].as_str().unwrap_or("").to_string(),
        });
    }
    findings
}

fn parse_phpcs(output: &str) -> Vec<LinterFinding> {
    if output.trim().is_empty() {
        return Vec::new();
    }
    let data: Value = match serde_json::from_str(output) {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to parse phpcs output: {}", e);
            return Vec::new();
        }
    };
    let mut findings = Vec::new();
    if let Some(files) = data["files"].as_object() {
        for file_data in files.values() {
            if let Some(messages) = file_data["messages"].as_array() {
                for msg in messages {
                    findings.push(LinterFinding {
                        line: as_line(&msg["line"]),
                        column: as_line(&msg["column"]),
                        severity: LinterSeverity::normalize(&severity_label(&msg["type"])),
                        message: msg["message"].as_str().unwrap_or("").to_string(),
                        rule: msg["source"].as_str().unwrap_or("").to_string(),
                    });
                }
            }
        }
    }
    findings
}
