// Shared data model for the review pipeline
//
// Severity drives triage: critical/major issues go through evidence-based
// verification, minor/suggestion issues pass straight to posting.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Severity of an AI-flagged issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Suggestion,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Major => "major",
            Severity::Minor => "minor",
            Severity::Suggestion => "suggestion",
        }
    }

    /// Critical and major issues are routed through verification.
    pub fn is_high(&self) -> bool {
        matches!(self, Severity::Critical | Severity::Major)
    }

    /// Parse a severity label. Unknown labels degrade to `Suggestion` —
    /// reviewer output is not a trusted wire format and one odd label must
    /// not invalidate the whole comment array.
    pub fn parse(s: &str) -> Severity {
        match s.to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "major" => Severity::Major,
            "minor" => Severity::Minor,
            _ => Severity::Suggestion,
        }
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Severity::parse(&s))
    }
}

/// Normalized severity of a linter finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinterSeverity {
    Error,
    Warning,
    Info,
}

impl LinterSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinterSeverity::Error => "error",
            LinterSeverity::Warning => "warning",
            LinterSeverity::Info => "info",
        }
    }

    /// Normalize a tool-specific severity label into the fixed three-level
    /// scale. Numeric labels come from eslint (2 = error, 1 = warning).
    pub fn normalize(raw: &str) -> LinterSeverity {
        match raw.to_lowercase().as_str() {
            "error" | "fatal" | "2" | "critical" => LinterSeverity::Error,
            "warning" | "warn" | "1" | "major" => LinterSeverity::Warning,
            _ => LinterSeverity::Info,
        }
    }
}

/// A single normalized linter finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinterFinding {
    pub line: u32,
    pub column: u32,
    pub severity: LinterSeverity,
    pub message: String,
    pub rule: String,
}

/// The matching linter finding attached to a confirmed issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinterEvidence {
    pub line: u32,
    pub severity: LinterSeverity,
    pub message: String,
    pub rule: String,
}

/// One review comment, as produced by the AI reviewer.
///
/// The verifier only ever adds the optional fields; filepath and line are
/// never rewritten once the reviewer has emitted them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewComment {
    pub filepath: String,
    pub line: u32,
    pub comment: String,
    pub severity: Severity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linter_confirmed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linter_evidence: Option<LinterEvidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_reasoning: Option<String>,
}

/// Structured verdict from the optional third-pass AI re-verification.
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationVerdict {
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub updated_severity: Option<Severity>,
    #[serde(default)]
    pub confidence: Option<String>,
}

/// Aggregate counters for one full review run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewStats {
    pub files_reviewed: usize,
    pub files_skipped: usize,
    pub files_excluded: usize,
    pub total_comments: usize,
    pub cache_hits: usize,
}
