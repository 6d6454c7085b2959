// Wire types and response extraction for chat-completion providers
//
// Reviewer models wrap their JSON in prose more often than not; extraction
// takes the outermost array/object rather than trusting the whole body.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::review::types::{ReviewComment, VerificationVerdict};

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatRequest {
    pub fn user(model: &str, max_tokens: u32, temperature: f32, content: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: content.to_string(),
            }],
            max_tokens,
            temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponseMessage {
    pub content: String,
}

/// Slice from the first '[' to the last ']', if any.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Slice from the first '{' to the last '}', if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse review comments out of a model response. Lenient per item: one
/// malformed element is dropped with a warning instead of voiding the array.
pub fn parse_comment_array(text: &str) -> Vec<ReviewComment> {
    let Some(json) = extract_json_array(text) else {
        warn!("No JSON array found in reviewer response");
        return Vec::new();
    };

    let items: Vec<Value> = match serde_json::from_str(json) {
        Ok(items) => items,
        Err(e) => {
            warn!("Failed to parse reviewer response: {}", e);
            return Vec::new();
        }
    };

    let mut comments = Vec::new();
    for item in items {
        match serde_json::from_value::<ReviewComment>(item) {
            Ok(comment) => comments.push(comment),
            Err(e) => warn!("Dropping malformed review comment: {}", e),
        }
    }
    comments
}

/// Parse a verification verdict out of a model response.
pub fn parse_verdict(text: &str) -> Option<VerificationVerdict> {
    let json = extract_json_object(text)?;
    match serde_json::from_str(json) {
        Ok(verdict) => Some(verdict),
        Err(e) => {
            warn!("Failed to parse verification verdict: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::types::Severity;

    #[test]
    fn test_extract_array_from_noisy_text() {
        let text = "Here is my review:\n[{\"a\": 1}]\nHope that helps!";
        assert_eq!(extract_json_array(text), Some("[{\"a\": 1}]"));
    }

    #[test]
    fn test_extract_array_absent() {
        assert!(extract_json_array("no json here").is_none());
        assert!(extract_json_array("]backwards[").is_none());
    }

    #[test]
    fn test_extract_object_from_noisy_text() {
        let text = "Verdict follows: {\"confirmed\": true} — done.";
        assert_eq!(extract_json_object(text), Some("{\"confirmed\": true}"));
    }

    #[test]
    fn test_parse_comment_array() {
        let text = r#"Review complete.
[
  {"filepath": "src/app.py", "line": 10, "comment": "off-by-one", "severity": "critical"},
  {"filepath": "src/app.py", "line": 20, "comment": "rename this", "severity": "suggestion"}
]"#;
        let comments = parse_comment_array(text);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].severity, Severity::Critical);
        assert_eq!(comments[1].line, 20);
    }

    #[test]
    fn test_parse_comment_array_drops_malformed_items() {
        let text = r#"[
  {"filepath": "a.py", "line": 1, "comment": "ok", "severity": "minor"},
  {"filepath": "b.py", "comment": "missing line"},
  "not even an object"
]"#;
        let comments = parse_comment_array(text);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].filepath, "a.py");
    }

    #[test]
    fn test_parse_comment_array_empty_response() {
        assert!(parse_comment_array("[]").is_empty());
        assert!(parse_comment_array("The code looks good!").is_empty());
    }

    #[test]
    fn test_parse_verdict() {
        let text = r#"{"confirmed": true, "reasoning": "confirmed by trace", "updated_severity": "major", "confidence": "high"}"#;
        let verdict = parse_verdict(text).unwrap();
        assert!(verdict.confirmed);
        assert_eq!(verdict.updated_severity, Some(Severity::Major));
        assert_eq!(verdict.confidence.as_deref(), Some("high"));
    }

    #[test]
    fn test_parse_verdict_absent() {
        assert!(parse_verdict("no object").is_none());
    }
}
