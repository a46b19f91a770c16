// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Response Interpreter
//!
//! Pulls the single JSON object out of a model's free-form answer.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Deterministic, first-match JSON extraction
//!
//! Candidate selection, in order:
//! 1. the first fenced block tagged `json`
//! 2. the first fenced block of any kind
//! 3. the whole trimmed text
//!
//! The chosen candidate is parsed once. No other blocks are tried.

use serde_json::{Map, Value};

/// Characters of the original text kept in a parse error
pub const PREVIEW_CHARS: usize = 200;

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Failed to parse model response as JSON: {message} (response starts with: {preview:?})")]
pub struct ResponseParseError {
    pub message: String,
    /// First `PREVIEW_CHARS` characters of the raw response
    pub preview: String,
}

impl ResponseParseError {
    fn new(message: impl Into<String>, text: &str) -> Self {
        Self {
            message: message.into(),
            preview: text.chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

/// Extract and parse the JSON object embedded in `text`
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, ResponseParseError> {
    let candidate = select_candidate(text);
    if candidate.is_empty() {
        return Err(ResponseParseError::new("empty response", text));
    }

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(ResponseParseError::new(
            format!("expected a JSON object, found {}", json_kind(&other)),
            text,
        )),
        Err(e) => Err(ResponseParseError::new(e.to_string(), text)),
    }
}

/// The text that will be parsed, per the selection order above
pub fn select_candidate(text: &str) -> &str {
    let blocks = fenced_blocks(text);
    blocks
        .iter()
        .find(|block| block.info.eq_ignore_ascii_case("json"))
        .or_else(|| blocks.first())
        .map(|block| block.body.trim())
        .unwrap_or_else(|| text.trim())
}

struct FencedBlock<'a> {
    info: &'a str,
    body: &'a str,
}

/// Closed fenced blocks, in order of appearance. An unterminated fence is
/// not a block.
fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let Some(close) = after_open.find(FENCE) else {
            break;
        };
        let inner = &after_open[..close];

        // Info string is the rest of the opening line, unless the payload
        // starts right after the fence (```{"a": 1}```)
        let (info, body) = match inner.split_once('\n') {
            Some((first, body)) if !starts_like_json(first) => (first.trim(), body),
            _ => ("", inner),
        };
        blocks.push(FencedBlock { info, body });

        rest = &after_open[close + FENCE.len()..];
    }
    blocks
}

fn starts_like_json(line: &str) -> bool {
    matches!(line.trim_start().chars().next(), Some('{') | Some('['))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_fence_in_prose() {
        let text = "Here are the questions:\n```json\n{\"questoes\":[{\"numero\":1,\"enunciado\":\"2+2=?\",\"resposta_geral\":\"4\",\"pontuacao\":1.0}],\"total_questoes\":1}\n```";
        let object = extract_json_object(text).unwrap();
        assert_eq!(
            Value::Object(object),
            json!({
                "questoes": [{"numero": 1, "enunciado": "2+2=?", "resposta_geral": "4", "pontuacao": 1.0}],
                "total_questoes": 1
            })
        );
    }

    #[test]
    fn test_clean_and_fenced_agree() {
        let clean = r#"{"nota": 1.5, "feedback": "ok"}"#;
        let fenced = format!("Sure!\n```json\n{}\n```\nAnything else?", clean);
        assert_eq!(
            extract_json_object(clean).unwrap(),
            extract_json_object(&fenced).unwrap()
        );
    }

    #[test]
    fn test_json_tag_wins_over_earlier_block() {
        let text = "```python\nprint(1)\n```\nthen\n```JSON\n{\"a\": 1}\n```";
        assert_eq!(extract_json_object(text).unwrap()["a"], 1);
    }

    #[test]
    fn test_first_untagged_block_used() {
        let text = "```\n{\"a\": 1}\n```\n```\n{\"a\": 2}\n```";
        assert_eq!(extract_json_object(text).unwrap()["a"], 1);

        let inline = "```{\"b\": true}```";
        assert_eq!(extract_json_object(inline).unwrap()["b"], true);
    }

    #[test]
    fn test_no_search_across_blocks() {
        // First block is not JSON; the valid second block is never tried
        let text = "```\nnot json\n```\n```\n{\"a\": 2}\n```";
        assert!(extract_json_object(text).is_err());
    }

    #[test]
    fn test_truncated_json_reports_preview() {
        let text = format!("{{\"questoes\": [{{\"numero\": 1, {}", "x".repeat(400));
        let err = extract_json_object(&text).unwrap_err();
        assert_eq!(err.preview.chars().count(), PREVIEW_CHARS);
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_non_object_rejected() {
        let err = extract_json_object("[1, 2]").unwrap_err();
        assert!(err.message.contains("an array"));
        assert!(extract_json_object("   ").is_err());
    }
}
