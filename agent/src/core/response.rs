//! Model response contract and its parser.
//!
//! The model must return one JSON object with two optional keys: `files`
//! (relative path to content) and `shell` (ordered commands). Model output is
//! often wrapped in a Markdown fence or followed by commentary, so the parser
//! extracts the first balanced `{...}` before decoding it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Characters of raw model output kept in parse diagnostics.
pub const PREVIEW_CHARS: usize = 500;

/// Parsed `{files, shell}` payload for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedResponse {
    /// Relative path -> full file content. Order carries no meaning.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    /// Commands run in sequence.
    #[serde(default)]
    pub shell: Vec<String>,
}

impl GeneratedResponse {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.shell.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no JSON object found in model output; raw output starts with: {preview}")]
    NoObject { preview: String },
    #[error(
        "invalid JSON from model at line {line} column {column}: {message}; raw output starts with: {preview}"
    )]
    Syntax {
        line: usize,
        column: usize,
        message: String,
        preview: String,
    },
    #[error("'{key}' {problem}")]
    Shape { key: &'static str, problem: String },
}

/// Parse raw model text into a [`GeneratedResponse`].
pub fn parse_response(raw: &str) -> Result<GeneratedResponse, ParseError> {
    let unfenced = strip_code_fence(raw);
    let object = extract_balanced_object(unfenced).ok_or_else(|| ParseError::NoObject {
        preview: preview(raw),
    })?;

    let value: Value = serde_json::from_str(object).map_err(|err| ParseError::Syntax {
        line: err.line(),
        column: err.column(),
        message: err.to_string(),
        preview: preview(raw),
    })?;

    validate_shape(value)
}

/// Remove one surrounding Markdown code fence (with optional language tag).
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (`json`, `JSON`, ...) up to the first newline.
        text = match rest.find('\n') {
            Some(newline) if !rest[..newline].contains('{') => &rest[newline + 1..],
            _ => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Return the minimal prefix starting at the first `{` whose braces balance.
///
/// Braces inside JSON string literals are ignored. When the object never closes,
/// the remainder of the text is returned so the decoder reports where it ended.
pub fn extract_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    Some(&text[start..])
}

fn validate_shape(value: Value) -> Result<GeneratedResponse, ParseError> {
    let Value::Object(mut map) = value else {
        return Err(ParseError::Shape {
            key: "response",
            problem: "must be a JSON object".to_string(),
        });
    };

    let mut response = GeneratedResponse::default();

    if let Some(files) = map.remove("files") {
        let Value::Object(entries) = files else {
            return Err(ParseError::Shape {
                key: "files",
                problem: format!("must be an object of path to content, got {}", kind(&files)),
            });
        };
        for (path, content) in entries {
            match content {
                Value::String(content) => {
                    response.files.insert(path, content);
                }
                other => {
                    return Err(ParseError::Shape {
                        key: "files",
                        problem: format!("entry '{path}' must be a string, got {}", kind(&other)),
                    });
                }
            }
        }
    }

    if let Some(shell) = map.remove("shell") {
        let Value::Array(items) = shell else {
            return Err(ParseError::Shape {
                key: "shell",
                problem: format!("must be an array of strings, got {}", kind(&shell)),
            });
        };
        for (index, item) in items.into_iter().enumerate() {
            match item {
                Value::String(command) => response.shell.push(command),
                other => {
                    return Err(ParseError::Shape {
                        key: "shell",
                        problem: format!("item {index} must be a string, got {}", kind(&other)),
                    });
                }
            }
        }
    }

    Ok(response)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn preview(raw: &str) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_object() {
        let parsed =
            parse_response(r#"{"files": {"hello.txt": "HELLO"}, "shell": []}"#).expect("parse");
        assert_eq!(parsed.files.get("hello.txt").map(String::as_str), Some("HELLO"));
        assert!(parsed.shell.is_empty());
    }

    #[test]
    fn empty_object_is_a_valid_no_op() {
        let parsed = parse_response("{}").expect("parse");
        assert!(parsed.is_empty());
    }

    #[test]
    fn fenced_output_with_trailing_prose_is_extracted() {
        let raw = "```json\n{\"files\": {\"a.py\": \"print('{}')\"}, \"shell\": [\"python3 a.py\"]}\n```\n\nThis creates a script. {not json}";
        let parsed = parse_response(raw).expect("parse");
        assert_eq!(parsed.files.get("a.py").map(String::as_str), Some("print('{}')"));
        assert_eq!(parsed.shell, vec!["python3 a.py".to_string()]);
    }

    #[test]
    fn leading_prose_before_object_is_skipped() {
        let raw = "Sure! Here is the plan:\n{\"shell\": [\"ls\"]} Let me know.";
        let parsed = parse_response(raw).expect("parse");
        assert_eq!(parsed.shell, vec!["ls".to_string()]);
        assert!(parsed.files.is_empty());
    }

    #[test]
    fn braces_inside_strings_do_not_end_the_object() {
        let text = r#"{"files": {"x.js": "function f() { return \"}\"; }"}} trailing"#;
        let object = extract_balanced_object(text).expect("object");
        assert!(object.ends_with("}}"));
        assert!(!object.contains("trailing"));
    }

    #[test]
    fn strip_fence_handles_uppercase_tag_and_bare_fence() {
        assert_eq!(strip_code_fence("```JSON\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```{}```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[test]
    fn missing_object_is_reported_with_preview() {
        let err = parse_response("I cannot help with that.").unwrap_err();
        assert_eq!(
            err,
            ParseError::NoObject {
                preview: "I cannot help with that.".to_string()
            }
        );
    }

    #[test]
    fn syntax_error_carries_position_and_truncated_preview() {
        let raw = format!("{{\"files\": {{\"a\": }} {}", "x".repeat(600));
        let err = parse_response(&raw).unwrap_err();
        match err {
            ParseError::Syntax {
                line,
                column,
                preview,
                ..
            } => {
                assert_eq!(line, 1);
                assert!(column > 0);
                assert!(preview.ends_with("..."));
                assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn unclosed_object_is_a_syntax_error() {
        let err = parse_response(r#"{"files": {"a": "b"}"#).unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn files_must_be_flat_string_map() {
        let err = parse_response(r#"{"files": {"a": {"nested": "x"}}}"#).unwrap_err();
        assert_eq!(
            err,
            ParseError::Shape {
                key: "files",
                problem: "entry 'a' must be a string, got object".to_string(),
            }
        );

        let err = parse_response(r#"{"files": ["a"]}"#).unwrap_err();
        assert!(matches!(err, ParseError::Shape { key: "files", .. }));
    }

    #[test]
    fn shell_must_be_array_of_strings() {
        let err = parse_response(r#"{"shell": "ls"}"#).unwrap_err();
        assert!(matches!(err, ParseError::Shape { key: "shell", .. }));

        let err = parse_response(r#"{"shell": ["ls", 3]}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'shell' item 1 must be a string, got number"
        );
    }

    #[test]
    fn shell_order_is_preserved() {
        let parsed = parse_response(r#"{"shell": ["c", "a", "b"]}"#).expect("parse");
        assert_eq!(parsed.shell, vec!["c", "a", "b"]);
    }
}
