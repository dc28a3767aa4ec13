//! Response Validator (C1): repairs and validates JSON emitted by an LLM
//! that is supposed to produce structured output but did not call a tool.
//!
//! The repair pipeline is deliberately ordered cheapest-first: strip
//! markdown fences, strip quote wrappers, strip stray backticks, extract
//! the outermost `{...}`/`[...]` span, then try a strict parse before
//! falling back to a tolerant repair (brace balancing, trailing-comma
//! removal). Every step taken is recorded in `repair_steps` so a caller can
//! tell a clean response from one the model needed help with. This never
//! panics on malformed input — every failure mode returns an `error_kind`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn code_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?```").unwrap())
}

fn object_span_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)(\{.*\})").unwrap())
}

fn array_span_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)(\[.*\])").unwrap())
}

fn trailing_comma_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r",(\s*[}\]])").unwrap())
}

/// Why a response failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input was empty or all whitespace.
    Empty,
    /// No parse succeeded even after tolerant repair.
    Decode,
    /// Parsed, but is not a JSON object when one was expected.
    NotObject,
    /// Parsed, but is not a JSON array when one was expected.
    NotArray,
    /// Parsed as an object, but one or more expected keys are missing.
    MissingKeys,
}

impl ErrorKind {
    /// Wire name for this error kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Decode => "decode",
            Self::NotObject => "not_object",
            Self::NotArray => "not_array",
            Self::MissingKeys => "missing_keys",
        }
    }
}

/// Result of running a response through the repair/validation pipeline.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// Whether `parsed` satisfies the caller's structural expectation.
    pub is_valid: bool,
    /// The parsed value, present whenever any parse attempt succeeded
    /// (even if it then failed key/shape validation).
    pub parsed: Option<Value>,
    /// Set when `is_valid` is false.
    pub error_kind: Option<ErrorKind>,
    /// Keys from the caller's expected set that were absent, if relevant.
    pub missing_keys: Vec<String>,
    /// Ordered log of repair steps attempted, for diagnostics.
    pub repair_steps: Vec<String>,
}

impl ValidationOutcome {
    fn empty() -> Self {
        Self {
            is_valid: false,
            parsed: None,
            error_kind: Some(ErrorKind::Empty),
            missing_keys: Vec::new(),
            repair_steps: Vec::new(),
        }
    }

    fn decode_failure(repair_steps: Vec<String>) -> Self {
        Self {
            is_valid: false,
            parsed: None,
            error_kind: Some(ErrorKind::Decode),
            missing_keys: Vec::new(),
            repair_steps,
        }
    }
}

/// Strips markdown fences, quote wrappers, and stray backticks, then
/// extracts the outermost span matched by `span_pattern`. Returns the
/// cleaned text and the list of repair steps applied.
fn clean_and_extract(raw: &str, span_pattern: &Regex, span_step: &str) -> (String, Vec<String>) {
    let mut steps = Vec::new();
    let mut text = raw.trim().to_owned();

    if let Some(captures) = code_block_pattern().captures(&text) {
        text = captures[1].trim().to_owned();
        steps.push("removed_markdown_code_block".to_owned());
    }

    let is_quoted = (text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2)
        || (text.starts_with('"') && text.ends_with('"') && text.len() >= 2);
    if is_quoted {
        text = text[1..text.len() - 1].to_owned();
        steps.push("removed_quotes".to_owned());
    }

    let trimmed = text.trim_matches('`').trim();
    if trimmed.len() != text.len() {
        steps.push("removed_backticks".to_owned());
    }
    text = trimmed.to_owned();

    if let Some(captures) = span_pattern.captures(&text) {
        text = captures[1].to_owned();
        steps.push(span_step.to_owned());
    }

    (text, steps)
}

/// Balances unterminated braces/brackets and strips trailing commas before
/// the closing delimiter — the two defects an LLM's truncated or slightly
/// malformed JSON most commonly has.
fn tolerant_repair(text: &str) -> String {
    let mut repaired = trailing_comma_pattern().replace_all(text, "$1").into_owned();

    let mut open_braces = 0i32;
    let mut open_brackets = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for ch in repaired.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => open_braces += 1,
            '}' if !in_string => open_braces -= 1,
            '[' if !in_string => open_brackets += 1,
            ']' if !in_string => open_brackets -= 1,
            _ => {}
        }
    }

    for _ in 0..open_braces.max(0) {
        repaired.push('}');
    }
    for _ in 0..open_brackets.max(0) {
        repaired.push(']');
    }

    repaired
}

fn parse_with_repair(text: &str, steps: &mut Vec<String>) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => {
            steps.push("direct_parse_success".to_owned());
            Some(value)
        }
        Err(e) => {
            steps.push(format!("direct_parse_failed: {e}"));
            let repaired = tolerant_repair(text);
            match serde_json::from_str::<Value>(&repaired) {
                Ok(value) => {
                    steps.push("tolerant_repair_success".to_owned());
                    Some(value)
                }
                Err(e) => {
                    steps.push(format!("tolerant_repair_failed: {e}"));
                    None
                }
            }
        }
    }
}

/// Validates and repairs a JSON *object* response, requiring every key in
/// `expected_keys` to be present.
#[must_use]
pub fn validate_json_response(response_text: &str, expected_keys: &[&str]) -> ValidationOutcome {
    if response_text.trim().is_empty() {
        return ValidationOutcome::empty();
    }

    let (text, mut steps) = clean_and_extract(response_text, object_span_pattern(), "extracted_json_object");
    let Some(parsed) = parse_with_repair(&text, &mut steps) else {
        return ValidationOutcome::decode_failure(steps);
    };

    let Value::Object(map) = &parsed else {
        return ValidationOutcome {
            is_valid: false,
            parsed: Some(parsed),
            error_kind: Some(ErrorKind::NotObject),
            missing_keys: Vec::new(),
            repair_steps: steps,
        };
    };

    let missing_keys: Vec<String> = expected_keys
        .iter()
        .filter(|k| !map.contains_key(**k))
        .map(|k| (*k).to_owned())
        .collect();

    if missing_keys.is_empty() {
        ValidationOutcome {
            is_valid: true,
            parsed: Some(parsed),
            error_kind: None,
            missing_keys: Vec::new(),
            repair_steps: steps,
        }
    } else {
        ValidationOutcome {
            is_valid: false,
            parsed: Some(parsed),
            error_kind: Some(ErrorKind::MissingKeys),
            missing_keys,
            repair_steps: steps,
        }
    }
}

/// Validates and repairs a JSON *array* response.
#[must_use]
pub fn extract_json_array(response_text: &str) -> ValidationOutcome {
    if response_text.trim().is_empty() {
        return ValidationOutcome::empty();
    }

    let (text, mut steps) = clean_and_extract(response_text, array_span_pattern(), "extracted_json_array");
    let Some(parsed) = parse_with_repair(&text, &mut steps) else {
        return ValidationOutcome::decode_failure(steps);
    };

    if matches!(parsed, Value::Array(_)) {
        ValidationOutcome {
            is_valid: true,
            parsed: Some(parsed),
            error_kind: None,
            missing_keys: Vec::new(),
            repair_steps: steps,
        }
    } else {
        ValidationOutcome {
            is_valid: false,
            parsed: Some(parsed),
            error_kind: Some(ErrorKind::NotArray),
            missing_keys: Vec::new(),
            repair_steps: steps,
        }
    }
}

/// Duck-typed acceptance mode used where the caller can tolerate any of
/// several shapes: a bare array, an object with the exact expected key, or
/// an object with exactly one key whose value is itself an array (a model
/// that wrapped the array under an unpredictable key name).
#[must_use]
pub fn validate_tolerant(response_text: &str, exact_key: &str) -> ValidationOutcome {
    if response_text.trim().is_empty() {
        return ValidationOutcome::empty();
    }

    let (text, mut steps) = clean_and_extract(response_text, object_span_pattern(), "extracted_json_object");
    let (array_text, array_steps) = clean_and_extract(response_text, array_span_pattern(), "extracted_json_array");

    if let Some(parsed) = parse_with_repair(&array_text, &mut array_steps.clone()) {
        if matches!(parsed, Value::Array(_)) {
            let mut steps = array_steps;
            steps.push("accepted_as_bare_array".to_owned());
            return ValidationOutcome {
                is_valid: true,
                parsed: Some(parsed),
                error_kind: None,
                missing_keys: Vec::new(),
                repair_steps: steps,
            };
        }
    }

    let Some(parsed) = parse_with_repair(&text, &mut steps) else {
        return ValidationOutcome::decode_failure(steps);
    };

    let Value::Object(map) = &parsed else {
        return ValidationOutcome {
            is_valid: false,
            parsed: Some(parsed),
            error_kind: Some(ErrorKind::NotObject),
            missing_keys: Vec::new(),
            repair_steps: steps,
        };
    };

    if let Some(value) = map.get(exact_key) {
        steps.push("accepted_exact_key".to_owned());
        return ValidationOutcome {
            is_valid: true,
            parsed: Some(value.clone()),
            error_kind: None,
            missing_keys: Vec::new(),
            repair_steps: steps,
        };
    }

    if map.len() == 1 {
        let (_, only_value) = map.iter().next().expect("len checked above");
        if matches!(only_value, Value::Array(_)) {
            steps.push("accepted_single_unknown_key".to_owned());
            return ValidationOutcome {
                is_valid: true,
                parsed: Some(only_value.clone()),
                error_kind: None,
                missing_keys: Vec::new(),
                repair_steps: steps,
            };
        }
    }

    ValidationOutcome {
        is_valid: false,
        parsed: Some(Value::Object(map.clone())),
        error_kind: Some(ErrorKind::MissingKeys),
        missing_keys: vec![exact_key.to_owned()],
        repair_steps: steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_reported_as_empty() {
        let outcome = validate_json_response("   ", &["tables"]);
        assert!(!outcome.is_valid);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Empty));
    }

    #[test]
    fn strips_markdown_fence_and_parses() {
        let raw = "```json\n{\"tables\": [\"benefits\"]}\n```";
        let outcome = validate_json_response(raw, &["tables"]);
        assert!(outcome.is_valid);
        assert!(outcome.repair_steps.contains(&"removed_markdown_code_block".to_owned()));
    }

    #[test]
    fn reports_missing_keys() {
        let raw = r#"{"tables": ["benefits"]}"#;
        let outcome = validate_json_response(raw, &["tables", "reason"]);
        assert!(!outcome.is_valid);
        assert_eq!(outcome.error_kind, Some(ErrorKind::MissingKeys));
        assert_eq!(outcome.missing_keys, vec!["reason".to_owned()]);
    }

    #[test]
    fn repairs_trailing_comma_and_unbalanced_brace() {
        let raw = r#"{"tables": ["benefits",]"#;
        let outcome = validate_json_response(raw, &["tables"]);
        assert!(outcome.is_valid, "{outcome:?}");
    }

    #[test]
    fn extracts_bare_array() {
        let raw = "Sure, here it is:\n[1, 2, 3]";
        let outcome = extract_json_array(raw);
        assert!(outcome.is_valid);
        assert_eq!(outcome.parsed.unwrap(), serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn rejects_array_request_given_an_object() {
        let raw = r#"{"not": "an array"}"#;
        let outcome = extract_json_array(raw);
        assert!(!outcome.is_valid);
        assert_eq!(outcome.error_kind, Some(ErrorKind::NotArray));
    }

    #[test]
    fn tolerant_accepts_single_unknown_array_key() {
        let raw = r#"{"results": [{"id": 1}]}"#;
        let outcome = validate_tolerant(raw, "topics");
        assert!(outcome.is_valid);
    }

    #[test]
    fn tolerant_accepts_exact_key() {
        let raw = r#"{"topics": ["baggage delay"], "other": 1}"#;
        let outcome = validate_tolerant(raw, "topics");
        assert!(outcome.is_valid);
        assert_eq!(outcome.parsed.unwrap(), serde_json::json!(["baggage delay"]));
    }
}
