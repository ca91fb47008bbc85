//! JSON extraction and validation for model responses
//!
//! Models are told to reply with bare JSON but routinely wrap it in code
//! fences, add a sentence before or after, or leave trailing commas. The
//! pipeline here recovers a JSON value from that text and checks it against a
//! [`Schema`] before anything downstream sees it:
//!
//! 1. strip code fence markers (any language tag)
//! 2. take the first `{`/`[` through the last `}`/`]` (greedy, no depth matching)
//! 3. drop trailing commas before `}` or `]`
//! 4. turn every `'` into `"`
//! 5. parse JSON
//! 6. validate against the schema, then deserialize
//!
//! Step 4 is kept for compatibility with existing behavior. It corrupts
//! string values containing apostrophes (`"don't"` becomes `"don"t"`), so
//! such replies fail to parse; see the `test_apostrophe_in_value_is_rejected`
//! test.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{ParseFailure, ResponseParseError, Result};

use super::schema::{Schema, StructuredResponse};

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_+\-]*\s*").expect("valid regex"))
}

fn json_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)[\[{].*[\]}]").expect("valid regex"))
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("valid regex"))
}

/// Remove code fence delimiters, keeping the fenced text and any prose
pub fn strip_code_fences(text: &str) -> String {
    fence_re().replace_all(text, "").into_owned()
}

/// First `{`/`[` through the last `}`/`]` after it
pub fn find_json_span(text: &str) -> Option<&str> {
    json_span_re().find(text).map(|m| m.as_str())
}

/// Steps 1-4: produce the text that will be handed to the JSON parser
pub fn sanitize(raw: &str) -> std::result::Result<String, ResponseParseError> {
    let unfenced = strip_code_fences(raw);

    let span = find_json_span(&unfenced).ok_or_else(|| {
        ResponseParseError::new(ParseFailure::NoJsonFound, "No JSON found in response", raw)
    })?;

    let without_commas = trailing_comma_re().replace_all(span, "$1");
    Ok(without_commas.replace('\'', "\""))
}

/// Sanitize, parse and validate a response, returning the untyped value
pub fn extract_and_validate_value(raw: &str, schema: &Schema) -> Result<Value> {
    let cleaned = sanitize(raw)?;

    let value: Value = serde_json::from_str(&cleaned).map_err(|e| {
        ResponseParseError::new(
            ParseFailure::InvalidJson,
            format!("Invalid JSON format: {}", e),
            raw,
        )
    })?;

    schema.validate(&value).map_err(|violation| {
        ResponseParseError::new(
            ParseFailure::SchemaViolation,
            format!("Schema validation failed at {}", violation),
            raw,
        )
    })?;

    Ok(value)
}

/// Sanitize, parse and validate a response into its typed structure
pub fn extract_and_validate<T: StructuredResponse>(raw: &str) -> Result<T> {
    let value = extract_and_validate_value(raw, &T::schema())?;

    serde_json::from_value(value).map_err(|e| {
        ResponseParseError::new(
            ParseFailure::SchemaViolation,
            format!("Schema validation failed: {}", e),
            raw,
        )
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Simple {
        a: f64,
    }

    impl StructuredResponse for Simple {
        fn schema() -> Schema {
            Schema::object(vec![("a", Schema::number())])
        }
    }

    fn parse_error(err: Error) -> ResponseParseError {
        match err {
            Error::ResponseParse(e) => e,
            other => panic!("expected ResponseParse, got {:?}", other),
        }
    }

    #[test]
    fn test_fenced_json_with_trailing_comma() {
        let raw = "```json\n{\"a\":1,}\n```";
        let result: Simple = extract_and_validate(raw).unwrap();
        assert_eq!(result, Simple { a: 1.0 });

        let value = extract_and_validate_value(raw, &Simple::schema()).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_fence_with_other_language_tag() {
        let raw = "Here you go:\n```javascript\n{\"a\": 2}\n```\nHope that helps!";
        let result: Simple = extract_and_validate(raw).unwrap();
        assert_eq!(result.a, 2.0);
    }

    #[test]
    fn test_uppercase_fence_tag() {
        let raw = "```JSON\n{\"a\": 3}\n```";
        let result: Simple = extract_and_validate(raw).unwrap();
        assert_eq!(result.a, 3.0);
    }

    #[test]
    fn test_no_json_found_keeps_raw_text() {
        let raw = "no json here";
        let err = parse_error(extract_and_validate::<Simple>(raw).unwrap_err());
        assert_eq!(err.reason, ParseFailure::NoJsonFound);
        assert_eq!(err.reason.as_str(), "no-json-found");
        assert_eq!(err.raw_text, raw);
    }

    #[test]
    fn test_closing_bracket_before_opening_is_not_json() {
        let raw = "} nothing here {";
        let err = parse_error(extract_and_validate::<Simple>(raw).unwrap_err());
        assert_eq!(err.reason, ParseFailure::NoJsonFound);
    }

    #[test]
    fn test_invalid_json_keeps_original_raw_text() {
        let raw = "```json\n{\"a\": 1 \"b\": 2}\n```";
        let err = parse_error(extract_and_validate::<Simple>(raw).unwrap_err());
        assert_eq!(err.reason, ParseFailure::InvalidJson);
        assert_eq!(err.raw_text, raw);
    }

    #[test]
    fn test_missing_required_field_is_schema_violation() {
        let raw = r#"{"b": 1}"#;
        let err = parse_error(extract_and_validate::<Simple>(raw).unwrap_err());
        assert_eq!(err.reason, ParseFailure::SchemaViolation);
        assert!(err.detail.contains("a: required field missing"));
        assert_eq!(err.raw_text, raw);
    }

    #[test]
    fn test_wrong_type_is_schema_violation() {
        let err = parse_error(extract_and_validate::<Simple>(r#"{"a": "one"}"#).unwrap_err());
        assert_eq!(err.reason, ParseFailure::SchemaViolation);
    }

    #[test]
    fn test_greedy_span_covers_first_to_last_bracket() {
        // Two separate objects: the greedy span joins them, which is not valid JSON
        let raw = r#"First {"a": 1} and then {"a": 2}"#;
        let err = parse_error(extract_and_validate::<Simple>(raw).unwrap_err());
        assert_eq!(err.reason, ParseFailure::InvalidJson);
    }

    #[test]
    fn test_prose_around_json() {
        let raw = "Sure! Here is the analysis:\n{\"a\": 42}\nLet me know.";
        let result: Simple = extract_and_validate(raw).unwrap();
        assert_eq!(result.a, 42.0);
    }

    #[test]
    fn test_single_quotes_normalized() {
        let raw = "{'a': 5}";
        let result: Simple = extract_and_validate(raw).unwrap();
        assert_eq!(result.a, 5.0);
    }

    #[test]
    fn test_apostrophe_in_value_is_rejected() {
        // Known limitation of the quote normalization step
        let raw = r#"{"a": 1, "note": "don't spend"}"#;
        let err = parse_error(extract_and_validate::<Simple>(raw).unwrap_err());
        assert_eq!(err.reason, ParseFailure::InvalidJson);
    }

    #[test]
    fn test_nested_trailing_commas() {
        let raw = "{\"a\": 1, \"list\": [1, 2, 3, ], }";
        let value = extract_and_validate_value(raw, &Simple::schema()).unwrap();
        assert_eq!(value["list"], json!([1, 2, 3]));
    }

    #[test]
    fn test_top_level_array() {
        let schema = Schema::array_of(Schema::string());
        let value = extract_and_validate_value("```\n[\"x\", \"y\",]\n```", &schema).unwrap();
        assert_eq!(value, json!(["x", "y"]));
    }

    #[test]
    fn test_sanitize_output() {
        let cleaned = sanitize("```json\n{'a': [1,],}\n```").unwrap();
        assert_eq!(cleaned, "{\"a\": [1]}");
    }
}
