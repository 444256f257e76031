//! Metadata dumps: JSON documents and `Key : value` blocks.

use serde_json::Value;

use super::vocabulary::classify_tag;
use super::{parse_error, Outcome};
use crate::finding::Finding;

/// Keys that describe the input rather than its content.
const IGNORED_KEYS: &[&str] = &["SourceFile", "FileName", "Directory", "ExifToolVersion"];

/// Parse a JSON metadata document: an array of records or a single record.
pub fn parse_json(tool: &str, text: &str) -> Outcome {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let doc: Value = serde_json::from_str(text)
        .map_err(|e| parse_error(tool, format!("invalid JSON: {}", e)))?;

    let records: Vec<&serde_json::Map<String, Value>> = match &doc {
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(map) => vec![map],
        other => {
            return Err(parse_error(
                tool,
                format!("expected a JSON object or array, found {}", json_kind(other)),
            ))
        }
    };

    let mut findings = Vec::new();
    for record in records {
        for (key, value) in record {
            if IGNORED_KEYS.contains(&key.as_str()) {
                continue;
            }
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if let Some((category, confidence, description)) = classify_tag(key, &value) {
                findings.push(Finding::new(tool, category, confidence, description));
            }
        }
    }
    Ok(findings)
}

/// Parse `Key : value` lines.
///
/// Non-empty input without a single such line is a parse error.
pub fn parse_key_value(tool: &str, text: &str) -> Outcome {
    let mut findings = Vec::new();
    let mut recognized = 0usize;
    let mut non_blank = 0usize;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        non_blank += 1;
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        recognized += 1;
        if IGNORED_KEYS.contains(&key.replace(' ', "").as_str()) {
            continue;
        }
        if let Some((category, confidence, description)) = classify_tag(key, value) {
            findings.push(Finding::new(tool, category, confidence, description));
        }
    }

    if non_blank > 0 && recognized == 0 {
        return Err(parse_error(tool, "no key/value pairs found".to_string()));
    }
    Ok(findings)
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
