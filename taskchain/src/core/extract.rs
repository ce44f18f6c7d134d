//! Locate a single JSON object inside free-form model output.
//!
//! Models wrap JSON in markdown fences or surround it with prose. Extraction
//! prefers a ```` ```json ```` fenced block, otherwise drops bare fences, then
//! slices from the first `{` to the last `}`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

static JSON_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("json fence regex should be valid")
});

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no JSON object found in model output")]
    NoObject,
    #[error("malformed JSON object: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// Return the candidate object text without parsing it.
pub fn object_slice(raw: &str) -> Result<&str, ExtractError> {
    let haystack = JSON_FENCE_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or(raw, |m| m.as_str());

    // Bare fences only matter when they sit between the braces; slicing by the
    // outermost braces drops any that surround the object.
    let start = haystack.find('{').ok_or(ExtractError::NoObject)?;
    let end = haystack.rfind('}').ok_or(ExtractError::NoObject)?;
    if end < start {
        return Err(ExtractError::NoObject);
    }
    Ok(&haystack[start..=end])
}

/// Extract and parse the JSON object from model output.
pub fn extract_json_object(raw: &str) -> Result<serde_json::Map<String, Value>, ExtractError> {
    let slice = object_slice(raw)?;
    let candidate = if slice.contains("```") {
        slice.replace("```", "")
    } else {
        slice.to_string()
    };
    match serde_json::from_str::<Value>(candidate.trim())? {
        Value::Object(map) => Ok(map),
        Value::Array(_) => Err(ExtractError::NotAnObject("array")),
        _ => Err(ExtractError::NotAnObject("scalar")),
    }
}
