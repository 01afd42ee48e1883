//! Response parsing: model text → [`Receipt`].
//!
//! Even when told to answer with bare JSON, models sometimes wrap the object
//! in a ```` ```json ```` fence or pad it with whitespace. Those are removed
//! before parsing. The shape check is deliberately minimal: the answer must
//! be a JSON object containing a `merchant` key (null is fine), and it must
//! deserialise into [`Receipt`]. Numbers are passed through unvalidated.

use crate::error::AttemptError;
use crate::model::Receipt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```$").unwrap());

/// Remove an outer code fence if the whole answer is wrapped in one.
pub fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps.get(1).map_or(trimmed, |m| m.as_str().trim()),
        None => trimmed,
    }
}

/// Parse and shape-check a model answer.
///
/// # Errors
/// [`AttemptError::Extraction`] for empty output, invalid JSON, a non-object
/// answer, a missing `merchant` key, or fields of the wrong type.
pub fn parse_receipt(raw: &str) -> Result<Receipt, AttemptError> {
    let fail = |detail: String| AttemptError::Extraction { detail };

    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(fail("model returned an empty response".into()));
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| fail(format!("invalid JSON: {e}")))?;

    let obj = value
        .as_object()
        .ok_or_else(|| fail("AI response is not in the expected format: not an object".into()))?;
    if !obj.contains_key("merchant") {
        return Err(fail(
            "AI response is not in the expected format: missing 'merchant'".into(),
        ));
    }

    serde_json::from_value(value).map_err(|e| fail(format!("schema mismatch: {e}")))
}
