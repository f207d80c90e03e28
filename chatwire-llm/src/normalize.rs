//! Response normalisation.
//!
//! Providers that claim OpenAI compatibility still disagree on the response
//! body. Rules, first match wins:
//!
//! 1. Body is not JSON: one choice holding the raw body.
//! 2. Non-empty `choices` array: one choice per entry, in order. An entry
//!    whose `message` is an object yields `message.content`, else
//!    `message.text`, else `""`. An entry with a top-level `text` or
//!    `content` yields that. Anything else is stringified.
//! 3. Top-level string `text`: one choice.
//! 4. Anything else: one choice holding the serialised body.
//!
//! Normalisation never fails, and never produces an empty result.

use serde_json::{Map, Value};

use crate::types::{CompletionResult, NormalizedChoice};

/// Normalise a raw provider response body.
#[must_use]
pub fn normalize(raw: &str) -> CompletionResult {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => normalize_value(&value),
        Err(_) => CompletionResult::single(raw),
    }
}

/// Normalise an already parsed body.
#[must_use]
pub fn normalize_value(body: &Value) -> CompletionResult {
    if let Some(result) = from_choices(body) {
        return result;
    }
    if let Some(Value::String(text)) = body.get("text") {
        return CompletionResult::single(text.as_str());
    }
    CompletionResult::single(body.to_string())
}

fn from_choices(body: &Value) -> Option<CompletionResult> {
    let Some(Value::Array(entries)) = body.get("choices") else {
        return None;
    };
    CompletionResult::from_choices(entries.iter().map(normalize_choice).collect())
}

fn normalize_choice(entry: &Value) -> NormalizedChoice {
    let text = match entry {
        Value::Object(fields) => match fields.get("message") {
            Some(Value::Object(message)) => field_text(message, "content")
                .or_else(|| field_text(message, "text"))
                .unwrap_or_default(),
            _ => field_text(fields, "text")
                .or_else(|| field_text(fields, "content"))
                .unwrap_or_else(|| entry.to_string()),
        },
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    NormalizedChoice::new(text)
}

/// Text of `fields[key]`; strings verbatim, other non-null values serialised.
fn field_text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
