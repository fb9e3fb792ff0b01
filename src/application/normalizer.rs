//! Reply normalization.
//!
//! The responder webhook answers in whatever shape its automation happens
//! to produce: a bare string, an object keyed by `response`/`message`/...,
//! or an array of message maps. `normalize` reduces any of these to plain
//! display text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Returned when no text can be extracted.
pub const NO_RESPONSE_SENTINEL: &str = "Sorry, I could not extract a response.";

/// Top-level keys, in priority order.
const PRIMARY_KEYS: &[&str] = &["assistant", "response", "message", "content", "text", "output"];

/// Keys searched one level deeper when a primary hit is itself a map.
const NESTED_KEYS: &[&str] = &["text", "content", "message"];

/// Keys on array entries that hold a nested message map.
const CONTAINER_KEYS: &[&str] = &["messages", "message"];

#[allow(clippy::unwrap_used)]
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// A named extraction rule: parsed tree in, text out if the rule applies.
struct ExtractionRule {
    tag: &'static str,
    extract: fn(&Value) -> Option<String>,
}

/// Rules evaluated in order; the first match wins.
const RULES: &[ExtractionRule] = &[
    ExtractionRule {
        tag: "string",
        extract: extract_string,
    },
    ExtractionRule {
        tag: "array",
        extract: extract_from_array,
    },
    ExtractionRule {
        tag: "object",
        extract: extract_from_object,
    },
];

/// Reduces a raw reply to display text. Never returns an empty string.
///
/// The result is a fixed point: `normalize(&normalize(x)) == normalize(x)`.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let mut current = normalize_once(raw);

    // Every pass that changes the text makes it strictly shorter.
    loop {
        let next = normalize_once(&current);
        if next == current {
            break;
        }
        current = next;
    }

    if current.is_empty() {
        NO_RESPONSE_SENTINEL.to_string()
    } else {
        current
    }
}

/// [`normalize`] for a raw HTTP body. Invalid UTF-8 is replaced, not rejected.
#[must_use]
pub fn normalize_bytes(raw: &[u8]) -> String {
    normalize(&String::from_utf8_lossy(raw))
}

/// One pass: structured extraction, then tag stripping.
fn normalize_once(raw: &str) -> String {
    let text = extract(raw).unwrap_or_else(|| raw.to_string());
    strip_tags(&text)
}

fn extract(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;

    RULES.iter().find_map(|rule| {
        let hit = (rule.extract)(&value)?;
        tracing::trace!(rule = rule.tag, "Reply matched extraction rule");
        Some(hit)
    })
}

fn strip_tags(text: &str) -> String {
    TAG_RE.replace_all(text, "").trim().to_string()
}

fn extract_string(value: &Value) -> Option<String> {
    value.as_str().map(String::from)
}

/// First entry holding a message map (or a primary key directly) wins.
fn extract_from_array(value: &Value) -> Option<String> {
    value.as_array()?.iter().find_map(|entry| {
        let entry = entry.as_object()?;
        CONTAINER_KEYS
            .iter()
            .filter_map(|key| entry.get(*key))
            .find_map(|nested| match nested {
                Value::Object(map) => search_primary(map),
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .or_else(|| search_primary(entry))
    })
}

fn extract_from_object(value: &Value) -> Option<String> {
    search_primary(value.as_object()?)
}

fn search_primary(map: &Map<String, Value>) -> Option<String> {
    let hit = PRIMARY_KEYS.iter().find_map(|key| map.get(*key))?;

    match hit {
        Value::Object(inner) => Some(
            NESTED_KEYS
                .iter()
                .find_map(|key| inner.get(*key))
                .map_or_else(|| hit.to_string(), value_to_text),
        ),
        other => Some(value_to_text(other)),
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
