//! Recovery of JSON objects embedded in streamed natural-language text.
//!
//! Tools sometimes stream a JSON payload wrapped in narration ("Here is the
//! result: {...} Let me know"). The scanner finds every balanced top-level
//! `{...}` literal in one left-to-right pass. Quotes and escapes are tracked
//! inside objects so braces in string values do not move the depth counter.
//! A trailing object that never closes is not reported.

use serde::Serialize;
use serde_json::{Map, Value};
use std::ops::Range;
use tracepanel_core::text::prefix_window;

/// Key that marks a customer-ready payload.
pub const CUSTOMER_READY_KEY: &str = "customer_ready";
pub const INTERNAL_NOTES_KEY: &str = "internal_notes";
pub const FILE_NAME_KEY: &str = "file_name";

/// Byte ranges of every balanced top-level object in `text`.
pub fn json_object_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    // Only ASCII bytes are inspected, so every span edge is a char boundary.
    for (i, &byte) in text.as_bytes().iter().enumerate() {
        if depth == 0 {
            if byte == b'{' {
                depth = 1;
                start = i;
                in_string = false;
                escaped = false;
            }
            continue;
        }

        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    spans.push(start..i + 1);
                }
            }
            _ => {}
        }
    }

    spans
}

/// Every balanced top-level `{...}` substring of `text`, in order.
pub fn extract_json_objects(text: &str) -> Vec<&str> {
    json_object_spans(text)
        .into_iter()
        .map(|span| &text[span])
        .collect()
}

/// Candidates that parse as JSON objects. Unparseable candidates are skipped.
pub fn parse_json_objects(text: &str) -> Vec<Map<String, Value>> {
    extract_json_objects(text)
        .into_iter()
        .filter_map(|candidate| match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Skipping unparseable embedded JSON candidate: {}", e);
                None
            }
        })
        .collect()
}

// ── Customer-ready payloads ─────────────────────────────────────────────────

/// Answer split emitted by support tools: what the customer sees vs. what
/// stays internal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerReadyPayload {
    pub customer_ready: String,
    pub internal_notes: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerReadySplit {
    pub payload: CustomerReadyPayload,
    /// Text around the payload, with the object removed.
    pub narration: String,
}

/// Quick containment check over the first `window` bytes of `text`: the
/// answer key plus at least one of its companion keys.
pub fn looks_like_customer_ready(text: &str, window: usize) -> bool {
    let head = prefix_window(text, window);
    head.contains(CUSTOMER_READY_KEY)
        && (head.contains(INTERNAL_NOTES_KEY) || head.contains(FILE_NAME_KEY))
}

/// Locate the first customer-ready payload in `text`.
///
/// The prefix check runs first; the brace scan only runs when it passes.
pub fn split_customer_ready(text: &str, window: usize) -> Option<CustomerReadySplit> {
    if !looks_like_customer_ready(text, window) {
        return None;
    }

    json_object_spans(text).into_iter().find_map(|span| {
        let map = match serde_json::from_str::<Value>(&text[span.clone()]) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return None,
            Err(e) => {
                tracing::debug!("Skipping unparseable customer-ready candidate: {}", e);
                return None;
            }
        };
        let payload = payload_from_map(&map)?;
        let narration = format!("{}{}", &text[..span.start], &text[span.end..]);
        Some(CustomerReadySplit {
            payload,
            narration: narration.trim().to_string(),
        })
    })
}

fn payload_from_map(map: &Map<String, Value>) -> Option<CustomerReadyPayload> {
    let customer_ready = map.get(CUSTOMER_READY_KEY)?.as_str()?.to_string();
    let internal_notes = match map.get(INTERNAL_NOTES_KEY) {
        Some(Value::String(notes)) => notes.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let file_name = map
        .get(FILE_NAME_KEY)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from);
    Some(CustomerReadyPayload {
        customer_ready,
        internal_notes,
        file_name,
    })
}
