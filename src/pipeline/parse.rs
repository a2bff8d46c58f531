//! Response interpretation: raw model text → [`OcrRecord`].
//!
//! A response that is a JSON object becomes [`OcrOutcome::Parsed`]. Anything
//! else becomes [`OcrOutcome::Unparsed`] holding the exact text, so nothing the
//! model said is lost. The `filename` a model echoes back is never trusted;
//! the record always carries the name of the image that was actually sent.

use crate::error::ItemError;
use crate::output::{FixtureFields, OcrOutcome, OcrRecord};
use crate::pipeline::segment::Region;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;

/// Identity of one image in the run.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemMeta {
    /// 0-based position in document order.
    pub index: usize,
    pub filename: String,
    pub page: Option<usize>,
    pub region: Option<Region>,
}

impl ItemMeta {
    pub fn new(index: usize, filename: impl Into<String>) -> Self {
        Self {
            index,
            filename: filename.into(),
            page: None,
            region: None,
        }
    }
}

/// Build the record for a response that arrived.
pub fn parse_response(meta: ItemMeta, raw: String, elapsed: Duration, strip_fences: bool) -> OcrRecord {
    record(meta, parse_outcome(raw, strip_fences), elapsed)
}

/// Build the record for a request that failed.
pub fn failed_record(meta: ItemMeta, error: ItemError, elapsed: Duration) -> OcrRecord {
    record(meta, OcrOutcome::Failed { error }, elapsed)
}

fn record(meta: ItemMeta, outcome: OcrOutcome, elapsed: Duration) -> OcrRecord {
    OcrRecord {
        index: meta.index,
        filename: meta.filename,
        page: meta.page,
        region: meta.region,
        outcome,
        duration_ms: elapsed.as_millis() as u64,
    }
}

/// Interpret `raw` as a JSON object.
pub fn parse_outcome(raw: String, strip_fences: bool) -> OcrOutcome {
    let parsed = {
        let text = if strip_fences {
            strip_json_fence(&raw)
        } else {
            raw.as_str()
        };
        serde_json::from_str::<Value>(text)
    };

    match parsed {
        Ok(Value::Object(map)) => OcrOutcome::Parsed {
            fields: FixtureFields::from_object(map),
            raw,
        },
        Ok(other) => OcrOutcome::Unparsed {
            reason: format!("expected a JSON object, got {}", json_kind(&other)),
            raw,
        },
        Err(e) => OcrOutcome::Unparsed {
            reason: e.to_string(),
            raw,
        },
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

/// Remove one outer ```` ```json ```` fence, if present.
fn strip_json_fence(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_JSON_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::JsonRecord;
    use serde_json::json;

    fn meta() -> ItemMeta {
        ItemMeta::new(4, "page_1_part_5.png")
    }

    #[test]
    fn json_object_is_parsed_and_filename_reasserted() {
        let raw = r#"{"filename": "image99.png", "hinban": "NNN21615 LE1", "num_items": 3, "serial_num": "H1", "other": null}"#;
        let rec = parse_response(meta(), raw.to_string(), Duration::from_millis(2500), false);

        assert!(rec.outcome.is_parsed());
        assert_eq!(rec.filename, "page_1_part_5.png");
        let JsonRecord::Parsed(row) = rec.to_json_record() else {
            panic!("expected a parsed row");
        };
        assert_eq!(row.filename, "page_1_part_5.png");
        assert_eq!(row.fields.num_items, json!(3));
        assert!(row.processing_time >= 0.0);
        assert_eq!(row.processing_time, 2.5);
    }

    #[test]
    fn invalid_json_keeps_exact_text() {
        let raw = "| 品番 | 個数 | 通し番号 |\n|---|---|---|\n| XL123 | 2 | H3 |";
        let rec = parse_response(meta(), raw.to_string(), Duration::ZERO, false);

        let JsonRecord::Failure(row) = rec.to_json_record() else {
            panic!("expected a failure row");
        };
        assert_eq!(row.error, crate::output::PARSE_FAILED);
        assert_eq!(row.raw_output, raw);
    }

    #[test]
    fn non_object_json_is_unparsed() {
        let outcome = parse_outcome("[1, 2]".to_string(), false);
        let OcrOutcome::Unparsed { reason, raw } = outcome else {
            panic!("expected unparsed");
        };
        assert!(reason.contains("array"));
        assert_eq!(raw, "[1, 2]");
    }

    #[test]
    fn fenced_json_needs_opt_in() {
        let raw = "```json\n{\"hinban\": \"A\"}\n```";
        assert!(!parse_outcome(raw.to_string(), false).is_parsed());

        let outcome = parse_outcome(raw.to_string(), true);
        let OcrOutcome::Parsed { fields, raw: kept } = outcome else {
            panic!("expected parsed");
        };
        assert_eq!(fields.hinban, json!("A"));
        assert_eq!(kept, raw, "raw text is stored unmodified");
    }

    #[test]
    fn bare_fence_without_language() {
        assert_eq!(strip_json_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_json_fence("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn failed_record_carries_error() {
        let rec = failed_record(meta(), ItemError::Timeout { secs: 30 }, Duration::from_secs(30));
        assert!(rec.outcome.is_failed());
        assert_eq!(rec.duration_ms, 30_000);
        assert_eq!(rec.index, 4);
    }
}
