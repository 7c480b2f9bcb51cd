//! Reconciliation: recover a JSON value from free-form model output and
//! stamp it with the document's provenance tag.
//!
//! Models are asked for JSON but routinely wrap it in Markdown fences, add a
//! sentence before it, or append commentary after it. [`reconcile`] is a
//! total function over strings: it never fails, and when nothing parseable
//! is found it degrades to a raw-text fallback so the unit still produces a
//! file someone can inspect.
//!
//! ## Steps
//!
//! 1. Trim surrounding whitespace
//! 2. Take the first fenced code block (```` ``` ````, ```` ```json ````,
//!    ```` ```js ````, ```` ```javascript ````) if present
//! 3. Strip leading byte-order marks and whitespace
//! 4. Start at the first `{` or `[`
//! 5. Decode one JSON value, ignoring whatever follows it
//! 6. Put `year` first in every object (or every object element of an array)
//! 7. Otherwise fall back to the raw text, wrapped under `year` when tagged

use serde::Deserialize;
use serde_json::{Map, Value};

/// Key carrying the provenance tag.
pub const PROVENANCE_KEY: &str = "year";

/// Key holding the unparsed text in a tagged fallback object.
pub const RAW_KEY: &str = "raw";

const FENCE: &str = "```";
const FENCE_TAGS: [&str; 3] = ["javascript", "json", "js"];

/// The value written to disk for one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// JSON was recovered; provenance already applied.
    Parsed(Value),
    /// No JSON was recovered; the text is kept under the provenance tag.
    TaggedRaw { tag: String, raw: String },
    /// No JSON was recovered and there is no tag to attach.
    Raw(String),
}

impl Reconciled {
    /// `true` when a JSON value was recovered from the model output.
    pub fn is_parsed(&self) -> bool {
        matches!(self, Reconciled::Parsed(_))
    }

    /// File contents: pretty-printed JSON, or the raw text verbatim.
    pub fn to_file_contents(&self) -> String {
        match self {
            Reconciled::Parsed(value) => pretty(value),
            Reconciled::TaggedRaw { tag, raw } => {
                let mut map = Map::new();
                map.insert(PROVENANCE_KEY.to_string(), Value::String(tag.clone()));
                map.insert(RAW_KEY.to_string(), Value::String(raw.clone()));
                pretty(&Value::Object(map))
            }
            Reconciled::Raw(text) => text.clone(),
        }
    }
}

fn pretty(value: &Value) -> String {
    // Serialising a `Value` cannot fail: keys are always strings.
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Reconcile raw model output. An empty tag counts as no tag.
pub fn reconcile(raw_text: &str, provenance_tag: Option<&str>) -> Reconciled {
    let tag = provenance_tag.filter(|t| !t.is_empty());
    let trimmed = raw_text.trim();

    let working = first_fenced_block(trimmed).unwrap_or(trimmed);
    let working = working.trim_start_matches('\u{feff}').trim_start();

    let candidate = match working.find(|c: char| c == '{' || c == '[') {
        Some(start) => working[start..].trim(),
        None => "",
    };

    if !candidate.is_empty() {
        if let Some(value) = decode_leading_value(candidate) {
            return Reconciled::Parsed(match tag {
                Some(tag) => attach_provenance(value, tag),
                None => value,
            });
        }
    }

    let fallback = if candidate.is_empty() {
        trimmed
    } else {
        candidate
    };
    match tag {
        Some(tag) => Reconciled::TaggedRaw {
            tag: tag.to_string(),
            raw: fallback.to_string(),
        },
        None => Reconciled::Raw(fallback.to_string()),
    }
}

/// Inner content of the first fenced code block, trimmed.
///
/// A language tag (`json`, `js`, `javascript`, any case) directly after the
/// opening fence is dropped. Returns `None` when there is no closing fence
/// or the block is empty.
fn first_fenced_block(text: &str) -> Option<&str> {
    let open = text.find(FENCE)?;
    let after_open = &text[open + FENCE.len()..];
    let body = strip_fence_tag(after_open);

    // The block must hold at least one character before the closing fence.
    let first_len = body.chars().next()?.len_utf8();
    let close = body[first_len..].find(FENCE)? + first_len;
    Some(body[..close].trim())
}

fn strip_fence_tag(text: &str) -> &str {
    for tag in FENCE_TAGS {
        if let Some(prefix) = text.get(..tag.len()) {
            if prefix.eq_ignore_ascii_case(tag) {
                return &text[tag.len()..];
            }
        }
    }
    text
}

/// Decode one JSON value from the start of `text`, ignoring trailing bytes.
fn decode_leading_value(text: &str) -> Option<Value> {
    let mut de = serde_json::Deserializer::from_str(text);
    Value::deserialize(&mut de).ok()
}

/// Put the provenance tag first in an object, or in every object element of
/// an array. Any existing `year` is replaced. Other values pass through.
pub fn attach_provenance(value: Value, tag: &str) -> Value {
    match value {
        Value::Object(map) => Value::Object(lead_with_tag(map, tag)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(lead_with_tag(map, tag)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

fn lead_with_tag(map: Map<String, Value>, tag: &str) -> Map<String, Value> {
    let mut ordered = Map::with_capacity(map.len() + 1);
    ordered.insert(PROVENANCE_KEY.to_string(), Value::String(tag.to_string()));
    for (key, value) in map {
        if key != PROVENANCE_KEY {
            ordered.insert(key, value);
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(value: &Value) -> Vec<&str> {
        value
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect()
    }

    #[test]
    fn clean_json_without_tag_is_unchanged() {
        let input = r#"{"title": "t", "items": [1, 2, {"k": null}]}"#;
        let expected: Value = serde_json::from_str(input).unwrap();
        assert_eq!(reconcile(input, None), Reconciled::Parsed(expected));
    }

    #[test]
    fn tag_overrides_and_leads() {
        let out = reconcile(r#"{"year": "X", "title": "t"}"#, Some("1999"));
        let Reconciled::Parsed(value) = out else {
            panic!("expected parsed output");
        };
        assert_eq!(value, json!({"year": "1999", "title": "t"}));
        assert_eq!(keys(&value), vec!["year", "title"]);
    }

    #[test]
    fn tag_leads_even_when_year_was_last() {
        let Reconciled::Parsed(value) = reconcile(r#"{"b": 1, "a": 2, "year": 3}"#, Some("2005"))
        else {
            panic!("expected parsed output");
        };
        assert_eq!(keys(&value), vec!["year", "b", "a"]);
        assert_eq!(value["year"], json!("2005"));
    }

    #[test]
    fn every_object_in_array_is_tagged() {
        let out = reconcile(r#"[{"a":1},{"a":2}]"#, Some("2000"));
        assert_eq!(
            out,
            Reconciled::Parsed(json!([{"year":"2000","a":1},{"year":"2000","a":2}]))
        );
        if let Reconciled::Parsed(Value::Array(items)) = &out {
            assert_eq!(keys(&items[0]), vec!["year", "a"]);
        }
    }

    #[test]
    fn non_object_array_elements_are_untouched() {
        let out = reconcile(r#"[1, "two", {"x": true}, [3]]"#, Some("2000"));
        assert_eq!(
            out,
            Reconciled::Parsed(json!([1, "two", {"year": "2000", "x": true}, [3]]))
        );
    }

    #[test]
    fn fenced_json_block_is_extracted() {
        let out = reconcile("```json\n{\"a\":1}\n```", None);
        assert_eq!(out, Reconciled::Parsed(json!({"a": 1})));
    }

    #[test]
    fn fence_tags_are_case_insensitive() {
        for fence in ["```JSON", "```Js", "```javascript", "```"] {
            let text = format!("Here you go:\n{fence}\n[{{\"a\":1}}]\n```\nThanks!");
            assert_eq!(
                reconcile(&text, None),
                Reconciled::Parsed(json!([{"a": 1}])),
                "fence {fence}"
            );
        }
    }

    #[test]
    fn only_the_first_fenced_block_is_used() {
        let text = "```json\n{\"first\":1}\n```\n\n```json\n{\"second\":2}\n```";
        assert_eq!(reconcile(text, None), Reconciled::Parsed(json!({"first": 1})));
    }

    #[test]
    fn leading_prose_and_trailing_commentary_are_ignored() {
        let text = "Sure! The result is {\"a\": [1, 2]}. Let me know if you need more.";
        assert_eq!(reconcile(text, None), Reconciled::Parsed(json!({"a": [1, 2]})));
    }

    #[test]
    fn byte_order_mark_is_stripped() {
        let text = "\u{feff}  {\"a\": 1}";
        assert_eq!(reconcile(text, None), Reconciled::Parsed(json!({"a": 1})));
    }

    #[test]
    fn text_without_json_falls_back_with_tag() {
        let out = reconcile("no json here", Some("2001"));
        assert_eq!(
            out,
            Reconciled::TaggedRaw {
                tag: "2001".into(),
                raw: "no json here".into()
            }
        );
        let written: Value = serde_json::from_str(&out.to_file_contents()).unwrap();
        assert_eq!(written, json!({"year": "2001", "raw": "no json here"}));
        assert_eq!(keys(&written), vec!["year", "raw"]);
    }

    #[test]
    fn text_without_json_and_without_tag_is_raw() {
        let out = reconcile("  no json here \n", None);
        assert_eq!(out, Reconciled::Raw("no json here".into()));
        assert_eq!(out.to_file_contents(), "no json here");
    }

    #[test]
    fn malformed_json_keeps_the_candidate() {
        let out = reconcile("Result: {\"a\": 1,, }", Some("2002"));
        assert_eq!(
            out,
            Reconciled::TaggedRaw {
                tag: "2002".into(),
                raw: "{\"a\": 1,, }".into()
            }
        );
    }

    #[test]
    fn empty_tag_counts_as_no_tag() {
        assert_eq!(
            reconcile(r#"{"a": 1}"#, Some("")),
            Reconciled::Parsed(json!({"a": 1}))
        );
        assert_eq!(reconcile("nothing", Some("")), Reconciled::Raw("nothing".into()));
    }

    #[test]
    fn empty_input_is_total() {
        assert_eq!(reconcile("", None), Reconciled::Raw(String::new()));
        assert_eq!(
            reconcile("   ", Some("2003")),
            Reconciled::TaggedRaw {
                tag: "2003".into(),
                raw: String::new()
            }
        );
    }

    #[test]
    fn unterminated_fence_uses_whole_text() {
        let out = reconcile("```json\n{\"a\": 1}", None);
        assert_eq!(out, Reconciled::Parsed(json!({"a": 1})));
    }

    #[test]
    fn fenced_block_without_json_falls_back_to_trimmed_input() {
        let out = reconcile("```\nhello\n```", None);
        assert_eq!(out, Reconciled::Raw("```\nhello\n```".into()));
    }

    #[test]
    fn scalar_json_is_not_recovered() {
        assert_eq!(reconcile("42", None), Reconciled::Raw("42".into()));
    }

    #[test]
    fn pretty_output_keeps_unicode_verbatim() {
        let out = reconcile(r#"{"問題": "答え"}"#, Some("令和元年"));
        let contents = out.to_file_contents();
        assert!(contents.contains("\"問題\": \"答え\""), "got: {contents}");
        assert!(contents.starts_with("{\n  \"year\": \"令和元年\""), "got: {contents}");
    }

    #[test]
    fn large_numbers_keep_every_digit() {
        let input = r#"{"id": 123456789012345678901234567890, "n": 18446744073709551616, "x": 0.1000000000000000055511151231257827}"#;
        let contents = reconcile(input, Some("2019")).to_file_contents();
        assert!(contents.contains("\"id\": 123456789012345678901234567890"), "got: {contents}");
        assert!(contents.contains("\"n\": 18446744073709551616"), "got: {contents}");
        assert!(contents.contains("\"x\": 0.1000000000000000055511151231257827"), "got: {contents}");

        // Reconciling the written file again changes nothing.
        assert_eq!(reconcile(&contents, Some("2019")).to_file_contents(), contents);
    }

    #[test]
    fn attach_provenance_passes_scalars_through() {
        assert_eq!(attach_provenance(json!("s"), "1999"), json!("s"));
        assert_eq!(attach_provenance(json!(null), "1999"), json!(null));
    }
}
