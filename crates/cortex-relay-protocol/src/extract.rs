//! Text extraction from upstream event payloads.
//!
//! The upstream service emits payloads of varying shape. The extractor walks
//! a fixed list of candidate fields and returns the first non-empty text.

use serde_json::Value;

/// Candidate fields, highest priority first.
const CANDIDATE_FIELDS: [&str; 5] = ["text", "delta", "content", "message", "output_text"];

/// Extract the text fragment carried by `payload`, if any.
///
/// For each candidate field in order:
/// - a non-blank string is returned as is;
/// - an array contributes its string elements and the `text` (else
///   `content`) string of object elements, concatenated;
/// - an object contributes its `text` or `content` string.
pub fn extract_text(payload: &Value) -> Option<String> {
    let obj = payload.as_object()?;
    CANDIDATE_FIELDS
        .iter()
        .filter_map(|field| obj.get(*field))
        .find_map(text_of)
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_blank(s).map(str::to_string),
        Value::Array(items) => {
            let joined: String = items.iter().filter_map(item_text).collect();
            non_blank(&joined).is_some().then_some(joined)
        }
        Value::Object(map) => ["text", "content"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .find_map(non_blank)
            .map(str::to_string),
        _ => None,
    }
}

fn item_text(item: &Value) -> Option<&str> {
    match item {
        Value::String(s) => Some(s),
        Value::Object(map) => map
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| map.get("content").and_then(Value::as_str)),
        _ => None,
    }
}

fn non_blank(s: &str) -> Option<&str> {
    (!s.trim().is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_text_over_later_fields() {
        let payload = json!({"content": "second", "text": "first"});
        assert_eq!(extract_text(&payload).as_deref(), Some("first"));
    }

    #[test]
    fn skips_blank_candidates() {
        let payload = json!({"text": "   ", "delta": "", "content": "real"});
        assert_eq!(extract_text(&payload).as_deref(), Some("real"));
    }

    #[test]
    fn preserves_surrounding_whitespace() {
        let payload = json!({"delta": " mot\n"});
        assert_eq!(extract_text(&payload).as_deref(), Some(" mot\n"));
    }

    #[test]
    fn concatenates_array_parts() {
        let payload = json!({
            "content": ["Ven", {"text": "tes"}, {"content": " en"}, {"type": "image"}, 42, " hausse"]
        });
        assert_eq!(extract_text(&payload).as_deref(), Some("Ventes en hausse"));
    }

    #[test]
    fn blank_array_falls_through_to_next_candidate() {
        let payload = json!({"content": [" ", {"text": ""}], "output_text": "fallback"});
        assert_eq!(extract_text(&payload).as_deref(), Some("fallback"));
    }

    #[test]
    fn reads_nested_object() {
        let payload = json!({"message": {"content": "from content"}});
        assert_eq!(extract_text(&payload).as_deref(), Some("from content"));

        let payload = json!({"delta": {"text": " ", "content": "used"}});
        assert_eq!(extract_text(&payload).as_deref(), Some("used"));
    }

    #[test]
    fn no_text_yields_none() {
        assert_eq!(extract_text(&json!({})), None);
        assert_eq!(extract_text(&json!({"status": "planning"})), None);
        assert_eq!(extract_text(&json!("bare string")), None);
        assert_eq!(extract_text(&json!({"text": 12})), None);
    }
}
