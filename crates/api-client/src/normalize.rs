//! Error-payload normalization.
//!
//! Backends in this domain are inconsistent about failure shapes: a string
//! `detail`, a validation list of `{loc, msg}` entries, a `message` or `error`
//! field, or a bare string body. This module flattens all of them into a
//! single display string and degrades gracefully instead of erroring on an
//! unknown shape.

use serde_json::Value;

/// Resolve a failed-call payload into one human-readable message.
///
/// Resolution order, first match wins:
/// 1. no payload: the transport-level message, else `fallback`
/// 2. string `detail`
/// 3. array `detail` (validation list), one `field: message` line per entry
/// 4. string `message`
/// 5. string `error`
/// 6. the payload itself is a string
/// 7. the whole payload serialized, else `fallback`
pub fn extract_error_message(
    payload: Option<&Value>,
    transport_message: Option<&str>,
    fallback: &str,
) -> String {
    let Some(data) = payload else {
        return transport_message.unwrap_or(fallback).to_owned();
    };

    if let Some(detail) = data.get("detail") {
        if let Some(text) = detail.as_str() {
            return text.to_owned();
        }
        if let Some(items) = detail.as_array() {
            return join_validation_errors(items);
        }
    }

    if let Some(text) = data.get("message").and_then(Value::as_str) {
        return text.to_owned();
    }

    if let Some(text) = data.get("error").and_then(Value::as_str) {
        return text.to_owned();
    }

    if let Some(text) = data.as_str() {
        return text.to_owned();
    }

    serde_json::to_string_pretty(data).unwrap_or_else(|_| fallback.to_owned())
}

/// One line per entry. Object entries render as `field.path: message` with a
/// leading `body` location segment dropped; plain-string entries pass through
/// unchanged.
fn join_validation_errors(items: &[Value]) -> String {
    let lines: Vec<String> = items
        .iter()
        .map(|item| {
            if let Some(text) = item.as_str() {
                return text.to_owned();
            }

            let field = field_path(item);
            let message = match item.get("msg").and_then(Value::as_str) {
                Some(msg) => msg.to_owned(),
                None => serde_json::to_string(item).unwrap_or_default(),
            };

            if field.is_empty() {
                message
            } else {
                format!("{field}: {message}")
            }
        })
        .collect();

    lines.join("\n")
}

fn field_path(item: &Value) -> String {
    let Some(segments) = item.get("loc").and_then(Value::as_array) else {
        return String::new();
    };

    let parts: Vec<String> = segments
        .iter()
        .enumerate()
        .filter_map(|(index, segment)| {
            let part = match segment {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            // FastAPI prefixes request-body locations with "body".
            if index == 0 && part == "body" {
                None
            } else {
                Some(part)
            }
        })
        .collect();

    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_payload_prefers_transport_message() {
        assert_eq!(
            extract_error_message(None, Some("connection refused"), "fallback"),
            "connection refused"
        );
        assert_eq!(extract_error_message(None, None, "fallback"), "fallback");
    }

    #[test]
    fn string_detail_is_returned_verbatim() {
        let payload = json!({ "detail": "bad request" });
        assert_eq!(
            extract_error_message(Some(&payload), None, "fallback"),
            "bad request"
        );
    }

    #[test]
    fn validation_list_joins_field_paths() {
        let payload = json!({
            "detail": [
                { "loc": ["body", "phone"], "msg": "required", "type": "missing" },
                { "loc": ["body", "address", "district"], "msg": "unknown district" },
            ]
        });
        assert_eq!(
            extract_error_message(Some(&payload), None, "fallback"),
            "phone: required\naddress.district: unknown district"
        );
    }

    #[test]
    fn validation_list_keeps_non_leading_body_segment() {
        let payload = json!({
            "detail": [{ "loc": ["query", "body"], "msg": "unexpected" }]
        });
        assert_eq!(
            extract_error_message(Some(&payload), None, "fallback"),
            "query.body: unexpected"
        );
    }

    #[test]
    fn validation_list_passes_plain_strings_through() {
        let payload = json!({ "detail": ["something went wrong", { "loc": ["body", "name"], "msg": "too short" }] });
        assert_eq!(
            extract_error_message(Some(&payload), None, "fallback"),
            "something went wrong\nname: too short"
        );
    }

    #[test]
    fn validation_entry_without_msg_serializes_itself() {
        let payload = json!({ "detail": [{ "code": 42 }] });
        assert_eq!(
            extract_error_message(Some(&payload), None, "fallback"),
            r#"{"code":42}"#
        );
    }

    #[test]
    fn numeric_loc_segments_render() {
        let payload = json!({
            "detail": [{ "loc": ["body", "items", 0, "qty"], "msg": "must be positive" }]
        });
        assert_eq!(
            extract_error_message(Some(&payload), None, "fallback"),
            "items.0.qty: must be positive"
        );
    }

    #[test]
    fn message_and_error_fields_are_fallbacks_for_detail() {
        assert_eq!(
            extract_error_message(Some(&json!({ "message": "nope" })), None, "fallback"),
            "nope"
        );
        assert_eq!(
            extract_error_message(Some(&json!({ "error": "denied" })), None, "fallback"),
            "denied"
        );
    }

    #[test]
    fn string_payload_is_returned_as_is() {
        let payload = json!("plain text body");
        assert_eq!(
            extract_error_message(Some(&payload), None, "fallback"),
            "plain text body"
        );
    }

    #[test]
    fn unknown_shape_serializes_whole_payload() {
        let payload = json!({ "weird": { "nested": true } });
        let message = extract_error_message(Some(&payload), None, "fallback");
        assert!(message.contains("weird"));
        assert!(message.contains("nested"));
    }

    #[test]
    fn string_detail_wins_over_message_field() {
        let payload = json!({ "detail": "from detail", "message": "from message" });
        assert_eq!(
            extract_error_message(Some(&payload), None, "fallback"),
            "from detail"
        );
    }
}
