use serde_json::Value;

/// Pulls the human-readable message out of a backend error body.
///
/// Precedence is fixed: `detail` (a plain string, or a validation list whose
/// first entry carries `msg`), then `error`, then `message`. Blank strings are
/// treated as absent.
pub fn extract_server_message(body: &Value) -> Option<String> {
    let object = body.as_object()?;

    if let Some(detail) = object.get("detail") {
        match detail {
            Value::String(text) => {
                if let Some(text) = non_blank(text) {
                    return Some(text);
                }
            }
            Value::Array(entries) => {
                if let Some(text) = entries
                    .iter()
                    .filter_map(|entry| entry.get("msg").and_then(Value::as_str))
                    .find_map(non_blank)
                {
                    return Some(text);
                }
            }
            Value::Object(inner) => {
                if let Some(text) = inner
                    .get("message")
                    .and_then(Value::as_str)
                    .and_then(non_blank)
                {
                    return Some(text);
                }
            }
            _ => {}
        }
    }

    ["error", "message"]
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find_map(non_blank)
}

/// Same as [`extract_server_message`] but for a raw, possibly non-JSON body.
pub fn extract_server_message_from_bytes(raw: &[u8]) -> Option<String> {
    serde_json::from_slice::<Value>(raw)
        .ok()
        .as_ref()
        .and_then(extract_server_message)
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
