//! Parsing of raw response bodies into [`InvocationResult`]s.

use serde_json::Value;

use super::InvocationResult;

/// Parse the body returned by a direct function invocation.
///
/// * Non-JSON bodies become `{success: true, data: <raw text>}`.
/// * `{statusCode, body}` is unwrapped; a string `body` is parsed as JSON
///   when possible. `statusCode >= 400` yields `success: false`.
/// * Any other JSON is returned verbatim as `data`.
///
/// A `function_error` (the `X-Amz-Function-Error` header) always yields
/// `success: false`, keeping whatever the function returned in `data`.
pub fn parse_direct_payload(body: &[u8], function_error: Option<&str>) -> InvocationResult {
    let text = String::from_utf8_lossy(body);
    let parsed = match serde_json::from_str::<Value>(text.trim()) {
        Ok(value) => value,
        Err(_) => {
            return match function_error {
                Some(kind) => InvocationResult::failed(format!("{kind}: {}", text.trim())),
                None => InvocationResult::ok(Value::String(text.into_owned())),
            };
        }
    };

    if let Some(kind) = function_error {
        let message = error_message(&parsed).unwrap_or_else(|| kind.to_string());
        return InvocationResult {
            data: parsed,
            ..InvocationResult::failed(message)
        };
    }

    unwrap_status_envelope(parsed)
}

/// Parse a signed-HTTP response body: JSON when possible, raw text otherwise.
pub fn parse_http_body(body: &[u8]) -> InvocationResult {
    let text = String::from_utf8_lossy(body);
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value) => InvocationResult::ok(value),
        Err(_) => InvocationResult::ok(Value::String(text.into_owned())),
    }
}

fn unwrap_status_envelope(value: Value) -> InvocationResult {
    let Some(status) = status_code(&value) else {
        return InvocationResult::ok(value);
    };
    let body = match value.get("body") {
        Some(Value::String(s)) => {
            serde_json::from_str::<Value>(s).unwrap_or_else(|_| Value::String(s.clone()))
        }
        Some(other) => other.clone(),
        None => return InvocationResult::ok(value),
    };

    if status >= 400 {
        let message = error_message(&body)
            .unwrap_or_else(|| format!("upstream returned status {status}"));
        return InvocationResult {
            data: body,
            ..InvocationResult::failed(message)
        };
    }
    InvocationResult::ok(body)
}

/// `statusCode` of a `{statusCode, body}` envelope, numeric or numeric string.
pub(crate) fn status_code(value: &Value) -> Option<u64> {
    let map = value.as_object()?;
    if !map.contains_key("body") {
        return None;
    }
    match map.get("statusCode")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Best human-readable error carried by a response value.
pub(crate) fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(map) => ["error", "errorMessage", "message"]
            .iter()
            .find_map(|key| match map.get(*key) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Object(inner)) => inner
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_json_is_returned_verbatim() {
        let result = parse_direct_payload(br#"{"domainAnalysis":"x"}"#, None);
        assert!(result.success);
        assert_eq!(result.data, json!({"domainAnalysis": "x"}));
    }

    #[test]
    fn status_envelope_with_string_body_is_unwrapped() {
        let raw = json!({"statusCode": 200, "body": "{\"success\":true,\"asciiDiagram\":\"d\"}"});
        let result = parse_direct_payload(raw.to_string().as_bytes(), None);
        assert!(result.success);
        assert_eq!(result.data, json!({"success": true, "asciiDiagram": "d"}));
    }

    #[test]
    fn status_envelope_with_object_body_is_unwrapped() {
        let raw = json!({"statusCode": "200", "body": {"a": 1}});
        let result = parse_direct_payload(raw.to_string().as_bytes(), None);
        assert_eq!(result.data, json!({"a": 1}));
    }

    #[test]
    fn status_envelope_with_text_body_keeps_text() {
        let raw = json!({"statusCode": 200, "body": "## Domain Analysis\nOrders"});
        let result = parse_direct_payload(raw.to_string().as_bytes(), None);
        assert!(result.success);
        assert_eq!(result.data, json!("## Domain Analysis\nOrders"));
    }

    #[test]
    fn error_status_in_envelope_fails() {
        let raw = json!({"statusCode": 500, "body": "{\"error\":\"model overloaded\"}"});
        let result = parse_direct_payload(raw.to_string().as_bytes(), None);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("model overloaded"));
    }

    #[test]
    fn non_json_becomes_raw_text() {
        let result = parse_direct_payload("just some text".as_bytes(), None);
        assert!(result.success);
        assert_eq!(result.data, json!("just some text"));
    }

    #[test]
    fn function_error_header_fails() {
        let body = br#"{"errorMessage":"Task timed out","errorType":"Timeout"}"#;
        let result = parse_direct_payload(body, Some("Unhandled"));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Task timed out"));
        assert_eq!(result.data["errorType"], "Timeout");
    }

    #[test]
    fn http_body_falls_back_to_text() {
        assert_eq!(parse_http_body(br#"{"a":1}"#).data, json!({"a": 1}));
        assert_eq!(parse_http_body(b"<html>").data, json!("<html>"));
    }
}
