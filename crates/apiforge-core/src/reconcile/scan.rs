//! Last-resort textual scan for result fields buried in stringified JSON.
//!
//! Agents sometimes return a result serialized two or three times over
//! (`"{\"domainAnalysis\":\"...\"}"` inside another string). The scan
//! stringifies the whole value, looks for a known field followed by a string
//! literal and, failing that, peels one level of escaping and tries again.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Fields the scan recognises.
pub const SCANNED_FIELDS: [&str; 4] = [
    "asciiDiagram",
    "domainAnalysis",
    "businessContextAnalysis",
    "boundedContextAnalysis",
];

/// How many levels of escaping are peeled before giving up.
pub const MAX_UNESCAPE_PASSES: usize = 8;

fn field_regex() -> &'static Regex {
    static FIELD_RE: OnceLock<Regex> = OnceLock::new();
    FIELD_RE.get_or_init(|| {
        let pattern = format!(
            r#""({})"\s*:\s*"((?:[^"\\]|\\.)*)""#,
            SCANNED_FIELDS.join("|")
        );
        Regex::new(&pattern).expect("valid field regex")
    })
}

fn success_regex() -> &'static Regex {
    static SUCCESS_RE: OnceLock<Regex> = OnceLock::new();
    SUCCESS_RE.get_or_init(|| {
        Regex::new(r#""success"\s*:\s*"?(true|false)"?"#).expect("valid success regex")
    })
}

fn error_regex() -> &'static Regex {
    static ERROR_RE: OnceLock<Regex> = OnceLock::new();
    ERROR_RE.get_or_init(|| {
        Regex::new(r#""error"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid error regex")
    })
}

/// Scan the stringified `value` for embedded result fields.
///
/// Returns the first occurrence of each field found at the shallowest
/// escaping level, with its text fully un-escaped. A `success` flag at that
/// level is carried along, and when it is `false` so is the `error` text.
/// `None` when no field is found at any level.
pub fn scan_embedded_fields(value: &Value) -> Option<Map<String, Value>> {
    let mut text = serde_json::to_string(value).ok()?;

    for _ in 0..=MAX_UNESCAPE_PASSES {
        let mut found = Map::new();
        for caps in field_regex().captures_iter(&text) {
            let (Some(name), Some(raw)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            found
                .entry(name.as_str().to_string())
                .or_insert_with(|| Value::String(unescape_fully(raw.as_str())));
        }
        if !found.is_empty() {
            carry_status(&text, &mut found);
            return Some(found);
        }

        let next = unescape_once(&text);
        if next == text {
            break;
        }
        text = next;
    }
    None
}

fn carry_status(text: &str, found: &mut Map<String, Value>) {
    let Some(flag) = success_regex().captures(text).and_then(|c| c.get(1)) else {
        return;
    };
    let success = flag.as_str() == "true";
    found.insert("success".to_string(), Value::Bool(success));
    if success {
        return;
    }
    if let Some(error) = error_regex().captures(text).and_then(|c| c.get(1)) {
        found.insert(
            "error".to_string(),
            Value::String(unescape_fully(error.as_str())),
        );
    }
}

/// Remove one level of JSON string escaping (`\n`, `\t`, `\"`, `\\`, `\/`).
/// Unknown escapes are kept as written.
pub fn unescape_once(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Un-escape repeatedly until no escape sequences remain.
pub fn unescape_fully(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_UNESCAPE_PASSES {
        if !has_escape(&current) {
            break;
        }
        let next = unescape_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn has_escape(text: &str) -> bool {
    ["\\n", "\\t", "\\\"", "\\\\"].iter().any(|seq| text.contains(seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_field_is_found() {
        let fields = scan_embedded_fields(&json!({"domainAnalysis": "Orders"})).unwrap();
        assert_eq!(fields["domainAnalysis"], "Orders");
    }

    #[test]
    fn doubly_encoded_field_is_unescaped() {
        let inner = json!({"domainAnalysis": "Line one\nSay \"hi\""}).to_string();
        let value = json!({"payload": inner});
        let fields = scan_embedded_fields(&value).unwrap();
        assert_eq!(fields["domainAnalysis"], "Line one\nSay \"hi\"");
    }

    #[test]
    fn triply_encoded_field_is_unescaped() {
        let inner = json!({"asciiDiagram": "a\nb"}).to_string();
        let middle = json!({"body": inner}).to_string();
        let value = json!({"response": middle});
        let fields = scan_embedded_fields(&value).unwrap();
        assert_eq!(fields["asciiDiagram"], "a\nb");
    }

    #[test]
    fn first_occurrence_wins() {
        let value = json!({"a": {"domainAnalysis": "first"}, "b": {"domainAnalysis": "second"}});
        let fields = scan_embedded_fields(&value).unwrap();
        assert_eq!(fields["domainAnalysis"], "first");
    }

    #[test]
    fn embedded_failure_status_is_carried() {
        let inner = json!({"success": false, "error": "quota \"exceeded\"", "domainAnalysis": "partial"})
            .to_string();
        let fields = scan_embedded_fields(&json!({"output": {"text": inner}})).unwrap();
        assert_eq!(fields["success"], false);
        assert_eq!(fields["error"], "quota \"exceeded\"");
        assert_eq!(fields["domainAnalysis"], "partial");
    }

    #[test]
    fn status_absent_when_not_embedded() {
        let fields = scan_embedded_fields(&json!({"domainAnalysis": "Orders"})).unwrap();
        assert!(!fields.contains_key("success"));
    }

    #[test]
    fn nothing_to_find() {
        assert_eq!(scan_embedded_fields(&json!({"foo": "bar"})), None);
        assert_eq!(scan_embedded_fields(&json!(42)), None);
    }

    #[test]
    fn unescape_keeps_unknown_sequences() {
        assert_eq!(unescape_once(r"a\nb\qc"), "a\nb\\qc");
    }
}
