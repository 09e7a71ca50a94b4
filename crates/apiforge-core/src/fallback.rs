//! Deterministic documentation derived straight from an OpenAPI document.
//!
//! Used when the documentation agent is unavailable. The output has the
//! same shape as a generated [`DocumentationBundle`] so consumers need no
//! special handling beyond the `fallback` flag. No I/O, no clock, no
//! randomness: the same input always serializes to the same bytes.

use serde_json::{json, Map, Value};

use crate::docs::DocumentationBundle;

pub const DEFAULT_REQUESTS_PER_MINUTE: u64 = 100;
pub const DEFAULT_BURST_LIMIT: u64 = 20;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_API_VERSION: &str = "1.0.0";
pub const DEFAULT_API_TITLE: &str = "API";

const DEPRECATION_POLICY: &str =
    "Deprecated versions remain available for 6 months after their successor is released";

/// Operation keys recognised under a path item, in emission order.
const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Build the fallback bundle for `spec`.
pub fn generate_fallback_bundle(spec: &Value) -> DocumentationBundle {
    DocumentationBundle {
        security_definitions: Some(security_definitions(spec)),
        policies: Some(policies(spec)),
        documentation: Some(documentation(spec)),
        versioning: Some(versioning(spec)),
        fallback: true,
        ..DocumentationBundle::default()
    }
}

/// One operation of the spec with the path-level parameters merged in.
struct Operation<'a> {
    method: &'static str,
    path: &'a str,
    op: &'a Map<String, Value>,
    parameters: Vec<Value>,
}

impl Operation<'_> {
    fn key(&self) -> String {
        format!("{} {}", self.method.to_ascii_uppercase(), self.path)
    }

    fn has_request_body(&self) -> bool {
        self.op.contains_key("requestBody")
            || self
                .parameters
                .iter()
                .any(|p| p.get("in").and_then(Value::as_str) == Some("body"))
    }

    fn required_parameters(&self) -> Vec<Value> {
        self.parameters
            .iter()
            .filter(|p| {
                p.get("required").and_then(Value::as_bool).unwrap_or(false)
                    || p.get("in").and_then(Value::as_str) == Some("path")
            })
            .filter_map(|p| p.get("name").cloned())
            .collect()
    }

    fn query_parameter_names(&self) -> Vec<Value> {
        self.parameters
            .iter()
            .filter(|p| p.get("in").and_then(Value::as_str) == Some("query"))
            .filter_map(|p| p.get("name").cloned())
            .collect()
    }
}

fn paths(spec: &Value) -> impl Iterator<Item = (&str, &Map<String, Value>)> {
    spec.get("paths")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|paths| paths.iter())
        .filter_map(|(path, item)| item.as_object().map(|item| (path.as_str(), item)))
}

fn operations(spec: &Value) -> Vec<Operation<'_>> {
    let mut out = Vec::new();
    for (path, item) in paths(spec) {
        let shared = item
            .get("parameters")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for method in HTTP_METHODS {
            let Some(op) = item.get(method).and_then(Value::as_object) else {
                continue;
            };
            let mut parameters = shared.clone();
            if let Some(own) = op.get("parameters").and_then(Value::as_array) {
                parameters.extend(own.iter().cloned());
            }
            out.push(Operation {
                method,
                path,
                op,
                parameters,
            });
        }
    }
    out
}

fn info_str<'a>(spec: &'a Value, field: &str) -> Option<&'a str> {
    spec.get("info").and_then(|i| i.get(field)).and_then(Value::as_str)
}

fn api_version(spec: &Value) -> String {
    info_str(spec, "version")
        .unwrap_or(DEFAULT_API_VERSION)
        .to_string()
}

fn security_definitions(spec: &Value) -> Value {
    spec.pointer("/components/securitySchemes")
        .or_else(|| spec.get("securityDefinitions"))
        .filter(|v| v.is_object())
        .cloned()
        .unwrap_or_else(|| json!({}))
}

fn policies(spec: &Value) -> Value {
    let mut rate_limiting = Map::new();
    for (path, _) in paths(spec) {
        rate_limiting.insert(
            path.to_string(),
            json!({
                "requestsPerMinute": DEFAULT_REQUESTS_PER_MINUTE,
                "burstLimit": DEFAULT_BURST_LIMIT,
            }),
        );
    }

    let mut caching = Map::new();
    let mut validation = Map::new();
    for operation in operations(spec) {
        if operation.method == "get" {
            let mut vary_by = vec![json!("Authorization")];
            vary_by.extend(operation.query_parameter_names());
            caching.insert(
                operation.path.to_string(),
                json!({
                    "ttlSeconds": DEFAULT_CACHE_TTL_SECS,
                    "varyBy": vary_by,
                }),
            );
        }

        if operation.has_request_body() || !operation.parameters.is_empty() {
            validation.insert(
                operation.key(),
                json!({
                    "validateRequestBody": operation.has_request_body(),
                    "requiredParameters": operation.required_parameters(),
                }),
            );
        }
    }

    json!({
        "rateLimiting": rate_limiting,
        "caching": caching,
        "validation": validation,
    })
}

fn documentation(spec: &Value) -> Value {
    let mut ops = Map::new();
    for operation in operations(spec) {
        let field = |name: &str, default: Value| operation.op.get(name).cloned().unwrap_or(default);
        ops.insert(
            operation.key(),
            json!({
                "summary": field("summary", json!("")),
                "description": field("description", json!("")),
                "tags": field("tags", json!([])),
                "parameters": operation.parameters,
                "responses": field("responses", json!({})),
            }),
        );
    }

    json!({
        "title": info_str(spec, "title").unwrap_or(DEFAULT_API_TITLE),
        "version": api_version(spec),
        "description": info_str(spec, "description").unwrap_or(""),
        "operations": ops,
    })
}

fn versioning(spec: &Value) -> Value {
    let current = api_version(spec);
    json!({
        "currentVersion": current,
        "strategy": "uri",
        "supportedVersions": [current],
        "deprecationPolicy": DEPRECATION_POLICY,
    })
}
