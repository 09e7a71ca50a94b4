//! Response reconciliation.
//!
//! Agents answer in inconsistent envelopes: a bare result object, a
//! `{statusCode, body}` wrapper (sometimes nested), free text with a
//! heading, or a result serialized several times over. [`reconcile`] runs a
//! fixed table of parsers over the value and returns the first match as a
//! flat [`AnalysisResult`], tagged with the [`ReconcileStep`] that produced
//! it:
//!
//! 1. [`ReconcileStep::Normalized`]: an object with a `success` key
//! 2. [`ReconcileStep::MarkedText`]: a string classified by its markers
//! 3. [`ReconcileStep::Envelope`]: a `body` wrapper, unwrapped recursively
//! 4. [`ReconcileStep::DeepScan`]: a diagram search, then a textual scan
//! 5. [`ReconcileStep::Unrecognized`]: an explicit failure
//!
//! Whatever step matches, `businessContextAnalysis` and
//! `boundedContextAnalysis` are both populated when either is.

mod diagram;
mod embedded;
mod markers;
mod scan;

pub use diagram::{find_ascii_diagram, is_ascii_diagram, DIAGRAM_KEYS, MAX_DIAGRAM_DEPTH};
pub use embedded::extract_embedded_json;
pub use markers::{classify_text, ContentKind};
pub use scan::{scan_embedded_fields, unescape_fully};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dispatch::direct::{error_message, status_code};
use crate::dispatch::InvocationResult;
use crate::metrics::METRICS;
use crate::obs;

/// Maximum number of nested `body` wrappers unwrapped by the envelope step.
pub const MAX_ENVELOPE_DEPTH: usize = 4;

pub const UNEXPECTED_FORMAT: &str = "Unexpected result format";

/// The flat, normalized analysis shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_analysis: Option<Value>,
    /// Alias of `bounded_context_analysis`, kept for older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_context_analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounded_context_analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ascii_diagram: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub retryable: bool,
    /// Every other top-level key the agent returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl AnalysisResult {
    pub fn failure(error: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            retryable,
            ..Self::default()
        }
    }

    pub fn unexpected_format() -> Self {
        Self::failure(UNEXPECTED_FORMAT, false)
    }

    /// Failure carried by a non-successful invocation.
    pub fn from_failed_invocation(result: &InvocationResult) -> Self {
        Self::failure(
            result
                .error
                .clone()
                .unwrap_or_else(|| "invocation failed".to_string()),
            result.retryable,
        )
    }

    /// Successful result holding `text` under the field for `kind`.
    pub fn from_content(kind: ContentKind, text: impl Into<String>) -> Self {
        let mut result = Self {
            success: true,
            ..Self::default()
        };
        result.set_field(kind, Value::String(text.into()));
        result
    }

    /// Bounded-context analysis, whichever alias carries it.
    pub fn context_analysis(&self) -> Option<&Value> {
        self.bounded_context_analysis
            .as_ref()
            .or(self.business_context_analysis.as_ref())
    }

    pub fn set_context_analysis(&mut self, value: Value) {
        self.business_context_analysis = Some(value.clone());
        self.bounded_context_analysis = Some(value);
    }

    fn set_field(&mut self, kind: ContentKind, value: Value) {
        match kind {
            ContentKind::Domain => self.domain_analysis = Some(value),
            ContentKind::BoundedContext => self.set_context_analysis(value),
            ContentKind::AsciiDiagram => self.ascii_diagram = Some(value),
        }
    }

    /// Populate whichever context alias is missing from the other.
    pub fn backfill_aliases(&mut self) {
        match (
            &self.business_context_analysis,
            &self.bounded_context_analysis,
        ) {
            (Some(business), None) => self.bounded_context_analysis = Some(business.clone()),
            (None, Some(bounded)) => self.business_context_analysis = Some(bounded.clone()),
            _ => {}
        }
    }

    /// Fill fields this result lacks from `other`. Used to combine the
    /// parts of a full analysis.
    pub fn merge_from(&mut self, other: AnalysisResult) {
        self.success |= other.success;
        if self.domain_analysis.is_none() {
            self.domain_analysis = other.domain_analysis;
        }
        if self.bounded_context_analysis.is_none() {
            self.bounded_context_analysis = other.bounded_context_analysis;
        }
        if self.business_context_analysis.is_none() {
            self.business_context_analysis = other.business_context_analysis;
        }
        if self.ascii_diagram.is_none() {
            self.ascii_diagram = other.ascii_diagram;
        }
        for (key, value) in other.extra {
            self.extra.entry(key).or_insert(value);
        }
        self.backfill_aliases();
    }

    /// Build from an object that already has the flat shape.
    fn from_object(map: &Map<String, Value>) -> Self {
        let mut result = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "success" => result.success = truthy(value),
                "domainAnalysis" => result.domain_analysis = non_null(value),
                "businessContextAnalysis" => result.business_context_analysis = non_null(value),
                "boundedContextAnalysis" => result.bounded_context_analysis = non_null(value),
                "asciiDiagram" => result.ascii_diagram = non_null(value),
                "error" => result.error = error_text(value),
                "retryable" => result.retryable = truthy(value),
                _ => {
                    result.extra.insert(key.clone(), value.clone());
                }
            }
        }
        result.backfill_aliases();
        result
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn non_null(value: &Value) -> Option<Value> {
    (!value.is_null()).then(|| value.clone())
}

fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => error_message(other).or_else(|| Some(other.to_string())),
    }
}

/// Which parser produced a reconciled result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileStep {
    Normalized,
    MarkedText,
    Envelope,
    DeepScan,
    Unrecognized,
}

impl ReconcileStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileStep::Normalized => "normalized",
            ReconcileStep::MarkedText => "marked-text",
            ReconcileStep::Envelope => "envelope",
            ReconcileStep::DeepScan => "deep-scan",
            ReconcileStep::Unrecognized => "unrecognized",
        }
    }
}

/// A reconciled result plus the step that matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciled {
    pub step: ReconcileStep,
    pub result: AnalysisResult,
}

type Parser = fn(&Value, usize) -> Option<AnalysisResult>;

/// The parser table, tried in order.
const PARSERS: [(ReconcileStep, Parser); 4] = [
    (ReconcileStep::Normalized, parse_normalized),
    (ReconcileStep::MarkedText, parse_marked_text),
    (ReconcileStep::Envelope, parse_envelope),
    (ReconcileStep::DeepScan, parse_deep_scan),
];

/// Normalize `value` into the flat result shape.
///
/// Never fails: an unclassifiable value becomes
/// `{success: false, error: "Unexpected result format"}`.
pub fn reconcile(value: &Value) -> Reconciled {
    let reconciled = PARSERS
        .iter()
        .find_map(|(step, parse)| {
            parse(value, 0).map(|result| Reconciled {
                step: *step,
                result,
            })
        })
        .unwrap_or_else(|| Reconciled {
            step: ReconcileStep::Unrecognized,
            result: AnalysisResult::unexpected_format(),
        });

    if reconciled.step == ReconcileStep::Unrecognized {
        METRICS.inc_reconcile_failures();
    }
    obs::emit_reconciled(reconciled.step.as_str(), reconciled.result.success);
    reconciled
}

/// Reconcile the outcome of an invocation: failures pass through as
/// failure results, successes have their `data` reconciled.
pub fn reconcile_invocation(result: &InvocationResult) -> AnalysisResult {
    if result.success {
        reconcile(&result.data).result
    } else {
        AnalysisResult::from_failed_invocation(result)
    }
}

fn parse_normalized(value: &Value, _depth: usize) -> Option<AnalysisResult> {
    let map = value.as_object()?;
    map.contains_key("success")
        .then(|| AnalysisResult::from_object(map))
}

fn parse_marked_text(value: &Value, _depth: usize) -> Option<AnalysisResult> {
    let text = value.as_str()?;
    classify_text(text).map(|kind| AnalysisResult::from_content(kind, text))
}

/// Steps 1-3 only; used when recursing into an envelope body.
fn parse_structural(value: &Value, depth: usize) -> Option<AnalysisResult> {
    parse_normalized(value, depth)
        .or_else(|| parse_marked_text(value, depth))
        .or_else(|| parse_envelope(value, depth))
}

fn parse_envelope(value: &Value, depth: usize) -> Option<AnalysisResult> {
    if depth >= MAX_ENVELOPE_DEPTH {
        return None;
    }
    let body = value.as_object()?.get("body")?;

    let inner = match body {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed) => parsed,
            Err(_) => Value::String(text.clone()),
        },
        other => other.clone(),
    };

    if let Some(status) = status_code(value) {
        if status >= 400 {
            let message = error_message(&inner)
                .unwrap_or_else(|| format!("upstream returned status {status}"));
            return Some(AnalysisResult::failure(message, status == 504));
        }
    }

    match &inner {
        Value::String(text) => {
            classify_text(text).map(|kind| AnalysisResult::from_content(kind, text.as_str()))
        }
        Value::Object(_) => parse_structural(&inner, depth + 1),
        _ => None,
    }
}

fn parse_deep_scan(value: &Value, _depth: usize) -> Option<AnalysisResult> {
    if !(value.is_object() || value.is_array() || value.is_string()) {
        return None;
    }
    if let Some(diagram) = find_ascii_diagram(value, MAX_DIAGRAM_DEPTH) {
        return Some(AnalysisResult::from_content(
            ContentKind::AsciiDiagram,
            diagram,
        ));
    }
    let mut fields = scan_embedded_fields(value)?;
    fields
        .entry("success".to_string())
        .or_insert(Value::Bool(true));
    Some(AnalysisResult::from_object(&fields))
}
