//! Reconciler contracts over realistic agent responses.

use apiforge_core::reconcile::{reconcile, ReconcileStep, MAX_ENVELOPE_DEPTH};
use apiforge_core::{reconcile_invocation, AnalysisResult, InvocationResult};
use serde_json::{json, Value};

fn samples() -> Vec<Value> {
    vec![
        json!({"success": true, "domainAnalysis": "Orders, Customers", "model": "claude"}),
        json!({"success": true, "businessContextAnalysis": "Sales context"}),
        json!({"success": false, "error": "model overloaded", "retryable": true}),
        json!("## Domain Analysis\nEntities: Order, Invoice"),
        json!("Bounded Context: Billing\nUpstream of Shipping"),
        json!({"statusCode": 200, "body": "{\"success\":true,\"asciiDiagram\":\"+--+\"}"}),
        json!({"statusCode": 503, "body": "{\"error\":\"unavailable\"}"}),
        json!({"foo": "bar"}),
        json!(42),
    ]
}

/// Payloads every envelope shape must reconcile to the same result as.
fn recognized_payloads() -> Vec<Value> {
    vec![
        json!({"success": true, "domainAnalysis": "Orders, Customers", "model": "claude"}),
        json!({"success": true, "businessContextAnalysis": "Sales context"}),
        json!({"success": false, "error": "model overloaded", "retryable": true}),
        json!("## Domain Analysis\nEntities: Order, Invoice"),
        json!("Bounded Context: Billing\nUpstream of Shipping"),
    ]
}

/// What a transport puts in `body`: marker text as-is, JSON serialized.
fn body_text(value: &Value) -> String {
    match value.as_str() {
        Some(text) => text.to_string(),
        None => value.to_string(),
    }
}

#[test]
fn envelope_shapes_do_not_change_result() {
    for value in recognized_payloads() {
        let plain = reconcile(&value);
        assert_ne!(plain.step, ReconcileStep::Unrecognized, "{value}");

        let shapes = [
            json!({"statusCode": 200, "body": body_text(&value)}),
            json!({"body": body_text(&value)}),
            json!({"body": {"body": body_text(&value)}}),
            json!({"statusCode": "200", "body": {"statusCode": 200, "body": body_text(&value)}}),
        ];
        for wrapped in shapes {
            let via_envelope = reconcile(&wrapped);
            assert_eq!(via_envelope.step, ReconcileStep::Envelope, "{wrapped}");
            assert_eq!(via_envelope.result, plain.result, "{wrapped}");
        }
    }
}

#[test]
fn repeated_string_envelopes_do_not_change_result() {
    for value in recognized_payloads() {
        let plain = reconcile(&value).result;
        let mut wrapped = json!({"statusCode": 200, "body": body_text(&value)});
        for depth in 1..MAX_ENVELOPE_DEPTH {
            let via_envelope = reconcile(&wrapped);
            assert_eq!(via_envelope.step, ReconcileStep::Envelope, "depth {depth}");
            assert_eq!(via_envelope.result, plain, "depth {depth} for {value}");
            wrapped = json!({"statusCode": 200, "body": wrapped.to_string()});
        }
    }
}

#[test]
fn marker_text_matches_its_wrapped_form() {
    let text = "## Domain Analysis\nAggregates: Order";
    let bare = reconcile(&json!(text));
    let wrapped = reconcile(&json!({"body": text}));
    assert_eq!(bare.step, ReconcileStep::MarkedText);
    assert_eq!(wrapped.step, ReconcileStep::Envelope);
    assert_eq!(bare.result, wrapped.result);
    assert_eq!(bare.result.domain_analysis, Some(json!(text)));
}

#[test]
fn object_nested_envelope_reaches_inner_result() {
    let value = json!({"body": {"body": "{\"success\":true,\"domainAnalysis\":\"D\"}"}});
    let reconciled = reconcile(&value);
    assert_eq!(reconciled.step, ReconcileStep::Envelope);
    assert!(reconciled.result.success);
    assert_eq!(reconciled.result.domain_analysis, Some(json!("D")));
}

#[test]
fn deep_scan_keeps_embedded_failure() {
    let inner = json!({"success": false, "error": "quota exceeded", "domainAnalysis": "partial"})
        .to_string();
    let value = json!({"output": {"text": inner}});

    let reconciled = reconcile(&value);
    assert_eq!(reconciled.step, ReconcileStep::DeepScan);
    assert!(!reconciled.result.success);
    assert_eq!(reconciled.result.error.as_deref(), Some("quota exceeded"));
    assert_eq!(reconciled.result.domain_analysis, Some(json!("partial")));
}

#[test]
fn deep_scan_keeps_failure_below_envelope_limit() {
    let mut value = json!({"success": false, "error": "too deep", "domainAnalysis": "Orders"});
    for _ in 0..(MAX_ENVELOPE_DEPTH + 1) {
        value = json!({"body": value.to_string()});
    }
    let reconciled = reconcile(&value);
    assert_eq!(reconciled.step, ReconcileStep::DeepScan);
    assert!(!reconciled.result.success);
    assert_eq!(reconciled.result.error.as_deref(), Some("too deep"));
}

#[test]
fn context_aliases_are_always_both_set() {
    let values = [
        json!({"success": true, "businessContextAnalysis": "B"}),
        json!({"success": true, "boundedContextAnalysis": "B"}),
        json!("Business context: B"),
        json!({"statusCode": 200, "body": "{\"success\":true,\"boundedContextAnalysis\":\"B\"}"}),
        json!({"wrapped": "{\"boundedContextAnalysis\": \"B\"}"}),
    ];
    for value in values {
        let result = reconcile(&value).result;
        assert!(result.success, "{value}");
        assert_eq!(
            result.business_context_analysis, result.bounded_context_analysis,
            "{value}"
        );
        assert!(result.bounded_context_analysis.is_some(), "{value}");
    }
}

#[test]
fn reconcile_is_idempotent() {
    for value in samples() {
        let once = reconcile(&value).result;
        let serialized = serde_json::to_value(&once).unwrap();
        let twice = reconcile(&serialized);
        assert_eq!(twice.step, ReconcileStep::Normalized, "{value}");
        assert_eq!(twice.result, once, "{value}");
    }
}

#[test]
fn deep_scan_recovers_triple_encoded_field() {
    let inner = json!({"domainAnalysis": "Aggregates: Order"}).to_string();
    let twice = serde_json::to_string(&inner).unwrap();
    let value = json!({"output": {"text": twice}});

    let reconciled = reconcile(&value);
    assert_eq!(reconciled.step, ReconcileStep::DeepScan);
    assert!(reconciled.result.success);
    assert_eq!(
        reconciled.result.domain_analysis,
        Some(json!("Aggregates: Order"))
    );
}

#[test]
fn diagram_found_anywhere_in_response() {
    let diagram = "┌────────┐      ┌──────────┐\n│ Orders │─────▶│ Invoices │\n└────────┘      └──────────┘";
    let value = json!({"result": {"content": [{"text": diagram}]}});
    let reconciled = reconcile(&value);
    assert_eq!(reconciled.step, ReconcileStep::DeepScan);
    assert_eq!(reconciled.result.ascii_diagram, Some(json!(diagram)));
}

#[test]
fn earliest_marker_decides_classification() {
    let text = "Domain model first.\nThen the bounded context section.";
    let result = reconcile(&json!(text)).result;
    assert_eq!(result.domain_analysis, Some(json!(text)));
    assert!(result.bounded_context_analysis.is_none());
}

#[test]
fn unrecognized_is_explicit_failure() {
    let result = reconcile(&json!({"foo": "bar"})).result;
    assert_eq!(result, AnalysisResult::unexpected_format());
    assert_eq!(result.error.as_deref(), Some("Unexpected result format"));
}

#[test]
fn failed_invocations_pass_through() {
    let result = reconcile_invocation(&InvocationResult::failed("function crashed"));
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("function crashed"));
    assert!(!result.retryable);
}
