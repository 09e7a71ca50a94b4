//! Observability tests for the invocation pipeline.
//!
//! Event content is asserted in the `obs` unit tests; here the pipeline is
//! driven end to end under a captured subscriber, and the global counters
//! are checked to move.

use std::sync::Arc;
use std::time::Duration;

use apiforge_core::fakes::ScriptedTransport;
use apiforge_core::obs::{emit_batch_finished, emit_invocation_timeout, invocation_span};
use apiforge_core::{reconcile, Dispatcher, InvocationRequest, RawResponse, METRICS};
use serde_json::json;
use tracing::Instrument;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn emit_functions_do_not_panic_without_span() {
    emit_invocation_timeout("analysis-agent", 45_000);
    emit_batch_finished(3, 0, 17);
}

#[traced_test]
#[tokio::test]
async fn instrumented_future_runs_inside_span() {
    let value = async { 7 }
        .instrument(invocation_span("analysis-agent", "direct"))
        .await;
    assert_eq!(value, 7);
}

#[traced_test]
#[tokio::test]
async fn invocation_counters_advance() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond("ok-agent", RawResponse::ok("{}"));
    transport.fail("bad-agent", "refused");
    let dispatcher = Dispatcher::new(transport);

    let invocations = METRICS.invocations();
    let failures = METRICS.invocation_failures();

    dispatcher
        .invoke(&InvocationRequest::direct("ok-agent", json!({})))
        .await
        .unwrap();
    let _ = dispatcher
        .invoke(&InvocationRequest::direct("bad-agent", json!({})))
        .await;

    assert!(METRICS.invocations() >= invocations + 2);
    assert!(METRICS.invocation_failures() > failures);
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn timeouts_are_counted() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_after("slow", Duration::from_secs(10), RawResponse::ok("{}"));
    let before = METRICS.timeouts();

    let result = Dispatcher::new(transport)
        .invoke_with_timeout(
            &InvocationRequest::direct("slow", json!({})),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert!(result.is_timeout());
    assert!(METRICS.timeouts() > before);
}

#[traced_test]
#[test]
fn unrecognized_responses_are_counted() {
    let before = METRICS.reconcile_failures();
    let reconciled = reconcile(&json!(12345));
    assert!(!reconciled.result.success);
    assert!(METRICS.reconcile_failures() > before);
}
