//! Structured observability hooks for invocation and reconciliation events.
//!
//! This module provides:
//! - Invocation-scoped tracing spans via [`invocation_span`]
//! - Emission functions for the pipeline's key events
//!
//! Events are emitted at `info!` (or `warn!` for degraded paths). Filter with
//! `APIFORGE_LOG`; select JSON output with the binaries' `--json` flag.

use tracing::{info, warn};

/// Span tagged with the invocation target and mode.
///
/// Attach it to the invocation future with `tracing::Instrument` so events
/// emitted while the call is in flight carry `target` and `mode`.
///
/// # Example
///
/// ```ignore
/// dispatcher.invoke(&req).instrument(invocation_span("analysis-agent", "direct")).await
/// ```
pub fn invocation_span(target: &str, mode: &str) -> tracing::Span {
    tracing::info_span!("apiforge.invocation", target = %target, mode = %mode)
}

pub fn emit_invocation_started(target: &str, mode: &str, payload_bytes: usize) {
    info!(
        event = "invocation.started",
        target = %target,
        mode = %mode,
        payload_bytes = payload_bytes,
    );
}

pub fn emit_invocation_finished(target: &str, duration_ms: u64, success: bool) {
    info!(
        event = "invocation.finished",
        target = %target,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: the caller stopped waiting and the call was cancelled.
pub fn emit_invocation_timeout(target: &str, timeout_ms: u64) {
    warn!(event = "invocation.timeout", target = %target, timeout_ms = timeout_ms);
}

pub fn emit_batch_finished(total: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "batch.finished",
        total = total,
        failed = failed,
        duration_ms = duration_ms,
    );
}

/// Emit event: a response was reconciled via `step`.
pub fn emit_reconciled(step: &str, success: bool) {
    info!(event = "reconcile.completed", step = %step, success = success);
}

pub fn emit_fallback_generated(title: &str, reason: &str) {
    warn!(event = "fallback.generated", title = %title, reason = %reason);
}

pub fn emit_docs_section_failed(section: &str, error: &dyn std::fmt::Display) {
    warn!(event = "docs.section_failed", section = %section, error = %error);
}
