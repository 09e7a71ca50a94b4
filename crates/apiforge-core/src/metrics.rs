//! Global atomic counters for apiforge observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as one `tracing::info!` event,
//! e.g. when the daemon shuts down or a CLI command finishes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters.
pub struct Metrics {
    invocations: AtomicU64,
    invocation_failures: AtomicU64,
    timeouts: AtomicU64,
    fallbacks_generated: AtomicU64,
    reconcile_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            invocations: AtomicU64::new(0),
            invocation_failures: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            fallbacks_generated: AtomicU64::new(0),
            reconcile_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_invocations(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "invocations", "counter incremented");
    }

    pub fn inc_invocation_failures(&self) {
        self.invocation_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "invocation_failures", "counter incremented");
    }

    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "timeouts", "counter incremented");
    }

    pub fn inc_fallbacks(&self) {
        self.fallbacks_generated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fallbacks_generated", "counter incremented");
    }

    pub fn inc_reconcile_failures(&self) {
        self.reconcile_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "reconcile_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            invocations = self.invocations(),
            invocation_failures = self.invocation_failures(),
            timeouts = self.timeouts(),
            fallbacks_generated = self.fallbacks_generated(),
            reconcile_failures = self.reconcile_failures(),
        );
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn invocation_failures(&self) -> u64 {
        self.invocation_failures.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn fallbacks_generated(&self) -> u64 {
        self.fallbacks_generated.load(Ordering::Relaxed)
    }

    pub fn reconcile_failures(&self) -> u64 {
        self.reconcile_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.invocations.store(0, Ordering::Relaxed);
        self.invocation_failures.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
        self.fallbacks_generated.store(0, Ordering::Relaxed);
        self.reconcile_failures.store(0, Ordering::Relaxed);
    }
}
