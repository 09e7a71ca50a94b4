//! Scripted transport for tests.
//!
//! `ScriptedTransport` answers each target from a script: a fixed response,
//! a transport failure, or a closure over the decoded payload. Every script
//! can be delayed, which together with a paused tokio clock drives the
//! timeout and cancellation paths deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatch::{RawResponse, Transport};
use crate::error::{ForgeError, ForgeResult};

type Responder = Arc<dyn Fn(&Value) -> ForgeResult<RawResponse> + Send + Sync>;

#[derive(Clone)]
enum Script {
    Fixed(RawResponse),
    Fail(String),
    Respond(Responder),
}

#[derive(Clone)]
struct Entry {
    script: Script,
    delay: Duration,
}

/// In-memory [`Transport`] that both `invoke_function` and `post_signed`
/// route through, keyed by function name or URL.
///
/// Unscripted targets fail with [`ForgeError::Transport`].
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Entry>>,
    payloads: Mutex<HashMap<String, Vec<Value>>>,
    completions: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, target: &str, response: RawResponse) {
        self.script(target, Script::Fixed(response), Duration::ZERO);
    }

    /// Respond only after `delay` has elapsed.
    pub fn respond_after(&self, target: &str, delay: Duration, response: RawResponse) {
        self.script(target, Script::Fixed(response), delay);
    }

    /// Fail every call to `target` with a transport error.
    pub fn fail(&self, target: &str, message: &str) {
        self.script(target, Script::Fail(message.to_string()), Duration::ZERO);
    }

    /// Compute the response from the decoded payload.
    pub fn respond_with<F>(&self, target: &str, responder: F)
    where
        F: Fn(&Value) -> ForgeResult<RawResponse> + Send + Sync + 'static,
    {
        self.respond_with_after(target, Duration::ZERO, responder);
    }

    pub fn respond_with_after<F>(&self, target: &str, delay: Duration, responder: F)
    where
        F: Fn(&Value) -> ForgeResult<RawResponse> + Send + Sync + 'static,
    {
        self.script(target, Script::Respond(Arc::new(responder)), delay);
    }

    /// Payloads received for `target`, in arrival order.
    pub fn payloads(&self, target: &str) -> Vec<Value> {
        lock(&self.payloads).get(target).cloned().unwrap_or_default()
    }

    /// Calls to `target` that ran to completion (were not cancelled).
    pub fn completions(&self, target: &str) -> usize {
        lock(&self.completions).get(target).copied().unwrap_or(0)
    }

    /// Highest number of simultaneously in-flight calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Calls currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn script(&self, target: &str, script: Script, delay: Duration) {
        lock(&self.scripts).insert(target.to_string(), Entry { script, delay });
    }

    async fn handle(&self, target: &str, payload: Vec<u8>) -> ForgeResult<RawResponse> {
        let value = serde_json::from_slice::<Value>(&payload).unwrap_or(Value::Null);
        lock(&self.payloads)
            .entry(target.to_string())
            .or_default()
            .push(value.clone());

        let entry = lock(&self.scripts).get(target).cloned().ok_or_else(|| {
            ForgeError::Transport(format!("no scripted response for {target}"))
        })?;

        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        if !entry.delay.is_zero() {
            tokio::time::sleep(entry.delay).await;
        }

        let outcome = match entry.script {
            Script::Fixed(response) => Ok(response),
            Script::Fail(message) => Err(ForgeError::Transport(message)),
            Script::Respond(responder) => responder(&value),
        };
        *lock(&self.completions).entry(target.to_string()).or_default() += 1;
        outcome
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn invoke_function(&self, function: &str, payload: Vec<u8>) -> ForgeResult<RawResponse> {
        self.handle(function, payload).await
    }

    async fn post_signed(&self, url: &str, payload: Vec<u8>) -> ForgeResult<RawResponse> {
        self.handle(url, payload).await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Tracks in-flight calls; decrements on drop so cancelled calls are
/// accounted for.
struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
