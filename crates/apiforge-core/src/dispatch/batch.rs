use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::{Dispatcher, InvocationRequest, InvocationResult};
use crate::metrics::METRICS;
use crate::obs;

impl Dispatcher {
    /// Dispatch every request concurrently and collect results positionally.
    ///
    /// At most `max_concurrent` requests are in flight; each gets its own
    /// `timeout`, started once it is admitted. A failed, timed-out or
    /// panicked item becomes `{success: false, error, fallback: true}` in its
    /// slot; siblings are unaffected and the batch itself never fails.
    ///
    /// Dropping the returned future aborts every outstanding request.
    pub async fn invoke_parallel(
        &self,
        requests: Vec<InvocationRequest>,
        timeout: Duration,
    ) -> Vec<InvocationResult> {
        let started = Instant::now();
        let total = requests.len();
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut join_set = JoinSet::new();

        for (idx, request) in requests.into_iter().enumerate() {
            let dispatcher = self.clone();
            let permits = Arc::clone(&permits);
            join_set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = match tokio::time::timeout(timeout, dispatcher.invoke(&request)).await {
                    Ok(Ok(result)) => InvocationResult {
                        fallback: result.fallback || !result.success,
                        ..result
                    },
                    Ok(Err(e)) => InvocationResult::batch_failure(e.to_string()),
                    Err(_) => {
                        METRICS.inc_timeouts();
                        obs::emit_invocation_timeout(&request.target, timeout.as_millis() as u64);
                        InvocationResult {
                            fallback: true,
                            ..InvocationResult::timed_out(&request.target, timeout)
                        }
                    }
                };
                (idx, result)
            });
        }

        let mut slots: Vec<Option<InvocationResult>> = vec![None; total];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => tracing::warn!(error = %e, "batch invocation task failed"),
            }
        }

        let results: Vec<InvocationResult> = slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| InvocationResult::batch_failure("invocation task aborted"))
            })
            .collect();

        let failed = results.iter().filter(|r| !r.success).count();
        obs::emit_batch_finished(total, failed, started.elapsed().as_millis() as u64);
        results
    }
}
