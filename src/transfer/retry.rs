use std::future::Future;
use std::time::Duration;

use crate::error::{Result, StagehandError};

/// Each failed attempt multiplies the holdoff by this when escalation is on
pub const HOLDOFF_GROWTH_FACTOR: f64 = 1.5;

/// Compute the sleep durations preceding each retry.
///
/// With escalation, the sleep before attempt `k` (1-indexed, `k >= 2`)
/// is `initial * 1.5^(k-2)`, compounding across failures.
pub fn holdoff_schedule(initial: Duration, escalate: bool, retries: u32) -> Vec<Duration> {
    let mut schedule = Vec::with_capacity(retries as usize);
    let mut holdoff = initial.as_secs_f64();
    for _ in 0..retries {
        schedule.push(Duration::from_secs_f64(holdoff));
        if escalate {
            holdoff *= HOLDOFF_GROWTH_FACTOR;
        }
    }
    schedule
}

/// Notification fired after a failed attempt, before the holdoff sleep.
/// Embedders use this to drop caches or otherwise free memory between
/// attempts.
pub type RetryNotify = dyn Fn(u32, &StagehandError) + Send + Sync;

/// Run `op` up to `total_attempts` times, sleeping between failures
/// according to [`holdoff_schedule`].
///
/// Only raw I/O errors are retried; typed precondition and
/// would-overwrite errors short-circuit immediately so a caller never
/// burns its budget on something that cannot succeed. Returns the value
/// together with the number of attempts consumed. Exhausting the budget
/// yields [`StagehandError::ExcessiveFailures`].
pub async fn run_with_retry<T, F, Fut>(
    operation: &str,
    total_attempts: u32,
    holdoff: Duration,
    escalate: bool,
    on_retry: Option<&(dyn Fn(u32, &StagehandError) + Send + Sync)>,
    mut op: F,
) -> Result<(T, u32)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = total_attempts.max(1);
    let schedule = holdoff_schedule(holdoff, escalate, attempts - 1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(err) if err.is_retryable() => {
                last_error = err.to_string();
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = attempts,
                    error = %err,
                    "Attempt failed"
                );
                if attempt < attempts {
                    if let Some(notify) = on_retry {
                        notify(attempt, &err);
                    }
                    tokio::time::sleep(schedule[(attempt - 1) as usize]).await;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(StagehandError::ExcessiveFailures {
        operation: operation.to_string(),
        attempts,
        last_error,
    })
}
