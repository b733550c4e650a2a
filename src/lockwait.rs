//! Lock-queue wait observation.
//!
//! Concurrent workers across the fleet coordinate access to shared
//! network storage through an external lock-file queue. This crate never
//! owns or enforces that queue; it only decides how a long wait should be
//! surfaced in the logs. The longer an operation has been queued, the
//! less often we repeat ourselves:
//!
//! | time in queue | minimum re-log interval |
//! |---------------|-------------------------|
//! | under 5 min   | 30 s                    |
//! | 5 to 15 min   | 60 s                    |
//! | 15 to 30 min  | 120 s                   |
//! | 30 min and up | 240 s                   |

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ManagerContext;

/// Minimum wait before a completed wait is worth a log line
const COMPLETION_LOG_THRESHOLD: Duration = Duration::from_secs(60);

/// Pick the minimum interval between "still waiting" lines for a wait
/// that has lasted `elapsed` so far.
pub fn log_interval_for(elapsed: Duration) -> Duration {
    let minutes = elapsed.as_secs_f64() / 60.0;
    let seconds = if minutes >= 30.0 {
        240
    } else if minutes >= 15.0 {
        120
    } else if minutes >= 5.0 {
        60
    } else {
        30
    };
    Duration::from_secs(seconds)
}

/// Wait bookkeeping for one in-flight operation.
///
/// Created fresh at the start of every top-level retryable operation and
/// discarded when it completes; never shared between operations. The
/// start instant is fixed at construction, so it cannot regress while
/// the operation is in flight.
#[derive(Debug, Clone, Copy)]
pub struct WaitTrackingState {
    wait_start: Instant,
    last_log: Instant,
}

impl WaitTrackingState {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            wait_start: start,
            last_log: start,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.wait_start)
    }

    /// True when the escalating interval since the last emitted line has
    /// passed; updates the last-log marker when it fires.
    pub fn should_log(&mut self, now: Instant) -> bool {
        let interval = log_interval_for(self.elapsed(now));
        if now.saturating_duration_since(self.last_log) >= interval {
            self.last_log = now;
            true
        } else {
            false
        }
    }
}

impl Default for WaitTrackingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging policy around one shared-resource wait.
#[derive(Debug, Clone)]
pub struct LockQueueObserver {
    ctx: Arc<ManagerContext>,
    resource: String,
}

impl LockQueueObserver {
    pub fn new(ctx: Arc<ManagerContext>, resource: impl Into<String>) -> Self {
        Self {
            ctx,
            resource: resource.into(),
        }
    }

    /// Emit a "still waiting" line if the escalating interval has passed.
    /// Returns whether a line was emitted.
    pub fn still_waiting(&self, state: &mut WaitTrackingState, now: Instant) -> bool {
        if !state.should_log(now) {
            return false;
        }
        if self.ctx.debug_level >= 1 {
            tracing::info!(
                manager = %self.ctx.manager_name,
                resource = %self.resource,
                waited_sec = state.elapsed(now).as_secs(),
                "Waiting for lock queue"
            );
        }
        true
    }

    /// Queued-work backlog on each side of the transfer, when the lock
    /// queue exposes it. Chatty, so gated behind the higher debug level.
    /// Returns whether a line was emitted.
    pub fn report_backlog(&self, source_backlog_mb: u64, destination_backlog_mb: u64) -> bool {
        if self.ctx.debug_level < 2 {
            return false;
        }
        tracing::debug!(
            resource = %self.resource,
            source_backlog_mb,
            destination_backlog_mb,
            "Lock queue backlog"
        );
        true
    }

    /// The external queue gave up on us. Informational only: the caller
    /// proceeds and any subsequent copy failure surfaces through the
    /// retry engine. Warns at every debug level, unlike the routine
    /// still-waiting and completion lines. Returns the total time waited.
    pub fn wait_timed_out(&self, state: &WaitTrackingState, now: Instant) -> Duration {
        let waited = state.elapsed(now);
        tracing::warn!(
            resource = %self.resource,
            waited_sec = waited.as_secs(),
            "Timed out waiting for lock queue; proceeding anyway"
        );
        waited
    }

    /// The wait ended normally. Only noteworthy if it actually took a
    /// while.
    pub fn wait_complete(&self, state: &WaitTrackingState, now: Instant) {
        let waited = state.elapsed(now);
        if waited > COMPLETION_LOG_THRESHOLD && self.ctx.debug_level >= 1 {
            tracing::info!(
                resource = %self.resource,
                waited_sec = waited.as_secs(),
                "Exited lock queue"
            );
        }
    }
}
