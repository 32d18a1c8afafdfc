// ── Bounded retry poller ──
//
// Retry an attempt at a fixed interval until it succeeds or the wall-clock
// budget runs out. The only looping construct in a provisioning run; every
// iteration suspends on a sleep that races the cancellation token.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Polling policy: total wall-clock budget and fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub max_elapsed: Duration,
    pub interval: Duration,
}

impl RetryBudget {
    pub const fn new(max_elapsed: Duration, interval: Duration) -> Self {
        Self {
            max_elapsed,
            interval,
        }
    }
}

/// Why polling stopped without a success.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The next delay would have overrun the budget.
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        last: E,
    },
    /// The cancellation token fired before the next attempt.
    Cancelled,
}

/// Run `attempt` until it returns `Ok`, the budget is spent, or `cancel` fires.
///
/// After a failed attempt the poller sleeps exactly `budget.interval`,
/// unless that sleep would push elapsed time past `budget.max_elapsed`, in
/// which case it stops and surfaces the last error. An in-flight attempt
/// is not interrupted; cancellation is honored before each attempt and
/// during each sleep.
pub async fn retry<T, E, F, Fut>(
    budget: RetryBudget,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        attempts += 1;
        let err = match attempt(attempts).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let elapsed = started.elapsed();
        trace!(attempt = attempts, error = %err, elapsed_ms = millis(elapsed), "attempt failed");

        if elapsed + budget.interval > budget.max_elapsed {
            return Err(RetryError::Exhausted {
                attempts,
                elapsed,
                last: err,
            });
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RetryError::Cancelled),
            () = tokio::time::sleep(budget.interval) => {}
        }
    }
}

pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
