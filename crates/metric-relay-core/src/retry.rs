//! Bounded retry with error classification.
//!
//! The schedule is part of the cross-process contract: the first delay
//! is 1s and each subsequent delay is the previous one doubled plus 2s
//! (1s, 4s, 10s, 22s, ...). Monotonic, at least doubling plus a 2s
//! additive floor.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const DELAY_FLOOR: Duration = Duration::from_secs(2);

/// Run `action` with up to `retries` re-attempts (so `retries + 1`
/// attempts in total).
///
/// The action's error is classified by `is_retriable`: a non-retriable
/// error, or a retriable one on the final attempt, is returned as-is.
/// Success short-circuits immediately. Delays between attempts follow
/// the module-level schedule.
///
/// # Examples
///
/// ```rust
/// use metric_relay_core::run_with_retries;
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() {
/// let result: Result<u32, &str> =
///     run_with_retries("demo", 2, || async { Ok(7) }, |_| true).await;
/// assert_eq!(result, Ok(7));
/// # }
/// ```
pub async fn run_with_retries<T, E, F, Fut, C>(
    title: &str,
    retries: u32,
    mut action: F,
    is_retriable: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    C: Fn(&E) -> bool,
{
    let mut delay = INITIAL_DELAY;

    for attempt in 1..=retries + 1 {
        debug!(title, attempt, "executing action");

        let err = match action().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt > retries || !is_retriable(&err) {
            return Err(err);
        }

        warn!(
            title,
            attempt,
            error = %err,
            delay_secs = delay.as_secs(),
            "action failed, retrying"
        );
        tokio::time::sleep(delay).await;
        delay = delay * 2 + DELAY_FLOOR;
    }

    unreachable!("loop returns on final attempt")
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
