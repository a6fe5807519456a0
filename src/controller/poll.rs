//! Bounded-time polling
//!
//! Every wait in this crate is "repeat an observation every N seconds until it
//! settles or the deadline passes". There is no backoff; callers pick the
//! interval for the resource they watch.

use super::clock::Clock;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::trace;

/// Interval for fast-changing state such as build phase
pub const FAST_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Interval for slower operations such as rollouts and scaling
pub const SLOW_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Result of a single poll attempt
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// Not settled yet, try again after the interval
    Pending,
    Ready(T),
    /// Settled in a state that will not recover; stop without waiting out the deadline
    Failed(E),
}

/// Result of a whole poll loop
#[derive(Debug)]
pub enum PollOutcome<T, E> {
    Ready(T),
    Failed(E),
    TimedOut,
}

/// Run `action` every `interval` while `now < deadline`
///
/// The first attempt runs immediately. After a `Pending` attempt the loop
/// sleeps a full `interval` before checking the deadline again, so it never
/// spins faster than the interval.
pub async fn poll_until<T, E, F, Fut>(
    clock: &dyn Clock,
    deadline: Instant,
    interval: Duration,
    mut action: F,
) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    let mut attempts = 0u32;
    while clock.now() < deadline {
        attempts += 1;
        match action().await {
            Attempt::Ready(value) => return PollOutcome::Ready(value),
            Attempt::Failed(err) => return PollOutcome::Failed(err),
            Attempt::Pending => {
                trace!(attempt = attempts, interval = ?interval, "Not settled yet, sleeping");
                clock.sleep(interval).await;
            }
        }
    }
    PollOutcome::TimedOut
}
