//! Clock abstraction for testable time-dependent logic
//!
//! Production code uses `SystemClock`, which reads the monotonic clock and
//! sleeps on the tokio timer. Tests use `MockClock`, whose `sleep` advances
//! virtual time instantly, so deadlines measured in minutes run in microseconds.

use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Source of "now" and of the pause between poll attempts
///
/// Injected via `Context` to allow tests to control time.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);

    /// Deadline `wait` from now, computed once when a step starts
    fn deadline_after(&self, wait: Duration) -> Instant {
        self.now() + wait
    }
}

/// Production clock
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Mock clock for testing with controllable time
#[cfg(test)]
#[allow(clippy::expect_used)]
pub struct MockClock {
    start: Instant,
    elapsed: std::sync::Mutex<Duration>,
    sleeps: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl MockClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: std::sync::Mutex::new(Duration::ZERO),
            sleeps: std::sync::Mutex::new(Vec::new()),
        }
    }

    #[allow(dead_code)]
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock().expect("MockClock lock poisoned") += duration;
    }

    /// Virtual time passed since the clock was created
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().expect("MockClock lock poisoned")
    }

    /// Every duration passed to `sleep`, in call order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("MockClock lock poisoned").clone()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .expect("MockClock lock poisoned")
            .push(duration);
        self.advance(duration);
    }
}
