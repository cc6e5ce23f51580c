//! Timeout policy bounding outbound calls.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// The wrapped future did not finish in time and was dropped (cancelling it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    /// Time spent before giving up.
    pub elapsed: Duration,
    /// Configured bound.
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    duration: Duration,
}

impl TimeoutPolicy {
    /// Create a timeout policy. Panics if duration is zero or `Duration::MAX`.
    pub fn new(duration: Duration) -> Self {
        assert!(
            duration > Duration::ZERO && duration < Duration::MAX,
            "timeout duration must be non-zero and finite",
        );
        Self { duration }
    }

    /// Inspect the configured timeout duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run `future`, dropping it if it outlives the bound.
    pub async fn execute<F>(&self, future: F) -> Result<F::Output, Elapsed>
    where
        F: Future,
    {
        let start = Instant::now();

        match tokio::time::timeout(self.duration, future).await {
            Ok(output) => Ok(output),
            Err(_) => Err(Elapsed { elapsed: start.elapsed(), timeout: self.duration }),
        }
    }
}
