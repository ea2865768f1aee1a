//! Bounded polling with a monotonic deadline

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::E2eResult;

/// Default timeout for assertions and actions (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// How long to keep polling and how often
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl WaitOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// Result of one probe
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    Ready(T),
    /// Condition not met yet; carries a description of what was observed
    Pending(String),
}

/// Result of a whole polling loop
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { last_observed: String },
}

/// Run `probe` until it reports ready or the deadline passes.
///
/// The probe always runs at least once, even with a zero timeout. Errors from
/// the probe abort the loop immediately.
pub async fn poll_until<T, F, Fut>(options: WaitOptions, mut probe: F) -> E2eResult<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<Probe<T>>>,
{
    let deadline = Instant::now() + options.timeout;
    let mut attempts = 0usize;

    loop {
        attempts += 1;
        let last_observed = match probe().await? {
            Probe::Ready(value) => return Ok(PollOutcome::Ready(value)),
            Probe::Pending(observed) => observed,
        };

        let now = Instant::now();
        if now >= deadline {
            debug!(attempts, "polling deadline reached: {}", last_observed);
            return Ok(PollOutcome::TimedOut { last_observed });
        }

        sleep(options.poll_interval.min(deadline - now)).await;
    }
}
