//! Cancellable deadline-bounded polling
//!
//! Waits are built from a [`Deadline`]: a fixed expiry instant plus a
//! caller-owned [`CancellationToken`]. Each tick sleeps for the poll
//! interval but wakes early when the deadline passes or the token is
//! cancelled, so a cancelled caller is released within one tick.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::Error;

/// Default tick interval for namespace and readiness waits
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Result of waiting for one tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// The interval elapsed; time to read remote state again
    Elapsed,
    /// The deadline passed before the interval elapsed
    Expired,
    /// The caller cancelled the wait
    Cancelled,
}

/// Terminal state of a poll loop that did not fail
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Polled<T> {
    /// The check produced a value
    Done(T),
    /// The deadline passed first
    Expired,
}

/// A time budget that can also be cancelled by its owner
#[derive(Clone, Debug)]
pub struct Deadline {
    expires_at: Instant,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Deadline {
    /// Deadline `timeout` from now that nothing else can cancel
    pub fn after(timeout: Duration) -> Self {
        Self::with_cancel(timeout, CancellationToken::new())
    }

    /// Deadline `timeout` from now, also ended by `cancel`
    pub fn with_cancel(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            expires_at: Instant::now() + timeout,
            timeout,
            cancel,
        }
    }

    /// The total budget this deadline was created with
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time left before expiry (zero once expired)
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Whether the owner has cancelled this deadline
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleep for one interval, waking early on expiry or cancellation.
    ///
    /// Cancellation wins over expiry when both are already true.
    pub async fn tick(&self, interval: Duration) -> Tick {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Tick::Cancelled,
            _ = tokio::time::sleep_until(self.expires_at) => Tick::Expired,
            _ = tokio::time::sleep(interval) => Tick::Elapsed,
        }
    }
}

/// Poll `check_fn` once per tick until it yields a value or the deadline ends.
///
/// Each iteration waits one tick first and then issues one check, so the
/// loop never busy-spins and never reads before the first tick.
///
/// # Returns
/// * `Ok(Polled::Done(v))` - `check_fn` returned `Ok(Some(v))`
/// * `Ok(Polled::Expired)` - the deadline passed first
/// * `Err(Error::Cancelled)` - the deadline's token was cancelled
/// * `Err(e)` - `check_fn` failed; errors are surfaced, not retried
pub async fn poll_until<T, F, Fut>(
    deadline: &Deadline,
    poll_interval: Duration,
    description: &str,
    mut check_fn: F,
) -> Result<Polled<T>, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, Error>>,
{
    loop {
        match deadline.tick(poll_interval).await {
            Tick::Elapsed => {}
            Tick::Expired => return Ok(Polled::Expired),
            Tick::Cancelled => {
                return Err(Error::cancelled(format!("waiting for {}", description)));
            }
        }

        match check_fn().await? {
            Some(value) => return Ok(Polled::Done(value)),
            None => trace!(resource = %description, "not converged yet, polling again"),
        }
    }
}
