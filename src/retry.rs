//! Bounded retry with exponential backoff for network-bound turn stages

use std::future::Future;
use std::time::{Duration, SystemTime};

use crate::error::Service;
use crate::shutdown::ShutdownListener;
use crate::{Error, Result};

/// Retry policy for transcriber, generator and synthesizer calls
///
/// Controls how many attempts a request gets and how long to wait between
/// attempts using exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits between attempts
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    ///
    /// The final failure is wrapped in [`Error::RetriesExhausted`] so callers
    /// can tell which stage gave up and after how many attempts. An attempt
    /// already in flight is allowed to finish, but no new attempt starts and
    /// no backoff is waited out once `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] if shutdown is requested before a
    /// retry, otherwise the last error once no attempts remain or the error
    /// is not transient
    pub async fn run<T, F, Fut>(
        &self,
        service: Service,
        shutdown: &mut ShutdownListener,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if shutdown.is_triggered() {
                tracing::debug!(%service, attempt, "shutdown requested, not retrying");
                return Err(Error::ShuttingDown);
            }

            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && e.is_transient() => {
                    let delay = delay_for_attempt(self, attempt - 1);
                    tracing::warn!(
                        %service,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "request failed, retrying"
                    );
                    tokio::select! {
                        () = shutdown.wait() => return Err(Error::ShuttingDown),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(%service, attempt, error = %e, "request failed, giving up");
                    return Err(Error::RetriesExhausted {
                        service,
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
            }
        }
    }
}

/// Compute the delay before the next retry attempt.
///
/// Exponential backoff: `min(base_delay * 2^attempt + jitter, max_delay)`.
/// Jitter is 0-25% of the computed delay, derived from `SystemTime` to avoid
/// pulling in a full random number generator.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt));
    let base = base.min(policy.max_delay);

    let jitter_nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    let jitter_fraction = f64::from(jitter_nanos % 250) / 1000.0;
    let jitter = base.mul_f64(jitter_fraction);

    (base + jitter).min(policy.max_delay)
}
