use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use clap::Args;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Args)]
pub struct RetryArgs {
    /// Delay before the first reconnect attempt, in milliseconds.
    #[arg(long, env = "RETRY_INITIAL_MS", default_value = "1000")]
    pub retry_initial_ms: u64,

    /// Upper bound for the reconnect delay, in milliseconds.
    #[arg(long, env = "RETRY_MAX_MS", default_value = "30000")]
    pub retry_max_ms: u64,
}

impl RetryArgs {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.retry_initial_ms),
            Duration::from_millis(self.retry_max_ms),
        )
    }
}

/// Doubling delay capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay to wait after the `attempt`-th consecutive failure (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial.saturating_mul(1u32 << exponent).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// Runs `op` until it succeeds, backing off between failures.
///
/// There is no attempt limit: the only way out without a value is `cancel`
/// firing, in which case `None` is returned. Failures are logged, never
/// propagated.
pub async fn retry<T, E, F, Fut>(
    backoff: &Backoff,
    cancel: &CancellationToken,
    what: &str,
    mut op: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            outcome = op() => outcome,
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "{} succeeded after retrying", what);
                }
                return Some(value);
            }
            Err(e) => {
                let delay = backoff.delay(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "{} failed: {:#}. Retrying",
                    what,
                    e
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    _ = time::sleep(delay) => {}
                }
            }
        }
    }
}
