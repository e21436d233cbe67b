use std::future::Future;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::window::StartLog;
use crate::ratelimit::RateLimitConfig;
use crate::retry::Attempt;
use crate::{ErrorKind, Outcome, Result};

/// Mutable admission state shared by all tasks of one dispatch
#[derive(Debug)]
struct GateState {
    /// Start times of the most recent `max_calls_per_period` attempts
    starts: StartLog,
}

/// Admits a bounded number of concurrent attempts, throttles the global
/// attempt rate and drives the per-record retry loop.
///
/// Each gate maintains:
/// - A semaphore bounding the number of records in flight
/// - A log of recent attempt start times, enforcing the call limit over a
///   rolling window of `period`
/// - A cancellation token which aborts every wait
///
/// A gate is created for a single dispatch and shared by reference between
/// all of its tasks.
#[derive(Debug)]
pub struct RateGate {
    config: RateLimitConfig,

    /// Serializes updates of the start log
    state: Mutex<GateState>,

    /// Controls maximum concurrent attempts
    semaphore: Semaphore,

    /// Aborts all suspension points once cancelled
    cancel: CancellationToken,
}

impl RateGate {
    /// Create a new gate enforcing `config`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate, e.g.
    /// because the requested rate exceeds the platform ceiling.
    pub fn new(config: RateLimitConfig, cancel: CancellationToken) -> Result<Self> {
        config.validate()?;

        let capacity = usize::try_from(config.max_calls_per_period)
            .map_err(|_| ErrorKind::InvalidRateLimit("call limit is too large".to_string()))?;

        Ok(Self {
            config,
            state: Mutex::new(GateState {
                starts: StartLog::new(capacity),
            }),
            semaphore: Semaphore::new(config.max_concurrent),
            cancel,
        })
    }

    /// Run `attempt_fn` under the gate's limits until it succeeds, fails
    /// terminally or runs out of attempts.
    ///
    /// This method:
    /// 1. Acquires a concurrency slot, held until the record is done
    /// 2. Waits until the call limit of the rolling window admits one more start
    /// 3. Invokes `attempt_fn` with the number of attempts left after this one
    /// 4. Returns on success or terminal failure
    /// 5. Sleeps `retry_base_delay * (attempt - 1)` after a retryable failure
    ///    and loops, as long as attempts remain
    ///
    /// The returned [`Outcome`] is the one of the last attempt, with
    /// [`Outcome::attempts`] set.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Cancelled`] if the gate's token is cancelled
    /// while waiting at any suspension point.
    pub async fn execute<F, Fut>(&self, mut attempt_fn: F) -> Result<Outcome>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt>,
    {
        let _permit = self
            .suspend(self.semaphore.acquire())
            .await?
            .map_err(|_| ErrorKind::Cancelled)?;

        let max_attempts = self.config.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            self.admit().await?;
            attempt += 1;
            let attempts_left = max_attempts - attempt;

            match self.suspend(attempt_fn(attempts_left)).await? {
                Attempt::Success(mut outcome) => {
                    outcome.attempts = attempt;
                    return Ok(outcome);
                }
                Attempt::RetryableFailure(outcome) if attempts_left > 0 => {
                    log::warn!("{}; attempts left: {attempts_left}", describe(&outcome));
                    let delay = self.config.retry_base_delay * (attempt - 1);
                    if !delay.is_zero() {
                        self.suspend(sleep(delay)).await?;
                    }
                }
                Attempt::RetryableFailure(mut outcome) => {
                    log::error!("{}; no attempts left", describe(&outcome));
                    outcome.attempts = attempt;
                    return Ok(outcome);
                }
                Attempt::TerminalFailure(mut outcome) => {
                    log::error!(
                        "{}; not retrying for status {}",
                        describe(&outcome),
                        outcome
                            .http_status
                            .map_or_else(|| "UNKNOWN".to_string(), |s| s.to_string())
                    );
                    outcome.attempts = attempt;
                    return Ok(outcome);
                }
            }
        }
    }

    /// Wait until starting one more attempt keeps every rolling window of
    /// `period` within `max_calls_per_period`, then record the start.
    async fn admit(&self) -> Result<()> {
        loop {
            let next_free = {
                let mut state = self.suspend(self.state.lock()).await?;
                let now = Instant::now();
                match state.starts.next_admission(now, self.config.period) {
                    Some(at) => at,
                    None => {
                        state.starts.record(now);
                        return Ok(());
                    }
                }
            };

            log::debug!(
                "Call limit of {} per {:?} reached, waiting {:?}",
                self.config.max_calls_per_period,
                self.config.period,
                next_free.saturating_duration_since(Instant::now())
            );
            self.suspend(sleep_until(next_free)).await?;
        }
    }

    /// Await `fut` unless the gate gets cancelled first
    async fn suspend<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ErrorKind::Cancelled),
            output = fut => Ok(output),
        }
    }

    /// Get the current number of available permits (concurrent attempt slots)
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// The configuration enforced by this gate
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

fn describe(outcome: &Outcome) -> String {
    outcome
        .error_description
        .clone()
        .unwrap_or_else(|| format!("Query for record #{} failed", outcome.index))
}
