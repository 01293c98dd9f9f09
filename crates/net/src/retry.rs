//! The retry policy applied to every network call

use std::future::Future;
use std::time::Duration;

use macfetch_config::NetworkConfig;
use macfetch_errors::{Error, UserFacingError};
use macfetch_events::{AppEvent, DownloadEvent, EventEmitter};
use tokio_util::sync::CancellationToken;

/// Bounded exponential backoff over transient failures
///
/// Transient failures (timeouts, dropped connections, body errors, 5xx and
/// 429) are retried up to `max_retries` times. Anything else is surfaced on
/// the first occurrence.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub attempt_timeout: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&NetworkConfig::default())
    }
}

impl From<&NetworkConfig> for RetryPolicy {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            max_retries: config.retries,
            attempt_timeout: config.attempt_timeout(),
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            backoff_multiplier: config.backoff_multiplier,
            jitter_factor: config.jitter_factor,
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts, for tests and tooling
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
            ..Self::default()
        }
    }

    /// Maximum number of attempts, the first one included
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate exponential backoff delay with jitter before retry `attempt` (1-based)
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        // Precision loss acceptable for backoff calculations
        #[allow(clippy::cast_precision_loss)]
        let base_delay = self.initial_delay.as_millis().min(u128::from(u64::MAX)) as f64;
        #[allow(clippy::cast_precision_loss)]
        let max_delay = self.max_delay.as_millis().min(u128::from(u64::MAX)) as f64;

        // Retry attempts are small, so the cast cannot wrap
        #[allow(clippy::cast_possible_wrap)]
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let delay = (base_delay * self.backoff_multiplier.powi(exponent)).min(max_delay);

        let jitter = delay * self.jitter_factor * (rand::random::<f64>() - 0.5);
        // max(0.0) keeps the value non-negative
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let final_delay = (delay + jitter).max(0.0).round() as u64;

        Duration::from_millis(final_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or the retry budget is spent.
    ///
    /// `op` receives the zero-based attempt number. Backoff waits end early
    /// when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns the first permanent error, the last transient error once
    /// retries are exhausted, or `Error::Cancelled`.
    pub async fn run<T, F, Fut, E>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        emitter: &E,
        mut op: F,
    ) -> Result<T, Error>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
        E: EventEmitter + ?Sized,
    {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(
                        target: "macfetch::net",
                        label,
                        attempt,
                        max_attempts = self.max_attempts(),
                        ?delay,
                        error = %e,
                        "transient failure, retrying"
                    );
                    emitter.emit(AppEvent::Download(DownloadEvent::Retrying {
                        url: label.to_string(),
                        attempt,
                        max_attempts: self.max_attempts(),
                        delay,
                        reason: e.user_message().into_owned(),
                    }));

                    tokio::select! {
                        () = cancel.cancelled() => return Err(Error::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
