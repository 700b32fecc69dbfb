//! Bounded retry with exponential backoff and jitter
//!
//! The policy only decides *how long* to wait and *how often* to try again.
//! What counts as a failure is up to the operation: the HTTP caller feeds it
//! transport errors only, never application-level status codes.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry configuration with capped exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Factor applied to the delay after each retry
    pub multiplier: f64,

    /// Ceiling for the exponential part of the delay
    pub max_delay: Duration,

    /// Upper bound of the random component added to every delay
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_attempts(),
            initial_delay: default_initial_delay(),
            multiplier: default_multiplier(),
            max_delay: default_max_delay(),
            max_jitter: default_max_jitter(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Deterministic part of the delay before retry `retry` (1-based)
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Full delay before retry `retry`: the capped base plus random jitter
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay(retry) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis().min(u64::MAX as u128) as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }

    /// Run `operation` until it succeeds or the attempts run out.
    ///
    /// The closure receives the 1-based attempt number. The final result is
    /// returned as-is together with a log of every failed attempt.
    pub async fn execute<F, Fut, T, E>(&self, context: &str, mut operation: F) -> (Result<T, E>, RetryLog)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut log = RetryLog::new(context);
        let mut attempt = 0;

        loop {
            attempt += 1;
            log.attempts = attempt;
            debug!("{} attempt {}/{}", context, attempt, max_attempts);

            match operation(attempt).await {
                Ok(value) => return (Ok(value), log),
                Err(err) => {
                    if attempt >= max_attempts {
                        warn!("{} failed after {} attempts: {}", context, attempt, err);
                        log.record_failure(attempt, err.to_string(), None);
                        return (Err(err), log);
                    }

                    let delay = self.delay_for(attempt);
                    info!(
                        "Retrying {} (attempt {}/{}) after {:?}: {}",
                        context, attempt, max_attempts, delay, err
                    );
                    log.record_failure(attempt, err.to_string(), Some(delay));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// One attempt that did not complete
#[derive(Debug, Clone, Serialize)]
pub struct FailedAttempt {
    pub attempt: u32,
    pub at: DateTime<Utc>,
    pub error: String,
    /// Wait before the next attempt; `None` for the final one
    pub next_delay_ms: Option<u64>,
}

/// Ordered record of the attempts made for one logical call
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetryLog {
    pub context: String,
    pub attempts: u32,
    pub failures: Vec<FailedAttempt>,
}

impl RetryLog {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            attempts: 0,
            failures: Vec::new(),
        }
    }

    /// True when nothing had to be retried
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_failure(&mut self, attempt: u32, error: String, next_delay: Option<Duration>) {
        self.failures.push(FailedAttempt {
            attempt,
            at: Utc::now(),
            error,
            next_delay_ms: next_delay.map(|d| d.as_millis() as u64),
        });
    }
}

impl fmt::Display for RetryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for failure in &self.failures {
            writeln!(
                f,
                "{} {} attempt-{} error: {}",
                failure.at.to_rfc3339(),
                self.context,
                failure.attempt,
                failure.error
            )?;
        }
        Ok(())
    }
}

fn default_attempts() -> u32 {
    10
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_max_jitter() -> Duration {
    Duration::from_secs(1)
}
