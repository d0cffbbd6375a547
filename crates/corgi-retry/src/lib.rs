//! # corgi-retry
//!
//! Exponential backoff with jitter for transient failures.
//!
//! The delay before retrying after attempt `n` (0-indexed) is
//! `initial_delay × multiplier^n`, perturbed by a uniform ±`jitter/2` percent
//! and floored at zero. Errors are classified through [`Retryable`]: a
//! non-retryable error ends the loop immediately.
//!
//! ## Defaults
//!
//! 2000 ms initial delay, multiplier 2, 3 attempts, 10% jitter.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Classifies an error as transient (worth retrying) or fatal.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Invalid retry configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryConfigError {
    #[error("max_attempts must be at least 1")]
    NoAttempts,

    #[error("multiplier must be finite and >= 1.0, got {0}")]
    BadMultiplier(f64),

    #[error("jitter_percentage must be within 0..=100, got {0}")]
    BadJitter(f64),
}

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay after the first failed attempt, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Full jitter band in percent; the delay moves by up to half of it either way.
    #[serde(default = "default_jitter_percentage")]
    pub jitter_percentage: f64,
}

fn default_initial_delay_ms() -> u64 {
    2000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_jitter_percentage() -> f64 {
    10.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
            jitter_percentage: default_jitter_percentage(),
        }
    }
}

impl RetryConfig {
    /// A config that never sleeps and tries once. Useful in tests.
    pub fn no_retry() -> Self {
        Self {
            initial_delay_ms: 0,
            multiplier: 1.0,
            max_attempts: 1,
            jitter_percentage: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), RetryConfigError> {
        if self.max_attempts == 0 {
            return Err(RetryConfigError::NoAttempts);
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(RetryConfigError::BadMultiplier(self.multiplier));
        }
        if !(0.0..=100.0).contains(&self.jitter_percentage) {
            return Err(RetryConfigError::BadJitter(self.jitter_percentage));
        }
        Ok(())
    }

    /// Un-jittered delay after attempt `attempt` (0-indexed).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_secs_f64((millis.max(0.0) / 1000.0).min(u64::MAX as f64 / 1000.0))
    }

    /// Jittered delay after attempt `attempt`, using `rng` for the perturbation.
    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let half_band = self.jitter_percentage / 200.0;
        let factor = if half_band > 0.0 {
            1.0 + rng.gen_range(-half_band..=half_band)
        } else {
            1.0
        };
        Duration::from_secs_f64((base * factor).max(0.0))
    }

    /// Longest total sleep one `retry` call can take, jitter included.
    pub fn max_total_delay(&self) -> Duration {
        let upper = 1.0 + self.jitter_percentage.max(0.0) / 200.0;
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.base_delay(attempt).mul_f64(upper))
            .sum()
    }

    /// Jittered delay after attempt `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }
}

/// What happened across all attempts.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// The last attempt's result.
    pub result: Result<T, E>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Sleeps taken between attempts.
    pub delays: Vec<Duration>,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Run `op` until it succeeds, fails fatally, or the attempt budget is spent.
///
/// `op` receives the 0-indexed attempt number.
pub async fn retry<T, E, F, Fut>(config: &RetryConfig, mut op: F) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delays = Vec::new();
    let mut attempt = 0;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt + 1,
                    delays,
                };
            }
            Err(err) => {
                let attempts = attempt + 1;
                if !err.is_retryable() {
                    debug!(attempts, error = %err, "non-retryable error, giving up");
                    return RetryOutcome {
                        result: Err(err),
                        attempts,
                        delays,
                    };
                }
                if attempts >= max_attempts {
                    warn!(attempts, error = %err, "retry budget exhausted");
                    return RetryOutcome {
                        result: Err(err),
                        attempts,
                        delays,
                    };
                }

                let delay = config.delay_for_attempt(attempt);
                warn!(
                    attempt = attempts,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                delays.push(delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
