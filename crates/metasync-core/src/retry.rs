//! Retry logic with exponential backoff and optional jitter.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ retry)`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to add up to 50% random extra delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(1_000))
    }
}

impl Backoff {
    /// Doubling backoff from `base`, capped at one minute, without jitter.
    pub const fn exponential(base: Duration) -> Self {
        Self::Exponential {
            base,
            factor: 2.0,
            max: Duration::from_secs(60),
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped_seconds = seconds.min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(capped_seconds);

                if jitter {
                    // Jitter only lengthens, so the configured delay stays a floor.
                    let extra_ms = (delay.as_millis() / 2) as u64;
                    delay + Duration::from_millis(fastrand::u64(0..=extra_ms))
                } else {
                    delay
                }
            }
        }
    }
}

/// Configuration for the automatic retry mechanism.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Enables or disables the retry mechanism.
    pub enabled: bool,
    /// The maximum number of retries to attempt.
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// The backoff strategy to use between retries.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// Exponential backoff doubling from `retry_delay`.
    pub fn exponential(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            enabled: true,
            max_retries,
            backoff: Backoff::exponential(retry_delay),
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            enabled: true,
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        self.backoff.delay(retry)
    }
}

/// The last error of an operation that ran out of attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted<E> {
    pub error: E,
    pub attempts: u32,
}

/// Runs `operation` until it succeeds or the attempt budget is spent.
///
/// `operation` receives the 1-based attempt number. Between attempts the
/// task sleeps for the configured backoff.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = config.max_attempts();
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= max_attempts => {
                return Err(RetryExhausted {
                    error,
                    attempts: attempt,
                });
            }
            Err(error) => {
                let delay = config.delay_for_attempt(attempt - 1);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(100),
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(10), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_secs(1)); // capped
    }

    #[test]
    fn test_jitter_never_shortens_delay() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..10 {
            for retry in 0..5 {
                let floor = Backoff::exponential(Duration::from_millis(100))
                    .delay(retry)
                    .min(Duration::from_secs(1));
                let delay = backoff.delay(retry);
                assert!(delay >= floor, "retry={retry}, delay={delay:?}");
                assert!(delay <= floor + floor / 2, "retry={retry}, delay={delay:?}");
            }
        }
    }

    #[test]
    fn test_default_retry_config() {
        let config = RetryConfig::default();

        assert!(config.enabled);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_attempts(), 4);
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_config_no_retry() {
        let config = RetryConfig::no_retry();

        assert!(!config.enabled);
        assert_eq!(config.max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_first_success() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::exponential(3, Duration::from_millis(10));

        let result: Result<u32, RetryExhausted<String>> = retry_with_backoff(&config, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(String::from("flaky"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_retry_runs_once() {
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryExhausted<&str>> =
            retry_with_backoff(&RetryConfig::no_retry(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("down") }
            })
            .await;

        assert_eq!(
            result,
            Err(RetryExhausted {
                error: "down",
                attempts: 1
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
