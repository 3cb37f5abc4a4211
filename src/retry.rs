//! Bounded retry with exponential backoff for transient storage failures.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            backoff_multiplier: 1.0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (1-based), always within `[0, max_delay_ms]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let millis = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let max = self.max_delay_ms as f64;
        let millis = if millis.is_nan() { max } else { millis.clamp(0.0, max) };
        Duration::try_from_secs_f64(millis / 1000.0).unwrap_or(Duration::from_millis(self.max_delay_ms))
    }

    /// Reject settings that cannot produce a delay.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 0.0 {
            return Err(format!(
                "backoff_multiplier must be a finite, non-negative number, got {}",
                self.backoff_multiplier
            ));
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        Ok(())
    }

    /// Run `operation`, retrying transient failures until attempts run out.
    /// Non-transient failures and the last transient one come back unchanged.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation = label,
                        error = %e,
                        retry = attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(operation = label, attempts = attempt, error = %e, "exhausted all retries");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(10), Duration::from_millis(2000));
    }

    #[test]
    fn test_delay_never_panics_on_odd_settings() {
        let negative = RetryPolicy {
            backoff_multiplier: -2.0,
            ..RetryPolicy::default()
        };
        assert_eq!(negative.delay_for(2), Duration::ZERO);

        let huge = RetryPolicy {
            max_attempts: 2000,
            ..RetryPolicy::default()
        };
        assert_eq!(huge.delay_for(1500), Duration::from_millis(2000));
        assert_eq!(huge.delay_for(u32::MAX), Duration::from_millis(2000));

        let nan = RetryPolicy {
            backoff_multiplier: f64::NAN,
            ..RetryPolicy::default()
        };
        assert_eq!(nan.delay_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_validate_rejects_unusable_multipliers() {
        assert!(RetryPolicy::default().validate().is_ok());
        for multiplier in [-1.0, f64::NAN, f64::INFINITY] {
            let policy = RetryPolicy {
                backoff_multiplier: multiplier,
                ..RetryPolicy::default()
            };
            assert!(policy.validate().is_err(), "multiplier {multiplier}");
        }
        assert!(RetryPolicy::immediate(0).validate().is_err());
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = RetryPolicy::immediate(3)
            .run("update", || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::transient("deadlock"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = RetryPolicy::immediate(2)
            .run("update", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::transient("deadlock"))
            })
            .await;

        assert_eq!(result, Err(Error::transient("deadlock")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = RetryPolicy::immediate(5)
            .run("update", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::storage("syntax error"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
