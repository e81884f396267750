//! Wrappers around a `GeocodeLookup`: bounded retry with exponential backoff,
//! and request throttling toward the external source.
//!
//! Both wrap any lookup and are themselves lookups, so they stack:
//! `RateLimitedLookup::new(RetryingLookup::new(source, ..), ..)` throttles the
//! whole retried call, while the reverse order throttles every attempt.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{GeocodeLookup, LookupError, LookupMatch};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        std::cmp::min(Duration::from_millis(delay_ms as u64), self.max_delay)
    }
}

pub struct RetryingLookup<L> {
    inner: L,
    config: RetryConfig,
}

impl<L: GeocodeLookup> RetryingLookup<L> {
    pub fn new(inner: L, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<L: GeocodeLookup> GeocodeLookup for RetryingLookup<L> {
    async fn lookup(&self, address: &str) -> Result<LookupMatch, LookupError> {
        let mut attempt = 0;
        loop {
            match self.inner.lookup(address).await {
                Ok(found) => {
                    if attempt > 0 {
                        tracing::debug!("Lookup for '{}' succeeded after {} retries", address, attempt);
                    }
                    return Ok(found);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt >= self.config.max_retries {
                        tracing::warn!("Giving up on '{}' after {} attempts: {}", address, attempt + 1, e);
                        return Err(LookupError::RetriesExhausted {
                            attempts: attempt + 1,
                        });
                    }
                    let delay = self.config.calculate_delay(attempt);
                    tracing::warn!(
                        "Lookup failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        self.config.max_retries + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Lets at most one request through per `interval`.
pub struct RateLimitedLookup<L> {
    inner: L,
    limiter: Arc<DirectRateLimiter>,
}

impl<L: GeocodeLookup> RateLimitedLookup<L> {
    pub fn new(inner: L, interval: Duration) -> Self {
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX));
        Self {
            inner,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

#[async_trait]
impl<L: GeocodeLookup> GeocodeLookup for RateLimitedLookup<L> {
    async fn lookup(&self, address: &str) -> Result<LookupMatch, LookupError> {
        self.limiter.until_ready().await;
        self.inner.lookup(address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    /// Fails with `error` for the first `failures` calls, then succeeds.
    struct FlakyLookup {
        calls: AtomicU32,
        failures: u32,
        error: fn() -> LookupError,
    }

    impl FlakyLookup {
        fn new(failures: u32, error: fn() -> LookupError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                error,
            }
        }
    }

    #[async_trait]
    impl GeocodeLookup for FlakyLookup {
        async fn lookup(&self, _address: &str) -> Result<LookupMatch, LookupError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err((self.error)());
            }
            Ok(LookupMatch {
                latitude: 32.8,
                longitude: 34.99,
                confidence: 0.5,
                display_name: "Haifa".to_string(),
            })
        }
    }

    fn timeout() -> LookupError {
        LookupError::Timeout(Duration::from_secs(10))
    }

    fn fast_retries(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_retry_delay_calculation() {
        let config = RetryConfig::default();
        assert_eq!(config.calculate_delay(0), Duration::from_millis(500));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(1000));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(2000));

        let capped = RetryConfig {
            max_delay: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(capped.calculate_delay(10), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let flaky = Arc::new(FlakyLookup::new(2, timeout));
        let lookup = RetryingLookup::new(flaky.clone(), fast_retries(3));

        assert!(lookup.lookup("Herzl 1").await.is_ok());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let flaky = Arc::new(FlakyLookup::new(u32::MAX, timeout));
        let lookup = RetryingLookup::new(flaky.clone(), fast_retries(2));

        let result = lookup.lookup("Herzl 1").await;
        assert!(matches!(
            result,
            Err(LookupError::RetriesExhausted { attempts: 3 })
        ));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let flaky = Arc::new(FlakyLookup::new(u32::MAX, || LookupError::NotFound));
        let lookup = RetryingLookup::new(flaky.clone(), fast_retries(3));

        assert!(matches!(
            lookup.lookup("Herzl 1").await,
            Err(LookupError::NotFound)
        ));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_spaces_requests() {
        let lookup = RateLimitedLookup::new(
            FlakyLookup::new(0, timeout),
            Duration::from_millis(100),
        );

        let start = Instant::now();
        for _ in 0..3 {
            lookup.lookup("Herzl 1").await.unwrap();
        }

        // First request is immediate, the next two wait one period each
        assert!(
            start.elapsed() >= Duration::from_millis(190),
            "Rate limiting not working: {:?}",
            start.elapsed()
        );
    }
}
