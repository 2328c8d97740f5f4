//! Bounded retry with exponential backoff around a single provider.
//!
//! A completion call is idempotent for identical input, so transient
//! failures (network, timeout, rate limit, 5xx) can simply be re-sent.
//! Permanent failures (bad key, unknown model, 4xx) are returned at once.

use async_trait::async_trait;
use riskprofiler_core::error::ProviderError;
use riskprofiler_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A provider that re-sends failed requests to the wrapped provider.
pub struct RetryProvider {
    name: String,
    inner: Arc<dyn Provider>,
    max_attempts: u32,
    initial_backoff: Duration,
    attempt_timeout: Duration,
}

impl RetryProvider {
    /// Wrap a provider with the default policy: 3 attempts, 500ms initial
    /// backoff, 55s per attempt.
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        Self {
            name: format!("retry({})", inner.name()),
            inner,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(55),
        }
    }

    /// Total number of attempts, including the first. Clamped to at least 1.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Delay before the first retry; doubles for each subsequent retry.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Deadline for a single attempt.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff_for(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

#[async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let inner_name = self.inner.name().to_string();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match tokio::time::timeout(
                self.attempt_timeout,
                self.inner.complete(request.clone()),
            )
            .await
            {
                Ok(Ok(response)) => {
                    if attempt > 1 {
                        info!(provider = %inner_name, attempt, "Retry: completion succeeded");
                    }
                    return Ok(response);
                }
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(format!(
                    "Provider '{}' timed out after {}s",
                    inner_name,
                    self.attempt_timeout.as_secs()
                )),
            };

            if !error.is_retryable() || attempt >= self.max_attempts {
                warn!(
                    provider = %inner_name,
                    attempt,
                    max_attempts = self.max_attempts,
                    error = %error,
                    "Retry: giving up"
                );
                return Err(error);
            }

            let delay = match &error {
                ProviderError::RateLimited { retry_after_secs } => {
                    self.backoff_for(attempt).max(Duration::from_secs(*retry_after_secs))
                }
                _ => self.backoff_for(attempt),
            };

            warn!(
                provider = %inner_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retry: attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        self.inner.list_models().await
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskprofiler_core::message::ChatTurn;
    use std::sync::Mutex;

    /// Fails with the scripted errors in order, then succeeds.
    struct FlakyProvider {
        failures: Mutex<Vec<ProviderError>>,
        call_count: Mutex<usize>,
    }

    impl FlakyProvider {
        fn new(failures: Vec<ProviderError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            let mut failures = self.failures.lock().unwrap();
            if failures.is_empty() {
                Ok(ProviderResponse::text("ok", "mock"))
            } else {
                Err(failures.remove(0))
            }
        }
    }

    /// Never answers.
    struct HangingProvider;

    #[async_trait]
    impl Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            std::future::pending().await
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest::new("mock", vec![ChatTurn::user("hello")])
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_until_success() {
        let inner = Arc::new(FlakyProvider::new(vec![
            ProviderError::Network("connection reset".into()),
            ProviderError::ApiError {
                status_code: 503,
                message: "loading model".into(),
            },
        ]));
        let provider = RetryProvider::new(inner.clone()).with_max_attempts(3);

        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let inner = Arc::new(FlakyProvider::new(vec![
            ProviderError::Network("down".into()),
            ProviderError::Network("down".into()),
            ProviderError::Network("still down".into()),
        ]));
        let provider = RetryProvider::new(inner.clone()).with_max_attempts(2);

        let err = provider.complete(request()).await.unwrap_err();
        assert!(err.to_string().contains("down"));
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let inner = Arc::new(FlakyProvider::new(vec![
            ProviderError::AuthenticationFailed("bad key".into()),
        ]));
        let provider = RetryProvider::new(inner.clone()).with_max_attempts(5);

        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempt_times_out() {
        let provider = RetryProvider::new(Arc::new(HangingProvider))
            .with_max_attempts(2)
            .with_attempt_timeout(Duration::from_secs(5));

        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[test]
    fn backoff_doubles() {
        let provider = RetryProvider::new(Arc::new(HangingProvider))
            .with_initial_backoff(Duration::from_millis(100));
        assert_eq!(provider.backoff_for(1), Duration::from_millis(100));
        assert_eq!(provider.backoff_for(2), Duration::from_millis(200));
        assert_eq!(provider.backoff_for(3), Duration::from_millis(400));
    }

    #[test]
    fn attempts_clamped_to_one() {
        let provider = RetryProvider::new(Arc::new(HangingProvider)).with_max_attempts(0);
        assert_eq!(provider.max_attempts(), 1);
        assert_eq!(provider.name(), "retry(hanging)");
    }
}
