//! Runtime knobs of the pipeline, derived from [`PipelineSettings`].

use std::time::Duration;

use vitrine_core::constants::{
    DEFAULT_LIST_ATTEMPTS, DEFAULT_LIST_RETRY_DELAY, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_OPERATION_TIMEOUT, DEFAULT_SETTLE_DELAY, DEFAULT_SIGNED_URL_TTL,
};
use vitrine_core::{PipelineSettings, UploadRequest};

/// Bounded linear backoff for upload attempts.
///
/// The first attempt runs immediately. After failed attempt `n` the executor
/// waits `base_delay * n`, so with a 1s base the pauses are 1s, 2s, 3s and the
/// wait before attempt `n + 1` is `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included. Never below 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_request(request: &UploadRequest) -> Self {
        Self::new(request.max_retries, request.retry_base_delay)
    }

    /// Pause after failed attempt `attempt` (1-based), before attempt `attempt + 1`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.max(1))
    }
}

/// How the verifier looks for a freshly written object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    /// Wait before the first listing
    pub settle_delay: Duration,
    pub list_attempts: u32,
    pub list_retry_delay: Duration,
    /// HEAD the public URL after the metadata check
    pub public_probe: bool,
    pub operation_timeout: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            list_attempts: DEFAULT_LIST_ATTEMPTS,
            list_retry_delay: DEFAULT_LIST_RETRY_DELAY,
            public_probe: true,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub max_concurrency: usize,
    /// Upper bound for each put, list, probe and sign call
    pub operation_timeout: Duration,
    pub verifier: VerifierConfig,
    pub signed_url_ttl: Duration,
}

impl PipelineConfig {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            max_concurrency: settings.max_concurrency.max(1),
            operation_timeout: settings.operation_timeout,
            verifier: VerifierConfig {
                settle_delay: settings.settle_delay,
                list_attempts: settings.list_attempts.max(1),
                list_retry_delay: settings.list_retry_delay,
                public_probe: settings.public_probe,
                operation_timeout: settings.operation_timeout,
            },
            signed_url_ttl: settings.signed_url_ttl,
        }
    }

    /// Same configuration without any sleeps. Used by tests and dry runs.
    pub fn without_delays(mut self) -> Self {
        self.verifier.settle_delay = Duration::ZERO;
        self.verifier.list_retry_delay = Duration::ZERO;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            verifier: VerifierConfig::default(),
            signed_url_ttl: DEFAULT_SIGNED_URL_TTL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_core::Destination;

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        // Only the gaps between attempts are delayed
        let pauses: Vec<_> = (1..policy.max_attempts).map(|n| policy.delay_after(n)).collect();
        assert_eq!(
            pauses,
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_policy_from_request() {
        let request = UploadRequest::new("a.png", vec![1], Destination::default())
            .with_retry(5, Duration::from_millis(10));
        let policy = RetryPolicy::from_request(&request);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_from_settings_clamps_concurrency() {
        let settings = PipelineSettings {
            max_concurrency: 0,
            list_attempts: 0,
            ..PipelineSettings::default()
        };
        let config = PipelineConfig::from_settings(&settings);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.verifier.list_attempts, 1);
        assert_eq!(config.verifier.operation_timeout, settings.operation_timeout);
    }

    #[test]
    fn test_without_delays() {
        let config = PipelineConfig::default().without_delays();
        assert_eq!(config.verifier.settle_delay, Duration::ZERO);
        assert_eq!(config.verifier.list_retry_delay, Duration::ZERO);
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
    }
}
