//! Load Retry Policy
//!
//! Exponential backoff with jitter for the startup load, so a Notion outage
//! at boot delays data instead of killing the process.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::application::ports::SourceError;
use crate::application::services::DataSource;
use crate::infrastructure::config::LoadRetrySettings;

/// Backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor per retry.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Maximum retries after the first attempt (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 5,
        }
    }
}

impl From<&LoadRetrySettings> for RetryConfig {
    fn from(settings: &LoadRetrySettings) -> Self {
        Self {
            initial_delay: settings.initial_delay,
            max_delay: settings.max_delay,
            max_attempts: settings.max_attempts,
            ..Self::default()
        }
    }
}

/// Stateful backoff sequence.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl RetryPolicy {
    /// Create a policy at its first step.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Delay before the next retry, or `None` once retries are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }
        self.attempt_count += 1;

        let delay = self.apply_jitter(self.current_delay);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        self.current_delay = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        Some(delay)
    }

    /// Retries taken so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(adjusted as u64)
    }
}

/// Load `data_source`, retrying with backoff until it succeeds, the policy
/// gives up, or `cancel` fires.
///
/// # Errors
///
/// Returns the last load error when retries run out or on cancellation.
pub async fn load_with_retry(
    data_source: &DataSource,
    mut policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<usize, SourceError> {
    loop {
        let err = match data_source.load().await {
            Ok(total) => return Ok(total),
            Err(e) => e,
        };

        let Some(delay) = policy.next_delay() else {
            tracing::error!(
                retries = policy.attempt_count(),
                error = %err,
                "Giving up on initial load"
            );
            return Err(err);
        };

        tracing::warn!(
            error = %err,
            retry = policy.attempt_count(),
            delay_ms = delay.as_millis(),
            "Initial load failed, retrying"
        );

        tokio::select! {
            () = cancel.cancelled() => return Err(err),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mockall::Sequence;

    use super::*;
    use crate::application::ports::MockRecordSource;
    use crate::domain::record::Record;

    fn no_jitter(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut policy = RetryPolicy::new(no_jitter(0));
        let delays: Vec<u128> = (0..5)
            .map(|_| policy.next_delay().unwrap().as_millis())
            .collect();
        assert_eq!(delays, [100, 200, 400, 500, 500]);
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let mut policy = RetryPolicy::new(no_jitter(2));
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempt_count(), 2);
    }

    #[test]
    fn jitter_stays_in_range() {
        let mut policy = RetryPolicy::new(RetryConfig {
            jitter_factor: 0.1,
            ..no_jitter(0)
        });
        let delay = policy.next_delay().unwrap().as_millis();
        assert!((90..=110).contains(&delay));
    }

    #[test]
    fn from_settings() {
        let config = RetryConfig::from(&LoadRetrySettings::default());
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_attempts, 5);
    }

    fn flaky_source(failures: usize) -> DataSource {
        let mut mock = MockRecordSource::new();
        let mut seq = Sequence::new();
        mock.expect_fetch_all()
            .times(failures)
            .in_sequence(&mut seq)
            .returning(|| Err(SourceError::Unavailable("503".to_string())));
        mock.expect_fetch_all()
            .times(0..=1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![Record::new().with_int("depth", 1)]));
        DataSource::new(Arc::new(mock))
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let source = flaky_source(2);
        let result = load_with_retry(
            &source,
            RetryPolicy::new(no_jitter(5)),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result, Ok(1));
        assert!(source.is_loaded());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let source = flaky_source(3);
        let result = load_with_retry(
            &source,
            RetryPolicy::new(no_jitter(2)),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result, Err(SourceError::Unavailable("503".to_string())));
        assert!(!source.is_loaded());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_retrying() {
        let source = flaky_source(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = load_with_retry(&source, RetryPolicy::new(no_jitter(0)), &cancel).await;
        assert!(result.is_err());
    }
}
