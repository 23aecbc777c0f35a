//! Engine configuration.

use std::time::Duration;

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retry configuration for the listener's reconnect loop.
    pub retry: RetryConfig,
    /// Number of handler-dispatch workers.
    pub dispatcher_workers: usize,
    /// Poll granularity of the write coalescer.
    pub coalescer_tick: Duration,
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            retry: RetryConfig::default(),
            dispatcher_workers: 4,
            coalescer_tick: Duration::from_millis(20),
        }
    }

    /// Sets the listener retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the dispatcher worker count (minimum 1).
    pub fn with_dispatcher_workers(mut self, workers: usize) -> Self {
        self.dispatcher_workers = workers.max(1);
        self
    }

    /// Sets the coalescer poll granularity.
    pub fn with_coalescer_tick(mut self, tick: Duration) -> Self {
        self.coalescer_tick = tick;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for reconnect backoff.
///
/// The listener retries without an attempt bound: silently losing the
/// change feed would break the consistency contract, so it keeps trying
/// under exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration with the given initial delay.
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter.
            let jitter = delay_secs * 0.25 * pseudo_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

/// Deterministic-enough jitter without an RNG dependency.
fn pseudo_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = EngineConfig::new()
            .with_dispatcher_workers(2)
            .with_coalescer_tick(Duration::from_millis(5));
        assert_eq!(config.dispatcher_workers, 2);
        assert_eq!(config.coalescer_tick, Duration::from_millis(5));
    }

    #[test]
    fn worker_count_has_floor() {
        let config = EngineConfig::new().with_dispatcher_workers(0);
        assert_eq!(config.dispatcher_workers, 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let retry = RetryConfig::new(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(400))
            .without_jitter();
        assert_eq!(retry.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(10), Duration::from_millis(400));
    }
}
