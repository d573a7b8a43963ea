use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(60);
pub const DEFAULT_KEEP_COMPLETED: u32 = 1000;
pub const DEFAULT_KEEP_FAILED: u32 = 5000;

/// Exponential backoff for partner deliveries.
///
/// The delay after the n-th failed attempt is `base × 2^(n-1)`. A job is given up on once it has failed
/// `max_attempts` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, base_delay: DEFAULT_BACKOFF_BASE }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    /// The delay before the next attempt, after `failures` failed attempts.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Whether another attempt is allowed after `failures` failed attempts.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}

/// How many finished jobs are kept around for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub keep_completed: u32,
    pub keep_failed: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { keep_completed: DEFAULT_KEEP_COMPLETED, keep_failed: DEFAULT_KEEP_FAILED }
    }
}
