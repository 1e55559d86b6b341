//! Engine timing configuration.

use std::time::Duration;

/// Timeouts and retry budget for saga steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SagaConfig {
    /// A step with no reply this long after its first send is treated as failed.
    pub step_timeout: Duration,

    /// Sends per command, including the first.
    pub max_attempts: u32,

    /// Delay before the first resend; doubles on each further attempt.
    pub retry_backoff: Duration,

    pub max_backoff: Duration,

    /// How often the timeout sweep runs.
    pub sweep_interval: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            max_attempts: 5,
            retry_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl SagaConfig {
    /// Wait after send number `attempt` (1-based) before the next one:
    /// `min(retry_backoff × 2^(attempt−1), max_backoff)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.retry_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}
