use std::time;

#[derive(Copy, Clone, Debug)]
/// The retry policy the consumer uses to space out fetches after consecutive failures.
pub struct RetryPolicy {
    /// Coefficient to multiply initial_interval with for every past failure.
    backoff_coefficient: u32,
    /// The backoff interval after the first failure.
    initial_interval: time::Duration,
    /// The maximum possible backoff between attempts.
    maximum_interval: Option<time::Duration>,
}

impl RetryPolicy {
    pub fn new(
        backoff_coefficient: u32,
        initial_interval: time::Duration,
        maximum_interval: Option<time::Duration>,
    ) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            maximum_interval,
        }
    }

    /// Calculate the time to wait before the next attempt, given how many attempts in a row have failed.
    /// No failures means no wait.
    pub fn time_until_next_retry(&self, consecutive_failures: u32) -> time::Duration {
        if consecutive_failures == 0 {
            return time::Duration::ZERO;
        }

        let multiplier = self
            .backoff_coefficient
            .checked_pow(consecutive_failures - 1)
            .unwrap_or(u32::MAX);
        let candidate_interval = self.initial_interval.saturating_mul(multiplier);

        match self.maximum_interval {
            Some(max_interval) => std::cmp::min(candidate_interval, max_interval),
            None => candidate_interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            initial_interval: time::Duration::from_millis(100),
            maximum_interval: Some(time::Duration::from_secs(30)),
        }
    }
}
