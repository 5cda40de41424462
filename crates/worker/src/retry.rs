//! Retry budgets for technical failures and backoff for poll errors.

use std::time::Duration;

use serde::Serialize;

/// Exponents above this are clamped; the delay is already far past any cap.
const MAX_EXPONENT: u32 = 32;

/// Per-topic retry budget.
///
/// `max_attempts` counts re-executions after a failure, so a task runs at
/// most `max_attempts + 1` times before it becomes an incident.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryBudget {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// 1.0 gives a fixed delay.
    pub multiplier: f64,
    pub max_delay: Option<Duration>,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(5000))
    }
}

impl RetryBudget {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            multiplier: 1.0,
            max_delay: None,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
            max_delay: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Remaining executions of a task that has not failed yet.
    pub fn initial_remaining(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    /// Delay before the retry following failure number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exp = (attempt - 1).min(MAX_EXPONENT) as i32;
        let factor = self.multiplier.max(1.0).powi(exp);
        let mut delay_ms = self.base_delay.as_millis() as f64 * factor;
        if let Some(max) = self.max_delay {
            delay_ms = delay_ms.min(max.as_millis() as f64);
        }

        Duration::from_millis(delay_ms.min(u64::MAX as f64) as u64)
    }

    /// Decide what to report after a technical failure.
    ///
    /// `reported` is the authority's remaining-retries counter for the task,
    /// `None` before its first failure.
    pub fn on_failure(&self, reported: Option<u32>) -> RetryDecision {
        let remaining = reported
            .unwrap_or_else(|| self.initial_remaining())
            .saturating_sub(1);
        if remaining == 0 {
            return RetryDecision::Exhausted;
        }

        let attempts_used = self.initial_remaining().saturating_sub(remaining).max(1);
        RetryDecision::Retry {
            remaining,
            delay: self.delay_for_attempt(attempts_used),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { remaining: u32, delay: Duration },
    /// No retries left: report `(0, 0)` and let the authority raise an incident.
    Exhausted,
}

impl RetryDecision {
    pub fn remaining(&self) -> u32 {
        match self {
            RetryDecision::Retry { remaining, .. } => *remaining,
            RetryDecision::Exhausted => 0,
        }
    }

    pub fn delay(&self) -> Duration {
        match self {
            RetryDecision::Retry { delay, .. } => *delay,
            RetryDecision::Exhausted => Duration::ZERO,
        }
    }
}

/// Bounded exponential backoff for authority errors (polls and reports).
#[derive(Debug, Clone, PartialEq)]
pub struct PollBackoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
    failures: u32,
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 2.0, Duration::from_secs(60))
    }
}

impl PollBackoff {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            initial,
            multiplier,
            max,
            failures: 0,
        }
    }

    /// Register one more consecutive failure and return how long to wait.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.failures.min(MAX_EXPONENT) as i32;
        self.failures = self.failures.saturating_add(1);

        let delay_ms = self.initial.as_millis() as f64 * self.multiplier.max(1.0).powi(exp);
        Duration::from_millis(delay_ms.min(self.max.as_millis() as f64) as u64)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}
