//! Worker configuration from `ONBOARDFLOW_*` environment variables.

use core::fmt::Display;
use core::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use onboardflow_core::topics;
use onboardflow_observability::LogFormat;
use onboardflow_worker::RetryBudget;

const PREFIX: &str = "ONBOARDFLOW_";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: `{value}` ({reason})")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &str, value: impl Display, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var: format!("{PREFIX}{var}"),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    pub worker_id: String,
    pub max_tasks: usize,
    pub lock_duration: Duration,
    /// Error handling is quick; it gets a shorter lease.
    pub handle_error_lock_duration: Duration,
    pub async_response_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_multiplier: f64,
    pub backoff_max: Duration,
    pub lease_safety_margin: Duration,
    pub validate_data_retry: RetryBudget,
    pub create_account_retry: RetryBudget,
    pub handle_error_retry: RetryBudget,
    pub account_latency: Duration,
    pub account_call_timeout: Duration,
    pub log_format: LogFormat,
    pub demo_instances: usize,
    pub demo_auto_review: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let retry_delay = Duration::from_millis(5000);
        Self {
            worker_id: "external-worker-1".to_string(),
            max_tasks: 10,
            lock_duration: Duration::from_millis(30_000),
            handle_error_lock_duration: Duration::from_millis(10_000),
            async_response_timeout: Duration::from_millis(20_000),
            backoff_initial: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            backoff_max: Duration::from_millis(60_000),
            lease_safety_margin: Duration::from_millis(1_000),
            validate_data_retry: RetryBudget::fixed(3, retry_delay),
            create_account_retry: RetryBudget::exponential(3, retry_delay, 2.0),
            handle_error_retry: RetryBudget::fixed(3, retry_delay),
            account_latency: Duration::from_millis(1_000),
            account_call_timeout: Duration::from_millis(10_000),
            log_format: LogFormat::Json,
            demo_instances: 0,
            demo_auto_review: true,
        }
    }
}

/// Typed reads over a variable lookup function.
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, var: &str) -> Option<String> {
        (self.lookup)(&format!("{PREFIX}{var}"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, var: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.raw(var) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(var, &value, e.to_string())),
        }
    }

    fn millis(&self, var: &str, default: Duration) -> Result<Duration, ConfigError> {
        let ms = self.parse::<u64>(var, default.as_millis() as u64)?;
        Ok(Duration::from_millis(ms))
    }

    fn retry(&self, topic_var: &str, default: &RetryBudget) -> Result<RetryBudget, ConfigError> {
        let attempts_var = format!("{topic_var}_RETRIES");
        let max_attempts = self.parse::<u32>(&attempts_var, default.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::invalid(&attempts_var, max_attempts, "must be at least 1"));
        }

        let base_delay = self.millis(&format!("{topic_var}_RETRY_DELAY_MS"), default.base_delay)?;

        let multiplier_var = format!("{topic_var}_RETRY_MULTIPLIER");
        let multiplier = self.parse::<f64>(&multiplier_var, default.multiplier)?;
        if !(multiplier >= 1.0 && multiplier.is_finite()) {
            return Err(ConfigError::invalid(&multiplier_var, multiplier, "must be a finite number >= 1"));
        }

        Ok(RetryBudget {
            max_attempts,
            base_delay,
            multiplier,
            max_delay: default.max_delay,
        })
    }
}

impl AppConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup` (variable name → value).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let v = Vars { lookup };

        let config = Self {
            worker_id: v.raw("WORKER_ID").unwrap_or(d.worker_id),
            max_tasks: v.parse("MAX_TASKS", d.max_tasks)?,
            lock_duration: v.millis("LOCK_DURATION_MS", d.lock_duration)?,
            handle_error_lock_duration: v.millis(
                "HANDLE_ERROR_LOCK_DURATION_MS",
                d.handle_error_lock_duration,
            )?,
            async_response_timeout: v.millis("ASYNC_RESPONSE_TIMEOUT_MS", d.async_response_timeout)?,
            backoff_initial: v.millis("BACKOFF_INIT_MS", d.backoff_initial)?,
            backoff_multiplier: v.parse("BACKOFF_MULTIPLIER", d.backoff_multiplier)?,
            backoff_max: v.millis("BACKOFF_MAX_MS", d.backoff_max)?,
            lease_safety_margin: v.millis("LEASE_SAFETY_MARGIN_MS", d.lease_safety_margin)?,
            validate_data_retry: v.retry("VALIDATE_DATA", &d.validate_data_retry)?,
            create_account_retry: v.retry("CREATE_ACCOUNT", &d.create_account_retry)?,
            handle_error_retry: v.retry("HANDLE_ERROR", &d.handle_error_retry)?,
            account_latency: v.millis("ACCOUNT_LATENCY_MS", d.account_latency)?,
            account_call_timeout: v.millis("ACCOUNT_CALL_TIMEOUT_MS", d.account_call_timeout)?,
            log_format: v.parse("LOG_FORMAT", d.log_format)?,
            demo_instances: v.parse("DEMO_INSTANCES", d.demo_instances)?,
            demo_auto_review: v.parse("DEMO_AUTO_REVIEW", d.demo_auto_review)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tasks == 0 {
            return Err(ConfigError::invalid("MAX_TASKS", self.max_tasks, "must be at least 1"));
        }
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(ConfigError::invalid(
                "BACKOFF_MULTIPLIER",
                self.backoff_multiplier,
                "must be a finite number >= 1",
            ));
        }
        for (var, lock) in [
            ("LOCK_DURATION_MS", self.lock_duration),
            ("HANDLE_ERROR_LOCK_DURATION_MS", self.handle_error_lock_duration),
        ] {
            if lock <= self.lease_safety_margin {
                return Err(ConfigError::invalid(
                    var,
                    lock.as_millis(),
                    "must exceed the lease safety margin",
                ));
            }
        }
        if self.account_call_timeout >= self.lock_duration {
            return Err(ConfigError::invalid(
                "ACCOUNT_CALL_TIMEOUT_MS",
                self.account_call_timeout.as_millis(),
                "must be shorter than the lock duration",
            ));
        }
        Ok(())
    }

    /// Retry budget for `topic`, if it is one of the onboarding topics.
    pub fn retry_budget(&self, topic: &str) -> Option<&RetryBudget> {
        match topic {
            topics::VALIDATE_DATA => Some(&self.validate_data_retry),
            topics::CREATE_ACCOUNT => Some(&self.create_account_retry),
            topics::HANDLE_ERROR => Some(&self.handle_error_retry),
            _ => None,
        }
    }

    /// Log the effective configuration.
    pub fn log_summary(&self) {
        info!(
            worker_id = %self.worker_id,
            max_tasks = self.max_tasks,
            lock_duration_ms = self.lock_duration.as_millis() as u64,
            async_response_timeout_ms = self.async_response_timeout.as_millis() as u64,
            backoff_initial_ms = self.backoff_initial.as_millis() as u64,
            backoff_multiplier = self.backoff_multiplier,
            backoff_max_ms = self.backoff_max.as_millis() as u64,
            "worker configuration"
        );
        for topic in topics::ALL {
            if let Some(b) = self.retry_budget(topic) {
                info!(
                    topic,
                    max_attempts = b.max_attempts,
                    base_delay_ms = b.base_delay.as_millis() as u64,
                    multiplier = b.multiplier,
                    "retry budget"
                );
            }
        }
    }
}
