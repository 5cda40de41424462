//! `handleError`: records why an onboarding instance failed validation.
//!
//! Always completes. If reading the failure context itself fails, a minimal
//! fallback variable set is written so the instance can still reach `Failed`.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use onboardflow_core::{CoreError, Execute, ExternalTask, Outcome, Variables};
use onboardflow_workflow::vars;

use crate::TIMESTAMP_FORMAT;

/// Value of `errorHandledBy`.
pub const HANDLED_BY: &str = "HandleErrorWorker";

/// Value of `onboardingStatus` once error handling ran.
pub const FAILED_VALIDATION: &str = "FAILED_VALIDATION";

const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Clone, Copy, Default)]
pub struct HandleError;

impl HandleError {
    fn summarize(&self, task: &ExternalTask) -> Result<Variables, CoreError> {
        let v = &task.variables;
        let customer_name = v.get_str(vars::CUSTOMER_NAME)?;
        let email = v.get_str(vars::EMAIL)?;
        let validation_message = v.get_str(vars::VALIDATION_MESSAGE)?;
        let error_code = v.get_str(vars::ERROR_CODE)?;

        warn!(
            task_id = %task.id,
            customer_name = ?customer_name,
            email = ?email,
            error_code = ?error_code,
            validation_message = ?validation_message,
            "onboarding failed validation"
        );

        Ok(Variables::new()
            .with(vars::ERROR_OCCURRED, true)
            .with(vars::ERROR_MESSAGE, validation_message.unwrap_or(UNKNOWN_ERROR))
            .with(vars::ERROR_HANDLED_AT, now_formatted())
            .with(vars::ERROR_HANDLED_BY, HANDLED_BY)
            .with(vars::ONBOARDING_STATUS, FAILED_VALIDATION)
            .with(vars::ONBOARDING_COMPLETED, false))
    }

    fn fallback(err: &CoreError) -> Variables {
        Variables::new()
            .with(vars::ERROR_OCCURRED, true)
            .with(vars::ERROR_MESSAGE, format!("Error handler failed: {err}"))
            .with(vars::ERROR_HANDLED_AT, now_formatted())
            .with(vars::ONBOARDING_STATUS, FAILED_VALIDATION)
            .with(vars::ONBOARDING_COMPLETED, false)
    }
}

fn now_formatted() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

#[async_trait]
impl Execute for HandleError {
    async fn execute(&self, task: &ExternalTask) -> Outcome {
        info!(
            task_id = %task.id,
            process_instance_id = %task.process_instance_id,
            business_key = ?task.business_key,
            "handle error task received"
        );

        match self.summarize(task) {
            Ok(variables) => {
                info!(task_id = %task.id, "error handled");
                Outcome::completed(variables)
            }
            Err(err) => {
                error!(task_id = %task.id, error = %err, "error handler failed, completing with fallback");
                Outcome::completed(Self::fallback(&err))
            }
        }
    }
}
