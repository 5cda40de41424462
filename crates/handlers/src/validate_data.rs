//! `validateData`: checks the customer's name, email and document type.
//!
//! - All checks pass: complete with `isValid = true`
//! - Any check fails: throw the `VALIDATION_ERROR` business error with every
//!   failure reason, in field order
//! - A variable of the wrong type is a technical failure, never a business error

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tracing::{error, info, warn};

use onboardflow_core::{CoreError, Execute, ExternalTask, Outcome, TechnicalFailure, Variables};
use onboardflow_workflow::vars;

/// Business error code thrown when customer data is invalid.
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";

/// Accepted document types (compared case-insensitively).
pub const VALID_DOCUMENT_TYPES: [&str; 3] = ["ID", "PASSPORT", "DRIVING_LICENSE"];

const ALL_PASSED: &str = "All validations passed successfully.";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern compiles")
});

/// Result of checking one set of customer data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub message: String,
}

impl ValidationReport {
    pub fn check(
        customer_name: Option<&str>,
        email: Option<&str>,
        document_type: Option<&str>,
    ) -> Self {
        let mut errors: Vec<String> = Vec::new();

        match customer_name.map(str::trim) {
            None | Some("") => errors.push("Customer name is required.".to_string()),
            Some(name) if name.chars().count() < 2 => {
                errors.push("Customer name must be at least 2 characters.".to_string())
            }
            Some(_) => {}
        }

        match email {
            None => errors.push("Email is required.".to_string()),
            Some(e) if e.trim().is_empty() => errors.push("Email is required.".to_string()),
            Some(e) if !EMAIL_PATTERN.is_match(e) => {
                errors.push("Invalid email format.".to_string())
            }
            Some(_) => {}
        }

        match document_type.map(str::trim) {
            None | Some("") => errors.push("Document type is required.".to_string()),
            Some(doc)
                if !VALID_DOCUMENT_TYPES
                    .iter()
                    .any(|valid| valid.eq_ignore_ascii_case(doc)) =>
            {
                errors.push(format!(
                    "Invalid document type. Allowed: {}.",
                    VALID_DOCUMENT_TYPES.join(", ")
                ))
            }
            Some(_) => {}
        }

        if errors.is_empty() {
            Self {
                is_valid: true,
                message: ALL_PASSED.to_string(),
            }
        } else {
            Self {
                is_valid: false,
                message: errors.join(" ").trim().to_string(),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateData;

impl ValidateData {
    fn validate(&self, task: &ExternalTask) -> Result<ValidationReport, CoreError> {
        let v = &task.variables;
        let customer_name = v.get_str(vars::CUSTOMER_NAME)?;
        let email = v.get_str(vars::EMAIL)?;
        let document_type = v.get_str(vars::DOCUMENT_TYPE)?;

        info!(
            task_id = %task.id,
            customer_name = ?customer_name,
            email = ?email,
            document_type = ?document_type,
            "validating customer data"
        );

        Ok(ValidationReport::check(customer_name, email, document_type))
    }
}

#[async_trait]
impl Execute for ValidateData {
    async fn execute(&self, task: &ExternalTask) -> Outcome {
        info!(
            task_id = %task.id,
            process_instance_id = %task.process_instance_id,
            business_key = ?task.business_key,
            "validate data task received"
        );

        let report = match self.validate(task) {
            Ok(report) => report,
            Err(err) => {
                error!(task_id = %task.id, error = %err, "technical error during validation");
                return TechnicalFailure::from_error("Technical error", &err).into();
            }
        };

        if report.is_valid {
            info!(task_id = %task.id, "validation passed");
            Outcome::completed(
                Variables::new()
                    .with(vars::IS_VALID, true)
                    .with(vars::VALIDATION_MESSAGE, report.message)
                    .with(vars::VALIDATED_AT, Utc::now().timestamp_millis()),
            )
        } else {
            warn!(task_id = %task.id, reason = %report.message, "validation failed");
            Outcome::domain_error(
                VALIDATION_ERROR,
                report.message.clone(),
                Variables::new()
                    .with(vars::IS_VALID, false)
                    .with(vars::VALIDATION_MESSAGE, report.message)
                    .with(vars::ERROR_CODE, VALIDATION_ERROR),
            )
        }
    }
}
