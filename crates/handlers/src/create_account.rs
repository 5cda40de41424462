//! `createAccount`: opens the customer's account in the backend system.
//!
//! The backend call is at-least-once: a retried task may open a second
//! account. Ids are random and not de-duplicated.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::{error, info};

use onboardflow_core::{
    BusinessKey, CoreError, Execute, ExternalTask, Outcome, TechnicalFailure, Variables,
};
use onboardflow_workflow::vars;

use crate::TIMESTAMP_FORMAT;

pub const ACCOUNT_STATUS_ACTIVE: &str = "ACTIVE";

const ACCOUNT_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ACCOUNT_ID_LEN: usize = 8;

/// Generate an account id of the form `ACC-XXXXXXXX` (`[A-Z0-9]`).
pub fn generate_account_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ACCOUNT_ID_LEN)
        .map(|_| ACCOUNT_ID_CHARSET[rng.gen_range(0..ACCOUNT_ID_CHARSET.len())] as char)
        .collect();
    format!("ACC-{suffix}")
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("account backend unavailable")]
    Unavailable(#[source] std::io::Error),

    #[error("account backend call timed out after {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRequest {
    pub holder: Option<String>,
    pub email: Option<String>,
    pub business_key: Option<BusinessKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedAccount {
    pub account_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// The system of record accounts are opened in.
#[async_trait]
pub trait AccountBackend: Send + Sync + std::fmt::Debug {
    async fn open_account(&self, request: &AccountRequest) -> Result<OpenedAccount, BackendError>;
}

/// Stand-in backend: waits `latency`, then opens an `ACTIVE` account.
#[derive(Debug, Clone)]
pub struct SimulatedAccountBackend {
    latency: Duration,
}

impl SimulatedAccountBackend {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for SimulatedAccountBackend {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl AccountBackend for SimulatedAccountBackend {
    async fn open_account(&self, request: &AccountRequest) -> Result<OpenedAccount, BackendError> {
        info!(holder = ?request.holder, latency = ?self.latency, "creating account in backend system");
        tokio::time::sleep(self.latency).await;
        Ok(OpenedAccount {
            account_id: generate_account_id(),
            status: ACCOUNT_STATUS_ACTIVE.to_string(),
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CreateAccount {
    backend: Arc<dyn AccountBackend>,
    call_timeout: Duration,
}

impl CreateAccount {
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(backend: Arc<dyn AccountBackend>) -> Self {
        Self {
            backend,
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Bound the backend call; keep it well under the topic's lock duration.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    fn request_for(task: &ExternalTask) -> Result<AccountRequest, CoreError> {
        let v = &task.variables;
        let holder = v.get_str(vars::CUSTOMER_NAME)?.map(str::to_string);
        let email = v.get_str(vars::EMAIL)?.map(str::to_string);

        info!(
            task_id = %task.id,
            customer_name = ?holder,
            email = ?email,
            document_type = ?v.get_str(vars::DOCUMENT_TYPE)?,
            documents_approved = ?v.get_bool(vars::DOCUMENTS_APPROVED)?,
            reviewer_comments = ?v.get_str(vars::REVIEWER_COMMENTS)?,
            "account request"
        );

        Ok(AccountRequest {
            holder,
            email,
            business_key: task.business_key.clone(),
        })
    }

    async fn open(&self, request: &AccountRequest) -> Result<OpenedAccount, BackendError> {
        match tokio::time::timeout(self.call_timeout, self.backend.open_account(request)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::TimedOut(self.call_timeout)),
        }
    }
}

#[async_trait]
impl Execute for CreateAccount {
    async fn execute(&self, task: &ExternalTask) -> Outcome {
        info!(
            task_id = %task.id,
            process_instance_id = %task.process_instance_id,
            business_key = ?task.business_key,
            "create account task received"
        );

        let request = match Self::request_for(task) {
            Ok(r) => r,
            Err(err) => {
                error!(task_id = %task.id, error = %err, "invalid account request");
                return TechnicalFailure::from_error("Account creation failed", &err).into();
            }
        };

        let account = match self.open(&request).await {
            Ok(a) => a,
            Err(err) => {
                error!(task_id = %task.id, error = %err, "account creation failed");
                return TechnicalFailure::from_error("Account creation failed", &err).into();
            }
        };

        info!(
            task_id = %task.id,
            account_id = %account.account_id,
            status = %account.status,
            "account created"
        );

        Outcome::completed(
            Variables::new()
                .with(vars::ACCOUNT_ID, account.account_id)
                .with(vars::ACCOUNT_STATUS, account.status)
                .with(
                    vars::ACCOUNT_CREATED_AT,
                    account.created_at.format(TIMESTAMP_FORMAT).to_string(),
                )
                .with(vars::ACCOUNT_EMAIL, request.email)
                .with(vars::ACCOUNT_HOLDER, request.holder)
                .with(vars::ONBOARDING_COMPLETED, true),
        )
    }
}
