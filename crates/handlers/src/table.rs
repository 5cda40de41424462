//! Topic → handler dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use onboardflow_core::{topics, Execute, ExternalTask, Outcome};

use crate::create_account::{AccountBackend, CreateAccount};
use crate::handle_error::HandleError;
use crate::validate_data::ValidateData;

/// The closed set of onboarding handlers.
#[derive(Debug, Clone)]
pub enum TaskHandler {
    ValidateData(ValidateData),
    CreateAccount(CreateAccount),
    HandleError(HandleError),
}

impl TaskHandler {
    pub fn topic(&self) -> &'static str {
        match self {
            TaskHandler::ValidateData(_) => topics::VALIDATE_DATA,
            TaskHandler::CreateAccount(_) => topics::CREATE_ACCOUNT,
            TaskHandler::HandleError(_) => topics::HANDLE_ERROR,
        }
    }
}

#[async_trait]
impl Execute for TaskHandler {
    async fn execute(&self, task: &ExternalTask) -> Outcome {
        match self {
            TaskHandler::ValidateData(h) => h.execute(task).await,
            TaskHandler::CreateAccount(h) => h.execute(task).await,
            TaskHandler::HandleError(h) => h.execute(task).await,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<String, TaskHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// All three onboarding handlers, account creation against `backend`.
    pub fn onboarding(backend: Arc<dyn AccountBackend>, account_call_timeout: Duration) -> Self {
        let mut table = Self::new();
        table.register(TaskHandler::ValidateData(ValidateData));
        table.register(TaskHandler::CreateAccount(
            CreateAccount::new(backend).with_call_timeout(account_call_timeout),
        ));
        table.register(TaskHandler::HandleError(HandleError));
        table
    }

    /// Register a handler under its topic, returning the one it replaced.
    pub fn register(&mut self, handler: TaskHandler) -> Option<TaskHandler> {
        self.handlers.insert(handler.topic().to_string(), handler)
    }

    pub fn get(&self, topic: &str) -> Option<&TaskHandler> {
        self.handlers.get(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl Execute for HandlerTable {
    async fn execute(&self, task: &ExternalTask) -> Outcome {
        match self.get(&task.topic) {
            Some(handler) => handler.execute(task).await,
            None => {
                warn!(task_id = %task.id, topic = %task.topic, "no handler for topic");
                Outcome::technical_failure(
                    format!("no handler for topic: {}", task.topic),
                    format!("registered topics: {:?}", self.topics().collect::<Vec<_>>()),
                )
            }
        }
    }
}
