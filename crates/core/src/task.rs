//! The worker-side mirror of a leased external task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{BusinessKey, ProcessInstanceId, TaskId, WorkerId};
use crate::variables::Variables;

/// Topic names the onboarding process publishes external work under.
pub mod topics {
    pub const VALIDATE_DATA: &str = "validateData";
    pub const CREATE_ACCOUNT: &str = "createAccount";
    pub const HANDLE_ERROR: &str = "handleError";

    pub const ALL: [&str; 3] = [VALIDATE_DATA, CREATE_ACCOUNT, HANDLE_ERROR];
}

/// A unit of external work as returned by `fetch_and_lock`.
///
/// The authority owns the task; this is a read-only copy valid while the
/// lease is held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTask {
    pub id: TaskId,
    pub topic: String,
    pub process_instance_id: ProcessInstanceId,
    pub business_key: Option<BusinessKey>,
    pub variables: Variables,
    /// Authority-reported remaining retries; `None` until the first failure.
    pub retries: Option<u32>,
    pub worker_id: WorkerId,
    pub lock_expiration_time: DateTime<Utc>,
}
