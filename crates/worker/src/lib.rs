//! Worker-side external task engine.
//!
//! Polls a lock authority per topic, executes each leased task with its
//! handler, resolves the outcome and reports it back while the lease is still
//! held.
//!
//! Components:
//! - **authority**: the lock authority port (`fetch_and_lock`, `complete`, ...)
//! - **lease**: in-flight registry of held leases
//! - **retry**: retry budgets and poll backoff
//! - **resolver**: outcome → authority call
//! - **scheduler**: per-topic polling loops with cooperative shutdown

pub mod authority;
pub mod lease;
pub mod resolver;
pub mod retry;
pub mod scheduler;

pub use authority::{AuthorityError, ExternalTaskService, FailureReport, FetchAndLock};
pub use lease::{Lease, LeaseRegistry};
pub use resolver::{OutcomeResolver, Resolution};
pub use retry::{PollBackoff, RetryBudget, RetryDecision};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle, SchedulerStats, TopicSubscription};

pub use tokio_util::sync::CancellationToken;
