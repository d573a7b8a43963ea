use std::time::Duration;

use thiserror::Error;

use crate::{
    callbacks::{CallbackJob, RetentionPolicy, RetryPolicy},
    traits::data_objects::{FailureOutcome, QueuedJob},
};

/// A durable queue of partner notifications with retry scheduling.
#[allow(async_fn_in_trait)]
pub trait CallbackQueue: Clone {
    /// Adds a job that is due immediately. Returns the queue's job id.
    async fn enqueue(&self, job: &CallbackJob, policy: &RetryPolicy) -> Result<i64, QueueError>;

    /// Claims up to `limit` due jobs, oldest first. Claimed jobs are hidden from other workers for `visibility`.
    async fn claim_due(&self, limit: u32, visibility: Duration) -> Result<Vec<QueuedJob>, QueueError>;

    async fn mark_completed(&self, id: i64) -> Result<(), QueueError>;

    /// Records a failed delivery attempt. The job is rescheduled according to `policy`, or moved to the failed set once
    /// it has used up its attempts.
    async fn mark_failed(&self, id: i64, error: &str, policy: &RetryPolicy) -> Result<FailureOutcome, QueueError>;

    /// Deletes finished jobs beyond the retention limits. Returns the number of jobs removed.
    async fn prune(&self, retention: &RetentionPolicy) -> Result<u64, QueueError>;

    async fn fetch_job(&self, id: i64) -> Result<Option<QueuedJob>, QueueError>;
}

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("The callback queue is unavailable: {0}")]
    Unavailable(String),
    #[error("Callback job {0} does not exist")]
    JobNotFound(i64),
    #[error("Callback job {0} is already finished")]
    JobFinished(i64),
    #[error("Could not (de)serialize callback job: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        QueueError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        QueueError::Serialization(e.to_string())
    }
}
