use std::time::Duration;

use log::*;

use crate::{
    callbacks::{CallbackTransport, RetentionPolicy, RetryPolicy},
    traits::{CallbackQueue, FailureOutcome, QueueError},
};

pub const DEFAULT_BATCH_SIZE: u32 = 20;
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub batch_size: u32,
    /// How long a claimed job stays hidden from other workers
    pub visibility_timeout: Duration,
    pub retry: RetryPolicy,
    pub retention: RetentionPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            retry: RetryPolicy::default(),
            retention: RetentionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub claimed: usize,
    pub delivered: usize,
    pub retried: usize,
    pub dead: usize,
    /// Jobs whose outcome could not be recorded. They become claimable again after the visibility timeout.
    pub errors: usize,
    pub pruned: u64,
}

/// Drains due jobs from the callback queue and delivers them to partners.
#[derive(Clone)]
pub struct CallbackWorker<Q, T> {
    queue: Q,
    transport: T,
    config: WorkerConfig,
}

impl<Q, T> CallbackWorker<Q, T>
where
    Q: CallbackQueue,
    T: CallbackTransport,
{
    pub fn new(queue: Q, transport: T, config: WorkerConfig) -> Self {
        Self { queue, transport, config }
    }

    /// Claims one batch of due jobs, attempts each once, records the outcomes and prunes old finished jobs.
    pub async fn run_once(&self) -> Result<WorkerReport, QueueError> {
        let jobs = self.queue.claim_due(self.config.batch_size, self.config.visibility_timeout).await?;
        let mut report = WorkerReport { claimed: jobs.len(), ..Default::default() };
        for queued in jobs {
            let attempt = queued.attempts + 1;
            match self.transport.deliver(&queued.job).await {
                Ok(()) => match self.queue.mark_completed(queued.id).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        warn!("📮️ Callback job #{} was delivered, but could not be marked completed: {e}", queued.id);
                        report.errors += 1;
                    },
                },
                Err(e) => match self.queue.mark_failed(queued.id, &e.to_string(), &self.config.retry).await {
                    Ok(FailureOutcome::Retry { delay, .. }) => {
                        warn!(
                            "📮️ Callback job #{} attempt {attempt}/{} failed: {e}. Retrying in {}s",
                            queued.id,
                            queued.max_attempts,
                            delay.as_secs()
                        );
                        report.retried += 1;
                    },
                    Ok(FailureOutcome::Dead { attempts }) => {
                        error!(
                            "📮️ Callback job #{} to {} failed {attempts} times and has been dropped. Last error: {e}",
                            queued.id, queued.job.callback_url
                        );
                        report.dead += 1;
                    },
                    Err(qe) => {
                        warn!("📮️ Could not record the failed delivery of callback job #{}: {qe}", queued.id);
                        report.errors += 1;
                    },
                },
            }
        }
        report.pruned = self.queue.prune(&self.config.retention).await?;
        if report.claimed > 0 || report.pruned > 0 {
            debug!("📮️ Callback worker pass: {report:?}");
        }
        Ok(report)
    }
}
