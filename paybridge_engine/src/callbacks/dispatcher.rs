use log::*;

use crate::{
    callbacks::{CallbackJob, CallbackTransport, RetryPolicy},
    traits::{CallbackQueue, QueueError},
};

/// Accepts partner notifications on behalf of the webhook processor and the reconciliation sweep.
///
/// `dispatch` never fails: whatever happens to the notification is dealt with (and logged) here.
#[allow(async_fn_in_trait)]
pub trait CallbackDispatch: Clone {
    async fn dispatch(&self, job: CallbackJob);
}

/// Hands jobs to the durable queue, which retries them with backoff until the partner acknowledges.
#[derive(Clone)]
pub struct DurableDelivery<Q> {
    queue: Q,
    policy: RetryPolicy,
}

impl<Q: CallbackQueue> DurableDelivery<Q> {
    pub fn new(queue: Q, policy: RetryPolicy) -> Self {
        Self { queue, policy }
    }

    pub async fn submit(&self, job: &CallbackJob) -> Result<i64, QueueError> {
        self.queue.enqueue(job, &self.policy).await
    }
}

/// One immediate delivery attempt whose outcome is only logged.
#[derive(Clone)]
pub struct DirectDelivery<T> {
    transport: T,
}

impl<T: CallbackTransport> DirectDelivery<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub async fn deliver_once(&self, job: &CallbackJob) {
        match self.transport.deliver(job).await {
            Ok(()) => info!("📮️ Direct callback {} to {} delivered", job.method, job.callback_url),
            Err(e) => warn!("📮️ Direct callback {} to {} was lost: {e}", job.method, job.callback_url),
        }
    }
}

/// Queue first, and if the queue cannot take the job, deliver it directly once.
#[derive(Clone)]
pub struct CallbackDispatcher<Q, T> {
    durable: DurableDelivery<Q>,
    direct: DirectDelivery<T>,
}

impl<Q, T> CallbackDispatcher<Q, T>
where
    Q: CallbackQueue,
    T: CallbackTransport,
{
    pub fn new(queue: Q, transport: T, policy: RetryPolicy) -> Self {
        Self { durable: DurableDelivery::new(queue, policy), direct: DirectDelivery::new(transport) }
    }
}

impl<Q, T> CallbackDispatch for CallbackDispatcher<Q, T>
where
    Q: CallbackQueue,
    T: CallbackTransport,
{
    async fn dispatch(&self, job: CallbackJob) {
        match self.durable.submit(&job).await {
            Ok(id) => info!("📮️ Callback {} for {} queued as job #{id}", job.method, job.callback_url),
            Err(e) => {
                warn!(
                    "📮️ Could not queue callback {} for {}: {e}. Falling back to a single direct delivery.",
                    job.method, job.callback_url
                );
                self.direct.deliver_once(&job).await;
            },
        }
    }
}
