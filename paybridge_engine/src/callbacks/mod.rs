//! Partner notifications.
//!
//! A [`CallbackJob`] is produced whenever a payment reaches a partner-notifiable outcome. The
//! [`CallbackDispatcher`] puts it on the durable [`crate::traits::CallbackQueue`], falling back to one direct delivery
//! if the queue is unavailable. The [`CallbackWorker`] drains the queue and reports each outcome back to it so that
//! failed deliveries are retried according to the [`RetryPolicy`].
mod dispatcher;
mod job;
mod policy;
mod transport;
mod worker;

pub use dispatcher::{CallbackDispatch, CallbackDispatcher, DirectDelivery, DurableDelivery};
pub use job::{CallbackJob, CallbackMethod, CallbackParams};
pub use policy::{
    RetentionPolicy,
    RetryPolicy,
    DEFAULT_BACKOFF_BASE,
    DEFAULT_KEEP_COMPLETED,
    DEFAULT_KEEP_FAILED,
    DEFAULT_MAX_ATTEMPTS,
};
pub use transport::{CallbackTransport, DeliveryError, HttpCallbackTransport};
pub use worker::{CallbackWorker, WorkerConfig, WorkerReport, DEFAULT_BATCH_SIZE, DEFAULT_VISIBILITY_TIMEOUT};
