//! PayBridge Payment Engine
//!
//! The payment engine sits between payers, a card/wallet processor and partner merchants. It keeps three views of a
//! payment in step: the processor's intent status, the local payment record, and the notification the partner has
//! received.
//!
//! The library is divided into these sections:
//! 1. Storage ([`mod@traits`], [`mod@sqlite`]). Backends implement the traits in [`mod@traits`]; SQLite is the
//!    supported backend. The data types stored in the database live in [`mod@db_types`].
//! 2. The processor collaborator ([`mod@processor`]): the [`PaymentProcessor`] interface, a Stripe client, webhook
//!    signature verification and the event model.
//! 3. Partner notifications ([`mod@callbacks`]): a durable retrying queue with a direct-delivery fallback, and the
//!    worker that drains it.
//! 4. The public API ([`mod@api`]): the webhook event processor, the reconciliation sweep, the checkout flow and the
//!    EUR rate resolver.
pub mod api;
pub mod callbacks;
pub mod db_types;
pub mod helpers;
pub mod processor;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{
    CheckoutRequest,
    CheckoutSession,
    PaymentFlowApi,
    PaymentFlowError,
    RateResolver,
    ReconciliationSweep,
    SweepConfig,
    SweepOutcome,
    SweepReport,
    WebhookAck,
    WebhookError,
    WebhookEventProcessor,
    WebhookOutcome,
};
pub use callbacks::{CallbackDispatch, CallbackDispatcher, CallbackWorker, HttpCallbackTransport};
pub use processor::{PaymentProcessor, StripeClient, StripeConfig, WebhookVerifier};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{CallbackQueue, DistributedLock, OwnerManagement, PaymentGatewayDatabase, PaymentGatewayError};
